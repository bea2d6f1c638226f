//! Canonical page snapshot and its caller-dependent projection.

use std::collections::BTreeMap;

use opaline_api_types::{ElementView, OwnerPage, OwnerPageResponse, PublicPageResponse};
use serde::Serialize;

use crate::domain::entities::{ElementRecord, PageRecord};
use crate::domain::types::UserId;

/// What a caller gets back from a page read.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PageView {
    Owner(OwnerPageResponse),
    Public(PublicPageResponse),
}

impl PageView {
    /// Owner sees the full snapshot; everyone else sees the public projection.
    pub fn for_caller(snapshot: OwnerPageResponse, caller: Option<UserId>) -> Self {
        if caller.is_some_and(|caller| snapshot_owner(&snapshot) == caller) {
            PageView::Owner(snapshot)
        } else {
            PageView::Public(PublicPageResponse::from(snapshot))
        }
    }

    pub fn is_owner_view(&self) -> bool {
        matches!(self, PageView::Owner(_))
    }
}

pub(crate) fn snapshot_owner(snapshot: &OwnerPageResponse) -> UserId {
    UserId::new(snapshot.page.user_id)
}

/// `elements` must already be in display order.
pub(crate) fn build_snapshot(
    page: PageRecord,
    elements: Vec<ElementRecord>,
    sub_pages: Vec<PageRecord>,
) -> OwnerPageResponse {
    let sub_pages: BTreeMap<String, String> = sub_pages
        .into_iter()
        .map(|child| (child.page_uuid, child.page_name))
        .collect();

    OwnerPageResponse {
        page: owner_page(page),
        elements: elements.into_iter().map(element_view).collect(),
        sub_pages,
    }
}

pub(crate) fn owner_page(page: PageRecord) -> OwnerPage {
    OwnerPage {
        id: page.id,
        user_id: page.user_id.as_uuid(),
        created_at: page.created_at,
        updated_at: page.updated_at,
        page_uuid: page.page_uuid,
        page_name: page.page_name,
        is_root: page.is_root,
        element_positions: page.element_positions,
        parent_page_uuid: page.parent_page_uuid,
        public_page: page.public_page,
        is_favourite: page.is_favourite,
        last_updated_at: page.last_updated_at,
        view_count: page.views.total,
        date_view_count: page.views.by_date,
        etc: page.etc,
    }
}

fn element_view(element: ElementRecord) -> ElementView {
    ElementView {
        id: element.id,
        element_uuid: element.element_uuid,
        element_type: element.element_type,
        content: element.content,
        etc: element.etc,
        size: element.size,
    }
}
