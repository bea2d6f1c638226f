use std::collections::HashSet;

use opaline_api_types::ElementInput;
use serde_json::Value;
use time::OffsetDateTime;
use tracing::info;

use crate::application::repos::{CreatePageParams, ElementParams, PagesTx};
use crate::cache::page_key;
use crate::domain::entities::PageRecord;
use crate::domain::error::DomainError;
use crate::domain::pages::normalize_etc;
use crate::domain::types::UserId;

use super::{PageService, PageServiceError, finish_tx, prepare_elements};

#[derive(Debug, Clone, Default)]
pub struct CreatePageCommand {
    pub page_uuid: String,
    pub page_name: String,
    pub is_root: bool,
    pub parent_page_uuid: Option<String>,
    pub element_positions: Option<Vec<String>>,
    pub public_page: bool,
    pub is_favourite: bool,
    pub etc: Option<Value>,
    pub elements: Option<Vec<ElementInput>>,
}

impl PageService {
    /// Create a page, optionally with initial elements, under an owned parent.
    pub async fn create_page(
        &self,
        owner: UserId,
        command: CreatePageCommand,
    ) -> Result<PageRecord, PageServiceError> {
        let page_uuid = command.page_uuid.trim().to_string();
        if page_uuid.is_empty() {
            return Err(DomainError::validation("page_uuid must not be empty").into());
        }
        let parent = command
            .parent_page_uuid
            .map(|parent| parent.trim().to_string())
            .filter(|parent| !parent.is_empty());

        let elements = command
            .elements
            .map(prepare_elements)
            .transpose()?
            .unwrap_or_default();
        let element_positions = initial_positions(command.element_positions, &elements)?;

        let params = CreatePageParams {
            page_uuid,
            page_name: command.page_name,
            is_root: command.is_root,
            parent_page_uuid: parent,
            element_positions,
            public_page: command.public_page,
            is_favourite: command.is_favourite,
            etc: normalize_etc(command.etc),
            user_id: owner,
            created_at: OffsetDateTime::now_utc(),
        };

        let mut tx = self.pages.begin().await?;
        let result = insert_page(tx.as_mut(), params, owner, &elements).await;
        let page = finish_tx(tx, result).await?;

        if let Some(parent) = page.parent_page_uuid.as_deref() {
            self.invalidate(vec![page_key(parent)]).await;
        }

        info!(
            target = "opaline::pages::create",
            page_uuid = %page.page_uuid,
            parent_page_uuid = page.parent_page_uuid.as_deref().unwrap_or(""),
            elements = elements.len(),
            "page created"
        );
        Ok(page)
    }
}

/// Supplied positions win but may only name supplied elements; otherwise the
/// element order becomes the ordering.
fn initial_positions(
    supplied: Option<Vec<String>>,
    elements: &[ElementParams],
) -> Result<Vec<String>, DomainError> {
    let supplied = supplied.unwrap_or_default();
    if supplied.is_empty() {
        return Ok(elements.iter().map(|e| e.element_uuid.clone()).collect());
    }

    let known: HashSet<&str> = elements.iter().map(|e| e.element_uuid.as_str()).collect();
    if let Some(unknown) = supplied.iter().find(|uuid| !known.contains(uuid.as_str())) {
        return Err(DomainError::validation(format!(
            "element_positions names unknown element `{unknown}`"
        )));
    }
    Ok(supplied)
}

async fn insert_page(
    tx: &mut dyn PagesTx,
    params: CreatePageParams,
    owner: UserId,
    elements: &[ElementParams],
) -> Result<PageRecord, PageServiceError> {
    if tx.find_page(&params.page_uuid).await?.is_some() {
        return Err(PageServiceError::Conflict(format!(
            "page `{}` already exists",
            params.page_uuid
        )));
    }

    if let Some(parent) = params.parent_page_uuid.as_deref() {
        check_ancestry(tx, &params.page_uuid, parent, owner).await?;
    }

    for element in elements {
        if tx.find_element(&element.element_uuid).await?.is_some() {
            return Err(PageServiceError::Conflict(format!(
                "element `{}` already exists",
                element.element_uuid
            )));
        }
    }

    let page = tx.create_page(params).await?;
    for element in elements {
        tx.create_element(page.id, owner, element).await?;
    }
    Ok(page)
}

/// Walk up from `parent` and refuse any chain that names `page_uuid` or loops.
///
/// The direct parent must exist and belong to `owner`. A missing ancestor
/// higher up simply ends the walk.
async fn check_ancestry(
    tx: &mut dyn PagesTx,
    page_uuid: &str,
    parent: &str,
    owner: UserId,
) -> Result<(), PageServiceError> {
    let direct = tx
        .find_page(parent)
        .await?
        .filter(|page| page.is_owned_by(owner))
        .ok_or_else(|| {
            DomainError::validation(format!("parent page `{parent}` does not exist"))
        })?;

    let mut visited = HashSet::from([direct.page_uuid.clone()]);
    let mut next = direct.parent_page_uuid;
    while let Some(ancestor) = next {
        if ancestor == page_uuid || !visited.insert(ancestor.clone()) {
            return Err(DomainError::cycle(page_uuid).into());
        }
        next = match tx.find_page(&ancestor).await? {
            Some(page) => page.parent_page_uuid,
            None => None,
        };
    }
    Ok(())
}
