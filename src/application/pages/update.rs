use std::collections::HashSet;

use opaline_api_types::ElementInput;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::application::repos::{ElementParams, PageFieldsPatch, PagesTx};
use crate::cache::page_key;
use crate::domain::entities::PageRecord;
use crate::domain::error::DomainError;
use crate::domain::types::UserId;

use super::{PageService, PageServiceError, SOURCE, finish_tx, prepare_elements};

#[derive(Debug, Clone, Default)]
pub struct UpdatePageCommand {
    pub page_uuid: String,
    /// Ignored when empty.
    pub page_name: Option<String>,
    pub is_root: Option<bool>,
    pub public_page: Option<bool>,
    pub is_favourite: Option<bool>,
    /// `None` leaves elements alone; `Some` replaces the ordering with this list.
    pub elements: Option<Vec<ElementInput>>,
}

impl PageService {
    /// Apply a partial page update and reconcile its elements in one transaction.
    pub async fn update_page(
        &self,
        owner: UserId,
        command: UpdatePageCommand,
    ) -> Result<(), PageServiceError> {
        let page = self
            .pages
            .find_page(&command.page_uuid)
            .await?
            .filter(|page| page.is_owned_by(owner))
            .ok_or(PageServiceError::NotFound)?;

        let elements = command.elements.map(prepare_elements).transpose()?;

        if let Err(err) = self
            .pages
            .touch_last_updated(page.id, OffsetDateTime::now_utc())
            .await
        {
            warn!(
                target = "opaline::pages::update",
                source = SOURCE,
                page_uuid = %page.page_uuid,
                error = %err,
                "failed to stamp last_updated_at"
            );
        }

        let fields = FieldChanges {
            page_name: command.page_name.filter(|name| !name.is_empty()),
            is_root: command.is_root,
            public_page: command.public_page,
            is_favourite: command.is_favourite,
        };

        let mut tx = self.pages.begin().await?;
        let result = reconcile(tx.as_mut(), &page.page_uuid, owner, fields, elements).await;
        let outcome = finish_tx(tx, result).await?;

        let mut keys = vec![page_key(&page.page_uuid)];
        if let Some(parent) = page.parent_page_uuid.as_deref() {
            keys.push(page_key(parent));
        }
        self.invalidate(keys).await;

        info!(
            target = "opaline::pages::update",
            page_uuid = %page.page_uuid,
            fields_changed = outcome.fields_changed,
            views_reset = outcome.views_reset,
            elements_written = outcome.elements_written,
            elements_removed = outcome.elements_removed,
            "page updated"
        );
        Ok(())
    }
}

struct FieldChanges {
    page_name: Option<String>,
    is_root: Option<bool>,
    public_page: Option<bool>,
    is_favourite: Option<bool>,
}

#[derive(Debug, Default)]
struct ReconcileOutcome {
    fields_changed: bool,
    views_reset: bool,
    elements_written: usize,
    elements_removed: usize,
}

async fn reconcile(
    tx: &mut dyn PagesTx,
    page_uuid: &str,
    owner: UserId,
    fields: FieldChanges,
    elements: Option<Vec<ElementParams>>,
) -> Result<ReconcileOutcome, PageServiceError> {
    let page = tx
        .find_page(page_uuid)
        .await?
        .filter(|page| page.is_owned_by(owner))
        .ok_or(PageServiceError::NotFound)?;

    let mut outcome = ReconcileOutcome::default();

    let views_reset = fields
        .public_page
        .is_some_and(|public| public != page.public_page);
    let patch = PageFieldsPatch {
        page_name: fields.page_name,
        is_root: fields.is_root,
        public_page: fields.public_page,
        is_favourite: fields.is_favourite,
        reset_views: views_reset,
    };
    if !patch.is_empty() {
        tx.update_page_fields(page.id, &patch).await?;
        outcome.fields_changed = true;
        outcome.views_reset = views_reset;
    }

    if let Some(elements) = elements {
        let (written, removed) = reconcile_elements(tx, &page, owner, &elements).await?;
        outcome.elements_written = written;
        outcome.elements_removed = removed;
    }

    Ok(outcome)
}

/// Upsert `elements`, drop previously ordered elements that are no longer
/// listed, and store the supplied order.
async fn reconcile_elements(
    tx: &mut dyn PagesTx,
    page: &PageRecord,
    owner: UserId,
    elements: &[ElementParams],
) -> Result<(usize, usize), PageServiceError> {
    let mut positions = Vec::with_capacity(elements.len());
    for element in elements {
        match tx.find_element(&element.element_uuid).await? {
            Some(existing) if existing.page_id == page.id && existing.user_id == owner => {
                tx.update_element(existing.id, element).await?;
            }
            Some(_) => {
                return Err(PageServiceError::Conflict(format!(
                    "element `{}` belongs to another page",
                    element.element_uuid
                )));
            }
            None => {
                tx.create_element(page.id, owner, element).await?;
            }
        }
        positions.push(element.element_uuid.clone());
    }

    let kept: HashSet<&str> = positions.iter().map(String::as_str).collect();
    let mut seen = HashSet::new();
    let mut removed = 0;
    for stale in &page.element_positions {
        if kept.contains(stale.as_str()) || !seen.insert(stale.as_str()) {
            continue;
        }
        match tx.find_element(stale).await? {
            Some(existing) if existing.page_id == page.id => {
                tx.delete_element(existing.id).await?;
                removed += 1;
            }
            _ => {
                return Err(DomainError::validation(format!(
                    "element `{stale}` is listed in the page ordering but does not exist"
                ))
                .into());
            }
        }
    }

    tx.set_element_positions(page.id, &positions).await?;
    Ok((elements.len(), removed))
}
