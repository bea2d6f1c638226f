//! Page service: cache-aside reads, reconciled updates, and subtree deletion.
//!
//! The store is the source of truth. The cache only ever holds the owner-shaped
//! snapshot under `/page-get/<uuid>`; writers invalidate after commit and never
//! fail a request because the cache misbehaved.

mod create;
mod delete;
mod list;
mod read;
mod update;
mod view;

pub use create::CreatePageCommand;
pub use update::UpdatePageCommand;
pub use view::PageView;

use std::sync::Arc;

use futures::future::join_all;
use metrics::counter;
use opaline_api_types::ElementInput;
use thiserror::Error;
use time::{Date, OffsetDateTime};
use tracing::warn;

use crate::application::repos::{ElementParams, PagesRepo, PagesTx, RepoError};
use crate::cache::PageCache;
use crate::domain::error::DomainError;
use crate::domain::pages::{first_duplicate, normalize_etc, validate_element_type};

const SOURCE: &str = "application::pages::PageService";

#[derive(Debug, Error)]
pub enum PageServiceError {
    #[error("page not found")]
    NotFound,
    #[error("caller may not read this page")]
    Unauthorized,
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Clone)]
pub struct PageService {
    pages: Arc<dyn PagesRepo>,
    cache: Arc<dyn PageCache>,
}

impl PageService {
    pub fn new(pages: Arc<dyn PagesRepo>, cache: Arc<dyn PageCache>) -> Self {
        Self { pages, cache }
    }

    /// Best-effort removal of cache entries. Failures are logged and swallowed.
    async fn invalidate(&self, keys: Vec<String>) {
        let results = join_all(keys.iter().map(|key| self.cache.delete(key))).await;
        for (key, result) in keys.iter().zip(results) {
            match result {
                Ok(()) => counter!("opaline_cache_invalidate_total").increment(1),
                Err(err) => warn!(
                    target = "opaline::pages::cache",
                    source = SOURCE,
                    key = %key,
                    error = %err,
                    "cache invalidation failed"
                ),
            }
        }
    }
}

/// Commit on success, roll back on failure. A failed rollback is logged; the
/// original error wins.
async fn finish_tx<T>(
    tx: Box<dyn PagesTx>,
    result: Result<T, PageServiceError>,
) -> Result<T, PageServiceError> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(
                    target = "opaline::pages",
                    source = SOURCE,
                    error = %rollback_err,
                    "transaction rollback failed"
                );
            }
            Err(err)
        }
    }
}

fn today() -> Date {
    OffsetDateTime::now_utc().date()
}

/// Validate and normalize client elements, preserving their order.
fn prepare_elements(elements: Vec<ElementInput>) -> Result<Vec<ElementParams>, DomainError> {
    if let Some(duplicate) = first_duplicate(elements.iter().map(|e| e.element_uuid.as_str())) {
        return Err(DomainError::validation(format!(
            "element `{duplicate}` appears more than once"
        )));
    }

    elements
        .into_iter()
        .map(|element| {
            let element_uuid = element.element_uuid.trim().to_string();
            if element_uuid.is_empty() {
                return Err(DomainError::validation("element_uuid must not be empty"));
            }
            validate_element_type(&element.element_type)?;
            Ok(ElementParams {
                element_uuid,
                element_type: element.element_type,
                content: element.content,
                etc: normalize_etc(element.etc),
                size: element.size,
            })
        })
        .collect()
}
