use metrics::counter;
use opaline_api_types::OwnerPageResponse;
use tracing::{debug, warn};

use crate::application::repos::RepoError;
use crate::cache::page_key;
use crate::domain::pages::order_elements;
use crate::domain::types::UserId;
use crate::domain::views::ViewCounts;

use super::view::{PageView, build_snapshot, snapshot_owner};
use super::{PageService, PageServiceError, SOURCE, today};

impl PageService {
    /// Read one page for `caller`, serving from cache when possible.
    ///
    /// Every read of a public page counts as a view, including the owner's own
    /// reads. Private pages are only visible to their owner and are never
    /// counted.
    pub async fn get_page(
        &self,
        page_uuid: &str,
        caller: Option<UserId>,
    ) -> Result<PageView, PageServiceError> {
        let key = page_key(page_uuid);

        if let Some(snapshot) = self.cached_snapshot(&key).await {
            counter!("opaline_cache_hit_total").increment(1);
            return self.serve_cached(snapshot, &key, caller).await;
        }

        counter!("opaline_cache_miss_total").increment(1);
        self.serve_from_store(page_uuid, &key, caller).await
    }

    /// Cache errors and undecodable entries both read as a miss; the latter are evicted.
    async fn cached_snapshot(&self, key: &str) -> Option<OwnerPageResponse> {
        let raw = match self.cache.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                warn!(
                    target = "opaline::pages::cache",
                    source = SOURCE,
                    key = %key,
                    error = %err,
                    "cache read failed; falling back to store"
                );
                return None;
            }
        };

        match serde_json::from_str::<OwnerPageResponse>(&raw) {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                counter!("opaline_cache_corrupt_total").increment(1);
                warn!(
                    target = "opaline::pages::cache",
                    source = SOURCE,
                    key = %key,
                    error = %err,
                    "discarding undecodable cache entry"
                );
                self.evict(key).await;
                None
            }
        }
    }

    async fn serve_cached(
        &self,
        mut snapshot: OwnerPageResponse,
        key: &str,
        caller: Option<UserId>,
    ) -> Result<PageView, PageServiceError> {
        if !snapshot.page.public_page {
            return match caller {
                Some(caller) if caller == snapshot_owner(&snapshot) => Ok(PageView::Owner(snapshot)),
                _ => Err(PageServiceError::Unauthorized),
            };
        }

        let today = today();
        match self.pages.record_view(snapshot.page.id, today).await {
            Ok(_) => {}
            Err(RepoError::NotFound) => {
                // Deleted after the cache read; drop the entry so it cannot be written back.
                self.evict(key).await;
                return self
                    .serve_from_store(&snapshot.page.page_uuid, key, caller)
                    .await;
            }
            Err(err) => warn!(
                target = "opaline::pages::views",
                source = SOURCE,
                page_uuid = %snapshot.page.page_uuid,
                error = %err,
                "durable view increment failed on cache hit"
            ),
        }

        let counts = ViewCounts::new(
            snapshot.page.view_count,
            std::mem::take(&mut snapshot.page.date_view_count),
        )
        .bump(today);
        snapshot.page.view_count = counts.total;
        snapshot.page.date_view_count = counts.by_date;
        counter!("opaline_page_view_total").increment(1);

        self.store_snapshot(key, &snapshot).await;

        Ok(PageView::for_caller(snapshot, caller))
    }

    async fn serve_from_store(
        &self,
        page_uuid: &str,
        key: &str,
        caller: Option<UserId>,
    ) -> Result<PageView, PageServiceError> {
        let mut page = self
            .pages
            .find_page(page_uuid)
            .await?
            .ok_or(PageServiceError::NotFound)?;

        let is_owner = caller.is_some_and(|caller| page.is_owned_by(caller));
        if !page.public_page && !is_owner {
            return Err(PageServiceError::Unauthorized);
        }

        if page.public_page {
            page.views = self.pages.record_view(page.id, today()).await?;
            counter!("opaline_page_view_total").increment(1);
        }

        let mut elements = self.pages.list_elements(page.id).await?;
        order_elements(&mut elements, &page.element_positions, |element| {
            element.element_uuid.as_str()
        });
        let sub_pages = self.pages.list_sub_pages(&page.page_uuid).await?;

        let snapshot = build_snapshot(page, elements, sub_pages);
        if is_owner {
            self.store_snapshot(key, &snapshot).await;
        }

        Ok(PageView::for_caller(snapshot, caller))
    }

    async fn evict(&self, key: &str) {
        if let Err(err) = self.cache.delete(key).await {
            warn!(
                target = "opaline::pages::cache",
                source = SOURCE,
                key = %key,
                error = %err,
                "failed to evict cache entry"
            );
        }
    }

    async fn store_snapshot(&self, key: &str, snapshot: &OwnerPageResponse) {
        let encoded = match serde_json::to_string(snapshot) {
            Ok(encoded) => encoded,
            Err(err) => {
                warn!(
                    target = "opaline::pages::cache",
                    source = SOURCE,
                    key = %key,
                    error = %err,
                    "failed to encode page snapshot"
                );
                return;
            }
        };

        match self.cache.set(key, encoded).await {
            Ok(()) => debug!(target = "opaline::pages::cache", key = %key, "page snapshot cached"),
            Err(err) => warn!(
                target = "opaline::pages::cache",
                source = SOURCE,
                key = %key,
                error = %err,
                "cache write failed"
            ),
        }
    }
}
