#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use opaline::application::pages::{CreatePageCommand, PageService};
use opaline::application::repos::{CreateUserParams, PagesRepo, PagesTx, RepoError, UsersRepo};
use opaline::cache::{CacheConfig, CacheError, MemoryPageCache, PageCache};
use opaline::domain::entities::{ElementRecord, PageRecord};
use opaline::domain::types::UserId;
use opaline::domain::views::ViewCounts;
use opaline::infra::memory::MemoryRepositories;
use opaline_api_types::{ElementInput, OwnerPageResponse};
use serde_json::json;
use time::{Date, OffsetDateTime};

pub struct Harness {
    pub repos: Arc<MemoryRepositories>,
    pub cache: Arc<MemoryPageCache>,
    pub service: PageService,
}

impl Harness {
    pub fn new() -> Self {
        let repos = Arc::new(MemoryRepositories::new());
        let cache = Arc::new(MemoryPageCache::new(&CacheConfig::default()));
        let service = PageService::new(repos.clone(), cache.clone());
        Self {
            repos,
            cache,
            service,
        }
    }

    pub async fn user(&self, email: &str) -> UserId {
        self.repos
            .create_user(CreateUserParams {
                email: email.to_string(),
                name: email.to_string(),
                picture: String::new(),
            })
            .await
            .expect("user should be created")
            .id
    }

    pub async fn page(&self, owner: UserId, command: CreatePageCommand) {
        self.service
            .create_page(owner, command)
            .await
            .expect("page should be created");
    }

    /// Decode the raw cache entry for `page_uuid`, if any.
    pub async fn cached(&self, page_uuid: &str) -> Option<OwnerPageResponse> {
        let raw = self
            .cache
            .get(&format!("/page-get/{page_uuid}"))
            .await
            .expect("memory cache get");
        raw.map(|raw| serde_json::from_str(&raw).expect("cached snapshot decodes"))
    }
}

pub fn root_page(uuid: &str, public: bool) -> CreatePageCommand {
    CreatePageCommand {
        page_uuid: uuid.to_string(),
        page_name: format!("Page {uuid}"),
        is_root: true,
        public_page: public,
        ..Default::default()
    }
}

pub fn child_page(uuid: &str, parent: &str) -> CreatePageCommand {
    CreatePageCommand {
        page_uuid: uuid.to_string(),
        page_name: format!("Page {uuid}"),
        parent_page_uuid: Some(parent.to_string()),
        ..Default::default()
    }
}

pub fn element(uuid: &str, text: &str) -> ElementInput {
    ElementInput {
        element_uuid: uuid.to_string(),
        element_type: "text".to_string(),
        content: json!({ "text": text }),
        etc: None,
        size: None,
    }
}

/// Cache whose every operation fails.
pub struct FailingPageCache;

#[async_trait]
impl PageCache for FailingPageCache {
    async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        Err(CacheError::Unavailable("offline".to_string()))
    }

    async fn set(&self, _key: &str, _value: String) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("offline".to_string()))
    }

    async fn delete(&self, _key: &str) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("offline".to_string()))
    }
}

/// Memory cache that deletes `page_uuid` from the store right after the first
/// read that finds it cached, then drops the entry the way a writer would.
pub struct DeletingOnHitCache {
    pub inner: MemoryPageCache,
    repos: Arc<MemoryRepositories>,
    page_uuid: String,
    armed: AtomicBool,
}

impl DeletingOnHitCache {
    pub fn new(repos: Arc<MemoryRepositories>, page_uuid: &str) -> Self {
        Self {
            inner: MemoryPageCache::new(&CacheConfig::default()),
            repos,
            page_uuid: page_uuid.to_string(),
            armed: AtomicBool::new(false),
        }
    }

    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl PageCache for DeletingOnHitCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let value = self.inner.get(key).await?;
        if value.is_some() && self.armed.swap(false, Ordering::SeqCst) {
            let page = self
                .repos
                .find_page(&self.page_uuid)
                .await
                .expect("find page")
                .expect("page exists");
            let mut tx = self.repos.begin().await.expect("begin");
            tx.purge_elements(page.id).await.expect("purge elements");
            tx.purge_page(page.id).await.expect("purge page");
            tx.commit().await.expect("commit");
            self.inner.delete(key).await?;
        }
        Ok(value)
    }

    async fn set(&self, key: &str, value: String) -> Result<(), CacheError> {
        self.inner.set(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.inner.delete(key).await
    }
}

/// Page store whose view increments fail while `failing` is set.
pub struct FlakyViewsRepo {
    pub inner: Arc<MemoryRepositories>,
    pub failing: AtomicBool,
}

impl FlakyViewsRepo {
    pub fn new(inner: Arc<MemoryRepositories>) -> Self {
        Self {
            inner,
            failing: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl PagesRepo for FlakyViewsRepo {
    async fn find_page(&self, page_uuid: &str) -> Result<Option<PageRecord>, RepoError> {
        self.inner.find_page(page_uuid).await
    }

    async fn list_pages_for_owner(&self, owner: UserId) -> Result<Vec<PageRecord>, RepoError> {
        self.inner.list_pages_for_owner(owner).await
    }

    async fn list_sub_pages(&self, parent_uuid: &str) -> Result<Vec<PageRecord>, RepoError> {
        self.inner.list_sub_pages(parent_uuid).await
    }

    async fn list_elements(&self, page_id: i64) -> Result<Vec<ElementRecord>, RepoError> {
        self.inner.list_elements(page_id).await
    }

    async fn touch_last_updated(
        &self,
        page_id: i64,
        at: OffsetDateTime,
    ) -> Result<(), RepoError> {
        self.inner.touch_last_updated(page_id, at).await
    }

    async fn record_view(&self, page_id: i64, today: Date) -> Result<ViewCounts, RepoError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RepoError::Timeout);
        }
        self.inner.record_view(page_id, today).await
    }

    async fn begin(&self) -> Result<Box<dyn PagesTx>, RepoError> {
        self.inner.begin().await
    }
}
