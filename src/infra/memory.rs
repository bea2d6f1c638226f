//! Process-local repositories used when no database is configured, and by tests.
//!
//! A transaction holds the state lock for its whole lifetime and works on a
//! private copy; `commit` swaps the copy in, anything else discards it.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use time::{Date, OffsetDateTime};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::application::repos::{
    CreatePageParams, CreateUserParams, ElementParams, PageFieldsPatch, PagesRepo, PagesTx,
    RepoError, UpdateUserTokenParams, UsersRepo,
};
use crate::domain::entities::{ElementRecord, PageRecord, UserRecord};
use crate::domain::types::{AccountStatus, UserId};
use crate::domain::views::ViewCounts;

#[derive(Debug, Clone, Default)]
struct MemoryState {
    next_page_id: i64,
    next_element_id: i64,
    pages: BTreeMap<i64, PageRecord>,
    elements: BTreeMap<i64, ElementRecord>,
    users: BTreeMap<UserId, UserRecord>,
}

impl MemoryState {
    fn page_by_uuid(&self, page_uuid: &str) -> Option<&PageRecord> {
        self.pages.values().find(|page| page.page_uuid == page_uuid)
    }

    fn element_by_uuid(&self, element_uuid: &str) -> Option<&ElementRecord> {
        self.elements
            .values()
            .find(|element| element.element_uuid == element_uuid)
    }

    fn page_mut(&mut self, page_id: i64) -> Result<&mut PageRecord, RepoError> {
        self.pages.get_mut(&page_id).ok_or(RepoError::NotFound)
    }
}

#[derive(Clone, Default)]
pub struct MemoryRepositories {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryRepositories {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn page_count(&self) -> usize {
        self.state.lock().await.pages.len()
    }

    pub async fn element_count(&self) -> usize {
        self.state.lock().await.elements.len()
    }
}

#[async_trait]
impl PagesRepo for MemoryRepositories {
    async fn find_page(&self, page_uuid: &str) -> Result<Option<PageRecord>, RepoError> {
        Ok(self.state.lock().await.page_by_uuid(page_uuid).cloned())
    }

    async fn list_pages_for_owner(&self, owner: UserId) -> Result<Vec<PageRecord>, RepoError> {
        let state = self.state.lock().await;
        let mut pages: Vec<PageRecord> = state
            .pages
            .values()
            .filter(|page| page.is_owned_by(owner))
            .cloned()
            .collect();
        pages.sort_by(|a, b| {
            b.is_favourite
                .cmp(&a.is_favourite)
                .then(b.last_updated_at.cmp(&a.last_updated_at))
                .then(b.id.cmp(&a.id))
        });
        Ok(pages)
    }

    async fn list_sub_pages(&self, parent_uuid: &str) -> Result<Vec<PageRecord>, RepoError> {
        let state = self.state.lock().await;
        Ok(state
            .pages
            .values()
            .filter(|page| page.parent_page_uuid.as_deref() == Some(parent_uuid))
            .cloned()
            .collect())
    }

    async fn list_elements(&self, page_id: i64) -> Result<Vec<ElementRecord>, RepoError> {
        let state = self.state.lock().await;
        Ok(state
            .elements
            .values()
            .filter(|element| element.page_id == page_id)
            .cloned()
            .collect())
    }

    async fn touch_last_updated(
        &self,
        page_id: i64,
        at: OffsetDateTime,
    ) -> Result<(), RepoError> {
        let mut state = self.state.lock().await;
        if let Some(page) = state.pages.get_mut(&page_id) {
            page.last_updated_at = at;
        }
        Ok(())
    }

    async fn record_view(&self, page_id: i64, today: Date) -> Result<ViewCounts, RepoError> {
        let mut state = self.state.lock().await;
        let page = state.page_mut(page_id)?;
        page.views = std::mem::take(&mut page.views).bump(today);
        Ok(page.views.clone())
    }

    async fn begin(&self) -> Result<Box<dyn PagesTx>, RepoError> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryPagesTx { guard, working }))
    }
}

pub struct MemoryPagesTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

#[async_trait]
impl PagesTx for MemoryPagesTx {
    async fn find_page(&mut self, page_uuid: &str) -> Result<Option<PageRecord>, RepoError> {
        Ok(self.working.page_by_uuid(page_uuid).cloned())
    }

    async fn create_page(&mut self, params: CreatePageParams) -> Result<PageRecord, RepoError> {
        if self.working.page_by_uuid(&params.page_uuid).is_some() {
            return Err(RepoError::Duplicate {
                constraint: "pages_page_uuid_key".to_string(),
            });
        }
        if !self.working.users.contains_key(&params.user_id) {
            return Err(RepoError::InvalidInput {
                message: format!("user `{}` does not exist", params.user_id),
            });
        }

        self.working.next_page_id += 1;
        let record = PageRecord {
            id: self.working.next_page_id,
            page_uuid: params.page_uuid,
            page_name: params.page_name,
            is_root: params.is_root,
            parent_page_uuid: params.parent_page_uuid,
            element_positions: params.element_positions,
            public_page: params.public_page,
            is_favourite: params.is_favourite,
            etc: params.etc,
            views: ViewCounts::default(),
            user_id: params.user_id,
            created_at: params.created_at,
            updated_at: params.created_at,
            last_updated_at: params.created_at,
        };
        self.working.pages.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_page_fields(
        &mut self,
        page_id: i64,
        patch: &PageFieldsPatch,
    ) -> Result<(), RepoError> {
        let page = self.working.page_mut(page_id)?;
        if let Some(name) = patch.page_name.as_ref() {
            page.page_name = name.clone();
        }
        if let Some(is_root) = patch.is_root {
            page.is_root = is_root;
        }
        if let Some(public_page) = patch.public_page {
            page.public_page = public_page;
        }
        if let Some(is_favourite) = patch.is_favourite {
            page.is_favourite = is_favourite;
        }
        if patch.reset_views {
            page.views.reset();
        }
        page.updated_at = OffsetDateTime::now_utc();
        Ok(())
    }

    async fn set_element_positions(
        &mut self,
        page_id: i64,
        positions: &[String],
    ) -> Result<(), RepoError> {
        let page = self.working.page_mut(page_id)?;
        page.element_positions = positions.to_vec();
        page.updated_at = OffsetDateTime::now_utc();
        Ok(())
    }

    async fn find_element(
        &mut self,
        element_uuid: &str,
    ) -> Result<Option<ElementRecord>, RepoError> {
        Ok(self.working.element_by_uuid(element_uuid).cloned())
    }

    async fn create_element(
        &mut self,
        page_id: i64,
        owner: UserId,
        params: &ElementParams,
    ) -> Result<ElementRecord, RepoError> {
        if self.working.element_by_uuid(&params.element_uuid).is_some() {
            return Err(RepoError::Duplicate {
                constraint: "elements_element_uuid_key".to_string(),
            });
        }
        if !self.working.pages.contains_key(&page_id) {
            return Err(RepoError::InvalidInput {
                message: format!("page {page_id} does not exist"),
            });
        }

        let now = OffsetDateTime::now_utc();
        self.working.next_element_id += 1;
        let record = ElementRecord {
            id: self.working.next_element_id,
            element_uuid: params.element_uuid.clone(),
            page_id,
            user_id: owner,
            element_type: params.element_type.clone(),
            content: params.content.clone(),
            etc: params.etc.clone(),
            size: params.size,
            created_at: now,
            updated_at: now,
        };
        self.working.elements.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_element(
        &mut self,
        element_id: i64,
        params: &ElementParams,
    ) -> Result<ElementRecord, RepoError> {
        let element = self
            .working
            .elements
            .get_mut(&element_id)
            .ok_or(RepoError::NotFound)?;
        element.element_type = params.element_type.clone();
        element.content = params.content.clone();
        element.etc = params.etc.clone();
        element.size = params.size;
        element.updated_at = OffsetDateTime::now_utc();
        Ok(element.clone())
    }

    async fn delete_element(&mut self, element_id: i64) -> Result<(), RepoError> {
        self.working.elements.remove(&element_id);
        Ok(())
    }

    async fn list_owned_children(
        &mut self,
        parent_uuid: &str,
        owner: UserId,
    ) -> Result<Vec<PageRecord>, RepoError> {
        Ok(self
            .working
            .pages
            .values()
            .filter(|page| {
                page.parent_page_uuid.as_deref() == Some(parent_uuid) && page.is_owned_by(owner)
            })
            .cloned()
            .collect())
    }

    async fn purge_elements(&mut self, page_id: i64) -> Result<u64, RepoError> {
        let before = self.working.elements.len();
        self.working
            .elements
            .retain(|_, element| element.page_id != page_id);
        Ok((before - self.working.elements.len()) as u64)
    }

    async fn purge_page(&mut self, page_id: i64) -> Result<(), RepoError> {
        if self
            .working
            .elements
            .values()
            .any(|element| element.page_id == page_id)
        {
            return Err(RepoError::Integrity {
                message: format!("page {page_id} still has elements"),
            });
        }
        self.working.pages.remove(&page_id);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), RepoError> {
        let Self { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), RepoError> {
        Ok(())
    }
}

#[async_trait]
impl UsersRepo for MemoryRepositories {
    async fn find_user(&self, id: UserId) -> Result<Option<UserRecord>, RepoError> {
        Ok(self.state.lock().await.users.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, RepoError> {
        let state = self.state.lock().await;
        Ok(state.users.values().find(|user| user.email == email).cloned())
    }

    async fn find_by_token_prefix(&self, prefix: &str) -> Result<Option<UserRecord>, RepoError> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .values()
            .find(|user| user.token_prefix.as_deref() == Some(prefix))
            .cloned())
    }

    async fn create_user(&self, params: CreateUserParams) -> Result<UserRecord, RepoError> {
        let mut state = self.state.lock().await;
        if state.users.values().any(|user| user.email == params.email) {
            return Err(RepoError::Duplicate {
                constraint: "users_email_key".to_string(),
            });
        }

        let now = OffsetDateTime::now_utc();
        let record = UserRecord {
            id: UserId::generate(),
            email: params.email,
            name: params.name,
            picture: params.picture,
            status: AccountStatus::default(),
            token_prefix: None,
            token_hash: None,
            created_at: now,
            updated_at: now,
        };
        state.users.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_token(&self, params: UpdateUserTokenParams) -> Result<UserRecord, RepoError> {
        let mut state = self.state.lock().await;
        if state.users.values().any(|user| {
            user.id != params.id && user.token_prefix.as_deref() == Some(&params.token_prefix)
        }) {
            return Err(RepoError::Duplicate {
                constraint: "users_token_prefix_key".to_string(),
            });
        }

        let user = state.users.get_mut(&params.id).ok_or(RepoError::NotFound)?;
        user.token_prefix = Some(params.token_prefix);
        user.token_hash = Some(params.token_hash);
        user.updated_at = OffsetDateTime::now_utc();
        Ok(user.clone())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use time::macros::date;

    use super::*;

    async fn seeded() -> (MemoryRepositories, UserId) {
        let repos = MemoryRepositories::new();
        let user = repos
            .create_user(CreateUserParams {
                email: "a@example.com".into(),
                name: "A".into(),
                picture: String::new(),
            })
            .await
            .expect("user");
        (repos, user.id)
    }

    fn page_params(uuid: &str, owner: UserId) -> CreatePageParams {
        CreatePageParams {
            page_uuid: uuid.into(),
            page_name: uuid.into(),
            is_root: true,
            parent_page_uuid: None,
            element_positions: vec![],
            public_page: false,
            is_favourite: false,
            etc: None,
            user_id: owner,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[tokio::test]
    async fn dropped_transaction_discards_writes() {
        let (repos, owner) = seeded().await;
        {
            let mut tx = repos.begin().await.expect("begin");
            tx.create_page(page_params("p1", owner)).await.expect("create");
        }
        assert!(repos.find_page("p1").await.expect("find").is_none());
    }

    #[tokio::test]
    async fn commit_publishes_writes() {
        let (repos, owner) = seeded().await;
        let mut tx = repos.begin().await.expect("begin");
        let page = tx.create_page(page_params("p1", owner)).await.expect("create");
        tx.create_element(
            page.id,
            owner,
            &ElementParams {
                element_uuid: "e1".into(),
                element_type: "text".into(),
                content: json!({}),
                etc: None,
                size: None,
            },
        )
        .await
        .expect("element");
        tx.commit().await.expect("commit");

        assert_eq!(repos.page_count().await, 1);
        assert_eq!(repos.list_elements(page.id).await.expect("list").len(), 1);
    }

    #[tokio::test]
    async fn page_with_elements_cannot_be_purged_first() {
        let (repos, owner) = seeded().await;
        let mut tx = repos.begin().await.expect("begin");
        let page = tx.create_page(page_params("p1", owner)).await.expect("create");
        tx.create_element(
            page.id,
            owner,
            &ElementParams {
                element_uuid: "e1".into(),
                element_type: "text".into(),
                content: json!({}),
                etc: None,
                size: None,
            },
        )
        .await
        .expect("element");

        let err = tx.purge_page(page.id).await.expect_err("fk");
        assert!(matches!(err, RepoError::Integrity { .. }));
    }

    #[tokio::test]
    async fn record_view_is_cumulative() {
        let (repos, owner) = seeded().await;
        let mut tx = repos.begin().await.expect("begin");
        let page = tx.create_page(page_params("p1", owner)).await.expect("create");
        tx.commit().await.expect("commit");

        let day = date!(2024 - 05 - 01);
        repos.record_view(page.id, day).await.expect("view");
        let counts = repos.record_view(page.id, day).await.expect("view");
        assert_eq!(counts.total, 2);
        assert_eq!(counts.by_date.get("2024-05-01"), Some(&2));
    }
}
