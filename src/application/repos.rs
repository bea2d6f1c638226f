//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use time::{Date, OffsetDateTime};

use crate::domain::entities::{ElementRecord, PageRecord, UserRecord};
use crate::domain::types::{ElementSize, UserId};
use crate::domain::views::ViewCounts;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct CreatePageParams {
    pub page_uuid: String,
    pub page_name: String,
    pub is_root: bool,
    pub parent_page_uuid: Option<String>,
    pub element_positions: Vec<String>,
    pub public_page: bool,
    pub is_favourite: bool,
    pub etc: Option<Value>,
    pub user_id: UserId,
    pub created_at: OffsetDateTime,
}

/// Field-level page patch; `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageFieldsPatch {
    pub page_name: Option<String>,
    pub is_root: Option<bool>,
    pub public_page: Option<bool>,
    pub is_favourite: Option<bool>,
    pub reset_views: bool,
}

impl PageFieldsPatch {
    pub fn is_empty(&self) -> bool {
        self.page_name.is_none()
            && self.is_root.is_none()
            && self.public_page.is_none()
            && self.is_favourite.is_none()
            && !self.reset_views
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElementParams {
    pub element_uuid: String,
    pub element_type: String,
    pub content: Value,
    pub etc: Option<Value>,
    pub size: Option<ElementSize>,
}

#[derive(Debug, Clone)]
pub struct CreateUserParams {
    pub email: String,
    pub name: String,
    pub picture: String,
}

#[derive(Debug, Clone)]
pub struct UpdateUserTokenParams {
    pub id: UserId,
    pub token_prefix: String,
    pub token_hash: String,
}

#[async_trait]
pub trait PagesRepo: Send + Sync {
    async fn find_page(&self, page_uuid: &str) -> Result<Option<PageRecord>, RepoError>;

    /// Pages owned by `owner`, favourites first, then most recently edited.
    async fn list_pages_for_owner(&self, owner: UserId) -> Result<Vec<PageRecord>, RepoError>;

    /// Direct children of `parent_uuid`, regardless of owner.
    async fn list_sub_pages(&self, parent_uuid: &str) -> Result<Vec<PageRecord>, RepoError>;

    /// Elements of one page in store order (ascending id).
    async fn list_elements(&self, page_id: i64) -> Result<Vec<ElementRecord>, RepoError>;

    async fn touch_last_updated(&self, page_id: i64, at: OffsetDateTime)
    -> Result<(), RepoError>;

    /// Atomically apply one view on `today` and return the stored counters.
    async fn record_view(&self, page_id: i64, today: Date) -> Result<ViewCounts, RepoError>;

    async fn begin(&self) -> Result<Box<dyn PagesTx>, RepoError>;
}

/// Unit of work over pages and elements. Dropping without `commit` discards every write.
#[async_trait]
pub trait PagesTx: Send {
    async fn find_page(&mut self, page_uuid: &str) -> Result<Option<PageRecord>, RepoError>;

    async fn create_page(&mut self, params: CreatePageParams) -> Result<PageRecord, RepoError>;

    async fn update_page_fields(
        &mut self,
        page_id: i64,
        patch: &PageFieldsPatch,
    ) -> Result<(), RepoError>;

    async fn set_element_positions(
        &mut self,
        page_id: i64,
        positions: &[String],
    ) -> Result<(), RepoError>;

    async fn find_element(&mut self, element_uuid: &str)
    -> Result<Option<ElementRecord>, RepoError>;

    async fn create_element(
        &mut self,
        page_id: i64,
        owner: UserId,
        params: &ElementParams,
    ) -> Result<ElementRecord, RepoError>;

    async fn update_element(
        &mut self,
        element_id: i64,
        params: &ElementParams,
    ) -> Result<ElementRecord, RepoError>;

    async fn delete_element(&mut self, element_id: i64) -> Result<(), RepoError>;

    /// Direct children of `parent_uuid` owned by `owner`.
    async fn list_owned_children(
        &mut self,
        parent_uuid: &str,
        owner: UserId,
    ) -> Result<Vec<PageRecord>, RepoError>;

    /// Permanently remove every element of the page; returns how many were removed.
    async fn purge_elements(&mut self, page_id: i64) -> Result<u64, RepoError>;

    /// Permanently remove the page row.
    async fn purge_page(&mut self, page_id: i64) -> Result<(), RepoError>;

    async fn commit(self: Box<Self>) -> Result<(), RepoError>;

    async fn rollback(self: Box<Self>) -> Result<(), RepoError>;
}

#[async_trait]
pub trait UsersRepo: Send + Sync {
    async fn find_user(&self, id: UserId) -> Result<Option<UserRecord>, RepoError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, RepoError>;

    async fn find_by_token_prefix(&self, prefix: &str) -> Result<Option<UserRecord>, RepoError>;

    async fn create_user(&self, params: CreateUserParams) -> Result<UserRecord, RepoError>;

    async fn update_token(&self, params: UpdateUserTokenParams) -> Result<UserRecord, RepoError>;
}
