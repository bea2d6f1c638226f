//! Domain entities mirrored from persistent storage.

use serde_json::Value;
use time::OffsetDateTime;

use crate::domain::{
    types::{AccountStatus, ElementSize, UserId},
    views::ViewCounts,
};

#[derive(Debug, Clone, PartialEq)]
pub struct PageRecord {
    pub id: i64,
    pub page_uuid: String,
    pub page_name: String,
    pub is_root: bool,
    pub parent_page_uuid: Option<String>,
    pub element_positions: Vec<String>,
    pub public_page: bool,
    pub is_favourite: bool,
    pub etc: Option<Value>,
    pub views: ViewCounts,
    pub user_id: UserId,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub last_updated_at: OffsetDateTime,
}

impl PageRecord {
    pub fn is_owned_by(&self, user: UserId) -> bool {
        self.user_id == user
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElementRecord {
    pub id: i64,
    pub element_uuid: String,
    pub page_id: i64,
    pub user_id: UserId,
    pub element_type: String,
    pub content: Value,
    pub etc: Option<Value>,
    pub size: Option<ElementSize>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    pub id: UserId,
    pub email: String,
    pub name: String,
    pub picture: String,
    pub status: AccountStatus,
    pub token_prefix: Option<String>,
    pub token_hash: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}
