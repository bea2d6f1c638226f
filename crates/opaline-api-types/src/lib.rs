//! Shared request and response types for the Opaline page API.
//!
//! These types are the JSON contract between the HTTP surface and its clients.
//! The owner-shaped page response doubles as the cached snapshot format.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementSize {
    Small,
    Medium,
    Large,
}

impl ElementSize {
    pub fn as_str(self) -> &'static str {
        match self {
            ElementSize::Small => "small",
            ElementSize::Medium => "medium",
            ElementSize::Large => "large",
        }
    }
}

impl fmt::Display for ElementSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant(pub String);

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown variant `{}`", self.0)
    }
}

impl std::error::Error for UnknownVariant {}

impl FromStr for ElementSize {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "small" => Ok(ElementSize::Small),
            "medium" => Ok(ElementSize::Medium),
            "large" => Ok(ElementSize::Large),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    #[default]
    Freemium,
    Premium,
    Enterprise,
}

impl AccountStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AccountStatus::Freemium => "freemium",
            AccountStatus::Premium => "premium",
            AccountStatus::Enterprise => "enterprise",
        }
    }
}

impl FromStr for AccountStatus {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "freemium" => Ok(AccountStatus::Freemium),
            "premium" => Ok(AccountStatus::Premium),
            "enterprise" => Ok(AccountStatus::Enterprise),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// Element as supplied by clients on create and update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementInput {
    pub element_uuid: String,
    #[serde(rename = "type")]
    pub element_type: String,
    #[serde(default = "empty_object")]
    pub content: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etc: Option<Value>,
    #[serde(
        default,
        deserialize_with = "blank_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub size: Option<ElementSize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementView {
    pub id: i64,
    pub element_uuid: String,
    #[serde(rename = "type")]
    pub element_type: String,
    pub content: Value,
    #[serde(default)]
    pub etc: Option<Value>,
    #[serde(default)]
    pub size: Option<ElementSize>,
}

/// Full page attributes, visible to the owner only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnerPage {
    pub id: i64,
    pub user_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    pub page_uuid: String,
    pub page_name: String,
    pub is_root: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub element_positions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_page_uuid: Option<String>,
    pub public_page: bool,
    pub is_favourite: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub last_updated_at: OffsetDateTime,
    pub view_count: u64,
    #[serde(default)]
    pub date_view_count: BTreeMap<String, u64>,
    #[serde(default)]
    pub etc: Option<Value>,
}

/// Page attributes safe to show to anyone who may read the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageSummary {
    pub id: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    pub page_uuid: String,
    pub page_name: String,
    pub is_root: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub element_positions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_page_uuid: Option<String>,
    pub public_page: bool,
    pub is_favourite: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub last_updated_at: OffsetDateTime,
    pub view_count: u64,
    #[serde(default)]
    pub etc: Option<Value>,
}

impl From<OwnerPage> for PageSummary {
    fn from(page: OwnerPage) -> Self {
        Self {
            id: page.id,
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
            view_count: page.view_count,
            etc: page.etc,
        }
    }
}

/// Owner-shaped page read response. This is also the cached snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnerPageResponse {
    pub page: OwnerPage,
    pub elements: Vec<ElementView>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub sub_pages: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicPageResponse {
    pub page: PageSummary,
    pub elements: Vec<ElementView>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub sub_pages: BTreeMap<String, String>,
}

impl From<OwnerPageResponse> for PublicPageResponse {
    fn from(response: OwnerPageResponse) -> Self {
        Self {
            page: PageSummary::from(response.page),
            elements: response.elements,
            sub_pages: response.sub_pages,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageListResponse {
    pub pages: Vec<PageSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageCreateRequest {
    pub page_uuid: String,
    #[serde(default)]
    pub page_name: String,
    #[serde(default)]
    pub is_root: bool,
    #[serde(default)]
    pub parent_page_uuid: Option<String>,
    #[serde(default)]
    pub element_positions: Option<Vec<String>>,
    #[serde(default)]
    pub public_page: bool,
    #[serde(default)]
    pub is_favourite: bool,
    #[serde(default)]
    pub etc: Option<Value>,
    #[serde(default)]
    pub elements: Option<Vec<ElementInput>>,
}

/// Field-level patch; absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageUpdateFields {
    pub page_uuid: String,
    #[serde(default)]
    pub page_name: Option<String>,
    #[serde(default)]
    pub is_root: Option<bool>,
    #[serde(default)]
    pub public_page: Option<bool>,
    #[serde(default)]
    pub is_favourite: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageUpdateRequest {
    pub page: PageUpdateFields,
    /// `None` leaves elements alone; `Some(vec![])` removes every positioned element.
    #[serde(default)]
    pub elements: Option<Vec<ElementInput>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageDeleteRequest {
    pub page_uuid: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub picture: String,
    pub status: AccountStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmptyResponse {}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<ElementSize>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn blank_size_is_treated_as_absent() {
        let input: ElementInput = serde_json::from_value(json!({
            "element_uuid": "e1",
            "type": "text",
            "size": ""
        }))
        .expect("element input");
        assert_eq!(input.size, None);
        assert_eq!(input.content, json!({}));
    }

    #[test]
    fn unknown_size_is_rejected() {
        let result: Result<ElementInput, _> = serde_json::from_value(json!({
            "element_uuid": "e1",
            "type": "text",
            "size": "huge"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn update_distinguishes_absent_and_empty_elements() {
        let absent: PageUpdateRequest =
            serde_json::from_value(json!({ "page": { "page_uuid": "p" } })).expect("absent");
        assert!(absent.elements.is_none());
        assert!(absent.page.public_page.is_none());

        let empty: PageUpdateRequest =
            serde_json::from_value(json!({ "page": { "page_uuid": "p" }, "elements": [] }))
                .expect("empty");
        assert_eq!(empty.elements, Some(Vec::new()));
    }

    #[test]
    fn public_projection_drops_histogram_and_owner() {
        let now = OffsetDateTime::UNIX_EPOCH;
        let owner = OwnerPageResponse {
            page: OwnerPage {
                id: 7,
                user_id: Uuid::nil(),
                created_at: now,
                updated_at: now,
                page_uuid: "p".into(),
                page_name: "Page".into(),
                is_root: true,
                element_positions: Vec::new(),
                parent_page_uuid: None,
                public_page: true,
                is_favourite: false,
                last_updated_at: now,
                view_count: 3,
                date_view_count: BTreeMap::from([("1970-01-01".to_string(), 3)]),
                etc: None,
            },
            elements: Vec::new(),
            sub_pages: BTreeMap::new(),
        };

        let public = serde_json::to_value(PublicPageResponse::from(owner)).expect("json");
        assert!(public["page"].get("date_view_count").is_none());
        assert!(public["page"].get("user_id").is_none());
        assert_eq!(public["page"]["view_count"], json!(3));
    }
}
