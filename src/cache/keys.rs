//! Cache key definitions.

pub const PAGE_KEY_PREFIX: &str = "/page-get/";

/// Key of the cached snapshot for one page; mirrors the read route.
pub fn page_key(page_uuid: &str) -> String {
    format!("{PAGE_KEY_PREFIX}{page_uuid}")
}
