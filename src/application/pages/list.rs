use opaline_api_types::PageSummary;

use crate::domain::types::UserId;

use super::view::owner_page;
use super::{PageService, PageServiceError};

impl PageService {
    /// Every page the caller owns, favourites first, then most recently edited.
    pub async fn list_pages(&self, owner: UserId) -> Result<Vec<PageSummary>, PageServiceError> {
        let pages = self.pages.list_pages_for_owner(owner).await?;
        Ok(pages
            .into_iter()
            .map(|page| PageSummary::from(owner_page(page)))
            .collect())
    }
}
