use std::collections::HashSet;

use tracing::info;

use crate::application::repos::PagesTx;
use crate::cache::page_key;
use crate::domain::entities::PageRecord;
use crate::domain::types::UserId;

use super::{PageService, PageServiceError, finish_tx};

enum Visit {
    Enter(PageRecord),
    Leave(PageRecord),
}

impl PageService {
    /// Permanently delete a page together with every descendant the caller owns.
    ///
    /// Children go before parents and elements before their page, all in one
    /// transaction. Cache keys of every removed page, plus the root's parent,
    /// are invalidated after commit.
    pub async fn delete_page(
        &self,
        owner: UserId,
        page_uuid: &str,
    ) -> Result<(), PageServiceError> {
        let root = self
            .pages
            .find_page(page_uuid)
            .await?
            .filter(|page| page.is_owned_by(owner))
            .ok_or(PageServiceError::NotFound)?;

        let mut tx = self.pages.begin().await?;
        let result = purge_subtree(tx.as_mut(), root.clone(), owner).await;
        let deleted = finish_tx(tx, result).await?;

        let mut keys: Vec<String> = deleted.iter().map(|uuid| page_key(uuid)).collect();
        if let Some(parent) = root.parent_page_uuid.as_deref() {
            keys.push(page_key(parent));
        }
        self.invalidate(keys).await;

        info!(
            target = "opaline::pages::delete",
            page_uuid = %root.page_uuid,
            pages_deleted = deleted.len(),
            "page subtree deleted"
        );
        Ok(())
    }
}

/// Post-order walk with an explicit stack. A page already entered is skipped,
/// so malformed parent links cannot loop forever.
async fn purge_subtree(
    tx: &mut dyn PagesTx,
    root: PageRecord,
    owner: UserId,
) -> Result<Vec<String>, PageServiceError> {
    let mut stack = vec![Visit::Enter(root)];
    let mut entered = HashSet::new();
    let mut deleted = Vec::new();

    while let Some(visit) = stack.pop() {
        match visit {
            Visit::Enter(page) => {
                if !entered.insert(page.id) {
                    continue;
                }
                let children = tx.list_owned_children(&page.page_uuid, owner).await?;
                stack.push(Visit::Leave(page));
                stack.extend(children.into_iter().map(Visit::Enter));
            }
            Visit::Leave(page) => {
                tx.purge_elements(page.id).await?;
                tx.purge_page(page.id).await?;
                deleted.push(page.page_uuid);
            }
        }
    }

    Ok(deleted)
}
