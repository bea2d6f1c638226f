mod support;

use opaline::application::pages::{PageServiceError, PageView};
use opaline::application::repos::{CreatePageParams, PagesRepo, PagesTx};
use opaline::domain::types::UserId;
use time::OffsetDateTime;

use support::{Harness, child_page, element, root_page};

/// R -> A -> B -> C, with D a second child of A and every page holding one element.
async fn seeded_tree(h: &Harness) -> UserId {
    let owner = h.user("owner@example.com").await;
    h.page(owner, root_page("r", false)).await;
    for (uuid, parent) in [("a", "r"), ("b", "a"), ("c", "b"), ("d", "a")] {
        let mut command = child_page(uuid, parent);
        command.elements = Some(vec![element(&format!("{uuid}-el"), uuid)]);
        h.page(owner, command).await;
    }
    owner
}

async fn warm(h: &Harness, owner: UserId, uuids: &[&str]) {
    for uuid in uuids {
        let view = h.service.get_page(uuid, Some(owner)).await.expect("owner reads");
        assert!(matches!(view, PageView::Owner(_)));
    }
}

#[tokio::test]
async fn deleting_a_page_removes_its_whole_subtree() {
    let h = Harness::new();
    let owner = seeded_tree(&h).await;
    assert_eq!(h.repos.page_count().await, 5);
    assert_eq!(h.repos.element_count().await, 4);

    h.service.delete_page(owner, "a").await.expect("delete applies");

    for uuid in ["a", "b", "c", "d"] {
        assert!(h.repos.find_page(uuid).await.expect("find").is_none(), "{uuid} removed");
    }
    assert!(h.repos.find_page("r").await.expect("find").is_some());
    assert_eq!(h.repos.page_count().await, 1);
    assert_eq!(h.repos.element_count().await, 0);
}

#[tokio::test]
async fn delete_invalidates_every_removed_key_and_the_parent() {
    let h = Harness::new();
    let owner = seeded_tree(&h).await;
    h.page(owner, root_page("elsewhere", false)).await;
    warm(&h, owner, &["r", "a", "b", "c", "d", "elsewhere"]).await;

    h.service.delete_page(owner, "a").await.expect("delete applies");

    for uuid in ["r", "a", "b", "c", "d"] {
        assert!(
            !h.cache.contains(&format!("/page-get/{uuid}")),
            "{uuid} key invalidated"
        );
    }
    assert!(h.cache.contains("/page-get/elsewhere"));

    let PageView::Owner(parent) = h.service.get_page("r", Some(owner)).await.expect("reads")
    else {
        panic!("owner view");
    };
    assert!(parent.sub_pages.is_empty());

    let err = h.service.get_page("c", Some(owner)).await.expect_err("gone");
    assert!(matches!(err, PageServiceError::NotFound));
}

#[tokio::test]
async fn deleting_a_leaf_touches_only_the_leaf() {
    let h = Harness::new();
    let owner = seeded_tree(&h).await;

    h.service.delete_page(owner, "c").await.expect("delete applies");

    assert_eq!(h.repos.page_count().await, 4);
    assert_eq!(h.repos.element_count().await, 3);
}

#[tokio::test]
async fn descendants_owned_by_someone_else_are_left_in_place() {
    let h = Harness::new();
    let owner = seeded_tree(&h).await;
    let other = h.user("other@example.com").await;

    let mut tx = h.repos.begin().await.expect("begin");
    tx.create_page(CreatePageParams {
        page_uuid: "foreign".to_string(),
        page_name: "Foreign".to_string(),
        is_root: false,
        parent_page_uuid: Some("b".to_string()),
        element_positions: vec![],
        public_page: false,
        is_favourite: false,
        etc: None,
        user_id: other,
        created_at: OffsetDateTime::now_utc(),
    })
    .await
    .expect("foreign child inserted");
    tx.commit().await.expect("commit");

    h.service.delete_page(owner, "a").await.expect("delete applies");

    let foreign = h
        .repos
        .find_page("foreign")
        .await
        .expect("find")
        .expect("foreign child survives");
    assert_eq!(foreign.user_id, other);
}

#[tokio::test]
async fn only_the_owner_may_delete() {
    let h = Harness::new();
    seeded_tree(&h).await;
    let stranger = h.user("stranger@example.com").await;

    let err = h
        .service
        .delete_page(stranger, "a")
        .await
        .expect_err("not found");
    assert!(matches!(err, PageServiceError::NotFound));
    assert_eq!(h.repos.page_count().await, 5);
}

#[tokio::test]
async fn parent_cycle_in_stored_links_terminates() {
    let h = Harness::new();
    let owner = h.user("owner@example.com").await;

    let mut tx = h.repos.begin().await.expect("begin");
    let now = OffsetDateTime::now_utc();
    for (uuid, parent) in [("x", "y"), ("y", "x")] {
        tx.create_page(CreatePageParams {
            page_uuid: uuid.to_string(),
            page_name: uuid.to_string(),
            is_root: false,
            parent_page_uuid: Some(parent.to_string()),
            element_positions: vec![],
            public_page: false,
            is_favourite: false,
            etc: None,
            user_id: owner,
            created_at: now,
        })
        .await
        .expect("page inserted");
    }
    tx.commit().await.expect("commit");

    h.service.delete_page(owner, "x").await.expect("delete applies");
    assert_eq!(h.repos.page_count().await, 0);
}
