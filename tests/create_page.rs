mod support;

use opaline::application::pages::{CreatePageCommand, PageServiceError};
use opaline::application::repos::{CreatePageParams, PagesRepo, PagesTx};
use opaline::domain::error::DomainError;
use opaline::domain::types::UserId;
use time::OffsetDateTime;

use support::{Harness, child_page, element, root_page};

async fn insert_raw(h: &Harness, owner: UserId, links: &[(&str, &str)]) {
    let mut tx = h.repos.begin().await.expect("begin");
    let now = OffsetDateTime::now_utc();
    for (uuid, parent) in links {
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
}

#[tokio::test]
async fn creates_page_with_elements_in_supplied_order() {
    let h = Harness::new();
    let owner = h.user("owner@example.com").await;

    let page = h
        .service
        .create_page(
            owner,
            CreatePageCommand {
                page_uuid: "  p  ".to_string(),
                page_name: "Notes".to_string(),
                is_root: true,
                elements: Some(vec![element("e1", "one"), element("e2", "two")]),
                ..Default::default()
            },
        )
        .await
        .expect("created");

    assert_eq!(page.page_uuid, "p");
    assert_eq!(page.element_positions, ["e1", "e2"]);
    assert_eq!(page.views.total, 0);
    assert_eq!(h.repos.element_count().await, 2);
}

#[tokio::test]
async fn duplicate_page_uuid_conflicts() {
    let h = Harness::new();
    let owner = h.user("owner@example.com").await;
    h.page(owner, root_page("p", false)).await;

    let err = h
        .service
        .create_page(owner, root_page("p", true))
        .await
        .expect_err("conflict");
    assert!(matches!(err, PageServiceError::Conflict(_)));
}

#[tokio::test]
async fn existing_element_uuid_conflicts_and_nothing_is_written() {
    let h = Harness::new();
    let owner = h.user("owner@example.com").await;
    let mut first = root_page("a", false);
    first.elements = Some(vec![element("e1", "one")]);
    h.page(owner, first).await;

    let mut second = root_page("b", false);
    second.elements = Some(vec![element("e1", "again")]);
    let err = h.service.create_page(owner, second).await.expect_err("conflict");

    assert!(matches!(err, PageServiceError::Conflict(_)));
    assert!(h.repos.find_page("b").await.expect("find").is_none());
}

#[tokio::test]
async fn parent_must_exist_and_be_owned() {
    let h = Harness::new();
    let owner = h.user("owner@example.com").await;
    let stranger = h.user("stranger@example.com").await;
    h.page(owner, root_page("mine", false)).await;

    let err = h
        .service
        .create_page(owner, child_page("kid", "missing"))
        .await
        .expect_err("missing parent");
    assert!(matches!(
        err,
        PageServiceError::Domain(DomainError::Validation { .. })
    ));

    let err = h
        .service
        .create_page(stranger, child_page("kid", "mine"))
        .await
        .expect_err("foreign parent");
    assert!(matches!(
        err,
        PageServiceError::Domain(DomainError::Validation { .. })
    ));
}

#[tokio::test]
async fn blank_parent_means_no_parent() {
    let h = Harness::new();
    let owner = h.user("owner@example.com").await;

    let page = h
        .service
        .create_page(owner, child_page("p", "   "))
        .await
        .expect("created");
    assert!(page.parent_page_uuid.is_none());
}

#[tokio::test]
async fn ancestor_chain_naming_the_new_page_is_a_cycle() {
    let h = Harness::new();
    let owner = h.user("owner@example.com").await;
    // `a` already claims the not-yet-created `n` as its parent.
    insert_raw(&h, owner, &[("a", "n")]).await;

    let err = h
        .service
        .create_page(owner, child_page("n", "a"))
        .await
        .expect_err("cycle");
    assert!(matches!(err, PageServiceError::Domain(DomainError::Cycle { .. })));
    assert!(h.repos.find_page("n").await.expect("find").is_none());
}

#[tokio::test]
async fn looping_ancestors_are_a_cycle() {
    let h = Harness::new();
    let owner = h.user("owner@example.com").await;
    insert_raw(&h, owner, &[("x", "y"), ("y", "x")]).await;

    let err = h
        .service
        .create_page(owner, child_page("n", "x"))
        .await
        .expect_err("cycle");
    assert!(matches!(err, PageServiceError::Domain(DomainError::Cycle { .. })));
}

#[tokio::test]
async fn creating_a_child_invalidates_the_parent_snapshot() {
    let h = Harness::new();
    let owner = h.user("owner@example.com").await;
    h.page(owner, root_page("parent", false)).await;
    h.service.get_page("parent", Some(owner)).await.expect("warm");
    assert!(h.cache.contains("/page-get/parent"));

    h.page(owner, child_page("kid", "parent")).await;

    assert!(!h.cache.contains("/page-get/parent"));
}

#[tokio::test]
async fn list_orders_favourites_first_and_hides_histogram() {
    let h = Harness::new();
    let owner = h.user("owner@example.com").await;
    let other = h.user("other@example.com").await;
    h.page(owner, root_page("plain", true)).await;
    let mut favourite = root_page("fav", false);
    favourite.is_favourite = true;
    h.page(owner, favourite).await;
    h.page(other, root_page("theirs", true)).await;

    let pages = h.service.list_pages(owner).await.expect("listed");

    let uuids: Vec<_> = pages.iter().map(|p| p.page_uuid.as_str()).collect();
    assert_eq!(uuids, ["fav", "plain"]);
    let json = serde_json::to_value(&pages[0]).expect("json");
    assert!(json.get("date_view_count").is_none());
}
