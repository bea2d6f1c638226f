//! Service scenarios against the Postgres adapter.
//!
//! Needs `DATABASE_URL`; run with `cargo test -- --ignored`.

use std::sync::Arc;

use opaline::application::pages::{
    CreatePageCommand, PageService, PageServiceError, PageView, UpdatePageCommand,
};
use opaline::application::repos::{CreateUserParams, PagesRepo, UsersRepo};
use opaline::cache::{CacheConfig, MemoryPageCache};
use opaline::domain::types::UserId;
use opaline::infra::db::PostgresRepositories;
use opaline_api_types::ElementInput;
use serde_json::json;
use sqlx::PgPool;

async fn setup(pool: PgPool) -> (Arc<PostgresRepositories>, PageService, UserId) {
    let repos = Arc::new(PostgresRepositories::new(pool));
    let owner = repos
        .create_user(CreateUserParams {
            email: "owner@example.com".to_string(),
            name: "Owner".to_string(),
            picture: String::new(),
        })
        .await
        .expect("user created")
        .id;
    let cache = Arc::new(MemoryPageCache::new(&CacheConfig::default()));
    let service = PageService::new(repos.clone(), cache);
    (repos, service, owner)
}

fn element(uuid: &str) -> ElementInput {
    ElementInput {
        element_uuid: uuid.to_string(),
        element_type: "text".to_string(),
        content: json!({ "text": uuid }),
        etc: None,
        size: None,
    }
}

fn page(uuid: &str, parent: Option<&str>, public: bool) -> CreatePageCommand {
    CreatePageCommand {
        page_uuid: uuid.to_string(),
        page_name: uuid.to_string(),
        is_root: parent.is_none(),
        parent_page_uuid: parent.map(str::to_string),
        public_page: public,
        ..Default::default()
    }
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn public_reads_are_counted_in_store(pool: PgPool) {
    let (repos, service, owner) = setup(pool).await;
    service
        .create_page(owner, page("p", None, true))
        .await
        .expect("created");

    for _ in 0..3 {
        service.get_page("p", None).await.expect("readable");
    }

    let stored = repos.find_page("p").await.expect("find").expect("exists");
    assert_eq!(stored.views.total, 3);
    assert_eq!(stored.views.by_date.values().sum::<u64>(), 3);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn reconcile_orders_and_prunes(pool: PgPool) {
    let (_repos, service, owner) = setup(pool).await;
    let mut command = page("p", None, false);
    command.elements = Some(vec![element("e1"), element("e2"), element("e3")]);
    service.create_page(owner, command).await.expect("created");

    service
        .update_page(
            owner,
            UpdatePageCommand {
                page_uuid: "p".to_string(),
                elements: Some(vec![element("e3"), element("e1")]),
                ..Default::default()
            },
        )
        .await
        .expect("updated");

    let PageView::Owner(snapshot) = service.get_page("p", Some(owner)).await.expect("reads")
    else {
        panic!("owner view");
    };
    assert_eq!(snapshot.page.element_positions, ["e3", "e1"]);
    let order: Vec<_> = snapshot.elements.iter().map(|e| e.element_uuid.as_str()).collect();
    assert_eq!(order, ["e3", "e1"]);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn visibility_toggle_resets_counters(pool: PgPool) {
    let (repos, service, owner) = setup(pool).await;
    service
        .create_page(owner, page("p", None, true))
        .await
        .expect("created");
    service.get_page("p", None).await.expect("view");

    service
        .update_page(
            owner,
            UpdatePageCommand {
                page_uuid: "p".to_string(),
                public_page: Some(false),
                ..Default::default()
            },
        )
        .await
        .expect("updated");

    let stored = repos.find_page("p").await.expect("find").expect("exists");
    assert_eq!(stored.views.total, 0);
    assert!(stored.views.by_date.is_empty());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn subtree_delete_respects_foreign_keys(pool: PgPool) {
    let (repos, service, owner) = setup(pool).await;
    service
        .create_page(owner, page("a", None, false))
        .await
        .expect("created");
    for (uuid, parent) in [("b", "a"), ("c", "b")] {
        let mut command = page(uuid, Some(parent), false);
        command.elements = Some(vec![element(&format!("{uuid}-el"))]);
        service.create_page(owner, command).await.expect("created");
    }

    service.delete_page(owner, "a").await.expect("deleted");

    for uuid in ["a", "b", "c"] {
        assert!(repos.find_page(uuid).await.expect("find").is_none());
    }
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn failed_reconcile_leaves_store_untouched(pool: PgPool) {
    let (repos, service, owner) = setup(pool).await;
    let mut first = page("a", None, false);
    first.elements = Some(vec![element("shared")]);
    service.create_page(owner, first).await.expect("created");
    let mut second = page("b", None, false);
    second.elements = Some(vec![element("mine")]);
    service.create_page(owner, second).await.expect("created");

    let err = service
        .update_page(
            owner,
            UpdatePageCommand {
                page_uuid: "b".to_string(),
                page_name: Some("Changed".to_string()),
                elements: Some(vec![element("shared")]),
                ..Default::default()
            },
        )
        .await
        .expect_err("conflict");
    assert!(matches!(err, PageServiceError::Conflict(_)));

    let stored = repos.find_page("b").await.expect("find").expect("exists");
    assert_eq!(stored.page_name, "b");
    assert_eq!(stored.element_positions, ["mine"]);
}
