//! Adding, removing and ordering list items over HTTP.

#![allow(clippy::unwrap_used)]

use axum::http::StatusCode;
use shoplist_core::NormalizedName;
use shoplist_integration_tests::TestContext;
use shoplist_web::store::{Collection, Operation};

#[tokio::test]
async fn test_duplicate_add_is_rejected_with_conflict() {
    let ctx = TestContext::new().await;

    let added = ctx.post_form("/list/items", &[("name", "Milk")]).await;
    assert_eq!(added.status, StatusCode::NO_CONTENT);
    assert!(added.triggers_refresh());

    // second add while the first may still be pending
    let duplicate = ctx.post_form("/list/items", &[("name", "milk")]).await;
    assert_eq!(duplicate.status, StatusCode::CONFLICT);
    assert!(duplicate.body.contains("Milk is already on the list"));

    ctx.settle_listed("milk").await;
    let again = ctx.post_form("/list/items", &[("name", "  MILK ")]).await;
    assert_eq!(again.status, StatusCode::CONFLICT);
    assert_eq!(ctx.store.document_count(Collection::ShoppingList), 1);

    let list = ctx.get("/list").await;
    assert_eq!(list.status, StatusCode::OK);
    assert_eq!(list.body.matches("<strong>Milk</strong>").count(), 1);
    assert!(list.body.contains("New item. No price history yet."));

    ctx.shutdown().await;
}

#[tokio::test]
async fn test_blank_name_is_ignored() {
    let ctx = TestContext::new().await;

    let response = ctx.post_form("/list/items", &[("name", "   ")]).await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);
    assert!(!response.triggers_refresh());
    assert_eq!(ctx.store.document_count(Collection::ShoppingList), 0);

    ctx.shutdown().await;
}

#[tokio::test]
async fn test_failed_add_can_be_retried() {
    let ctx = TestContext::new().await;
    ctx.store.fail_next(Operation::Create, 1);

    let failed = ctx.post_form("/list/items", &[("name", "bread")]).await;
    assert_eq!(failed.status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(failed.body.contains("Could not reach the database"));

    let retried = ctx.post_form("/list/items", &[("name", "bread")]).await;
    assert_eq!(retried.status, StatusCode::NO_CONTENT);
    ctx.settle_listed("bread").await;

    ctx.shutdown().await;
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let ctx = TestContext::new().await;
    ctx.post_form("/list/items", &[("name", "eggs")]).await;
    ctx.settle_listed("eggs").await;
    let id = ctx.item_id("eggs");

    let deleted = ctx.post_form(&format!("/list/items/{id}/delete"), &[]).await;
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);
    assert!(deleted.triggers_refresh());

    let eggs = NormalizedName::parse("eggs").unwrap();
    ctx.settle(|view| !view.lists(&eggs)).await;

    let again = ctx.post_form(&format!("/list/items/{id}/delete"), &[]).await;
    assert_eq!(again.status, StatusCode::NO_CONTENT);

    ctx.shutdown().await;
}

#[tokio::test]
async fn test_order_change_resubscribes_once() {
    let ctx = TestContext::new().await;
    for name in ["bread", "eggs"] {
        ctx.post_form("/list/items", &[("name", name)]).await;
        ctx.settle_listed(name).await;
    }

    let newest = ctx.post_form("/list/order", &[("order", "newest")]).await;
    assert_eq!(newest.status, StatusCode::OK);
    let eggs_at = newest.body.find("<strong>Eggs</strong>").unwrap();
    let bread_at = newest.body.find("<strong>Bread</strong>").unwrap();
    assert!(eggs_at < bread_at);

    let oldest = ctx.post_form("/list/order", &[("order", "oldest")]).await;
    assert_eq!(oldest.status, StatusCode::OK);
    assert!(
        oldest.body.find("<strong>Bread</strong>").unwrap()
            < oldest.body.find("<strong>Eggs</strong>").unwrap()
    );

    // one list listener and one history listener
    assert_eq!(ctx.store.listener_count(), 2);
    let view = ctx.state.sync().view();
    assert_eq!(view.list.len(), 2);

    let invalid = ctx.post_form("/list/order", &[("order", "sideways")]).await;
    assert_eq!(invalid.status, StatusCode::BAD_REQUEST);

    ctx.shutdown().await;
}

#[tokio::test]
async fn test_health_endpoints() {
    let ctx = TestContext::new().await;

    let live = ctx.get("/health").await;
    assert_eq!(live.status, StatusCode::OK);
    assert_eq!(live.body, "ok");
    assert_eq!(ctx.get("/health/ready").await.status, StatusCode::OK);

    ctx.state.sync().shutdown().await;
    assert_eq!(
        ctx.get("/health/ready").await.status,
        StatusCode::SERVICE_UNAVAILABLE
    );
}
