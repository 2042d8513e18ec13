//! The purchase dialog and best-price bookkeeping over HTTP.

#![allow(clippy::unwrap_used)]

use axum::http::StatusCode;
use shoplist_core::{NormalizedName, Price, PriceTrack};
use shoplist_integration_tests::TestContext;
use shoplist_web::store::{Collection, Operation};

fn name(s: &str) -> NormalizedName {
    NormalizedName::parse(s).unwrap()
}

/// Put `product` on the list and wait for it to show up.
async fn list(ctx: &TestContext, product: &str) -> String {
    let response = ctx.post_form("/history/readd", &[("name", product)]).await;
    assert!(response.status.is_success());
    ctx.settle_listed(product).await;
    ctx.item_id(product)
}

/// Confirm a purchase and wait for the item to leave the list.
async fn buy(ctx: &TestContext, id: &str, form: &[(&str, &str)]) -> String {
    let response = ctx.post_form(&format!("/list/items/{id}/buy"), form).await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.body);
    assert!(response.triggers_refresh());
    response.body
}

#[tokio::test]
async fn test_best_price_follows_cheapest_purchase() {
    let ctx = TestContext::new().await;
    let milk = name("milk");

    ctx.post_form("/list/items", &[("name", "Milk")]).await;
    ctx.settle_listed("milk").await;
    let id = ctx.item_id("milk");

    let dialog = ctx.get(&format!("/list/items/{id}/buy")).await;
    assert_eq!(dialog.status, StatusCode::OK);
    assert!(dialog.body.contains("New item. No price history yet."));

    let notice = buy(&ctx, &id, &[("price", "3.50"), ("new_market", "StoreA")]).await;
    assert!(notice.contains("New best price! The best price of Milk is now R$ 3.50 at Storea."));
    let view = ctx
        .settle(|view| !view.lists(&milk) && view.history_enabled(&milk) == Some(true))
        .await;
    let entry = view.history.iter().find(|e| e.name == milk).unwrap();
    assert_eq!(entry.regular.as_ref().unwrap().price, Price::parse("3.50").unwrap());

    let id = list(&ctx, "milk").await;
    let notice = buy(&ctx, &id, &[("price", "2,99"), ("new_market", "StoreB")]).await;
    assert!(notice.contains("New best price! The best price of Milk is now R$ 2.99 at Storeb."));
    ctx.settle(|view| !view.lists(&milk)).await;

    let id = list(&ctx, "milk").await;
    let notice = buy(&ctx, &id, &[("price", "4.00"), ("market", "storea")]).await;
    assert!(notice.contains("Purchase recorded, but the best price is still R$ 2.99 at Storeb."));
    ctx.settle(|view| !view.lists(&milk)).await;

    let prices = ctx.state.sync().prices();
    let record = prices.get(&milk).unwrap();
    let best = record.best(PriceTrack::Regular).unwrap();
    assert_eq!(best.price, Price::parse("2.99").unwrap());
    assert_eq!(best.market, name("storeb"));
    assert!(record.best_promo.is_none());
    assert!(record.last_purchased_at.is_some());

    assert_eq!(ctx.store.document_count(Collection::ShoppingList), 0);
    assert_eq!(ctx.store.document_count(Collection::Products), 1);
    assert_eq!(ctx.store.document_count(Collection::Markets), 2);

    ctx.shutdown().await;
}

#[tokio::test]
async fn test_promo_track_is_independent() {
    let ctx = TestContext::new().await;
    let rice = name("rice");

    let id = list(&ctx, "rice").await;
    buy(&ctx, &id, &[("price", "10"), ("new_market", "StoreA")]).await;
    ctx.settle(|view| !view.lists(&rice)).await;

    let id = list(&ctx, "rice").await;
    let notice = buy(
        &ctx,
        &id,
        &[("price", "12"), ("market", "storea"), ("promo", "on")],
    )
    .await;
    assert!(notice.contains("best promo price of Rice is now R$ 12.00"));
    ctx.settle(|view| !view.lists(&rice)).await;

    let prices = ctx.state.sync().prices();
    let record = prices.get(&rice).unwrap();
    assert_eq!(record.best_regular.as_ref().unwrap().price, Price::parse("10").unwrap());
    assert_eq!(record.best_promo.as_ref().unwrap().price, Price::parse("12").unwrap());

    ctx.shutdown().await;
}

#[tokio::test]
async fn test_invalid_form_mutates_nothing() {
    let ctx = TestContext::new().await;
    ctx.post_form("/list/items", &[("name", "bread")]).await;
    ctx.settle_listed("bread").await;
    let id = ctx.item_id("bread");

    let response = ctx
        .post_form(&format!("/list/items/{id}/buy"), &[("price", "abc")])
        .await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(response.body.contains("field-error"));
    assert!(response.body.contains("Select a market or enter a new one"));
    assert!(!response.triggers_refresh());

    assert_eq!(ctx.store.document_count(Collection::ShoppingList), 1);
    assert_eq!(ctx.store.document_count(Collection::Products), 0);
    assert_eq!(ctx.store.document_count(Collection::Markets), 0);

    ctx.shutdown().await;
}

#[tokio::test]
async fn test_failed_confirmation_keeps_dialog_open() {
    let ctx = TestContext::new().await;
    ctx.post_form("/list/items", &[("name", "cheese")]).await;
    ctx.settle_listed("cheese").await;
    let id = ctx.item_id("cheese");

    ctx.store.fail_next(Operation::Delete, 1);
    let form = [("price", "25.90"), ("new_market", "StoreC")];
    let failed = ctx.post_form(&format!("/list/items/{id}/buy"), &form).await;
    assert_eq!(failed.status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(failed.body.contains("<dialog"));
    assert!(failed.body.contains("Could not reach the database"));
    assert!(failed.body.contains("25.90"));

    // all or nothing
    assert_eq!(ctx.store.document_count(Collection::ShoppingList), 1);
    assert_eq!(ctx.store.document_count(Collection::Products), 0);
    assert_eq!(ctx.store.document_count(Collection::Markets), 0);

    buy(&ctx, &id, &form).await;
    assert_eq!(ctx.store.document_count(Collection::ShoppingList), 0);
    assert_eq!(ctx.store.document_count(Collection::Products), 1);

    ctx.shutdown().await;
}

#[tokio::test]
async fn test_dialog_for_missing_item_is_not_found() {
    let ctx = TestContext::new().await;

    let open = ctx.get("/list/items/missing/buy").await;
    assert_eq!(open.status, StatusCode::NOT_FOUND);

    let confirm = ctx
        .post_form("/list/items/missing/buy", &[("price", "1"), ("market", "storea")])
        .await;
    assert_eq!(confirm.status, StatusCode::NOT_FOUND);

    let cancel = ctx.get("/list/items/missing/buy/cancel").await;
    assert_eq!(cancel.status, StatusCode::OK);
    assert!(cancel.body.is_empty());

    ctx.shutdown().await;
}
