mod common;

use anyhow::anyhow;
use serde_json::json;

use common::{orders_page, products_page, setup_pool, CannedFeed, ScriptedPlatform};
use storesync::db::orders::{get_order_by_number, items_for_order};
use storesync::db::products::{get_product_by_code, get_variant_by_code};
use storesync::sync::catalog::{
    sync_products_full, sync_products_partial, sync_products_simple,
};
use storesync::sync::orders::sync_orders;

const FEED_TWO_PRODUCTS: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<PRODUCTS>
  <PRODUCT>
    <CODE>P1</CODE>
    <STOCK>5</STOCK>
    <AVAILABILITY>In stock</AVAILABILITY>
    <VARIANTS>
      <VARIANT>
        <CODE>P1-A</CODE>
        <STOCK>2</STOCK>
      </VARIANT>
    </VARIANTS>
  </PRODUCT>
  <PRODUCT>
    <CODE>P2</CODE>
    <STOCK>8</STOCK>
    <AVAILABILITY>In stock</AVAILABILITY>
  </PRODUCT>
</PRODUCTS>"#;

const FEED_ONLY_P1: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<PRODUCTS>
  <PRODUCT>
    <CODE>P1</CODE>
    <STOCK>6</STOCK>
  </PRODUCT>
</PRODUCTS>"#;

#[tokio::test]
async fn full_sync_mirrors_feed_and_is_idempotent() {
    let pool = setup_pool().await;
    let feed = CannedFeed::full_only(FEED_TWO_PRODUCTS);

    let stats = sync_products_full(&pool, &feed).await.unwrap();
    assert_eq!(stats.synced, 2);
    assert_eq!(stats.failed, 0);

    let stats = sync_products_full(&pool, &feed).await.unwrap();
    assert_eq!(stats.synced, 2);

    let p1 = get_product_by_code(&pool, "P1").await.unwrap().unwrap();
    assert_eq!(p1.stock, 5);
    assert!(p1.active);
    let v = get_variant_by_code(&pool, "P1-A").await.unwrap().unwrap();
    assert_eq!(v.stock, 2);
    assert_eq!(v.product_id, p1.id);
}

#[tokio::test]
async fn full_sync_deactivates_products_missing_from_feed() {
    let pool = setup_pool().await;
    sync_products_full(&pool, &CannedFeed::full_only(FEED_TWO_PRODUCTS))
        .await
        .unwrap();
    sync_products_full(&pool, &CannedFeed::full_only(FEED_ONLY_P1))
        .await
        .unwrap();

    let p1 = get_product_by_code(&pool, "P1").await.unwrap().unwrap();
    assert!(p1.active);
    assert_eq!(p1.stock, 6);
    let p2 = get_product_by_code(&pool, "P2").await.unwrap().unwrap();
    assert!(!p2.active);
    // P1's variant was not in the second feed entry either.
    let v = get_variant_by_code(&pool, "P1-A").await.unwrap().unwrap();
    assert!(!v.active);
}

#[tokio::test]
async fn malformed_feed_fails_before_touching_the_catalog() {
    let pool = setup_pool().await;
    sync_products_full(&pool, &CannedFeed::full_only(FEED_ONLY_P1))
        .await
        .unwrap();

    let broken = "<PRODUCTS><PRODUCT><CODE>P9</CODE></PRODUCTS>";
    assert!(sync_products_full(&pool, &CannedFeed::full_only(broken))
        .await
        .is_err());

    // The earlier catalog state survives, including activity flags.
    let p1 = get_product_by_code(&pool, "P1").await.unwrap().unwrap();
    assert!(p1.active);
    assert!(get_product_by_code(&pool, "P9").await.unwrap().is_none());
}

#[tokio::test]
async fn partial_sync_merges_sparsely_and_never_creates_or_deactivates() {
    let pool = setup_pool().await;
    sync_products_full(&pool, &CannedFeed::full_only(FEED_TWO_PRODUCTS))
        .await
        .unwrap();

    let partial = r#"<PRODUCTS>
      <PRODUCT><CODE>P2</CODE><STOCK>1</STOCK></PRODUCT>
      <PRODUCT><CODE>UNKNOWN</CODE><STOCK>9</STOCK></PRODUCT>
    </PRODUCTS>"#;
    let feed = CannedFeed::with_partial(FEED_TWO_PRODUCTS, partial);
    let stats = sync_products_partial(&pool, &feed).await.unwrap();
    assert_eq!(stats.synced, 1);
    assert_eq!(stats.skipped, 1);

    let p2 = get_product_by_code(&pool, "P2").await.unwrap().unwrap();
    assert_eq!(p2.stock, 1);
    assert_eq!(p2.availability.as_deref(), Some("In stock"));
    // P1 untouched and still active, unknown code not created.
    assert!(get_product_by_code(&pool, "P1").await.unwrap().unwrap().active);
    assert!(get_product_by_code(&pool, "UNKNOWN").await.unwrap().is_none());
}

#[tokio::test]
async fn unconfigured_partial_feed_is_a_noop_success() {
    let pool = setup_pool().await;
    let feed = CannedFeed::full_only(FEED_ONLY_P1);
    let stats = sync_products_partial(&pool, &feed).await.unwrap();
    assert_eq!(stats.synced, 0);
    assert_eq!(stats.skipped, 0);
}

#[tokio::test]
async fn simple_sync_walks_every_reported_page() {
    let pool = setup_pool().await;
    let platform = ScriptedPlatform::default();
    platform
        .push_products_page(products_page(json!({
            "products": [{"code": "A", "stock": 1}],
            "number_of_pages": 2
        })))
        .await;
    platform
        .push_products_page(products_page(json!({
            "products": [{"code": "B", "stock": 2,
                          "variants": [{"code": "B-1", "stock": 7}]}],
            "number_of_pages": 2
        })))
        .await;

    let stats = sync_products_simple(&pool, &platform, Some("A;B"))
        .await
        .unwrap();
    assert_eq!(stats.synced, 2);

    let calls = platform.products_calls().await;
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0], (1, Some("A;B".to_string())));
    assert_eq!(calls[1], (2, Some("A;B".to_string())));

    assert_eq!(get_product_by_code(&pool, "A").await.unwrap().unwrap().stock, 1);
    assert_eq!(
        get_variant_by_code(&pool, "B-1").await.unwrap().unwrap().stock,
        7
    );
}

#[tokio::test]
async fn simple_page_failure_fails_the_run() {
    let pool = setup_pool().await;
    let platform = ScriptedPlatform::default();
    platform
        .push_products_page(products_page(json!({
            "products": [{"code": "A", "stock": 1}],
            "number_of_pages": 3
        })))
        .await;
    platform.push_products_page(Err(anyhow!("bad gateway"))).await;

    assert!(sync_products_simple(&pool, &platform, None).await.is_err());
    // The first page was still applied before the failure.
    assert!(get_product_by_code(&pool, "A").await.unwrap().is_some());
}

#[tokio::test]
async fn order_sync_stores_snapshot_and_replaces_items() {
    let pool = setup_pool().await;
    let platform = ScriptedPlatform::default();
    platform
        .push_orders_page(orders_page(json!({
            "orders": [{
                "order_number": "O1",
                "status": "New",
                "creation_time": "2026-03-01T10:00:00",
                "order_total": 90.0,
                "products": [
                    {"uuid": "a", "code": "P1", "quantity": 1.0},
                    {"uuid": "b", "code": "P2", "quantity": 2.0}
                ]
            }],
            "number_of_pages": 1
        })))
        .await;
    let stats = sync_orders(&pool, &platform, Some("2026-03-01T00:00:00"), None)
        .await
        .unwrap();
    assert_eq!(stats.synced, 1);

    let order = get_order_by_number(&pool, "O1").await.unwrap().unwrap();
    assert_eq!(order.status.as_deref(), Some("New"));
    assert_eq!(items_for_order(&pool, order.id).await.unwrap().len(), 2);

    // A later payload without item "a" removes it.
    platform
        .push_orders_page(orders_page(json!({
            "orders": [{
                "order_number": "O1",
                "status": "Shipped",
                "products": [{"uuid": "b", "code": "P2", "quantity": 3.0}]
            }],
            "number_of_pages": 1
        })))
        .await;
    sync_orders(&pool, &platform, Some("2026-03-01T00:00:00"), None)
        .await
        .unwrap();

    let order = get_order_by_number(&pool, "O1").await.unwrap().unwrap();
    assert_eq!(order.status.as_deref(), Some("Shipped"));
    let items = items_for_order(&pool, order.id).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].uuid, "b");
    assert_eq!(items[0].quantity, Some(3.0));
}

#[tokio::test]
async fn orders_without_a_number_are_skipped() {
    let pool = setup_pool().await;
    let platform = ScriptedPlatform::default();
    platform
        .push_orders_page(orders_page(json!({
            "orders": [
                {"order_id": 42},
                {"order_number": "O2", "products": []}
            ],
            "number_of_pages": 1
        })))
        .await;

    let stats = sync_orders(&pool, &platform, None, None).await.unwrap();
    assert_eq!(stats.synced, 1);
    assert_eq!(stats.skipped, 1);
    assert!(get_order_by_number(&pool, "O2").await.unwrap().is_some());
}

#[tokio::test]
async fn order_page_failure_fails_the_run() {
    let pool = setup_pool().await;
    let platform = ScriptedPlatform::default();
    platform.push_orders_page(Err(anyhow!("bad gateway"))).await;
    assert!(sync_orders(&pool, &platform, None, None).await.is_err());
}

#[tokio::test]
async fn order_sync_defaults_to_a_one_day_window() {
    let pool = setup_pool().await;
    let platform = ScriptedPlatform::default();
    sync_orders(&pool, &platform, None, Some("1;2")).await.unwrap();

    let calls = platform.orders_calls.lock().await.clone();
    assert_eq!(calls.len(), 1);
    let (page, from, status_ids) = &calls[0];
    assert_eq!(*page, 1);
    assert!(from.is_some());
    assert_eq!(status_ids.as_deref(), Some("1;2"));
}
