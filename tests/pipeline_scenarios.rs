mod common;

use std::sync::atomic::{AtomicI64, Ordering};

use axum::http::StatusCode;
use serde_json::json;

use common::{MockWoo, Reply};
use target_woocommerce::models::RecordEvent;
use target_woocommerce::reference::{LookupKey, ReferenceKind};
use target_woocommerce::target::Target;

fn mug_catalog() -> Reply {
    Reply::page(json!([{"id": 11, "sku": "MUG", "name": "Mug", "type": "simple", "stock_quantity": 5}]), 1)
}

#[tokio::test]
async fn order_with_unknown_sku_is_skipped_and_neighbours_succeed() {
    let mock = MockWoo::start(|hit| match (hit.method.as_str(), hit.path.as_str()) {
        ("GET", "/products") => mug_catalog(),
        ("POST", "/orders") => Reply::created(json!({"id": 900})),
        _ => Reply::empty_list(),
    })
    .await;
    let target = Target::new(&mock.config()).unwrap();

    let orders = [
        json!({"line_items": [{"sku": "MUG", "quantity": 2}]}),
        json!({"line_items": [{"sku": "NOPE", "quantity": 1}]}),
        json!({"line_items": [{"sku": "MUG"}]}),
    ];
    let mut events = Vec::new();
    for o in &orders {
        events.push(target.process_record("SalesOrders", o).await);
    }

    assert!(events[0].is_success());
    assert!(matches!(&events[1], RecordEvent::Skipped { reason } if reason.contains("line items resolved")));
    assert!(events[2].is_success());

    let posts = mock.matching("POST", "/orders");
    assert_eq!(posts.len(), 2);
    assert_eq!(posts[0].body["line_items"], json!([{"product_id": 11, "quantity": 2}]));
    assert_eq!(posts[1].body["line_items"], json!([{"product_id": 11, "quantity": 1}]));
    assert_eq!(mock.count("GET", "/products"), 1, "catalog is fetched once for the whole run");

    let summary = target.summarize();
    let orders = summary.streams.iter().find(|s| s.stream == "SalesOrders").unwrap();
    assert_eq!((orders.total, orders.succeeded, orders.failed, orders.skipped), (3, 2, 0, 1));
    assert_eq!(orders.created, 2);
}

#[tokio::test]
async fn inventory_with_explicit_id_never_touches_the_catalog() {
    let mock = MockWoo::start(|hit| match (hit.method.as_str(), hit.path.as_str()) {
        ("GET", "/products/501") => Reply::ok(json!({"id": 501, "sku": "X", "stock_quantity": 2, "type": "simple"})),
        ("PUT", "/products/501") => Reply::ok(json!({"id": 501, "stock_quantity": 12})),
        ("PUT", "/products/70/variations/77") => Reply::ok(json!({"id": 77})),
        _ => Reply::error(StatusCode::NOT_FOUND, "unexpected"),
    })
    .await;
    let target = Target::new(&mock.config()).unwrap();

    let event = target.process_record("UpdateInventory", &json!({"id": 501, "quantity": 10})).await;
    assert!(event.is_success());
    let puts = mock.matching("PUT", "/products/501");
    assert_eq!(puts.len(), 1);
    assert_eq!(puts[0].body, json!({"stock_quantity": 12, "manage_stock": true, "stock_status": "instock"}));

    let event = target
        .process_record("UpdateInventory", &json!({"id": "77", "parent_id": 70, "quantity": 3, "operation": "set"}))
        .await;
    assert!(event.is_success());
    assert_eq!(mock.count("PUT", "/products/70/variations/77"), 1);

    assert_eq!(mock.count("GET", "/products"), 0);
    assert!(!target.cache().is_loaded(ReferenceKind::Products));
    assert!(!target.cache().is_loaded(ReferenceKind::Variants));
    assert_eq!(mock.hits().len(), 3, "one stock read and two updates");
}

#[tokio::test]
async fn inventory_by_sku_pages_through_the_catalog_once() {
    let mock = MockWoo::start(|hit| match (hit.method.as_str(), hit.path.as_str()) {
        ("GET", "/products") => match hit.q("page") {
            Some("1") => Reply::page(
                json!([
                    {"id": 1, "sku": "X", "name": "X", "type": "simple", "stock_quantity": 0},
                    {"id": 2, "sku": "Y", "name": "Y", "type": "simple", "stock_quantity": 0}
                ]),
                2,
            ),
            _ => Reply::page(json!([{"id": 3, "sku": "ABC-1", "name": "Widget", "type": "simple", "stock_quantity": 4}]), 2),
        },
        ("PUT", "/products/3") => Reply::ok(json!({"id": 3})),
        _ => Reply::empty_list(),
    })
    .await;
    let mut cfg = mock.config();
    cfg.page_size = 2;
    let target = Target::new(&cfg).unwrap();

    assert!(target.process_record("UpdateInventory", &json!({"sku": "ABC-1", "quantity": 5})).await.is_success());
    assert!(target
        .process_record("UpdateInventory", &json!({"sku": "ABC-1", "quantity": 1, "operation": "subtract"}))
        .await
        .is_success());

    let pages: Vec<String> = mock
        .matching("GET", "/products")
        .iter()
        .map(|h| h.q("page").unwrap_or_default().to_string())
        .collect();
    assert_eq!(pages, vec!["1", "2"]);
    let first = &mock.matching("GET", "/products")[0];
    assert_eq!(first.q("per_page"), Some("2"));
    assert_eq!(first.q("order"), Some("asc"));

    let puts = mock.matching("PUT", "/products/3");
    assert_eq!(puts.len(), 2);
    assert_eq!(puts[0].body["stock_quantity"], json!(9));
    // the cached snapshot still says 4
    assert_eq!(puts[1].body["stock_quantity"], json!(3));

    let cache = target.cache();
    assert_eq!(cache.resolve(ReferenceKind::Products, LookupKey::Sku("ABC-1")).await.map(|e| e.id), Some(3));
    assert_eq!(cache.resolve(ReferenceKind::Products, LookupKey::Id(2)).await.map(|e| e.id), Some(2));
    assert!(cache.resolve(ReferenceKind::Products, LookupKey::Sku("ZZZ")).await.is_none());
    assert_eq!(mock.count("GET", "/products"), 2, "lookups reuse the populated catalog");
}

#[tokio::test]
async fn failed_variation_does_not_fail_parent_or_siblings() {
    let next_id = AtomicI64::new(100);
    let mock = MockWoo::start(move |hit| match (hit.method.as_str(), hit.path.as_str()) {
        ("GET", "/products/attributes") => Reply::page(json!([{"id": 3, "name": "Size", "slug": "pa_size"}]), 1),
        ("GET", _) => Reply::empty_list(),
        ("POST", "/products") => Reply::created(json!({"id": 10, "attributes": [{"id": 3, "name": "Size"}]})),
        ("POST", "/products/10/variations") if hit.body["sku"] == json!("TEE-M") => {
            Reply::error(StatusCode::INTERNAL_SERVER_ERROR, "database went away")
        }
        ("POST", "/products/10/variations") => Reply::created(json!({"id": next_id.fetch_add(1, Ordering::SeqCst)})),
        _ => Reply::error(StatusCode::NOT_FOUND, "unexpected"),
    })
    .await;
    let target = Target::new(&mock.config()).unwrap();

    let product = json!({
        "name": "Tee",
        "options": ["Size"],
        "variants": [
            {"sku": "TEE-S", "price": 10, "options": [{"name": "Size", "value": "S"}]},
            {"sku": "TEE-M", "price": 10, "options": [{"name": "Size", "value": "M"}]},
            {"sku": "TEE-L", "price": 12, "options": [{"name": "Size", "value": "L"}]}
        ]
    });
    let event = target.process_record("Products", &product).await;

    let RecordEvent::Upserted(outcome) = &event else { panic!("expected an upsert, got {:?}", event) };
    assert!(outcome.success);
    assert_eq!(outcome.remote_id, Some(10));
    assert_eq!(outcome.detail.failed_variations, vec!["TEE-M".to_string()]);

    let parent = &mock.matching("POST", "/products")[0];
    assert_eq!(parent.body["type"], json!("variable"));
    assert_eq!(
        parent.body["attributes"],
        json!([{"id": 3, "position": 0, "visible": false, "variation": true, "options": ["S", "M", "L"]}])
    );
    assert_eq!(parent.body["default_attributes"], json!([{"id": 3, "option": "S"}]));
    assert!(parent.body.get("variations").is_none());

    let variations = mock.matching("POST", "/products/10/variations");
    assert_eq!(variations.len(), 3);
    assert_eq!(variations[2].body["attributes"], json!([{"id": 3, "name": "Size", "option": "L"}]));
    assert_eq!(variations[2].body["regular_price"], json!("12"));

    let summary = target.summarize();
    assert_eq!(summary.overall.succeeded, 1);
    assert_eq!(summary.overall.failed, 0);
}
