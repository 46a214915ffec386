use std::sync::Arc;

use serde_json::{json, Value};

use dimension_sync::catalog::{CatalogCall, MockCatalogClient};
use dimension_sync::config::CachePrefixes;
use dimension_sync::engine::SyncEngine;
use dimension_sync::redis::MockCacheClient;
use dimension_sync::sink::MemorySink;
use dimension_sync::types::{ChangeEvent, DimensionKind};

const TOPIC: &str = "aggr_data_change_events";
const BATCH_SIZE: usize = 2;

struct Harness {
    engine: Arc<SyncEngine>,
    cache: MockCacheClient,
    catalog: MockCatalogClient,
    sink: MemorySink,
}

fn harness() -> Harness {
    let cache = MockCacheClient::new();
    let catalog = MockCatalogClient::new();
    let sink = MemorySink::new();
    let engine = Arc::new(SyncEngine::new(
        Arc::new(cache.clone()),
        Arc::new(catalog.clone()),
        Arc::new(sink.clone()),
        CachePrefixes::default(),
        TOPIC.to_string(),
        BATCH_SIZE,
    ));

    Harness {
        engine,
        cache,
        catalog,
        sink,
    }
}

fn event(value: Value) -> ChangeEvent {
    ChangeEvent::from_payload(value.to_string().as_bytes()).unwrap()
}

fn payloads(sink: &MemorySink) -> Vec<String> {
    sink.published().into_iter().map(|(_, p)| p).collect()
}

#[tokio::test]
async fn test_category_update_writes_cache_and_notifies_once() {
    let h = harness();
    let record = json!({"id": 7, "name": "drinks"});
    let catalog = h.catalog.with_record(DimensionKind::Category, 7, record.clone());

    h.engine
        .process(event(json!({
            "data_type": "category",
            "event_type": "update",
            "id": 7
        })))
        .await
        .unwrap();

    assert_eq!(
        catalog.get_calls(),
        vec![CatalogCall::ById(DimensionKind::Category, 7)]
    );
    assert_eq!(h.cache.entry("category_7"), Some(record.to_string()));

    let published = h.engine.flush_pending().await;
    assert_eq!(published, 1);
    assert_eq!(
        payloads(&h.sink),
        vec![r#"{"dim_type": "category", "id": 7}"#.to_string()]
    );
    assert_eq!(h.engine.pending_len(), 0);

    // Nothing left for the next cycle.
    assert_eq!(h.engine.flush_pending().await, 0);
    assert_eq!(h.sink.published().len(), 1);
}

#[tokio::test]
async fn test_brand_adds_buffer_until_threshold_then_batch_resolve() {
    let h = harness();
    let catalog = h
        .catalog
        .with_record(DimensionKind::Brand, 1, json!({"id": 1, "name": "acme"}))
        .with_record(DimensionKind::Brand, 2, json!({"id": 2, "name": "zenith"}));

    h.engine
        .process(event(json!({
            "data_type": "brand",
            "event_type": "add",
            "id": 1
        })))
        .await
        .unwrap();

    // Below threshold: nothing resolved, nothing cached, nothing queued.
    assert!(catalog.get_calls().is_empty());
    assert_eq!(h.engine.buffered_brand_count().await, 1);
    assert_eq!(h.cache.entry("brand_1"), None);
    assert_eq!(h.engine.pending_len(), 0);

    h.engine
        .process(event(json!({
            "data_type": "brand",
            "event_type": "add",
            "id": 2
        })))
        .await
        .unwrap();

    assert_eq!(
        catalog.get_calls(),
        vec![CatalogCall::BrandBatch("1,2".to_string())]
    );
    assert_eq!(h.engine.buffered_brand_count().await, 0);
    assert_eq!(
        h.cache.entry("brand_1"),
        Some(json!({"id": 1, "name": "acme"}).to_string())
    );
    assert_eq!(
        h.cache.entry("brand_2"),
        Some(json!({"id": 2, "name": "zenith"}).to_string())
    );

    let published = h.engine.flush_pending().await;
    assert_eq!(published, 2);
    let mut got = payloads(&h.sink);
    got.sort();
    assert_eq!(
        got,
        vec![
            r#"{"dim_type": "brand", "id": 1}"#.to_string(),
            r#"{"dim_type": "brand", "id": 2}"#.to_string(),
        ]
    );
}

#[tokio::test]
async fn test_brand_batch_preserves_duplicate_ids() {
    let h = harness();
    let catalog = h
        .catalog
        .with_record(DimensionKind::Brand, 1, json!({"id": 1}));

    for _ in 0..2 {
        h.engine
            .process(event(json!({
                "data_type": "brand",
                "event_type": "update",
                "id": 1
            })))
            .await
            .unwrap();
    }

    assert_eq!(
        catalog.get_calls(),
        vec![CatalogCall::BrandBatch("1,1".to_string())]
    );
    // Two records for one id still collapse to one notification.
    assert_eq!(h.engine.flush_pending().await, 1);
}

#[tokio::test]
async fn test_brand_delete_bypasses_buffer() {
    let h = harness();

    h.engine
        .process(event(json!({
            "data_type": "brand",
            "event_type": "add",
            "id": 1
        })))
        .await
        .unwrap();
    assert_eq!(h.engine.buffered_brand_count().await, 1);

    h.engine
        .process(event(json!({
            "data_type": "brand",
            "event_type": "delete",
            "id": 9
        })))
        .await
        .unwrap();

    // The delete acted immediately and the buffered add is still pending.
    assert_eq!(h.engine.buffered_brand_count().await, 1);
    let calls = h.cache.get_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].op, "del");
    assert_eq!(calls[0].key, "brand_9");

    assert_eq!(h.engine.flush_pending().await, 1);
    assert_eq!(
        payloads(&h.sink),
        vec![r#"{"dim_type": "brand", "id": 9}"#.to_string()]
    );
}

#[tokio::test]
async fn test_brand_batch_shortfall_drops_missing_ids() {
    let h = harness();
    let catalog = h
        .catalog
        .with_record(DimensionKind::Brand, 1, json!({"id": 1}));

    h.engine
        .process(event(json!({
            "data_type": "brand",
            "event_type": "add",
            "id": 1
        })))
        .await
        .unwrap();
    h.engine
        .process(event(json!({
            "data_type": "brand",
            "event_type": "add",
            "id": 2
        })))
        .await
        .unwrap();

    assert_eq!(
        catalog.get_calls(),
        vec![CatalogCall::BrandBatch("1,2".to_string())]
    );
    assert_eq!(h.engine.buffered_brand_count().await, 0);
    assert_eq!(h.cache.entry("brand_1"), Some(json!({"id": 1}).to_string()));
    assert_eq!(h.cache.entry("brand_2"), None);
    assert_eq!(h.engine.flush_pending().await, 1);
}

#[tokio::test]
async fn test_brand_batch_fetch_failure_clears_buffer() {
    let h = harness();
    let catalog = h.catalog.fail_batches();

    h.engine
        .process(event(json!({
            "data_type": "brand",
            "event_type": "add",
            "id": 1
        })))
        .await
        .unwrap();
    let err = h
        .engine
        .process(event(json!({
            "data_type": "brand",
            "event_type": "add",
            "id": 2
        })))
        .await
        .unwrap_err();

    assert!(err.to_string().contains("1,2"));
    assert_eq!(catalog.get_calls().len(), 1);
    // The buffer is spent; the failed ids are not retried.
    assert_eq!(h.engine.buffered_brand_count().await, 0);
    assert_eq!(h.engine.pending_len(), 0);
    assert!(h.cache.get_calls().is_empty());
}

#[tokio::test]
async fn test_same_dimension_events_dedupe_to_one_publish() {
    let h = harness();
    h.catalog
        .with_record(DimensionKind::Product, 5, json!({"id": 5}))
        .with_record(DimensionKind::ProductProperty, 77, json!({"id": 77}));

    h.engine
        .process(event(json!({
            "data_type": "product",
            "event_type": "update",
            "id": 5
        })))
        .await
        .unwrap();
    h.engine
        .process(event(json!({
            "data_type": "product_property",
            "event_type": "update",
            "id": 77,
            "product_id": 5
        })))
        .await
        .unwrap();

    // Both events collapse to the (product, 5) signal.
    assert_eq!(h.engine.pending_len(), 1);
    assert_eq!(h.engine.flush_pending().await, 1);
    assert_eq!(
        payloads(&h.sink),
        vec![r#"{"dim_type": "product", "id": 5}"#.to_string()]
    );
}

#[tokio::test]
async fn test_product_sub_entities_key_by_product_id() {
    let h = harness();
    let intro = json!({"id": 10, "content": "intro text"});
    h.catalog
        .with_record(DimensionKind::ProductIntro, 10, intro.clone());

    h.engine
        .process(event(json!({
            "data_type": "product_intro",
            "event_type": "add",
            "id": 10,
            "product_id": 4
        })))
        .await
        .unwrap();

    // Fetched by its own id, cached and notified under the owning product.
    assert_eq!(
        h.catalog.get_calls(),
        vec![CatalogCall::ById(DimensionKind::ProductIntro, 10)]
    );
    assert_eq!(h.cache.entry("product_intro_4"), Some(intro.to_string()));
    assert_eq!(h.engine.flush_pending().await, 1);
    assert_eq!(
        payloads(&h.sink),
        vec![r#"{"dim_type": "product", "id": 4}"#.to_string()]
    );
}

#[tokio::test]
async fn test_sub_entity_delete_removes_product_keyed_entry() {
    let h = harness();

    h.engine
        .process(event(json!({
            "data_type": "product_specification",
            "event_type": "delete",
            "id": 31,
            "product_id": 5
        })))
        .await
        .unwrap();

    let calls = h.cache.get_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].op, "del");
    assert_eq!(calls[0].key, "product_specification_5");
    assert!(h.catalog.get_calls().is_empty());

    assert_eq!(h.engine.flush_pending().await, 1);
    assert_eq!(
        payloads(&h.sink),
        vec![r#"{"dim_type": "product", "id": 5}"#.to_string()]
    );
}

#[tokio::test]
async fn test_flush_of_empty_set_publishes_nothing() {
    let h = harness();

    assert_eq!(h.engine.flush_pending().await, 0);
    assert!(h.sink.published().is_empty());
}

#[tokio::test]
async fn test_fetch_failure_skips_cache_and_notification() {
    let h = harness();
    // No record configured for category 3, so the fetch fails.

    let err = h
        .engine
        .process(event(json!({
            "data_type": "category",
            "event_type": "update",
            "id": 3
        })))
        .await
        .unwrap_err();

    assert!(err.to_string().contains("category"));
    assert!(h.cache.get_calls().is_empty());
    assert_eq!(h.engine.pending_len(), 0);
    assert_eq!(h.engine.flush_pending().await, 0);
}

#[tokio::test]
async fn test_cache_failure_skips_notification() {
    let h = harness();
    h.catalog
        .with_record(DimensionKind::Category, 3, json!({"id": 3}));
    h.cache.fail_key("category_3");

    let err = h
        .engine
        .process(event(json!({
            "data_type": "category",
            "event_type": "update",
            "id": 3
        })))
        .await
        .unwrap_err();

    assert!(err.to_string().contains("category_3"));
    assert_eq!(h.cache.entry("category_3"), None);
    assert_eq!(h.engine.flush_pending().await, 0);
}

#[tokio::test]
async fn test_malformed_payload_never_reaches_the_engine() {
    let payload = json!({"event_type": "add", "id": 1}).to_string();

    assert!(ChangeEvent::from_payload(payload.as_bytes()).is_err());
}

#[tokio::test]
async fn test_failed_publish_is_retried_next_cycle() {
    let h = harness();
    h.catalog
        .with_record(DimensionKind::Category, 7, json!({"id": 7}));
    h.sink.fail_once(r#"{"dim_type": "category", "id": 7}"#);

    h.engine
        .process(event(json!({
            "data_type": "category",
            "event_type": "update",
            "id": 7
        })))
        .await
        .unwrap();

    // First cycle fails; the notification stays pending.
    assert_eq!(h.engine.flush_pending().await, 0);
    assert!(h.sink.published().is_empty());
    assert_eq!(h.engine.pending_len(), 1);

    // Second cycle delivers it exactly once.
    assert_eq!(h.engine.flush_pending().await, 1);
    assert_eq!(
        payloads(&h.sink),
        vec![r#"{"dim_type": "category", "id": 7}"#.to_string()]
    );
    assert_eq!(h.engine.pending_len(), 0);
}

#[tokio::test]
async fn test_concurrent_brand_adds_resolve_each_id_once() {
    let h = harness();
    let catalog = h.catalog.clone();
    for id in 1..=4 {
        catalog.with_record(DimensionKind::Brand, id, json!({"id": id}));
    }

    let mut handles = Vec::new();
    for id in 1..=4 {
        let engine = h.engine.clone();
        handles.push(tokio::spawn(async move {
            engine
                .process(event(json!({
                    "data_type": "brand",
                    "event_type": "add",
                    "id": id
                })))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    // Four adds at threshold two: exactly two batch calls, four ids total,
    // no id resolved twice and none lost.
    let calls = catalog.get_calls();
    assert_eq!(calls.len(), 2);
    let mut seen: Vec<i64> = calls
        .iter()
        .flat_map(|call| match call {
            CatalogCall::BrandBatch(ids) => ids
                .split(',')
                .map(|raw| raw.parse::<i64>().unwrap())
                .collect::<Vec<_>>(),
            CatalogCall::ById(_, _) => vec![],
        })
        .collect();
    seen.sort_unstable();
    assert_eq!(seen, vec![1, 2, 3, 4]);
    assert_eq!(h.engine.buffered_brand_count().await, 0);
    assert_eq!(h.engine.flush_pending().await, 4);
}
