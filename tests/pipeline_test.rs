//! End-to-end pipeline tests: read, tick, read again.

use std::sync::Arc;

use kaupang::{
    CacheStore, Kaupang, KaupangError, MemoryStore, PriceField, PriceValue, QueryTransport, Scope,
    Side, Transport, TtlConfig,
};
use serde_json::json;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

fn aggregate_body() -> serde_json::Value {
    json!({
        "34": { "buy": { "max": 5.05 }, "sell": { "min": 6.30, "volume": 450.0 } },
        "35": { "buy": { "max": 10.10 }, "sell": { "min": 12.00 } }
    })
}

#[tokio::test]
async fn full_cycle_resolves_reads() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(aggregate_body()))
        .mount(&mock_server)
        .await;

    let pipeline = Kaupang::builder()
        .base_url(mock_server.uri())
        .build()
        .unwrap();

    let items = [34, 35, 99999999];
    let before = pipeline
        .read(Scope::Region, 10000002, &items, Side::Sell, PriceField::Min)
        .await;
    assert!(before.iter().all(|v| matches!(v, PriceValue::Pending)));

    let report = pipeline.tick().await;
    assert_eq!(report.drained_tasks, 1);
    assert_eq!(report.fetched_records, 2);
    assert_eq!(report.confirmed_absent, 1);

    let after = pipeline
        .read(Scope::Region, 10000002, &items, Side::Sell, PriceField::Min)
        .await;
    assert_eq!(
        after,
        vec![
            PriceValue::Number(6.30),
            PriceValue::Number(12.00),
            // Upstream does not know this item: cached absence, blank.
            PriceValue::Blank,
        ]
    );
}

#[tokio::test]
async fn repeated_reads_cost_one_upstream_call() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(aggregate_body()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let pipeline = Kaupang::builder()
        .base_url(mock_server.uri())
        .build()
        .unwrap();

    // Two readers ask for overlapping items before any tick runs.
    pipeline
        .read(Scope::Region, 10000002, &[34], Side::Buy, PriceField::Max)
        .await;
    pipeline
        .read(Scope::Region, 10000002, &[34, 35], Side::Sell, PriceField::Min)
        .await;

    let report = pipeline.tick().await;
    assert_eq!(report.drained_tasks, 1);
    assert_eq!(report.fetched_records, 2);

    let value = pipeline
        .read_one(Scope::Region, 10000002, 34, Side::Buy, PriceField::Max)
        .await;
    assert_eq!(value, PriceValue::Number(5.05));
}

#[tokio::test]
async fn duplicate_ids_are_answered_consistently() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(aggregate_body()))
        .mount(&mock_server)
        .await;

    let pipeline = Kaupang::builder()
        .base_url(mock_server.uri())
        .build()
        .unwrap();

    pipeline
        .read(Scope::Region, 10000002, &[34], Side::Buy, PriceField::Max)
        .await;
    pipeline.tick().await;

    let values = pipeline
        .read(Scope::Region, 10000002, &[34, 34], Side::Buy, PriceField::Max)
        .await;
    assert_eq!(
        values,
        vec![PriceValue::Number(5.05), PriceValue::Number(5.05)]
    );
}

#[tokio::test]
async fn invalidate_causes_a_refetch() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(aggregate_body()))
        .expect(2)
        .mount(&mock_server)
        .await;

    let pipeline = Kaupang::builder()
        .base_url(mock_server.uri())
        .build()
        .unwrap();

    pipeline
        .read(Scope::Region, 10000002, &[34], Side::Buy, PriceField::Max)
        .await;
    pipeline.tick().await;

    pipeline.invalidate(Scope::Region, 10000002, &[34]).await;

    let value = pipeline
        .read_one(Scope::Region, 10000002, 34, Side::Buy, PriceField::Max)
        .await;
    assert_eq!(value, PriceValue::Pending);

    pipeline.tick().await;
    let value = pipeline
        .read_one(Scope::Region, 10000002, 34, Side::Buy, PriceField::Max)
        .await;
    assert_eq!(value, PriceValue::Number(5.05));
}

#[tokio::test]
async fn shared_store_coalesces_across_pipelines() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(aggregate_body()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::default());
    let a = Kaupang::builder()
        .base_url(mock_server.uri())
        .store(store.clone())
        .build()
        .unwrap();
    let b = Kaupang::builder()
        .base_url(mock_server.uri())
        .store(store)
        .build()
        .unwrap();

    // Both pipelines queue the same item into the shared store.
    a.read(Scope::Region, 10000002, &[34], Side::Buy, PriceField::Max)
        .await;
    b.read(Scope::Region, 10000002, &[34], Side::Buy, PriceField::Max)
        .await;

    // One tick resolves it for everyone; the other finds nothing to do.
    a.tick().await;
    let report = b.tick().await;
    assert_eq!(report.drained_tasks, 0);

    let value = b
        .read_one(Scope::Region, 10000002, 34, Side::Buy, PriceField::Max)
        .await;
    assert_eq!(value, PriceValue::Number(5.05));
}

#[tokio::test]
async fn custom_transport_replaces_default_chain() {
    let mock_server = MockServer::start().await;

    // Only the GET transport is configured, so no POST may arrive.
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(aggregate_body()))
        .expect(0)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(aggregate_body()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let transport: Arc<dyn Transport> =
        Arc::new(QueryTransport::with_base_url(mock_server.uri()).unwrap());
    let pipeline = Kaupang::builder().transport(transport).build().unwrap();

    pipeline
        .read(Scope::Region, 10000002, &[34], Side::Buy, PriceField::Max)
        .await;
    let report = pipeline.tick().await;
    assert_eq!(report.fetched_records, 1);
}

#[test]
fn builder_requires_base_url_or_transport() {
    let result = Kaupang::builder().build();
    assert!(matches!(result, Err(KaupangError::Configuration(_))));
}

#[test]
fn builder_rejects_invalid_config() {
    let result = Kaupang::builder()
        .base_url("https://market.example")
        .ttl(TtlConfig::new().jitter(1.5))
        .build();
    assert!(matches!(result, Err(KaupangError::Configuration(_))));
}
