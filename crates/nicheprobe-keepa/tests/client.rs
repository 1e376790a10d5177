//! Integration tests for `KeepaClient` using wiremock HTTP mocks.

use nicheprobe_core::Asin;
use nicheprobe_keepa::{ClientOptions, KeepaClient, KeepaError};
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_client(base_url: &str) -> KeepaClient {
    KeepaClient::with_base_url("test-key", ClientOptions::default(), base_url)
        .expect("client construction should not fail")
}

fn asin(raw: &str) -> Asin {
    Asin::new(raw).expect("valid asin")
}

#[tokio::test]
async fn health_check_reports_remote_budget() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/token"))
        .and(query_param("key", "test-key"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "tokensLeft": 180, "refillRate": 21 })),
        )
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let health = client.health_check().await.expect("health check");
    assert_eq!(health.tokens_left, 180);
    assert!((health.refill_per_minute - 21.0).abs() < f64::EPSILON);
    assert!(health.last_error.is_none());
}

#[tokio::test]
async fn discover_category_returns_asins_and_skips_invalid_ids() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/bestsellers"))
        .and(query_param("category", "7072562011"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "tokensLeft": 199,
            "refillRate": 21,
            "bestSellersList": { "asinList": ["B09MOUNT01", "not-an-id", "B09MOUNT02"] }
        })))
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let asins = client
        .discover_category(7_072_562_011)
        .await
        .expect("discovery");
    assert_eq!(asins, vec![asin("B09MOUNT01"), asin("B09MOUNT02")]);
}

#[tokio::test]
async fn fetch_products_isolates_malformed_records() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/product"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "tokensLeft": 150,
            "refillRate": 21,
            "products": [
                {
                    "asin": "B09MOUNT01",
                    "title": "Vent mount",
                    "stats": {
                        "current": { "price": 1_999, "salesRank": 12_000, "reviewCount": 800 },
                        "stockStatus": "in_stock",
                        "fulfillment": "fba"
                    }
                },
                { "asin": "BADID" }
            ]
        })))
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let requested = vec![asin("B09MOUNT01"), asin("B09MOUNT02"), asin("B09MOUNT03")];
    let batch = client
        .fetch_products(&requested, false)
        .await
        .expect("batch fetch");

    assert_eq!(batch.records.len(), 1);
    assert_eq!(batch.records[0].asin.as_str(), "B09MOUNT01");

    // One malformed record plus two requested-but-missing products.
    assert_eq!(batch.failures.len(), 3);
    assert!(batch.failures.iter().any(|f| f.asin == "BADID"));
    assert!(batch
        .failures
        .iter()
        .any(|f| f.asin == "B09MOUNT02" && f.reason.contains("not returned")));
    assert!(batch.failures.iter().any(|f| f.asin == "B09MOUNT03"));
}

#[tokio::test]
async fn fetch_products_rejects_oversized_batches() {
    let server = MockServer::start().await;
    let client = test_client(&server.uri());
    let batch: Vec<Asin> = (0..101)
        .map(|i| asin(&format!("B{i:09}")))
        .collect();
    let err = client.fetch_products(&batch, false).await.unwrap_err();
    assert!(matches!(err, KeepaError::BatchTooLarge(101)));
}

#[tokio::test]
async fn api_error_is_surfaced_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/bestsellers"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "error": { "message": "invalid category" } })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let err = client.discover_category(42).await.unwrap_err();
    assert!(matches!(err, KeepaError::Api(ref m) if m == "invalid category"));

    // The failure must be visible on the next health check.
    Mock::given(method("GET"))
        .and(path("/token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "tokensLeft": 10, "refillRate": 21 })),
        )
        .mount(&server)
        .await;
    let health = client.health_check().await.expect("health check");
    assert!(health.last_error.is_some());
}

#[tokio::test]
async fn rate_limit_waits_and_retries_from_refill_rate() {
    let server = MockServer::start().await;

    // First round: 429 with an aggressive refill rate so the test wait is
    // the 1 s floor. Second round succeeds.
    Mock::given(method("GET"))
        .and(path("/product"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "tokensLeft": 0,
            "refillRate": 6_000
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/product"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "tokensLeft": 90,
            "refillRate": 21,
            "products": [{ "asin": "B09MOUNT01" }]
        })))
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let batch = client
        .fetch_products(&[asin("B09MOUNT01")], false)
        .await
        .expect("fetch after rate-limit wait");
    assert_eq!(batch.records.len(), 1);
    assert!(batch.failures.is_empty());
}
