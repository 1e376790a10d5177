//! Live database tests. Require `DATABASE_URL` pointing at a disposable
//! Postgres and are `#[ignore]`d by default:
//!
//! ```sh
//! cargo test -p nicheprobe-db --test live -- --ignored
//! ```

use chrono::{Duration, Utc};
use rust_decimal_macros::dec;
use uuid::Uuid;

use nicheprobe_core::{Asin, Fulfillment, StockStatus};
use nicheprobe_db::{NewProduct, NewSnapshot};

async fn test_pool() -> sqlx::PgPool {
    let pool = nicheprobe_db::connect_pool_from_env()
        .await
        .expect("DATABASE_URL must point at a test database");
    nicheprobe_db::run_migrations(&pool)
        .await
        .expect("migrations apply");
    pool
}

fn fresh_asin() -> Asin {
    // Unique per test run so tests do not collide on PK history.
    let suffix: String = Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(7)
        .collect::<String>()
        .to_uppercase();
    Asin::new(&format!("T{suffix}00")).expect("generated asin is valid")
}

fn base_snapshot(asin: &Asin) -> NewSnapshot {
    NewSnapshot {
        asin: asin.clone(),
        captured_at: Utc::now() - Duration::hours(24),
        price_current: Some(dec!(20.00)),
        price_original: None,
        price_lowest_new: None,
        price_lowest_used: None,
        currency: "USD".to_string(),
        coupon_discount_percent: None,
        coupon_discount_amount: None,
        deal_type: None,
        rank_primary: Some(10_000),
        rank_category: Some("Electronics".to_string()),
        rank_secondary: None,
        stock_status: StockStatus::InStock,
        stock_quantity: Some(25),
        fulfillment: Fulfillment::Fba,
        seller_count: Some(5),
        rating_avg: Some(dec!(4.2)),
        rating_count: Some(900),
        review_count: Some(800),
        rating_distribution: None,
    }
}

async fn seed_product(pool: &sqlx::PgPool, asin: &Asin) {
    nicheprobe_db::upsert_products(
        pool,
        &[NewProduct {
            asin: asin.clone(),
            title: Some("test mount".to_string()),
            brand: None,
            manufacturer: None,
            category_id: Some(7_072_562_011),
            category_path: vec!["Electronics".to_string()],
            dimensions: None,
        }],
    )
    .await
    .expect("product upsert");
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn second_snapshot_gets_exact_deltas() {
    let pool = test_pool().await;
    let asin = fresh_asin();
    seed_product(&pool, &asin).await;
    let session = Uuid::new_v4();

    let first = base_snapshot(&asin);
    let mut second = base_snapshot(&asin);
    second.captured_at = Utc::now();
    second.price_current = Some(dec!(22.00));
    second.rank_primary = Some(8_000);
    second.review_count = Some(850);

    let report = nicheprobe_db::insert_snapshots(&pool, &[first, second], session)
        .await
        .expect("inserts");
    assert_eq!(report.inserted, 2);

    let latest = nicheprobe_db::latest_snapshot(&pool, asin.as_str())
        .await
        .expect("query")
        .expect("row");
    assert_eq!(latest.price_delta, Some(dec!(2.00)));
    assert!((latest.price_delta_percent.unwrap() - 10.0).abs() < 1e-9);
    assert_eq!(latest.rank_delta, Some(-2_000));
    assert_eq!(latest.review_count_delta, Some(50));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn replayed_batch_adds_no_rows_and_no_events() {
    let pool = test_pool().await;
    let asin = fresh_asin();
    seed_product(&pool, &asin).await;
    let session = Uuid::new_v4();

    let first = base_snapshot(&asin);
    let mut second = base_snapshot(&asin);
    second.captured_at = Utc::now();
    second.price_current = Some(dec!(24.00)); // +20 % => price event
    let batch = vec![first, second];

    let initial = nicheprobe_db::insert_snapshots(&pool, &batch, session)
        .await
        .expect("first pass");
    assert_eq!(initial.inserted, 2);
    assert_eq!(initial.price_events, 1);

    let replay = nicheprobe_db::insert_snapshots(&pool, &batch, Uuid::new_v4())
        .await
        .expect("replay");
    assert_eq!(replay.inserted, 0, "replay must not insert snapshots");
    assert_eq!(replay.skipped, 2);
    assert_eq!(replay.price_events, 0, "replay must not emit events");
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn stock_transition_emits_exactly_one_stockout() {
    let pool = test_pool().await;
    let asin = fresh_asin();
    seed_product(&pool, &asin).await;

    let first = base_snapshot(&asin);
    let mut second = base_snapshot(&asin);
    second.captured_at = Utc::now();
    second.stock_status = StockStatus::OutOfStock;

    let report = nicheprobe_db::insert_snapshots(&pool, &[first, second], Uuid::new_v4())
        .await
        .expect("inserts");
    assert_eq!(report.stock_events, 1);

    let stockouts = nicheprobe_db::count_stockouts_since(&pool, asin.as_str(), 30)
        .await
        .expect("count");
    assert_eq!(stockouts, 1);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn only_one_shortlist_snapshot_is_active() {
    let pool = test_pool().await;

    let run_a = nicheprobe_db::create_pipeline_run(
        &pool,
        &nicheprobe_db::NewPipelineRun {
            id: Uuid::new_v4(),
            config_snapshot: serde_json::json!({}),
        },
    )
    .await
    .expect("run a");
    let run_b = nicheprobe_db::create_pipeline_run(
        &pool,
        &nicheprobe_db::NewPipelineRun {
            id: Uuid::new_v4(),
            config_snapshot: serde_json::json!({}),
        },
    )
    .await
    .expect("run b");

    let make = |run_id| nicheprobe_db::NewShortlistSnapshot {
        run_id,
        asins: vec![],
        scores: vec![],
        total_potential_value: dec!(0),
        added_asins: vec![],
        removed_asins: vec![],
        stability: 1.0,
        frozen: false,
    };

    let a = nicheprobe_db::insert_shortlist_snapshot(&pool, &make(run_a.id))
        .await
        .expect("insert a");
    let b = nicheprobe_db::insert_shortlist_snapshot(&pool, &make(run_b.id))
        .await
        .expect("insert b");

    nicheprobe_db::activate_snapshot(&pool, a.id).await.expect("activate a");
    nicheprobe_db::activate_snapshot(&pool, b.id).await.expect("activate b");

    let active: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM shortlist_snapshots WHERE active")
            .fetch_one(&pool)
            .await
            .expect("count");
    assert_eq!(active, 1, "at most one active snapshot system-wide");

    let current = nicheprobe_db::active_snapshot(&pool)
        .await
        .expect("query")
        .expect("row");
    assert_eq!(current.id, b.id);
}
