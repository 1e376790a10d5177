//! Offline unit tests for nicheprobe-db pool configuration and row types.
//! These tests do not require a live database connection.

use chrono::Utc;
use nicheprobe_db::{ArtifactRow, PipelineRunRow, PoolConfig, ShortlistSnapshotRow};
use rust_decimal_macros::dec;
use uuid::Uuid;

#[test]
fn pool_config_defaults_are_stable() {
    let config = PoolConfig::default();
    assert_eq!(config.max_connections, 10);
    assert_eq!(config.min_connections, 1);
    assert_eq!(config.acquire_timeout_secs, 10);
}

/// Compile-time smoke test: confirm [`PipelineRunRow`] has all expected
/// fields with the correct types. No database required.
#[test]
fn pipeline_run_row_has_expected_fields() {
    let row = PipelineRunRow {
        id: Uuid::new_v4(),
        status: "running".to_string(),
        started_at: Utc::now(),
        ended_at: None,
        asins_total: 100,
        asins_ok: 88,
        asins_failed: 12,
        asins_skipped: 0,
        phase_timings: serde_json::json!({"fetch_ms": 4200}),
        tokens_consumed: 205,
        dq_price_missing_pct: Some(0.0),
        dq_rank_missing_pct: Some(40.0),
        dq_review_missing_pct: Some(0.0),
        dq_passed: Some(false),
        error_rate: Some(0.12),
        error_budget_breached: true,
        shortlist_frozen: true,
        config_snapshot: serde_json::json!({}),
        error_message: None,
        failed_asins: vec!["B09MOUNT99".to_string()],
        created_at: Utc::now(),
    };

    assert_eq!(row.asins_total, 100);
    assert!(row.error_budget_breached);
    assert!(row.shortlist_frozen);
    assert_eq!(row.failed_asins.len(), 1);
}

#[test]
fn artifact_row_has_expected_fields() {
    let row = ArtifactRow {
        id: 1,
        run_id: Uuid::new_v4(),
        asin: "B09MOUNT01".to_string(),
        rank_in_run: 1,
        final_score: 82,
        base_score: 0.73,
        time_multiplier: 1.12,
        component_scores: serde_json::json!({}),
        time_pressure_factors: serde_json::json!({}),
        signals_for: vec!["frequent stockouts".to_string()],
        signals_against: vec![],
        thesis: "High-potential product".to_string(),
        action_recommendation: "Source suppliers this week".to_string(),
        monthly_profit: dec!(1240.00),
        annual_value: dec!(14880.00),
        risk_adjusted_value: dec!(10416.00),
        rank_score: 12_499.2,
        window_days: 30,
        urgency_level: "urgent".to_string(),
        rejected: false,
        rejection_reason: None,
        input_hash: "a1b2c3".to_string(),
        price_at_scoring: Some(dec!(29.99)),
        review_count_at_scoring: Some(1_200),
        rating_at_scoring: Some(dec!(4.3)),
        rank_at_scoring: Some(8_500),
        scored_at: Utc::now(),
    };

    assert_eq!(row.final_score, 82);
    assert!(row.base_score >= 0.0 && row.base_score <= 1.0);
    assert!(row.time_multiplier >= 0.5 && row.time_multiplier <= 2.0);
    assert!(!row.rejected);
}

#[test]
fn shortlist_row_keeps_parallel_arrays() {
    let row = ShortlistSnapshotRow {
        id: 7,
        run_id: Uuid::new_v4(),
        asins: vec!["B09MOUNT01".to_string(), "B09MOUNT02".to_string()],
        scores: vec![82, 75],
        total_potential_value: dec!(28000.00),
        added_asins: vec!["B09MOUNT02".to_string()],
        removed_asins: vec![],
        stability: 0.5,
        frozen: false,
        active: true,
        created_at: Utc::now(),
    };

    assert_eq!(row.asins.len(), row.scores.len());
    assert!(row.stability >= 0.0 && row.stability <= 1.0);
}
