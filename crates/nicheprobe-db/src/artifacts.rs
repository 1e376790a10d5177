//! Database operations for immutable `opportunity_artifacts`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// A row from the `opportunity_artifacts` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ArtifactRow {
    pub id: i64,
    pub run_id: Uuid,
    pub asin: String,
    pub rank_in_run: i32,
    pub final_score: i32,
    pub base_score: f64,
    pub time_multiplier: f64,
    pub component_scores: serde_json::Value,
    pub time_pressure_factors: serde_json::Value,
    pub signals_for: Vec<String>,
    pub signals_against: Vec<String>,
    pub thesis: String,
    pub action_recommendation: String,
    pub monthly_profit: Decimal,
    pub annual_value: Decimal,
    pub risk_adjusted_value: Decimal,
    pub rank_score: f64,
    pub window_days: i32,
    pub urgency_level: String,
    pub rejected: bool,
    pub rejection_reason: Option<String>,
    pub input_hash: String,
    pub price_at_scoring: Option<Decimal>,
    pub review_count_at_scoring: Option<i32>,
    pub rating_at_scoring: Option<Decimal>,
    pub rank_at_scoring: Option<i32>,
    pub scored_at: DateTime<Utc>,
}

/// An artifact ready for insertion. Field-for-field what the scorer emits.
#[derive(Debug, Clone)]
pub struct NewArtifact {
    pub run_id: Uuid,
    pub asin: String,
    pub rank_in_run: i32,
    pub final_score: i32,
    pub base_score: f64,
    pub time_multiplier: f64,
    pub component_scores: serde_json::Value,
    pub time_pressure_factors: serde_json::Value,
    pub signals_for: Vec<String>,
    pub signals_against: Vec<String>,
    pub thesis: String,
    pub action_recommendation: String,
    pub monthly_profit: Decimal,
    pub annual_value: Decimal,
    pub risk_adjusted_value: Decimal,
    pub rank_score: f64,
    pub window_days: i32,
    pub urgency_level: String,
    pub rejected: bool,
    pub rejection_reason: Option<String>,
    pub input_hash: String,
    pub price_at_scoring: Option<Decimal>,
    pub review_count_at_scoring: Option<i32>,
    pub rating_at_scoring: Option<Decimal>,
    pub rank_at_scoring: Option<i32>,
}

/// Inserts one artifact. Artifacts are immutable: a conflict on
/// `(run_id, asin)` means the run was replayed and the existing row wins.
///
/// Returns `true` when a new row was written.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_artifact(pool: &PgPool, artifact: &NewArtifact) -> Result<bool, DbError> {
    let result = sqlx::query(
        "INSERT INTO opportunity_artifacts \
             (run_id, asin, rank_in_run, final_score, base_score, time_multiplier, \
              component_scores, time_pressure_factors, signals_for, signals_against, \
              thesis, action_recommendation, monthly_profit, annual_value, \
              risk_adjusted_value, rank_score, window_days, urgency_level, \
              rejected, rejection_reason, input_hash, price_at_scoring, \
              review_count_at_scoring, rating_at_scoring, rank_at_scoring) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, \
                 $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25) \
         ON CONFLICT (run_id, asin) DO NOTHING",
    )
    .bind(artifact.run_id)
    .bind(&artifact.asin)
    .bind(artifact.rank_in_run)
    .bind(artifact.final_score)
    .bind(artifact.base_score)
    .bind(artifact.time_multiplier)
    .bind(&artifact.component_scores)
    .bind(&artifact.time_pressure_factors)
    .bind(&artifact.signals_for)
    .bind(&artifact.signals_against)
    .bind(&artifact.thesis)
    .bind(&artifact.action_recommendation)
    .bind(artifact.monthly_profit)
    .bind(artifact.annual_value)
    .bind(artifact.risk_adjusted_value)
    .bind(artifact.rank_score)
    .bind(artifact.window_days)
    .bind(&artifact.urgency_level)
    .bind(artifact.rejected)
    .bind(&artifact.rejection_reason)
    .bind(&artifact.input_hash)
    .bind(artifact.price_at_scoring)
    .bind(artifact.review_count_at_scoring)
    .bind(artifact.rating_at_scoring)
    .bind(artifact.rank_at_scoring)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Lists a run's artifacts in rank order.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_artifacts_for_run(
    pool: &PgPool,
    run_id: Uuid,
    include_rejected: bool,
) -> Result<Vec<ArtifactRow>, DbError> {
    let rows = sqlx::query_as::<_, ArtifactRow>(
        "SELECT * FROM opportunity_artifacts \
         WHERE run_id = $1 AND (NOT rejected OR $2) \
         ORDER BY rank_in_run",
    )
    .bind(run_id)
    .bind(include_rejected)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
