//! Database operations for the `pipeline_runs` audit trail.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use nicheprobe_core::RunStatus;

use crate::DbError;

/// A row from the `pipeline_runs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PipelineRunRow {
    pub id: Uuid,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub asins_total: i32,
    pub asins_ok: i32,
    pub asins_failed: i32,
    pub asins_skipped: i32,
    pub phase_timings: serde_json::Value,
    pub tokens_consumed: i64,
    pub dq_price_missing_pct: Option<f64>,
    pub dq_rank_missing_pct: Option<f64>,
    pub dq_review_missing_pct: Option<f64>,
    pub dq_passed: Option<bool>,
    pub error_rate: Option<f64>,
    pub error_budget_breached: bool,
    pub shortlist_frozen: bool,
    pub config_snapshot: serde_json::Value,
    pub error_message: Option<String>,
    pub failed_asins: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields fixed at run creation.
#[derive(Debug, Clone)]
pub struct NewPipelineRun {
    pub id: Uuid,
    pub config_snapshot: serde_json::Value,
}

/// Counter and gate values written at finalization.
#[derive(Debug, Clone)]
pub struct RunTotals {
    pub asins_total: i32,
    pub asins_ok: i32,
    pub asins_failed: i32,
    pub asins_skipped: i32,
    pub phase_timings: serde_json::Value,
    pub tokens_consumed: i64,
    pub dq_price_missing_pct: f64,
    pub dq_rank_missing_pct: f64,
    pub dq_review_missing_pct: f64,
    pub dq_passed: bool,
    pub error_rate: f64,
    pub error_budget_breached: bool,
    pub shortlist_frozen: bool,
    pub failed_asins: Vec<String>,
}

/// Creates a run row in `running` status with its configuration snapshot.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn create_pipeline_run(
    pool: &PgPool,
    run: &NewPipelineRun,
) -> Result<PipelineRunRow, DbError> {
    let row = sqlx::query_as::<_, PipelineRunRow>(
        "INSERT INTO pipeline_runs (id, status, config_snapshot) \
         VALUES ($1, 'running', $2) \
         RETURNING *",
    )
    .bind(run.id)
    .bind(&run.config_snapshot)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// Finalizes a run: writes counters, gate results, and the terminal status.
/// Only a `running` row may be finalized.
///
/// # Errors
///
/// Returns [`DbError::InvalidRunTransition`] when the run is not in
/// `running` status, or [`DbError::Sqlx`] if the update fails.
pub async fn finalize_pipeline_run(
    pool: &PgPool,
    id: Uuid,
    status: RunStatus,
    totals: &RunTotals,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE pipeline_runs SET \
             status = $1, ended_at = NOW(), \
             asins_total = $2, asins_ok = $3, asins_failed = $4, asins_skipped = $5, \
             phase_timings = $6, tokens_consumed = $7, \
             dq_price_missing_pct = $8, dq_rank_missing_pct = $9, \
             dq_review_missing_pct = $10, dq_passed = $11, \
             error_rate = $12, error_budget_breached = $13, shortlist_frozen = $14, \
             failed_asins = $15 \
         WHERE id = $16 AND status = 'running'",
    )
    .bind(status.as_str())
    .bind(totals.asins_total)
    .bind(totals.asins_ok)
    .bind(totals.asins_failed)
    .bind(totals.asins_skipped)
    .bind(&totals.phase_timings)
    .bind(totals.tokens_consumed)
    .bind(totals.dq_price_missing_pct)
    .bind(totals.dq_rank_missing_pct)
    .bind(totals.dq_review_missing_pct)
    .bind(totals.dq_passed)
    .bind(totals.error_rate)
    .bind(totals.error_budget_breached)
    .bind(totals.shortlist_frozen)
    .bind(&totals.failed_asins)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidRunTransition {
            id,
            expected_status: "running",
        });
    }
    Ok(())
}

/// Marks a run `failed` with an error message. Best-effort terminal write.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn mark_run_failed(pool: &PgPool, id: Uuid, error_message: &str) -> Result<(), DbError> {
    sqlx::query(
        "UPDATE pipeline_runs \
         SET status = 'failed', ended_at = NOW(), error_message = $1, \
             shortlist_frozen = TRUE \
         WHERE id = $2 AND status = 'running'",
    )
    .bind(error_message)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Fetches a run by id.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] when no row exists, or [`DbError::Sqlx`]
/// if the query fails.
pub async fn get_pipeline_run(pool: &PgPool, id: Uuid) -> Result<PipelineRunRow, DbError> {
    sqlx::query_as::<_, PipelineRunRow>("SELECT * FROM pipeline_runs WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound)
}

/// Returns the most recently started run, if any.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn latest_pipeline_run(pool: &PgPool) -> Result<Option<PipelineRunRow>, DbError> {
    let row = sqlx::query_as::<_, PipelineRunRow>(
        "SELECT * FROM pipeline_runs ORDER BY started_at DESC LIMIT 1",
    )
    .fetch_optional(pool)
    .await?;
    Ok(row)
}
