use std::time::Duration;

use nicheprobe_core::AppConfig;
use sqlx::{postgres::PgPoolOptions, PgPool};
use thiserror::Error;

// Path relative to crates/nicheprobe-db/Cargo.toml; resolves to
// <workspace-root>/migrations/
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            acquire_timeout_secs: 10,
        }
    }
}

impl PoolConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            max_connections: config.db_max_connections,
            min_connections: config.db_min_connections,
            acquire_timeout_secs: config.db_acquire_timeout_secs,
        }
    }
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error("record not found")]
    NotFound,
    #[error("invalid pipeline run state transition for {id}: expected status '{expected_status}'")]
    InvalidRunTransition {
        id: uuid::Uuid,
        expected_status: &'static str,
    },
    #[error("stored value does not parse as a domain type: {0}")]
    Domain(#[from] nicheprobe_core::ParseDomainError),
    #[error(transparent)]
    Config(#[from] nicheprobe_core::ConfigError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Connect to a Postgres pool using explicit URL and config.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the connection cannot be established.
pub async fn connect_pool(database_url: &str, config: PoolConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect(database_url)
        .await
}

/// Connect to a Postgres pool, reading `DATABASE_URL` and pool settings from
/// the environment.
///
/// # Errors
///
/// Returns [`DbError::Config`] if configuration is missing/invalid, or
/// [`DbError::Sqlx`] if the connection cannot be established.
pub async fn connect_pool_from_env() -> Result<PgPool, DbError> {
    let app_config = nicheprobe_core::load_app_config_from_env()?;
    let pool_config = PoolConfig::from_app_config(&app_config);
    connect_pool(&app_config.database_url, pool_config)
        .await
        .map_err(DbError::from)
}

/// Run all pending migrations against the pool.
///
/// # Errors
///
/// Returns [`sqlx::migrate::MigrateError`] if any migration fails.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    MIGRATOR.run(pool).await
}

/// Send a `SELECT 1` to verify the pool has a live connection.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the query fails.
pub async fn ping(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(pool)
        .await?;
    Ok(())
}

/// Run a full health check: ping the pool and return a typed error on failure.
///
/// # Errors
///
/// Returns [`DbError`] if the ping fails.
pub async fn health_check(pool: &PgPool) -> Result<(), DbError> {
    ping(pool).await?;
    Ok(())
}


pub mod aggregates;
pub mod artifacts;
pub mod events;
pub mod products;
pub mod reviews;
pub mod runs;
pub mod shortlist;
pub mod snapshots;

pub use aggregates::{refresh_aggregates, stats_30d, stats_7d, SnapshotStatsRow};
pub use artifacts::{insert_artifact, list_artifacts_for_run, ArtifactRow, NewArtifact};
pub use events::{
    count_stockouts_since, price_event, prune_events, rank_event, stock_event, PriceEventDraft,
    PriceEventRow, RankEventDraft, RankEventRow, StockEventDraft, StockEventRow,
};
pub use products::{
    count_tracked_products, list_stale_asins, list_tracked_asins, soft_delete_product,
    upsert_products, NewProduct, ProductRow,
};
pub use reviews::{
    insert_defect_signals, insert_feature_requests, latest_profile, load_reviews_for_analysis,
    mark_reviews_analyzed, upsert_improvement_profile, NewDefectSignal, NewFeatureRequest,
    NewImprovementProfile, ProfileRow, ReviewRow,
};
pub use runs::{
    create_pipeline_run, finalize_pipeline_run, get_pipeline_run, latest_pipeline_run,
    mark_run_failed, NewPipelineRun, PipelineRunRow, RunTotals,
};
pub use shortlist::{
    activate_snapshot, active_snapshot, insert_shortlist_snapshot, latest_served_snapshot,
    NewShortlistSnapshot, ShortlistSnapshotRow,
};
pub use snapshots::{insert_snapshots, latest_snapshot, InsertReport, NewSnapshot, SnapshotRow};
