//! Materialized aggregate views over the snapshot history.

use sqlx::PgPool;

use crate::DbError;

/// A row from `snapshot_stats_7d` / `snapshot_stats_30d`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SnapshotStatsRow {
    pub asin: String,
    pub samples: i64,
    pub rank_first: Option<i32>,
    pub rank_last: Option<i32>,
    pub rank_avg: Option<f64>,
    pub price_avg: Option<f64>,
    pub price_stddev: Option<f64>,
    pub review_count_first: Option<i32>,
    pub review_count_last: Option<i32>,
    pub seller_count_min: Option<i32>,
    pub seller_count_max: Option<i32>,
}

/// Refreshes all materialized aggregates without blocking readers.
///
/// `CONCURRENTLY` requires each view's unique index on `asin`, which the
/// schema migration provides.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any refresh fails.
pub async fn refresh_aggregates(pool: &PgPool) -> Result<(), DbError> {
    for view in ["latest_snapshots", "snapshot_stats_7d", "snapshot_stats_30d"] {
        sqlx::query(&format!("REFRESH MATERIALIZED VIEW CONCURRENTLY {view}"))
            .execute(pool)
            .await?;
        tracing::debug!(view, "materialized view refreshed");
    }
    Ok(())
}

/// Loads a product's 7-day aggregate, if the view has a row for it.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn stats_7d(pool: &PgPool, asin: &str) -> Result<Option<SnapshotStatsRow>, DbError> {
    let row = sqlx::query_as::<_, SnapshotStatsRow>(
        "SELECT asin, samples, rank_first, rank_last, rank_avg, price_avg, \
                price_stddev, review_count_first, review_count_last, \
                seller_count_min, seller_count_max \
         FROM snapshot_stats_7d WHERE asin = $1",
    )
    .bind(asin)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Loads a product's 30-day aggregate, if the view has a row for it.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn stats_30d(pool: &PgPool, asin: &str) -> Result<Option<SnapshotStatsRow>, DbError> {
    let row = sqlx::query_as::<_, SnapshotStatsRow>(
        "SELECT asin, samples, rank_first, rank_last, rank_avg, price_avg, \
                price_stddev, review_count_first, review_count_last, \
                seller_count_min, seller_count_max \
         FROM snapshot_stats_30d WHERE asin = $1",
    )
    .bind(asin)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}
