//! Database operations for `shortlist_snapshots` and the single-active
//! invariant.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// A row from the `shortlist_snapshots` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ShortlistSnapshotRow {
    pub id: i64,
    pub run_id: Uuid,
    pub asins: Vec<String>,
    pub scores: Vec<i32>,
    pub total_potential_value: Decimal,
    pub added_asins: Vec<String>,
    pub removed_asins: Vec<String>,
    pub stability: f64,
    pub frozen: bool,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// A snapshot ready for insertion; activation is a separate step.
#[derive(Debug, Clone)]
pub struct NewShortlistSnapshot {
    pub run_id: Uuid,
    pub asins: Vec<String>,
    pub scores: Vec<i32>,
    pub total_potential_value: Decimal,
    pub added_asins: Vec<String>,
    pub removed_asins: Vec<String>,
    pub stability: f64,
    pub frozen: bool,
}

/// Records a shortlist snapshot as inactive. Frozen snapshots stay that way
/// forever; healthy ones are switched live via [`activate_snapshot`].
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_shortlist_snapshot(
    pool: &PgPool,
    snapshot: &NewShortlistSnapshot,
) -> Result<ShortlistSnapshotRow, DbError> {
    let row = sqlx::query_as::<_, ShortlistSnapshotRow>(
        "INSERT INTO shortlist_snapshots \
             (run_id, asins, scores, total_potential_value, added_asins, \
              removed_asins, stability, frozen, active) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, FALSE) \
         RETURNING *",
    )
    .bind(snapshot.run_id)
    .bind(&snapshot.asins)
    .bind(&snapshot.scores)
    .bind(snapshot.total_potential_value)
    .bind(&snapshot.added_asins)
    .bind(&snapshot.removed_asins)
    .bind(snapshot.stability)
    .bind(snapshot.frozen)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// Switches the active snapshot in one transaction: the previous active row
/// is retired and the given row takes over. The partial unique index on
/// `(active) WHERE active` guarantees at most one winner even under
/// concurrent activations.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] when the target row does not exist or is
/// frozen, or [`DbError::Sqlx`] if the switch fails.
pub async fn activate_snapshot(pool: &PgPool, snapshot_id: i64) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;

    sqlx::query("UPDATE shortlist_snapshots SET active = FALSE WHERE active")
        .execute(&mut *tx)
        .await?;

    let result = sqlx::query(
        "UPDATE shortlist_snapshots SET active = TRUE WHERE id = $1 AND NOT frozen",
    )
    .bind(snapshot_id)
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    tx.commit().await?;
    Ok(())
}

/// Returns the currently active snapshot, if one exists.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn active_snapshot(pool: &PgPool) -> Result<Option<ShortlistSnapshotRow>, DbError> {
    let row = sqlx::query_as::<_, ShortlistSnapshotRow>(
        "SELECT * FROM shortlist_snapshots WHERE active LIMIT 1",
    )
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// The snapshot the read API should serve: the active one, or failing that
/// the newest snapshot belonging to a `completed` run. A degraded or failed
/// run's proposal is never served.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn latest_served_snapshot(
    pool: &PgPool,
) -> Result<Option<ShortlistSnapshotRow>, DbError> {
    if let Some(row) = active_snapshot(pool).await? {
        return Ok(Some(row));
    }
    let row = sqlx::query_as::<_, ShortlistSnapshotRow>(
        "SELECT s.* FROM shortlist_snapshots s \
         JOIN pipeline_runs r ON r.id = s.run_id \
         WHERE r.status = 'completed' AND NOT s.frozen \
         ORDER BY s.created_at DESC \
         LIMIT 1",
    )
    .fetch_optional(pool)
    .await?;
    Ok(row)
}
