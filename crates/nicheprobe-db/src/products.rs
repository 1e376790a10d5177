//! Database operations for the `products` catalog.

use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;

use nicheprobe_core::Asin;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `products` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductRow {
    pub asin: String,
    pub title: Option<String>,
    pub brand: Option<String>,
    pub manufacturer: Option<String>,
    pub category_id: Option<i64>,
    pub category_path: Vec<String>,
    pub dimensions: Option<serde_json::Value>,
    pub is_active: bool,
    pub tracking_priority: i16,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Catalog fields of a freshly fetched product.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub asin: Asin,
    pub title: Option<String>,
    pub brand: Option<String>,
    pub manufacturer: Option<String>,
    pub category_id: Option<i64>,
    pub category_path: Vec<String>,
    pub dimensions: Option<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Idempotent catalog upsert. A conflict on `asin` refreshes the mutable
/// fields and bumps `last_seen_at`/`updated_at`; `first_seen_at` is kept.
///
/// Returns the number of rows written.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any upsert fails.
pub async fn upsert_products(pool: &PgPool, products: &[NewProduct]) -> Result<usize, DbError> {
    let mut written = 0usize;
    for product in products {
        sqlx::query(
            "INSERT INTO products \
                 (asin, title, brand, manufacturer, category_id, category_path, dimensions) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (asin) DO UPDATE SET \
                 title         = EXCLUDED.title, \
                 brand         = EXCLUDED.brand, \
                 manufacturer  = EXCLUDED.manufacturer, \
                 category_id   = EXCLUDED.category_id, \
                 category_path = EXCLUDED.category_path, \
                 dimensions    = EXCLUDED.dimensions, \
                 last_seen_at  = NOW(), \
                 updated_at    = NOW(), \
                 deleted_at    = NULL",
        )
        .bind(product.asin.as_str())
        .bind(&product.title)
        .bind(&product.brand)
        .bind(&product.manufacturer)
        .bind(product.category_id)
        .bind(&product.category_path)
        .bind(&product.dimensions)
        .execute(pool)
        .await?;
        written += 1;
    }
    Ok(written)
}

/// Returns active, non-deleted ASINs ordered by tracking priority then
/// staleness, capped at `limit`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails, or [`DbError::Domain`] if a
/// stored identifier does not parse.
pub async fn list_tracked_asins(pool: &PgPool, limit: i64) -> Result<Vec<Asin>, DbError> {
    let raw: Vec<String> = sqlx::query_scalar(
        "SELECT asin FROM products \
         WHERE is_active AND deleted_at IS NULL \
         ORDER BY tracking_priority DESC, updated_at ASC \
         LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    raw.iter()
        .map(|s| Asin::new(s).map_err(DbError::from))
        .collect()
}

/// Filters `candidates` down to those whose catalog row is older than the
/// freshness threshold (or missing entirely — never-seen products always
/// need a fetch).
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_stale_asins(
    pool: &PgPool,
    candidates: &[Asin],
    freshness_threshold_hours: i64,
) -> Result<Vec<Asin>, DbError> {
    if candidates.is_empty() {
        return Ok(Vec::new());
    }
    let raw: Vec<String> = candidates.iter().map(|a| a.as_str().to_owned()).collect();
    let cutoff = Utc::now() - Duration::hours(freshness_threshold_hours);

    let fresh: Vec<String> = sqlx::query_scalar(
        "SELECT asin FROM products WHERE asin = ANY($1) AND updated_at >= $2",
    )
    .bind(&raw)
    .bind(cutoff)
    .fetch_all(pool)
    .await?;

    Ok(candidates
        .iter()
        .filter(|a| !fresh.iter().any(|f| f == a.as_str()))
        .cloned()
        .collect())
}

/// Counts active, non-deleted catalog rows.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_tracked_products(pool: &PgPool) -> Result<i64, DbError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM products WHERE is_active AND deleted_at IS NULL",
    )
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// Soft-deletes a product. The row and its history are kept; it just stops
/// being tracked.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] when no live row matches, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn soft_delete_product(pool: &PgPool, asin: &Asin) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE products SET deleted_at = NOW(), is_active = FALSE \
         WHERE asin = $1 AND deleted_at IS NULL",
    )
    .bind(asin.as_str())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}
