//! Database operations for review text and the signals extracted from it.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `reviews` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ReviewRow {
    pub review_id: String,
    pub asin: String,
    pub title: Option<String>,
    pub body: Option<String>,
    pub rating: Decimal,
    pub verified: bool,
    pub review_date: Option<NaiveDate>,
    pub captured_at: DateTime<Utc>,
    pub analyzed_at: Option<DateTime<Utc>>,
}

/// A defect signal to persist for `(asin, run)`.
#[derive(Debug, Clone)]
pub struct NewDefectSignal {
    pub defect_type: String,
    pub frequency: i32,
    pub severity_score: f64,
    pub example_quotes: Vec<String>,
    pub total_reviews_scanned: i32,
    pub negative_reviews_scanned: i32,
}

/// A feature request to persist for `(asin, run)`.
#[derive(Debug, Clone)]
pub struct NewFeatureRequest {
    pub feature: String,
    pub mentions: i32,
    pub confidence: f64,
    pub source_quotes: Vec<String>,
}

/// The aggregated improvement profile to persist for `(asin, run)`.
#[derive(Debug, Clone)]
pub struct NewImprovementProfile {
    pub top_defects: serde_json::Value,
    pub missing_features: serde_json::Value,
    pub dominant_pain: Option<String>,
    pub improvement_score: f64,
    pub reviews_analyzed: i32,
    pub negative_reviews_analyzed: i32,
    pub reviews_ready: bool,
}

/// A row from `review_improvement_profiles`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProfileRow {
    pub id: i64,
    pub asin: String,
    pub run_id: Uuid,
    pub top_defects: serde_json::Value,
    pub missing_features: serde_json::Value,
    pub dominant_pain: Option<String>,
    pub improvement_score: f64,
    pub reviews_analyzed: i32,
    pub negative_reviews_analyzed: i32,
    pub reviews_ready: bool,
    pub computed_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Loads the most recent non-empty reviews for a product, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn load_reviews_for_analysis(
    pool: &PgPool,
    asin: &str,
    limit: i64,
) -> Result<Vec<ReviewRow>, DbError> {
    let rows = sqlx::query_as::<_, ReviewRow>(
        "SELECT review_id, asin, title, body, rating, verified, review_date, \
                captured_at, analyzed_at \
         FROM reviews \
         WHERE asin = $1 AND body IS NOT NULL AND body <> '' \
         ORDER BY review_date DESC NULLS LAST, review_id \
         LIMIT $2",
    )
    .bind(asin)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Stamps `analyzed_at` on the given reviews.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn mark_reviews_analyzed(pool: &PgPool, review_ids: &[String]) -> Result<(), DbError> {
    if review_ids.is_empty() {
        return Ok(());
    }
    sqlx::query("UPDATE reviews SET analyzed_at = NOW() WHERE review_id = ANY($1)")
        .bind(review_ids)
        .execute(pool)
        .await?;
    Ok(())
}

/// Inserts the per-run defect signal rows for a product.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any insert fails.
pub async fn insert_defect_signals(
    pool: &PgPool,
    asin: &str,
    run_id: Uuid,
    signals: &[NewDefectSignal],
) -> Result<(), DbError> {
    for signal in signals {
        sqlx::query(
            "INSERT INTO review_defect_signals \
                 (asin, run_id, defect_type, frequency, severity_score, example_quotes, \
                  total_reviews_scanned, negative_reviews_scanned) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(asin)
        .bind(run_id)
        .bind(&signal.defect_type)
        .bind(signal.frequency)
        .bind(signal.severity_score)
        .bind(&signal.example_quotes)
        .bind(signal.total_reviews_scanned)
        .bind(signal.negative_reviews_scanned)
        .execute(pool)
        .await?;
    }
    Ok(())
}

/// Inserts the per-run feature request rows for a product.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any insert fails.
pub async fn insert_feature_requests(
    pool: &PgPool,
    asin: &str,
    run_id: Uuid,
    requests: &[NewFeatureRequest],
) -> Result<(), DbError> {
    for request in requests {
        sqlx::query(
            "INSERT INTO review_feature_requests \
                 (asin, run_id, feature, mentions, confidence, source_quotes) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(asin)
        .bind(run_id)
        .bind(&request.feature)
        .bind(request.mentions)
        .bind(request.confidence)
        .bind(&request.source_quotes)
        .execute(pool)
        .await?;
    }
    Ok(())
}

/// Upserts the `(asin, run)` improvement profile.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_improvement_profile(
    pool: &PgPool,
    asin: &str,
    run_id: Uuid,
    profile: &NewImprovementProfile,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO review_improvement_profiles \
             (asin, run_id, top_defects, missing_features, dominant_pain, \
              improvement_score, reviews_analyzed, negative_reviews_analyzed, reviews_ready) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
         ON CONFLICT (asin, run_id) DO UPDATE SET \
             top_defects               = EXCLUDED.top_defects, \
             missing_features          = EXCLUDED.missing_features, \
             dominant_pain             = EXCLUDED.dominant_pain, \
             improvement_score         = EXCLUDED.improvement_score, \
             reviews_analyzed          = EXCLUDED.reviews_analyzed, \
             negative_reviews_analyzed = EXCLUDED.negative_reviews_analyzed, \
             reviews_ready             = EXCLUDED.reviews_ready, \
             computed_at               = NOW()",
    )
    .bind(asin)
    .bind(run_id)
    .bind(&profile.top_defects)
    .bind(&profile.missing_features)
    .bind(&profile.dominant_pain)
    .bind(profile.improvement_score)
    .bind(profile.reviews_analyzed)
    .bind(profile.negative_reviews_analyzed)
    .bind(profile.reviews_ready)
    .execute(pool)
    .await?;
    Ok(())
}

/// Returns the most recently computed profile for a product, if any.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn latest_profile(pool: &PgPool, asin: &str) -> Result<Option<ProfileRow>, DbError> {
    let row = sqlx::query_as::<_, ProfileRow>(
        "SELECT id, asin, run_id, top_defects, missing_features, dominant_pain, \
                improvement_score, reviews_analyzed, negative_reviews_analyzed, \
                reviews_ready, computed_at \
         FROM review_improvement_profiles \
         WHERE asin = $1 \
         ORDER BY computed_at DESC \
         LIMIT 1",
    )
    .bind(asin)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}
