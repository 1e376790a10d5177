//! Append-only snapshot history with atomic delta computation.
//!
//! Each snapshot insert runs in its own transaction: read the prior
//! snapshot, compute the three delta pairs, insert the new row, then run
//! the event engine over the (prior, new) pair. A primary-key collision on
//! `(asin, captured_at)` means the snapshot was already stored — the row is
//! skipped and no events fire, which is what makes replays harmless.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use nicheprobe_core::{Asin, Fulfillment, StockStatus};

use crate::events;
use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `snapshots` table (also the shape of `latest_snapshots`).
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SnapshotRow {
    pub asin: String,
    pub captured_at: DateTime<Utc>,
    pub price_current: Option<Decimal>,
    pub price_original: Option<Decimal>,
    pub price_lowest_new: Option<Decimal>,
    pub price_lowest_used: Option<Decimal>,
    pub currency: String,
    pub coupon_discount_percent: Option<Decimal>,
    pub coupon_discount_amount: Option<Decimal>,
    pub deal_type: Option<String>,
    pub rank_primary: Option<i32>,
    pub rank_category: Option<String>,
    pub rank_secondary: Option<i32>,
    pub stock_status: String,
    pub stock_quantity: Option<i32>,
    pub fulfillment: String,
    pub seller_count: Option<i32>,
    pub rating_avg: Option<Decimal>,
    pub rating_count: Option<i32>,
    pub review_count: Option<i32>,
    pub rating_distribution: Option<serde_json::Value>,
    pub price_delta: Option<Decimal>,
    pub price_delta_percent: Option<f64>,
    pub rank_delta: Option<i32>,
    pub rank_delta_percent: Option<f64>,
    pub review_count_delta: Option<i32>,
    pub scrape_session_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// A snapshot observation ready to append. Delta fields are absent on
/// purpose: only the insert path may set them.
#[derive(Debug, Clone)]
pub struct NewSnapshot {
    pub asin: Asin,
    pub captured_at: DateTime<Utc>,
    pub price_current: Option<Decimal>,
    pub price_original: Option<Decimal>,
    pub price_lowest_new: Option<Decimal>,
    pub price_lowest_used: Option<Decimal>,
    pub currency: String,
    pub coupon_discount_percent: Option<Decimal>,
    pub coupon_discount_amount: Option<Decimal>,
    pub deal_type: Option<String>,
    pub rank_primary: Option<i32>,
    pub rank_category: Option<String>,
    pub rank_secondary: Option<i32>,
    pub stock_status: StockStatus,
    pub stock_quantity: Option<i32>,
    pub fulfillment: Fulfillment,
    pub seller_count: Option<i32>,
    pub rating_avg: Option<Decimal>,
    pub rating_count: Option<i32>,
    pub review_count: Option<i32>,
    pub rating_distribution: Option<serde_json::Value>,
}

impl NewSnapshot {
    fn is_deal(&self) -> bool {
        self.deal_type.is_some()
            || self.coupon_discount_percent.is_some()
            || self.coupon_discount_amount.is_some()
    }
}

/// Outcome of an `insert_snapshots` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertReport {
    pub inserted: usize,
    /// Replayed or non-monotone snapshots left untouched.
    pub skipped: usize,
    pub price_events: usize,
    pub rank_events: usize,
    pub stock_events: usize,
}

#[derive(Debug, sqlx::FromRow)]
struct PriorSnapshot {
    captured_at: DateTime<Utc>,
    price_current: Option<Decimal>,
    rank_primary: Option<i32>,
    review_count: Option<i32>,
    stock_status: String,
    stock_quantity: Option<i32>,
    rank_delta: Option<i32>,
}

/// The three delta pairs computed against the immediately prior snapshot.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub(crate) struct Deltas {
    price_delta: Option<Decimal>,
    price_delta_percent: Option<f64>,
    rank_delta: Option<i32>,
    rank_delta_percent: Option<f64>,
    review_count_delta: Option<i32>,
}

pub(crate) fn compute_deltas(
    prior_price: Option<Decimal>,
    prior_rank: Option<i32>,
    prior_review_count: Option<i32>,
    new: &NewSnapshot,
) -> Deltas {
    let price_delta = match (new.price_current, prior_price) {
        (Some(now), Some(before)) => Some(now - before),
        _ => None,
    };
    let price_delta_percent = match (price_delta, prior_price) {
        (Some(delta), Some(before)) if !before.is_zero() => {
            (delta * Decimal::ONE_HUNDRED / before).to_f64()
        }
        _ => None,
    };
    let rank_delta = match (new.rank_primary, prior_rank) {
        (Some(now), Some(before)) => Some(now - before),
        _ => None,
    };
    let rank_delta_percent = match (rank_delta, prior_rank) {
        (Some(delta), Some(before)) if before != 0 => {
            Some(100.0 * f64::from(delta) / f64::from(before))
        }
        _ => None,
    };
    let review_count_delta = match (new.review_count, prior_review_count) {
        (Some(now), Some(before)) => Some(now - before),
        _ => None,
    };
    Deltas {
        price_delta,
        price_delta_percent,
        rank_delta,
        rank_delta_percent,
        review_count_delta,
    }
}

/// Appends snapshot rows, computing deltas and generating events.
///
/// Within a single product, inserts must be strictly monotone by
/// `captured_at`; a snapshot not newer than the stored latest is skipped.
/// Event rows reflect the (prior, just-inserted) pair and dedup on the
/// snapshot-span triple, so re-executing a run adds nothing.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any statement fails; the offending
/// snapshot's transaction is rolled back by drop.
pub async fn insert_snapshots(
    pool: &PgPool,
    snapshots: &[NewSnapshot],
    session_id: Uuid,
) -> Result<InsertReport, DbError> {
    let mut report = InsertReport::default();

    for snapshot in snapshots {
        let mut tx = pool.begin().await?;

        // Lock the product's latest snapshot so concurrent writers for the
        // same product serialize and the monotonicity check holds.
        let prior = sqlx::query_as::<_, PriorSnapshot>(
            "SELECT captured_at, price_current, rank_primary, review_count, \
                    stock_status, stock_quantity, rank_delta \
             FROM snapshots \
             WHERE asin = $1 \
             ORDER BY captured_at DESC \
             LIMIT 1 \
             FOR UPDATE",
        )
        .bind(snapshot.asin.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(ref prior) = prior {
            if prior.captured_at >= snapshot.captured_at {
                tracing::debug!(
                    asin = %snapshot.asin,
                    captured_at = %snapshot.captured_at,
                    "snapshot not newer than stored history — skipping"
                );
                report.skipped += 1;
                tx.commit().await?;
                continue;
            }
        }

        let deltas = compute_deltas(
            prior.as_ref().and_then(|p| p.price_current),
            prior.as_ref().and_then(|p| p.rank_primary),
            prior.as_ref().and_then(|p| p.review_count),
            snapshot,
        );

        let result = sqlx::query(
            "INSERT INTO snapshots \
                 (asin, captured_at, price_current, price_original, price_lowest_new, \
                  price_lowest_used, currency, coupon_discount_percent, \
                  coupon_discount_amount, deal_type, rank_primary, rank_category, \
                  rank_secondary, stock_status, stock_quantity, fulfillment, \
                  seller_count, rating_avg, rating_count, review_count, \
                  rating_distribution, price_delta, price_delta_percent, rank_delta, \
                  rank_delta_percent, review_count_delta, scrape_session_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, \
                     $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27) \
             ON CONFLICT (asin, captured_at) DO NOTHING",
        )
        .bind(snapshot.asin.as_str())
        .bind(snapshot.captured_at)
        .bind(snapshot.price_current)
        .bind(snapshot.price_original)
        .bind(snapshot.price_lowest_new)
        .bind(snapshot.price_lowest_used)
        .bind(&snapshot.currency)
        .bind(snapshot.coupon_discount_percent)
        .bind(snapshot.coupon_discount_amount)
        .bind(&snapshot.deal_type)
        .bind(snapshot.rank_primary)
        .bind(&snapshot.rank_category)
        .bind(snapshot.rank_secondary)
        .bind(snapshot.stock_status.as_str())
        .bind(snapshot.stock_quantity)
        .bind(snapshot.fulfillment.as_str())
        .bind(snapshot.seller_count)
        .bind(snapshot.rating_avg)
        .bind(snapshot.rating_count)
        .bind(snapshot.review_count)
        .bind(&snapshot.rating_distribution)
        .bind(deltas.price_delta)
        .bind(deltas.price_delta_percent)
        .bind(deltas.rank_delta)
        .bind(deltas.rank_delta_percent)
        .bind(deltas.review_count_delta)
        .bind(session_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            report.skipped += 1;
            tx.commit().await?;
            continue;
        }
        report.inserted += 1;

        // Event generation fires only for genuinely new snapshots with a
        // prior to compare against.
        if let Some(prior) = prior {
            let span = (prior.captured_at, snapshot.captured_at);
            let asin = snapshot.asin.as_str();

            if let Some(draft) =
                events::price_event(prior.price_current, snapshot.price_current, snapshot.is_deal())
            {
                if events::insert_price_event(&mut tx, asin, &draft, span).await? {
                    report.price_events += 1;
                }
            }
            if let Some(draft) =
                events::rank_event(prior.rank_primary, snapshot.rank_primary, prior.rank_delta)
            {
                if events::insert_rank_event(&mut tx, asin, &draft, span).await? {
                    report.rank_events += 1;
                }
            }
            let prior_status = prior.stock_status.parse::<StockStatus>().ok();
            if let Some(draft) = events::stock_event(prior_status, snapshot.stock_status) {
                if events::insert_stock_event(
                    &mut tx,
                    asin,
                    &draft,
                    (prior.stock_quantity, snapshot.stock_quantity),
                    span,
                )
                .await?
                {
                    report.stock_events += 1;
                }
            }
        }

        tx.commit().await?;
    }

    Ok(report)
}

/// Returns the most recent snapshot for a product, if any.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn latest_snapshot(pool: &PgPool, asin: &str) -> Result<Option<SnapshotRow>, DbError> {
    let row = sqlx::query_as::<_, SnapshotRow>(
        "SELECT * FROM snapshots WHERE asin = $1 ORDER BY captured_at DESC LIMIT 1",
    )
    .bind(asin)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn snapshot(price: Option<Decimal>, rank: Option<i32>, reviews: Option<i32>) -> NewSnapshot {
        NewSnapshot {
            asin: Asin::new("B09MOUNT01").unwrap(),
            captured_at: Utc::now(),
            price_current: price,
            price_original: None,
            price_lowest_new: None,
            price_lowest_used: None,
            currency: "USD".to_owned(),
            coupon_discount_percent: None,
            coupon_discount_amount: None,
            deal_type: None,
            rank_primary: rank,
            rank_category: None,
            rank_secondary: None,
            stock_status: StockStatus::InStock,
            stock_quantity: None,
            fulfillment: Fulfillment::Fba,
            seller_count: None,
            rating_avg: None,
            rating_count: None,
            review_count: reviews,
            rating_distribution: None,
        }
    }

    #[test]
    fn deltas_are_exact_differences() {
        let new = snapshot(Some(dec!(24.99)), Some(8_000), Some(1_250));
        let deltas = compute_deltas(Some(dec!(19.99)), Some(10_000), Some(1_200), &new);

        assert_eq!(deltas.price_delta, Some(dec!(5.00)));
        let pct = deltas.price_delta_percent.expect("pct");
        assert!((pct - 25.012_506_253_126_563).abs() < 1e-9, "got {pct}");
        assert_eq!(deltas.rank_delta, Some(-2_000));
        assert!((deltas.rank_delta_percent.unwrap() + 20.0).abs() < 1e-9);
        assert_eq!(deltas.review_count_delta, Some(50));
    }

    #[test]
    fn null_prior_fields_propagate_to_null_deltas() {
        let new = snapshot(Some(dec!(24.99)), Some(8_000), Some(1_250));
        let deltas = compute_deltas(None, None, None, &new);
        assert_eq!(deltas, Deltas::default());
    }

    #[test]
    fn null_new_fields_propagate_to_null_deltas() {
        let new = snapshot(None, None, None);
        let deltas = compute_deltas(Some(dec!(19.99)), Some(10_000), Some(1_200), &new);
        assert_eq!(deltas, Deltas::default());
    }

    #[test]
    fn zero_prior_price_leaves_percent_null() {
        let new = snapshot(Some(dec!(24.99)), None, None);
        let deltas = compute_deltas(Some(dec!(0.00)), None, None, &new);
        assert_eq!(deltas.price_delta, Some(dec!(24.99)));
        assert!(deltas.price_delta_percent.is_none());
    }

    #[test]
    fn deal_flag_covers_deal_type_and_coupons() {
        let mut new = snapshot(Some(dec!(9.99)), None, None);
        assert!(!new.is_deal());
        new.deal_type = Some("lightning".to_owned());
        assert!(new.is_deal());
        new.deal_type = None;
        new.coupon_discount_percent = Some(dec!(10));
        assert!(new.is_deal());
    }
}
