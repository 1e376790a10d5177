//! Snapshot-to-snapshot event generation.
//!
//! The decision functions are pure so the detection rules can be tested
//! without a database. They run inside the snapshot-insert transaction;
//! every insert carries the `(asin, snapshot_before_at, snapshot_after_at)`
//! triple and silently discards conflicts on it, so a replayed run leaves
//! the event tables untouched.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};

use nicheprobe_core::{EventSeverity, MovementDirection, StockEventKind, StockStatus};

use crate::DbError;

// ---------------------------------------------------------------------------
// Pure decision functions
// ---------------------------------------------------------------------------

/// A price event ready for insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceEventDraft {
    pub price_before: Decimal,
    pub price_after: Decimal,
    pub price_change: Decimal,
    pub price_change_percent: f64,
    pub direction: MovementDirection,
    pub severity: EventSeverity,
    pub is_deal: bool,
}

/// Evaluates the price rule: an event fires iff the absolute percent change
/// reaches 5 %. A null price on either side, or a zero prior price (percent
/// undefined), suppresses the event.
#[must_use]
pub fn price_event(
    before: Option<Decimal>,
    after: Option<Decimal>,
    is_deal: bool,
) -> Option<PriceEventDraft> {
    let before = before?;
    let after = after?;
    if before.is_zero() {
        return None;
    }
    let change = after - before;
    let percent = (change / before * Decimal::ONE_HUNDRED).to_f64()?;
    if percent.abs() < 5.0 {
        return None;
    }
    let severity = if percent.abs() >= 25.0 {
        EventSeverity::Critical
    } else if percent.abs() >= 15.0 {
        EventSeverity::High
    } else if percent.abs() >= 10.0 {
        EventSeverity::Medium
    } else {
        EventSeverity::Low
    };
    let direction = if change > Decimal::ZERO {
        MovementDirection::Up
    } else {
        MovementDirection::Down
    };
    Some(PriceEventDraft {
        price_before: before,
        price_after: after,
        price_change: change,
        price_change_percent: percent,
        direction,
        severity,
        is_deal,
    })
}

/// A rank event ready for insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct RankEventDraft {
    pub rank_before: i32,
    pub rank_after: i32,
    pub rank_change: i32,
    pub rank_change_percent: f64,
    pub direction: MovementDirection,
    pub severity: EventSeverity,
    pub is_sustained: bool,
}

/// Evaluates the rank rule: an event fires iff the absolute percent change
/// reaches 20 % or the absolute position change reaches 10 000.
///
/// A falling rank number means the product is selling better, reported as
/// direction `up`. Improving moves grade medium/high/critical by magnitude;
/// worsening moves are always `low`. `prior_rank_delta` is the previous
/// snapshot's own stored delta: when it pointed the same way, the movement
/// is flagged as sustained.
#[must_use]
pub fn rank_event(
    before: Option<i32>,
    after: Option<i32>,
    prior_rank_delta: Option<i32>,
) -> Option<RankEventDraft> {
    let before = before?;
    let after = after?;
    if before <= 0 {
        return None;
    }
    let change = after - before;
    let percent = 100.0 * f64::from(change) / f64::from(before);
    if percent.abs() < 20.0 && change.abs() < 10_000 {
        return None;
    }
    let improving = change < 0;
    let severity = if improving {
        if percent.abs() >= 50.0 || change.abs() >= 50_000 {
            EventSeverity::Critical
        } else if percent.abs() >= 30.0 {
            EventSeverity::High
        } else {
            EventSeverity::Medium
        }
    } else {
        EventSeverity::Low
    };
    let direction = if improving {
        MovementDirection::Up
    } else {
        MovementDirection::Down
    };
    let is_sustained = prior_rank_delta.is_some_and(|p| p != 0 && (p < 0) == improving);
    Some(RankEventDraft {
        rank_before: before,
        rank_after: after,
        rank_change: change,
        rank_change_percent: percent,
        direction,
        severity,
        is_sustained,
    })
}

/// A stock event ready for insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct StockEventDraft {
    pub status_before: StockStatus,
    pub status_after: StockStatus,
    pub kind: StockEventKind,
    pub severity: EventSeverity,
}

/// Evaluates the stock rule: an event fires iff the status changed.
/// `unknown` on either side counts as a missing status and suppresses the
/// event.
#[must_use]
pub fn stock_event(before: Option<StockStatus>, after: StockStatus) -> Option<StockEventDraft> {
    let before = before?;
    if before == StockStatus::Unknown || after == StockStatus::Unknown || before == after {
        return None;
    }
    let (kind, severity) = match (before, after) {
        (StockStatus::InStock | StockStatus::LowStock, StockStatus::OutOfStock) => {
            (StockEventKind::Stockout, EventSeverity::High)
        }
        (StockStatus::OutOfStock, StockStatus::InStock | StockStatus::LowStock) => {
            (StockEventKind::Restock, EventSeverity::Medium)
        }
        (_, StockStatus::LowStock) => (StockEventKind::LowStockAlert, EventSeverity::Low),
        _ => (StockEventKind::StatusChange, EventSeverity::Low),
    };
    Some(StockEventDraft {
        status_before: before,
        status_after: after,
        kind,
        severity,
    })
}

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `price_events` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PriceEventRow {
    pub id: i64,
    pub asin: String,
    pub detected_at: DateTime<Utc>,
    pub price_before: Decimal,
    pub price_after: Decimal,
    pub price_change: Decimal,
    pub price_change_percent: f64,
    pub direction: String,
    pub severity: String,
    pub is_deal: bool,
    pub snapshot_before_at: DateTime<Utc>,
    pub snapshot_after_at: DateTime<Utc>,
}

/// A row from the `rank_events` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RankEventRow {
    pub id: i64,
    pub asin: String,
    pub detected_at: DateTime<Utc>,
    pub rank_before: i32,
    pub rank_after: i32,
    pub rank_change: i32,
    pub rank_change_percent: f64,
    pub direction: String,
    pub severity: String,
    pub is_sustained: bool,
    pub snapshot_before_at: DateTime<Utc>,
    pub snapshot_after_at: DateTime<Utc>,
}

/// A row from the `stock_events` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StockEventRow {
    pub id: i64,
    pub asin: String,
    pub detected_at: DateTime<Utc>,
    pub status_before: String,
    pub status_after: String,
    pub quantity_before: Option<i32>,
    pub quantity_after: Option<i32>,
    pub kind: String,
    pub severity: String,
    pub stockout_started_at: Option<DateTime<Utc>>,
    pub stockout_duration_hours: Option<i32>,
    pub snapshot_before_at: DateTime<Utc>,
    pub snapshot_after_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Transactional inserts (called from the snapshot-insert path)
// ---------------------------------------------------------------------------

pub(crate) async fn insert_price_event(
    tx: &mut Transaction<'_, Postgres>,
    asin: &str,
    draft: &PriceEventDraft,
    span: (DateTime<Utc>, DateTime<Utc>),
) -> Result<bool, DbError> {
    let result = sqlx::query(
        "INSERT INTO price_events \
             (asin, price_before, price_after, price_change, price_change_percent, \
              direction, severity, is_deal, snapshot_before_at, snapshot_after_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
         ON CONFLICT (asin, snapshot_before_at, snapshot_after_at) DO NOTHING",
    )
    .bind(asin)
    .bind(draft.price_before)
    .bind(draft.price_after)
    .bind(draft.price_change)
    .bind(draft.price_change_percent)
    .bind(draft.direction.as_str())
    .bind(draft.severity.as_str())
    .bind(draft.is_deal)
    .bind(span.0)
    .bind(span.1)
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn insert_rank_event(
    tx: &mut Transaction<'_, Postgres>,
    asin: &str,
    draft: &RankEventDraft,
    span: (DateTime<Utc>, DateTime<Utc>),
) -> Result<bool, DbError> {
    let result = sqlx::query(
        "INSERT INTO rank_events \
             (asin, rank_before, rank_after, rank_change, rank_change_percent, \
              direction, severity, is_sustained, snapshot_before_at, snapshot_after_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
         ON CONFLICT (asin, snapshot_before_at, snapshot_after_at) DO NOTHING",
    )
    .bind(asin)
    .bind(draft.rank_before)
    .bind(draft.rank_after)
    .bind(draft.rank_change)
    .bind(draft.rank_change_percent)
    .bind(draft.direction.as_str())
    .bind(draft.severity.as_str())
    .bind(draft.is_sustained)
    .bind(span.0)
    .bind(span.1)
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn insert_stock_event(
    tx: &mut Transaction<'_, Postgres>,
    asin: &str,
    draft: &StockEventDraft,
    quantities: (Option<i32>, Option<i32>),
    span: (DateTime<Utc>, DateTime<Utc>),
) -> Result<bool, DbError> {
    // For a restock, recover the stockout start so the outage duration lands
    // on the event row.
    let (stockout_started_at, stockout_duration_hours) =
        if draft.kind == StockEventKind::Restock {
            let started: Option<DateTime<Utc>> = sqlx::query_scalar(
                "SELECT detected_at FROM stock_events \
                 WHERE asin = $1 AND kind = 'stockout' \
                 ORDER BY detected_at DESC LIMIT 1",
            )
            .bind(asin)
            .fetch_optional(&mut **tx)
            .await?;
            let hours = started.map(|s| {
                let delta = span.1 - s;
                i32::try_from(delta.num_hours().max(0)).unwrap_or(i32::MAX)
            });
            (started, hours)
        } else {
            (None, None)
        };

    let result = sqlx::query(
        "INSERT INTO stock_events \
             (asin, status_before, status_after, quantity_before, quantity_after, \
              kind, severity, stockout_started_at, stockout_duration_hours, \
              snapshot_before_at, snapshot_after_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
         ON CONFLICT (asin, snapshot_before_at, snapshot_after_at) DO NOTHING",
    )
    .bind(asin)
    .bind(draft.status_before.as_str())
    .bind(draft.status_after.as_str())
    .bind(quantities.0)
    .bind(quantities.1)
    .bind(draft.kind.as_str())
    .bind(draft.severity.as_str())
    .bind(stockout_started_at)
    .bind(stockout_duration_hours)
    .bind(span.0)
    .bind(span.1)
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected() > 0)
}

// ---------------------------------------------------------------------------
// Queries and retention
// ---------------------------------------------------------------------------

/// Counts stockout events for a product since `days` ago.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_stockouts_since(pool: &PgPool, asin: &str, days: i64) -> Result<i64, DbError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM stock_events \
         WHERE asin = $1 AND kind = 'stockout' \
           AND detected_at >= NOW() - make_interval(days => $2)",
    )
    .bind(asin)
    .bind(i32::try_from(days).unwrap_or(i32::MAX))
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// Deletes event rows older than the retention horizon across all three
/// tables. Returns the total number of rows removed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any delete fails.
pub async fn prune_events(pool: &PgPool, retention_days: i64) -> Result<u64, DbError> {
    let mut removed = 0u64;
    for table in ["price_events", "rank_events", "stock_events"] {
        let result = sqlx::query(&format!(
            "DELETE FROM {table} \
             WHERE detected_at < NOW() - make_interval(days => $1)"
        ))
        .bind(i32::try_from(retention_days).unwrap_or(i32::MAX))
        .execute(pool)
        .await?;
        removed += result.rows_affected();
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    // -- price rule -------------------------------------------------------

    #[test]
    fn price_change_just_below_threshold_is_silent() {
        // 1000.00 -> 1049.99 is a 4.999 % move.
        assert!(price_event(Some(dec!(1000.00)), Some(dec!(1049.99)), false).is_none());
    }

    #[test]
    fn price_change_at_threshold_fires_low() {
        let draft = price_event(Some(dec!(1000.00)), Some(dec!(1050.00)), false).expect("event");
        assert_eq!(draft.severity, EventSeverity::Low);
        assert_eq!(draft.direction, MovementDirection::Up);
        assert!((draft.price_change_percent - 5.0).abs() < 1e-9);
    }

    #[test]
    fn price_severity_grades_by_magnitude() {
        let medium = price_event(Some(dec!(20.00)), Some(dec!(22.40)), false).expect("12 %");
        assert_eq!(medium.severity, EventSeverity::Medium);

        let high = price_event(Some(dec!(20.00)), Some(dec!(16.40)), false).expect("-18 %");
        assert_eq!(high.severity, EventSeverity::High);
        assert_eq!(high.direction, MovementDirection::Down);

        let critical = price_event(Some(dec!(20.00)), Some(dec!(26.00)), false).expect("30 %");
        assert_eq!(critical.severity, EventSeverity::Critical);
    }

    #[test]
    fn null_price_on_either_side_is_silent() {
        assert!(price_event(None, Some(dec!(19.99)), false).is_none());
        assert!(price_event(Some(dec!(19.99)), None, false).is_none());
    }

    #[test]
    fn zero_prior_price_is_silent() {
        assert!(price_event(Some(dec!(0.00)), Some(dec!(19.99)), false).is_none());
    }

    // -- rank rule --------------------------------------------------------

    #[test]
    fn small_rank_move_is_silent() {
        // -10 % and under 10k positions.
        assert!(rank_event(Some(50_000), Some(45_000), None).is_none());
    }

    #[test]
    fn rank_event_fires_on_percent_threshold() {
        let draft = rank_event(Some(10_000), Some(8_000), None).expect("-20 %");
        assert_eq!(draft.direction, MovementDirection::Up);
        assert_eq!(draft.severity, EventSeverity::Medium);
        assert!(!draft.is_sustained);
    }

    #[test]
    fn rank_event_fires_on_absolute_threshold() {
        // Only -6.7 % but 12k positions.
        let draft = rank_event(Some(180_000), Some(168_000), None).expect("12k positions");
        assert_eq!(draft.rank_change, -12_000);
        assert_eq!(draft.severity, EventSeverity::Medium);
    }

    #[test]
    fn improving_rank_grades_high_and_critical() {
        let high = rank_event(Some(10_000), Some(6_500), None).expect("-35 %");
        assert_eq!(high.severity, EventSeverity::High);

        let critical_pct = rank_event(Some(10_000), Some(4_000), None).expect("-60 %");
        assert_eq!(critical_pct.severity, EventSeverity::Critical);

        let critical_abs = rank_event(Some(200_000), Some(140_000), None).expect("-60k");
        assert_eq!(critical_abs.severity, EventSeverity::Critical);
    }

    #[test]
    fn worsening_rank_is_always_low() {
        let draft = rank_event(Some(10_000), Some(25_000), None).expect("+150 %");
        assert_eq!(draft.direction, MovementDirection::Down);
        assert_eq!(draft.severity, EventSeverity::Low);
    }

    #[test]
    fn sustained_flag_requires_same_direction_prior_delta() {
        let sustained = rank_event(Some(10_000), Some(7_000), Some(-500)).expect("event");
        assert!(sustained.is_sustained);

        let reversed = rank_event(Some(10_000), Some(7_000), Some(400)).expect("event");
        assert!(!reversed.is_sustained);

        let flat_prior = rank_event(Some(10_000), Some(7_000), Some(0)).expect("event");
        assert!(!flat_prior.is_sustained);
    }

    #[test]
    fn null_rank_on_either_side_is_silent() {
        assert!(rank_event(None, Some(5_000), None).is_none());
        assert!(rank_event(Some(5_000), None, None).is_none());
    }

    // -- stock rule -------------------------------------------------------

    #[test]
    fn stockout_transition_is_high() {
        let draft =
            stock_event(Some(StockStatus::InStock), StockStatus::OutOfStock).expect("event");
        assert_eq!(draft.kind, StockEventKind::Stockout);
        assert_eq!(draft.severity, EventSeverity::High);

        let from_low =
            stock_event(Some(StockStatus::LowStock), StockStatus::OutOfStock).expect("event");
        assert_eq!(from_low.kind, StockEventKind::Stockout);
    }

    #[test]
    fn restock_transition_is_medium() {
        let draft =
            stock_event(Some(StockStatus::OutOfStock), StockStatus::InStock).expect("event");
        assert_eq!(draft.kind, StockEventKind::Restock);
        assert_eq!(draft.severity, EventSeverity::Medium);
    }

    #[test]
    fn transition_into_low_stock_is_an_alert() {
        let draft = stock_event(Some(StockStatus::InStock), StockStatus::LowStock).expect("event");
        assert_eq!(draft.kind, StockEventKind::LowStockAlert);
        assert_eq!(draft.severity, EventSeverity::Low);
    }

    #[test]
    fn other_transitions_are_status_changes() {
        let draft =
            stock_event(Some(StockStatus::BackOrdered), StockStatus::OutOfStock).expect("event");
        assert_eq!(draft.kind, StockEventKind::StatusChange);
        assert_eq!(draft.severity, EventSeverity::Low);
    }

    #[test]
    fn unchanged_status_is_silent() {
        assert!(stock_event(Some(StockStatus::InStock), StockStatus::InStock).is_none());
    }

    #[test]
    fn unknown_on_either_side_is_silent() {
        assert!(stock_event(None, StockStatus::OutOfStock).is_none());
        assert!(stock_event(Some(StockStatus::Unknown), StockStatus::OutOfStock).is_none());
        assert!(stock_event(Some(StockStatus::InStock), StockStatus::Unknown).is_none());
    }
}
