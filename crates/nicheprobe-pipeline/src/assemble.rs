//! Conversions between the fetch layer, the store, and the scorer's input
//! tuple.

use sqlx::PgPool;

use nicheprobe_db::{NewProduct, NewSnapshot, SnapshotStatsRow};
use nicheprobe_keepa::ProductRecord;
use nicheprobe_scoring::ScoringInput;

/// Roughly 30/7 — converts a 7-day pace into the 30-day window's scale.
const WEEKS_PER_MONTH: f64 = 4.29;

pub(crate) fn to_new_product(record: &ProductRecord) -> NewProduct {
    NewProduct {
        asin: record.asin.clone(),
        title: record.title.clone(),
        brand: record.brand.clone(),
        manufacturer: record.manufacturer.clone(),
        category_id: record.category_id,
        category_path: record.category_path.clone(),
        dimensions: None,
    }
}

pub(crate) fn to_new_snapshot(record: &ProductRecord) -> NewSnapshot {
    let obs = &record.observation;
    NewSnapshot {
        asin: record.asin.clone(),
        captured_at: obs.captured_at,
        price_current: obs.price_current,
        price_original: obs.price_original,
        price_lowest_new: obs.price_lowest_new,
        price_lowest_used: obs.price_lowest_used,
        currency: obs.currency.clone(),
        coupon_discount_percent: obs.coupon_discount_percent,
        coupon_discount_amount: obs.coupon_discount_amount,
        deal_type: obs.deal_type.clone(),
        rank_primary: obs.rank_primary,
        rank_category: obs.rank_category.clone(),
        rank_secondary: obs.rank_secondary,
        stock_status: obs.stock_status,
        stock_quantity: obs.stock_quantity,
        fulfillment: obs.fulfillment,
        seller_count: obs.seller_count,
        rating_avg: obs.rating_avg,
        rating_count: obs.rating_count,
        review_count: obs.review_count,
        rating_distribution: obs.rating_distribution.clone(),
    }
}

/// Fractional rank change across a stats window; negative = improving.
fn rank_trend(stats: Option<&SnapshotStatsRow>) -> f64 {
    let Some(stats) = stats else { return 0.0 };
    match (stats.rank_first, stats.rank_last) {
        (Some(first), Some(last)) if first > 0 => {
            f64::from(last - first) / f64::from(first)
        }
        _ => 0.0,
    }
}

/// Price coefficient of variation over a stats window.
fn price_volatility(stats: Option<&SnapshotStatsRow>) -> f64 {
    let Some(stats) = stats else { return 0.0 };
    match (stats.price_avg, stats.price_stddev) {
        (Some(avg), Some(stddev)) if avg > 0.0 => stddev / avg,
        _ => 0.0,
    }
}

/// Reviews gained per month, preferring the observed 30-day delta over the
/// lifetime-count heuristic.
fn reviews_per_month(stats_30d: Option<&SnapshotStatsRow>, review_count: Option<i32>) -> f64 {
    if let Some(stats) = stats_30d {
        if let (Some(first), Some(last)) = (stats.review_count_first, stats.review_count_last) {
            if stats.samples >= 2 {
                return f64::from(last - first).max(0.0);
            }
        }
    }
    review_count.map_or(0.0, |count| f64::from(count) / 12.0)
}

/// Rank-improvement acceleration: the 7-day improvement pace compared with
/// the 30-day pace scaled to the same window. Positive = the improvement is
/// speeding up.
fn rank_acceleration(trend_7d: f64, trend_30d: f64) -> f64 {
    let improvement_7d = -trend_7d;
    let improvement_30d_weekly = -trend_30d / WEEKS_PER_MONTH;
    improvement_7d - improvement_30d_weekly
}

/// Seller-churn proxy from the current seller count. Crowded listings turn
/// over sellers faster; a listing with a couple of entrenched sellers
/// barely moves.
fn seller_churn_proxy(seller_count: Option<i32>) -> f64 {
    match seller_count {
        Some(n) if n > 15 => 0.25,
        Some(n) if n > 8 => 0.15,
        Some(n) if n > 3 => 0.10,
        Some(_) => 0.05,
        None => 0.10,
    }
}

/// Seller-rotation proxy over 30 days from the observed seller-count swing.
fn rotation_proxy(stats_30d: Option<&SnapshotStatsRow>) -> f64 {
    const DEFAULT_ROTATION: f64 = 0.15;
    let Some(stats) = stats_30d else {
        return DEFAULT_ROTATION;
    };
    match (stats.seller_count_min, stats.seller_count_max) {
        (Some(min), Some(max)) if max > 0 => {
            (f64::from(max - min) / f64::from(max)).clamp(0.0, 1.0)
        }
        _ => DEFAULT_ROTATION,
    }
}

/// Share of 1- and 2-star ratings from the snapshot's distribution.
fn negative_share(distribution: Option<&serde_json::Value>) -> f64 {
    const DEFAULT_NEGATIVE_SHARE: f64 = 0.10;
    let Some(distribution) = distribution else {
        return DEFAULT_NEGATIVE_SHARE;
    };
    let share = |star: &str| {
        distribution
            .get(star)
            .and_then(serde_json::Value::as_f64)
            .unwrap_or(0.0)
    };
    let total = share("1") + share("2");
    if total > 0.0 {
        total.min(1.0)
    } else {
        DEFAULT_NEGATIVE_SHARE
    }
}

/// Review-count gap vs the run's category leaders.
fn review_gap(review_count: Option<i32>, top10_avg_reviews: f64) -> f64 {
    if top10_avg_reviews <= 0.0 {
        return 1.0;
    }
    let own = review_count.map_or(0.0, f64::from);
    (1.0 - own / top10_avg_reviews).clamp(0.0, 1.0)
}

/// Average review count of the ten best-ranked products in this run's
/// batch; the per-product gap input is measured against it.
pub(crate) fn top10_avg_reviews(records: &[ProductRecord]) -> f64 {
    let mut ranked: Vec<&ProductRecord> = records
        .iter()
        .filter(|r| r.observation.rank_primary.is_some())
        .collect();
    ranked.sort_by_key(|r| r.observation.rank_primary.unwrap_or(i32::MAX));
    let top: Vec<f64> = ranked
        .iter()
        .take(10)
        .filter_map(|r| r.observation.review_count.map(f64::from))
        .collect();
    if top.is_empty() {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let denom = top.len() as f64;
    top.iter().sum::<f64>() / denom
}

/// Builds the scorer input for one freshly-snapshotted product from the
/// stored aggregates, recent events, and (when ready) the review profile.
pub(crate) async fn build_scoring_input(
    pool: &PgPool,
    record: &ProductRecord,
    top10_avg: f64,
) -> Result<ScoringInput, nicheprobe_db::DbError> {
    let asin = record.asin.as_str();
    let obs = &record.observation;

    let stats_7d = nicheprobe_db::stats_7d(pool, asin).await?;
    let stats_30d = nicheprobe_db::stats_30d(pool, asin).await?;
    let stockouts_30d = nicheprobe_db::count_stockouts_since(pool, asin, 30).await?;
    let profile = nicheprobe_db::latest_profile(pool, asin).await?;

    let trend_7d = rank_trend(stats_7d.as_ref());
    let trend_30d = rank_trend(stats_30d.as_ref());

    let mut input = ScoringInput::empty(record.asin.clone());
    input.price = obs.price_current;
    input.rank = obs.rank_primary;
    input.rank_trend_7d = trend_7d;
    input.rank_trend_30d = trend_30d;
    input.reviews_per_month = reviews_per_month(stats_30d.as_ref(), obs.review_count);
    input.seller_count = obs.seller_count;
    input.rotation_30d = rotation_proxy(stats_30d.as_ref());
    input.buybox_churn_30d = seller_churn_proxy(obs.seller_count);
    input.review_gap_vs_top10 = review_gap(obs.review_count, top10_avg);
    input.negative_share = negative_share(obs.rating_distribution.as_ref());
    #[allow(clippy::cast_precision_loss)]
    {
        input.stockouts_per_month = stockouts_30d as f64;
    }
    input.rank_acceleration = rank_acceleration(trend_7d, trend_30d);
    input.price_volatility = price_volatility(stats_30d.as_ref());
    input.seller_churn = seller_churn_proxy(obs.seller_count);
    input.review_count = obs.review_count;
    input.rating_avg = obs.rating_avg;
    input.improvement_score = profile
        .filter(|p| p.reviews_ready)
        .map(|p| p.improvement_score);

    Ok(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(rank_first: i32, rank_last: i32) -> SnapshotStatsRow {
        SnapshotStatsRow {
            asin: "B09MOUNT01".to_string(),
            samples: 5,
            rank_first: Some(rank_first),
            rank_last: Some(rank_last),
            rank_avg: None,
            price_avg: None,
            price_stddev: None,
            review_count_first: None,
            review_count_last: None,
            seller_count_min: None,
            seller_count_max: None,
        }
    }

    #[test]
    fn rank_trend_is_fractional_change() {
        let s = stats(10_000, 8_000);
        assert!((rank_trend(Some(&s)) + 0.2).abs() < 1e-12);
        assert!(rank_trend(None).abs() < f64::EPSILON);
    }

    #[test]
    fn volatility_is_stddev_over_mean() {
        let mut s = stats(1, 1);
        s.price_avg = Some(20.0);
        s.price_stddev = Some(3.0);
        assert!((price_volatility(Some(&s)) - 0.15).abs() < 1e-12);
    }

    #[test]
    fn acceleration_compares_weekly_paces() {
        // 7d improving 10 %, 30d improving 10 % (≈2.3 %/week): accelerating.
        let acceleration = rank_acceleration(-0.10, -0.10);
        assert!(acceleration > 0.0);
        // 7d flat while 30d improved: decelerating.
        assert!(rank_acceleration(0.0, -0.20) < 0.0);
    }

    #[test]
    fn negative_share_reads_the_distribution() {
        let dist = serde_json::json!({"1": 0.08, "2": 0.07, "5": 0.60});
        assert!((negative_share(Some(&dist)) - 0.15).abs() < 1e-12);
        assert!((negative_share(None) - 0.10).abs() < 1e-12);
    }

    #[test]
    fn review_gap_clamps_to_unit_interval() {
        assert!((review_gap(Some(500), 1_000.0) - 0.5).abs() < 1e-12);
        assert!(review_gap(Some(2_000), 1_000.0).abs() < f64::EPSILON);
        assert!((review_gap(None, 1_000.0) - 1.0).abs() < 1e-12);
        assert!((review_gap(Some(10), 0.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn churn_proxy_scales_with_crowding() {
        assert!((seller_churn_proxy(Some(20)) - 0.25).abs() < 1e-12);
        assert!((seller_churn_proxy(Some(10)) - 0.15).abs() < 1e-12);
        assert!((seller_churn_proxy(Some(5)) - 0.10).abs() < 1e-12);
        assert!((seller_churn_proxy(Some(2)) - 0.05).abs() < 1e-12);
    }
}
