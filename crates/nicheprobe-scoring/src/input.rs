//! The scorer's input tuple.

use rust_decimal::Decimal;
use serde::Serialize;

use nicheprobe_core::Asin;

/// Everything the scorer reads for one product. Assembled by the pipeline
/// from the latest snapshot, the 7/30-day aggregates, recent events, and
/// the review improvement profile.
///
/// Trend values are fractional rank changes over the window (negative =
/// improving rank). Missing history collapses to the neutral `0.0` rather
/// than `None`: a product with no momentum data scores as momentum-flat,
/// while a missing price or rank zeroes the component that needs it.
#[derive(Debug, Clone, Serialize)]
pub struct ScoringInput {
    pub asin: Asin,
    pub price: Option<Decimal>,
    /// Unit cost of goods when a supplier quote exists; otherwise the
    /// scorer falls back to the configured price-divisor heuristic.
    pub cogs: Option<Decimal>,
    pub rank: Option<i32>,
    pub rank_trend_7d: f64,
    pub rank_trend_30d: f64,
    pub reviews_per_month: f64,
    pub seller_count: Option<i32>,
    /// Seller-rotation frequency over 30 days, in `[0, 1]`.
    pub rotation_30d: f64,
    /// Buy-box-holder churn over 30 days, in `[0, 1]`.
    pub buybox_churn_30d: f64,
    /// Review-count gap vs the category top 10, in `[0, 1]`.
    pub review_gap_vs_top10: f64,
    /// Share of 1- and 2-star reviews, in `[0, 1]`.
    pub negative_share: f64,
    /// Stockout events per month over the trailing 30 days.
    pub stockouts_per_month: f64,
    /// Rank-improvement acceleration (positive = improvement speeding up).
    pub rank_acceleration: f64,
    /// 30-day price coefficient of variation.
    pub price_volatility: f64,
    /// Seller churn used by the time multiplier, in `[0, 1]`.
    pub seller_churn: f64,
    pub review_count: Option<i32>,
    pub rating_avg: Option<Decimal>,
    /// Set only when the review profile is ready; feeds the rank bonus and
    /// nothing else.
    pub improvement_score: Option<f64>,
}

impl ScoringInput {
    /// A neutral input for a product with nothing but an identifier. Used
    /// by tests and as the assembly base in the pipeline.
    #[must_use]
    pub fn empty(asin: Asin) -> Self {
        Self {
            asin,
            price: None,
            cogs: None,
            rank: None,
            rank_trend_7d: 0.0,
            rank_trend_30d: 0.0,
            reviews_per_month: 0.0,
            seller_count: None,
            rotation_30d: 0.0,
            buybox_churn_30d: 0.0,
            review_gap_vs_top10: 1.0,
            negative_share: 0.0,
            stockouts_per_month: 0.0,
            rank_acceleration: 0.0,
            price_volatility: 0.0,
            seller_churn: 0.0,
            review_count: None,
            rating_avg: None,
            improvement_score: None,
        }
    }
}

/// Product context frozen onto the artifact at scoring time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductContext {
    pub price: Option<Decimal>,
    pub review_count: Option<i32>,
    pub rating_avg: Option<Decimal>,
    pub rank: Option<i32>,
}
