//! The four-factor time multiplier.
//!
//! Time is not a fifth additive component: it multiplies the whole base
//! score. The composite is the geometric mean of the four factors so one
//! extreme signal cannot dominate, clamped into the configured range.

use serde::Serialize;

use nicheprobe_core::TimeMultiplierConfig;

/// The individual factors and their composite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimeFactors {
    pub stockout: f64,
    pub seller_churn: f64,
    pub price_volatility: f64,
    pub rank_acceleration: f64,
    pub geometric_mean: f64,
}

/// Inclusive lookup: first factor whose threshold the value reaches.
fn factor_at_least(table: &[(f64, f64)], default: f64, value: f64) -> f64 {
    table
        .iter()
        .find(|(threshold, _)| value >= *threshold)
        .map_or(default, |(_, factor)| *factor)
}

/// Strict lookup: first factor whose threshold the value exceeds.
fn factor_above(table: &[(f64, f64)], default: f64, value: f64) -> f64 {
    table
        .iter()
        .find(|(threshold, _)| value > *threshold)
        .map_or(default, |(_, factor)| *factor)
}

/// Computes the clamped multiplier from the four market-dynamics inputs.
#[must_use]
pub(crate) fn time_multiplier(
    config: &TimeMultiplierConfig,
    stockouts_per_month: f64,
    seller_churn: f64,
    price_volatility: f64,
    rank_acceleration: f64,
) -> TimeFactors {
    let stockout = factor_at_least(
        &config.stockout_factors,
        config.stockout_default,
        stockouts_per_month,
    );
    let churn = factor_above(&config.churn_factors, config.churn_default, seller_churn);
    let volatility = factor_above(
        &config.volatility_factors,
        config.volatility_default,
        price_volatility,
    );
    let acceleration = factor_above(
        &config.rank_acceleration_factors,
        config.rank_acceleration_default,
        rank_acceleration,
    );

    let composite = (stockout * churn * volatility * acceleration).powf(0.25);
    let geometric_mean = composite.clamp(config.clamp_min, config.clamp_max);

    TimeFactors {
        stockout,
        seller_churn: churn,
        price_volatility: volatility,
        rank_acceleration: acceleration,
        geometric_mean,
    }
}
