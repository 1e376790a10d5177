//! The end-to-end scorer: components → gate → multiplier → window →
//! economics → artifact.

use std::hash::{DefaultHasher, Hash, Hasher};

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

use nicheprobe_core::{Asin, OpportunityUrgency, ScoringConfig};

use crate::components::{breakdown, net_margin, ComponentBreakdown};
use crate::input::{ProductContext, ScoringInput};
use crate::multiplier::{time_multiplier, TimeFactors};

/// Rejection reason recorded when the time-pressure gate fails.
pub const REJECTION_NO_WINDOW: &str = "invalid_no_window";

/// The complete scoring result for one product. Everything the audit trail
/// needs, nothing owned by the database layer.
#[derive(Debug, Clone)]
pub struct ScoredOpportunity {
    pub asin: Asin,
    pub rejected: bool,
    pub rejection_reason: Option<String>,

    pub final_score: i32,
    pub base_score: f64,
    pub time_multiplier: f64,
    pub components: ComponentBreakdown,
    pub factors: TimeFactors,

    pub urgency: OpportunityUrgency,
    pub window_days: i32,
    pub window_multiplier: f64,

    pub monthly_profit: Decimal,
    pub annual_value: Decimal,
    pub risk_adjusted_value: Decimal,
    pub rank_score: f64,

    pub signals_for: Vec<String>,
    pub signals_against: Vec<String>,
    pub thesis: String,
    pub action: String,

    pub input_hash: String,
    pub context: ProductContext,
}

/// Estimated monthly unit volume for a sales rank.
fn monthly_units(config: &ScoringConfig, rank: Option<i32>) -> i64 {
    let cfg = &config.economics;
    let Some(rank) = rank else {
        return cfg.monthly_units_floor;
    };
    cfg.monthly_units_tiers
        .iter()
        .find(|(threshold, _)| i64::from(rank) <= *threshold)
        .map_or(cfg.monthly_units_floor, |(_, units)| *units)
}

fn to_money(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or_default().round_dp(2)
}

/// Monthly profit, annual value, and risk-adjusted value.
fn economics(
    config: &ScoringConfig,
    input: &ScoringInput,
    units: i64,
) -> (Decimal, Decimal, Decimal) {
    let margin_cfg = &config.margin;
    let Some(price) = input.price.and_then(|p| p.to_f64()).filter(|p| *p > 0.0) else {
        return (Decimal::ZERO, Decimal::ZERO, Decimal::ZERO);
    };
    let goods = input
        .cogs
        .and_then(|c| c.to_f64())
        .unwrap_or(price / margin_cfg.cogs_price_divisor)
        + margin_cfg.shipping_per_unit;
    let fulfilment = (price * margin_cfg.fulfilment_fee_percent).max(margin_cfg.fulfilment_fee_minimum);
    let referral = price * margin_cfg.referral_percent;
    let ppc = price * margin_cfg.ppc_percent;
    let returns = price * margin_cfg.return_rate;

    let profit_per_unit = price - goods - fulfilment - referral - ppc - returns;
    #[allow(clippy::cast_precision_loss)]
    let monthly = (profit_per_unit * units as f64).max(0.0);
    let annual = monthly * 12.0;
    let risk_adjusted = annual * (1.0 - config.economics.risk_factor);
    (to_money(monthly), to_money(annual), to_money(risk_adjusted))
}

fn describe_factors(factors: &TimeFactors) -> (Vec<String>, Vec<String>) {
    let mut signals_for = Vec::new();
    let mut signals_against = Vec::new();

    let labelled = [
        (factors.stockout, "frequent stockouts", "stockouts rare"),
        (
            factors.seller_churn,
            "sellers churning out",
            "seller base stable",
        ),
        (
            factors.price_volatility,
            "price volatility",
            "prices flat",
        ),
        (
            factors.rank_acceleration,
            "rank momentum accelerating",
            "rank momentum fading",
        ),
    ];
    for (factor, positive, negative) in labelled {
        if factor >= 1.2 {
            signals_for.push(positive.to_owned());
        } else if factor <= 0.8 {
            signals_against.push(negative.to_owned());
        }
    }
    (signals_for, signals_against)
}

fn build_thesis(
    base_score: f64,
    window_days: i32,
    monthly_profit: Decimal,
    signals_for: &[String],
) -> String {
    let strength = if base_score >= 0.8 {
        "High-potential product"
    } else if base_score >= 0.6 {
        "Viable product"
    } else {
        "Moderate-risk product"
    };
    let mut parts = vec![
        strength.to_owned(),
        format!("window {window_days}d"),
        format!("~${monthly_profit}/mo est."),
    ];
    if !signals_for.is_empty() {
        parts.push(format!("drivers: {}", signals_for.join(", ")));
    }
    parts.join(" | ")
}

fn build_action(window_days: i32) -> String {
    if window_days <= 14 {
        "ACT NOW: source a supplier this week".to_owned()
    } else if window_days <= 30 {
        "PRIORITY: start supplier analysis within 7 days".to_owned()
    } else if window_days <= 60 {
        "ACTIVE: plan sourcing within 2 weeks".to_owned()
    } else {
        "WATCH: add to backlog, reassess in 30 days".to_owned()
    }
}

/// Hash of the canonical JSON form of the input tuple, recorded on the
/// artifact so a replay can prove it scored the same data.
fn input_hash(input: &ScoringInput) -> String {
    let canonical = serde_json::to_string(input).unwrap_or_default();
    let mut hasher = DefaultHasher::new();
    canonical.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

/// Scores one product.
///
/// Deterministic: for a fixed `config` and identical `input`, every field of
/// the result is identical across calls. The time-pressure gate rejects
/// products with no identifiable action window; rejected results are still
/// fully populated so they can be stored for audit.
#[must_use]
pub fn score(config: &ScoringConfig, input: &ScoringInput) -> ScoredOpportunity {
    let components = breakdown(config, input);

    let factors = time_multiplier(
        &config.time_multiplier,
        input.stockouts_per_month,
        input.seller_churn,
        input.price_volatility,
        input.rank_acceleration,
    );
    let multiplier = factors.geometric_mean;

    let base_score = f64::from(components.base_points()) / f64::from(components.base_cap().max(1));
    #[allow(clippy::cast_possible_truncation)]
    let final_score = ((base_score * multiplier * 100.0).round() as i32).clamp(0, 100);

    let window = config.window_for(multiplier);

    let units = monthly_units(config, input.rank);
    let (monthly_profit, annual_value, risk_adjusted_value) = economics(config, input, units);

    let risk_f64 = risk_adjusted_value.to_f64().unwrap_or(0.0);
    let improvement_bonus = input.improvement_score.unwrap_or(0.0)
        * config.economics.improvement_bonus_weight
        * risk_f64;
    let rank_score = risk_f64 * window.rank_multiplier + improvement_bonus;

    let rejected = components.time_pressure.score < config.time_pressure.minimum_valid;
    let rejection_reason = rejected.then(|| REJECTION_NO_WINDOW.to_owned());

    let (signals_for, signals_against) = describe_factors(&factors);
    let thesis = build_thesis(base_score, window.window_days, monthly_profit, &signals_for);
    let action = build_action(window.window_days);

    if rejected {
        tracing::debug!(
            asin = %input.asin,
            time_pressure = components.time_pressure.score,
            "no action window — rejecting"
        );
    }

    ScoredOpportunity {
        asin: input.asin.clone(),
        rejected,
        rejection_reason,
        final_score,
        base_score,
        time_multiplier: multiplier,
        components,
        factors,
        urgency: window.urgency,
        window_days: window.window_days,
        window_multiplier: window.rank_multiplier,
        monthly_profit,
        annual_value,
        risk_adjusted_value,
        rank_score,
        signals_for,
        signals_against,
        thesis,
        action,
        input_hash: input_hash(input),
        context: ProductContext {
            price: input.price,
            review_count: input.review_count,
            rating_avg: input.rating_avg,
            rank: input.rank,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn config() -> ScoringConfig {
        ScoringConfig::default()
    }

    fn strong_input() -> ScoringInput {
        let mut i = ScoringInput::empty(Asin::new("B09MOUNT01").unwrap());
        i.price = Some(dec!(29.99));
        i.rank = Some(8_500);
        i.rank_trend_7d = -0.20;
        i.rank_trend_30d = -0.10;
        i.reviews_per_month = 35.0;
        i.seller_count = Some(4);
        i.rotation_30d = 0.35;
        i.buybox_churn_30d = 0.25;
        i.review_gap_vs_top10 = 0.40;
        i.negative_share = 0.18;
        i.stockouts_per_month = 1.3;
        i.rank_acceleration = 0.15;
        i.price_volatility = 0.08;
        i.seller_churn = 0.22;
        i.review_count = Some(1_200);
        i.rating_avg = Some(dec!(4.3));
        i
    }

    fn flat_input() -> ScoringInput {
        let mut i = strong_input();
        i.stockouts_per_month = 0.0;
        i.rank_acceleration = 0.0;
        i.price_volatility = 0.0;
        i.seller_churn = 0.0;
        i
    }

    #[test]
    fn strong_input_scores_and_passes_the_gate() {
        let result = score(&config(), &strong_input());
        assert!(!result.rejected);
        assert!(result.final_score > 50, "got {}", result.final_score);
        assert!(result.base_score > 0.0 && result.base_score <= 1.0);
        assert!(result.time_multiplier >= 0.5 && result.time_multiplier <= 2.0);
    }

    #[test]
    fn final_score_is_base_times_multiplier() {
        let result = score(&config(), &strong_input());
        let expected =
            ((result.base_score * result.time_multiplier * 100.0).round() as i32).clamp(0, 100);
        assert_eq!(result.final_score, expected);
    }

    #[test]
    fn flat_market_is_rejected_with_no_window() {
        let result = score(&config(), &flat_input());
        assert_eq!(result.components.time_pressure.score, 0);
        assert!(result.rejected);
        assert_eq!(result.rejection_reason.as_deref(), Some(REJECTION_NO_WINDOW));
        // Rejected artifacts are still fully populated for the audit trail.
        assert!(result.final_score > 0);
        assert!(!result.thesis.is_empty());
    }

    #[test]
    fn gate_sits_exactly_at_three_points() {
        let cfg = config();
        // One point shy: a single occasional-stockout signal (0.5/mo => 1)
        // plus mild volatility (0.05 => 1) is 2 points.
        let mut i = flat_input();
        i.stockouts_per_month = 0.5;
        i.price_volatility = 0.05;
        let two = score(&cfg, &i);
        assert_eq!(two.components.time_pressure.score, 2);
        assert!(two.rejected);

        // Adding a mild acceleration (0.02 => 1) reaches the gate.
        i.rank_acceleration = 0.02;
        let three = score(&cfg, &i);
        assert_eq!(three.components.time_pressure.score, 3);
        assert!(!three.rejected);
    }

    #[test]
    fn quiet_market_multiplier_matches_the_fixture() {
        // stockouts 0/mo, churn 0 %, volatility 0 %, acceleration -10 %.
        let mut i = flat_input();
        i.rank_acceleration = -0.10;
        let result = score(&config(), &i);
        let expected = (0.8f64 * 0.8 * 1.0 * 0.8).powf(0.25);
        assert!(
            (result.time_multiplier - expected).abs() < 1e-12,
            "multiplier must equal clamp(geomean(0.8, 0.8, 1.0, 0.8)), got {}",
            result.time_multiplier
        );
    }

    #[test]
    fn window_maps_from_the_multiplier() {
        // Even with every factor maxed the geometric mean tops out at
        // (1.5·1.4·1.3·1.4)^0.25 ≈ 1.398, the active band; the critical and
        // urgent bands are reachable only under a recalibrated config.
        let hot = {
            let mut i = strong_input();
            i.stockouts_per_month = 4.0;
            i.seller_churn = 0.40;
            i.price_volatility = 0.25;
            i.rank_acceleration = 0.20;
            score(&config(), &i)
        };
        assert_eq!(hot.urgency, OpportunityUrgency::Active);
        assert_eq!(hot.window_days, 60);
        assert!((hot.window_multiplier - 1.2).abs() < f64::EPSILON);

        let quiet = {
            let mut i = flat_input();
            i.rank_acceleration = -0.10;
            score(&config(), &i)
        };
        assert_eq!(quiet.urgency, OpportunityUrgency::Extended);
        assert_eq!(quiet.window_days, 180);
    }

    #[test]
    fn economics_scale_with_rank_tier() {
        let result = score(&config(), &strong_input());
        // rank 8 500 => 80 units/month tier.
        // per-unit: 29.99 - (5.998 + 3.0) - 4.4985 - 4.4985 - 2.999 - 0.8997
        //         = 8.0963; monthly = 647.70.
        assert_eq!(result.monthly_profit, dec!(647.70));
        assert_eq!(result.annual_value, dec!(7772.45));
        assert_eq!(result.risk_adjusted_value, dec!(5440.71));
    }

    #[test]
    fn rank_score_weights_value_by_window() {
        let result = score(&config(), &strong_input());
        let expected =
            result.risk_adjusted_value.to_f64().unwrap() * result.window_multiplier;
        assert!((result.rank_score - expected).abs() < 1e-6);
    }

    #[test]
    fn improvement_score_feeds_only_the_rank_bonus() {
        let cfg = config();
        let plain = score(&cfg, &strong_input());

        let mut boosted_input = strong_input();
        boosted_input.improvement_score = Some(0.8);
        let boosted = score(&cfg, &boosted_input);

        assert_eq!(boosted.final_score, plain.final_score);
        assert_eq!(boosted.components, plain.components);
        let expected_bonus = 0.8 * 0.2 * plain.risk_adjusted_value.to_f64().unwrap();
        assert!(
            (boosted.rank_score - plain.rank_score - expected_bonus).abs() < 1e-6,
            "bonus must be improvement · 0.2 · risk-adjusted value"
        );
    }

    #[test]
    fn scoring_is_deterministic() {
        let cfg = config();
        let input = strong_input();
        let a = score(&cfg, &input);
        let b = score(&cfg, &input);
        assert_eq!(a.final_score, b.final_score);
        assert_eq!(a.base_score.to_bits(), b.base_score.to_bits());
        assert_eq!(a.time_multiplier.to_bits(), b.time_multiplier.to_bits());
        assert_eq!(a.rank_score.to_bits(), b.rank_score.to_bits());
        assert_eq!(a.monthly_profit, b.monthly_profit);
        assert_eq!(a.input_hash, b.input_hash);
        assert_eq!(a.thesis, b.thesis);
    }

    #[test]
    fn input_hash_tracks_input_changes() {
        let cfg = config();
        let a = score(&cfg, &strong_input());
        let mut changed = strong_input();
        changed.price = Some(dec!(30.00));
        let b = score(&cfg, &changed);
        assert_ne!(a.input_hash, b.input_hash);
    }

    #[test]
    fn missing_price_zeroes_the_economics() {
        let mut i = strong_input();
        i.price = None;
        let result = score(&config(), &i);
        assert_eq!(result.monthly_profit, Decimal::ZERO);
        assert_eq!(result.risk_adjusted_value, Decimal::ZERO);
        assert!(result.rank_score.abs() < f64::EPSILON);
    }
}
