//! The five capped scoring components.

use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;

use nicheprobe_core::ScoringConfig;

use crate::input::ScoringInput;

/// One component's points against its cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ComponentScore {
    pub score: i32,
    pub max: i32,
}

/// All five components. The caps are (30, 25, 20, 15, 10) under the default
/// calibration and every score is clamped into `[0, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ComponentBreakdown {
    pub margin: ComponentScore,
    pub velocity: ComponentScore,
    pub competition: ComponentScore,
    pub gap: ComponentScore,
    pub time_pressure: ComponentScore,
}

impl ComponentBreakdown {
    /// Sum of the four non-time components, the numerator of the base score.
    #[must_use]
    pub fn base_points(&self) -> i32 {
        self.margin.score + self.velocity.score + self.competition.score + self.gap.score
    }

    /// Sum of the four non-time caps, the denominator of the base score.
    #[must_use]
    pub fn base_cap(&self) -> i32 {
        self.margin.max + self.velocity.max + self.competition.max + self.gap.max
    }
}

/// First step whose threshold the value meets or exceeds. Tables are
/// ordered best-first.
fn step_at_least(table: &[(f64, i32)], value: f64) -> i32 {
    table
        .iter()
        .find(|(threshold, _)| value >= *threshold)
        .map_or(0, |(_, points)| *points)
}

/// First step whose ceiling the value fits under.
fn step_at_most_i64(table: &[(i64, i32)], value: i64) -> i32 {
    table
        .iter()
        .find(|(threshold, _)| value <= *threshold)
        .map_or(0, |(_, points)| *points)
}

fn step_at_most_f64(table: &[(f64, i32)], value: f64) -> i32 {
    table
        .iter()
        .find(|(threshold, _)| value <= *threshold)
        .map_or(0, |(_, points)| *points)
}

fn clamp_to(max: i32, raw: i32) -> ComponentScore {
    ComponentScore {
        score: raw.clamp(0, max),
        max,
    }
}

/// Per-unit net margin after every provision, or `None` when the price is
/// missing or non-positive.
pub(crate) fn net_margin(config: &ScoringConfig, input: &ScoringInput) -> Option<f64> {
    let cfg = &config.margin;
    let price = input.price?.to_f64()?;
    if price <= 0.0 {
        return None;
    }
    let goods = input
        .cogs
        .and_then(|c| c.to_f64())
        .unwrap_or(price / cfg.cogs_price_divisor);
    let fulfilment = (price * cfg.fulfilment_fee_percent).max(cfg.fulfilment_fee_minimum);
    let referral = price * cfg.referral_percent;
    let ppc = price * cfg.ppc_percent;
    let returns = price * cfg.return_rate;
    // Two months of average stock on hand.
    let storage = cfg.storage_monthly_per_unit * 2.0;
    let total =
        goods + cfg.shipping_per_unit + fulfilment + referral + ppc + returns + storage;
    Some((price - total) / price)
}

pub(crate) fn score_margin(config: &ScoringConfig, input: &ScoringInput) -> ComponentScore {
    let cfg = &config.margin;
    let raw = net_margin(config, input)
        .map_or(0, |margin| step_at_least(&cfg.thresholds, margin));
    clamp_to(cfg.max_points, raw)
}

pub(crate) fn score_velocity(config: &ScoringConfig, input: &ScoringInput) -> ComponentScore {
    let cfg = &config.velocity;
    let tier = input
        .rank
        .map_or(0, |rank| step_at_most_i64(&cfg.rank_tiers, i64::from(rank)));
    let trend_7d = step_at_most_f64(&cfg.trend_7d_thresholds, input.rank_trend_7d);
    let trend_30d = step_at_most_f64(&cfg.trend_30d_thresholds, input.rank_trend_30d);
    let reviews = step_at_least(&cfg.reviews_per_month_thresholds, input.reviews_per_month);
    clamp_to(cfg.max_points, tier + trend_7d + trend_30d + reviews)
}

pub(crate) fn score_competition(config: &ScoringConfig, input: &ScoringInput) -> ComponentScore {
    let cfg = &config.competition;
    let sellers = input.seller_count.map_or(0, |count| {
        step_at_most_i64(
            &cfg.seller_count_thresholds
                .iter()
                .map(|(t, p)| (i64::from(*t), *p))
                .collect::<Vec<_>>(),
            i64::from(count),
        )
    });
    let rotation = step_at_least(&cfg.rotation_thresholds, input.rotation_30d);
    let churn = step_at_least(&cfg.buybox_churn_thresholds, input.buybox_churn_30d);
    clamp_to(cfg.max_points, sellers + rotation + churn)
}

pub(crate) fn score_gap(config: &ScoringConfig, input: &ScoringInput) -> ComponentScore {
    let cfg = &config.gap;
    let gap = step_at_most_f64(&cfg.review_gap_thresholds, input.review_gap_vs_top10);
    let negative = step_at_least(&cfg.negative_share_thresholds, input.negative_share);
    clamp_to(cfg.max_points, gap + negative)
}

pub(crate) fn score_time_pressure(config: &ScoringConfig, input: &ScoringInput) -> ComponentScore {
    let cfg = &config.time_pressure;
    let stockouts = step_at_least(&cfg.stockout_thresholds, input.stockouts_per_month);
    let acceleration =
        step_at_least(&cfg.rank_acceleration_thresholds, input.rank_acceleration);
    let volatility = step_at_least(&cfg.price_volatility_thresholds, input.price_volatility);
    clamp_to(cfg.max_points, stockouts + acceleration + volatility)
}

pub(crate) fn breakdown(config: &ScoringConfig, input: &ScoringInput) -> ComponentBreakdown {
    ComponentBreakdown {
        margin: score_margin(config, input),
        velocity: score_velocity(config, input),
        competition: score_competition(config, input),
        gap: score_gap(config, input),
        time_pressure: score_time_pressure(config, input),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nicheprobe_core::Asin;
    use rust_decimal_macros::dec;

    fn input() -> ScoringInput {
        ScoringInput::empty(Asin::new("B09MOUNT01").unwrap())
    }

    fn config() -> ScoringConfig {
        ScoringConfig::default()
    }

    #[test]
    fn margin_zeroes_without_a_price() {
        let score = score_margin(&config(), &input());
        assert_eq!(score.score, 0);
        assert_eq!(score.max, 30);
    }

    #[test]
    fn margin_uses_the_heuristic_cogs() {
        let mut i = input();
        i.price = Some(dec!(34.99));
        // goods 6.998, shipping 3.0, fulfilment 5.2485, referral 5.2485,
        // ppc 3.499, returns 1.0497, storage 0.30 => total 25.344 => ~27.6 %.
        let margin = net_margin(&config(), &i).expect("margin");
        assert!((margin - 0.2757).abs() < 0.005, "got {margin}");
        assert_eq!(score_margin(&config(), &i).score, 22);
    }

    #[test]
    fn margin_prefers_a_real_quote() {
        let mut i = input();
        i.price = Some(dec!(29.99));
        i.cogs = Some(dec!(2.50));
        let with_quote = net_margin(&config(), &i).expect("margin");
        i.cogs = None;
        let heuristic = net_margin(&config(), &i).expect("margin");
        assert!(with_quote > heuristic);
    }

    #[test]
    fn velocity_respects_its_cap() {
        let mut i = input();
        i.rank = Some(3_000);
        i.rank_trend_7d = -0.40;
        i.rank_trend_30d = -0.30;
        i.reviews_per_month = 60.0;
        let score = score_velocity(&config(), &i);
        assert_eq!(score.score, 25);
        assert_eq!(score.max, 25);
    }

    #[test]
    fn velocity_rank_tiers_step_down() {
        let cfg = config();
        let tiers = [
            (3_000, 15),
            (10_000, 11),
            (30_000, 7),
            (80_000, 3),
            (150_000, 0),
        ];
        for (rank, expected_tier) in tiers {
            let mut i = input();
            i.rank = Some(rank);
            // Neutral trends still earn their stable-band points.
            let neutral_trend = step_at_most_f64(&cfg.velocity.trend_7d_thresholds, 0.0)
                + step_at_most_f64(&cfg.velocity.trend_30d_thresholds, 0.0);
            assert_eq!(
                score_velocity(&cfg, &i).score,
                expected_tier + neutral_trend,
                "rank {rank}"
            );
        }
    }

    #[test]
    fn competition_rewards_open_markets() {
        let mut i = input();
        i.seller_count = Some(3);
        i.rotation_30d = 0.45;
        i.buybox_churn_30d = 0.35;
        let score = score_competition(&config(), &i);
        assert_eq!(score.score, 20);
    }

    #[test]
    fn gap_combines_review_gap_and_negative_share() {
        let mut i = input();
        i.review_gap_vs_top10 = 0.25;
        i.negative_share = 0.30;
        assert_eq!(score_gap(&config(), &i).score, 15);

        i.review_gap_vs_top10 = 0.60;
        i.negative_share = 0.10;
        assert_eq!(score_gap(&config(), &i).score, 3 + 2);
    }

    #[test]
    fn time_pressure_is_zero_for_a_flat_market() {
        let score = score_time_pressure(&config(), &input());
        assert_eq!(score.score, 0);
        assert_eq!(score.max, 10);
    }

    #[test]
    fn time_pressure_maxes_under_strong_urgency() {
        let mut i = input();
        i.stockouts_per_month = 4.0;
        i.rank_acceleration = 0.25;
        i.price_volatility = 0.22;
        assert_eq!(score_time_pressure(&config(), &i).score, 10);
    }

    #[test]
    fn caps_hold_for_absurd_inputs() {
        let mut i = input();
        i.price = Some(dec!(500.00));
        i.cogs = Some(dec!(0.01));
        i.rank = Some(1);
        i.rank_trend_7d = -0.99;
        i.rank_trend_30d = -0.99;
        i.reviews_per_month = 10_000.0;
        i.seller_count = Some(1);
        i.rotation_30d = 1.0;
        i.buybox_churn_30d = 1.0;
        i.review_gap_vs_top10 = 0.0;
        i.negative_share = 1.0;
        i.stockouts_per_month = 99.0;
        i.rank_acceleration = 9.0;
        i.price_volatility = 9.0;
        let b = breakdown(&config(), &i);
        assert_eq!(b.margin.score, 30);
        assert_eq!(b.velocity.score, 25);
        assert_eq!(b.competition.score, 20);
        assert_eq!(b.gap.score, 15);
        assert_eq!(b.time_pressure.score, 10);
        assert_eq!(b.base_points(), 90);
        assert_eq!(b.base_cap(), 90);
    }
}
