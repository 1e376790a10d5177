//! Calibration thresholds for the deterministic opportunity scorer.
//!
//! Every threshold lives here rather than in the scoring logic, so a run can
//! serialize its exact calibration into the `config_snapshot` column and a
//! re-run against the same snapshot reproduces identical artifacts. The
//! default calibration targets small, light consumer accessories in the
//! $15–35 retail band.

use serde::{Deserialize, Serialize};

use crate::OpportunityUrgency;

/// Margin component (max 30 points).
///
/// Net margin is computed after cost of goods, fulfilment fee, referral fee,
/// a PPC provision, a returns provision, and monthly storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarginConfig {
    pub max_points: i32,
    /// Ordered `(net_margin_at_least, points)` steps; first match wins.
    pub thresholds: Vec<(f64, i32)>,
    pub fulfilment_fee_percent: f64,
    pub fulfilment_fee_minimum: f64,
    pub referral_percent: f64,
    pub ppc_percent: f64,
    pub return_rate: f64,
    pub storage_monthly_per_unit: f64,
    pub shipping_per_unit: f64,
    /// Fallback cost-of-goods heuristic: retail price divided by this.
    pub cogs_price_divisor: f64,
}

impl Default for MarginConfig {
    fn default() -> Self {
        Self {
            max_points: 30,
            thresholds: vec![(0.34, 30), (0.26, 22), (0.18, 14), (0.10, 6)],
            fulfilment_fee_percent: 0.15,
            fulfilment_fee_minimum: 3.0,
            referral_percent: 0.15,
            ppc_percent: 0.10,
            return_rate: 0.03,
            storage_monthly_per_unit: 0.15,
            shipping_per_unit: 3.0,
            cogs_price_divisor: 5.0,
        }
    }
}

/// Velocity component (max 25 points): rank tier plus momentum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VelocityConfig {
    pub max_points: i32,
    /// `(rank_at_most, points)` — absolute sales-rank tier, up to 15 points.
    pub rank_tiers: Vec<(i64, i32)>,
    /// `(trend_at_most, points)` over 7 days; negative trend = improving rank.
    pub trend_7d_thresholds: Vec<(f64, i32)>,
    /// `(trend_at_most, points)` over 30 days.
    pub trend_30d_thresholds: Vec<(f64, i32)>,
    /// `(reviews_per_month_at_least, points)`.
    pub reviews_per_month_thresholds: Vec<(f64, i32)>,
}

impl Default for VelocityConfig {
    fn default() -> Self {
        Self {
            max_points: 25,
            rank_tiers: vec![(5_000, 15), (20_000, 11), (50_000, 7), (100_000, 3)],
            trend_7d_thresholds: vec![(-0.30, 5), (-0.15, 4), (-0.05, 3), (0.05, 2), (0.15, 1)],
            trend_30d_thresholds: vec![(-0.20, 3), (-0.05, 2), (0.10, 1)],
            reviews_per_month_thresholds: vec![(50.0, 2), (20.0, 1)],
        }
    }
}

/// Competition component (max 20 points): market openness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetitionConfig {
    pub max_points: i32,
    /// `(seller_count_at_most, points)` — fewer active sellers scores higher.
    pub seller_count_thresholds: Vec<(i32, i32)>,
    /// `(rotation_at_least, points)` — 30-day seller-rotation frequency.
    pub rotation_thresholds: Vec<(f64, i32)>,
    /// `(churn_at_least, points)` — 30-day buy-box-holder churn.
    pub buybox_churn_thresholds: Vec<(f64, i32)>,
}

impl Default for CompetitionConfig {
    fn default() -> Self {
        Self {
            max_points: 20,
            seller_count_thresholds: vec![(3, 8), (5, 6), (10, 4), (20, 2)],
            rotation_thresholds: vec![(0.40, 6), (0.25, 4), (0.10, 2)],
            buybox_churn_thresholds: vec![(0.30, 6), (0.20, 4), (0.10, 2)],
        }
    }
}

/// Gap component (max 15 points): unmet demand visible in reviews.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GapConfig {
    pub max_points: i32,
    /// `(gap_ratio_at_most, points)` — review-count gap vs the category
    /// top 10; a smaller gap is easier to close.
    pub review_gap_thresholds: Vec<(f64, i32)>,
    /// `(share_at_least, points)` — share of 1- and 2-star reviews.
    pub negative_share_thresholds: Vec<(f64, i32)>,
}

impl Default for GapConfig {
    fn default() -> Self {
        Self {
            max_points: 15,
            review_gap_thresholds: vec![(0.30, 8), (0.50, 6), (0.70, 3)],
            negative_share_thresholds: vec![(0.25, 7), (0.15, 5), (0.08, 2)],
        }
    }
}

/// Time-pressure component (max 10 points) and the validity gate.
///
/// A product scoring below `minimum_valid` here has no identifiable action
/// window and is rejected outright, whatever the other components say.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimePressureConfig {
    pub max_points: i32,
    pub minimum_valid: i32,
    /// `(stockouts_per_30d_at_least, points)`.
    pub stockout_thresholds: Vec<(f64, i32)>,
    /// `(acceleration_at_least, points)` — positive = rank improvement is
    /// speeding up.
    pub rank_acceleration_thresholds: Vec<(f64, i32)>,
    /// `(volatility_at_least, points)` — 30-day price coefficient of
    /// variation.
    pub price_volatility_thresholds: Vec<(f64, i32)>,
}

impl Default for TimePressureConfig {
    fn default() -> Self {
        Self {
            max_points: 10,
            minimum_valid: 3,
            stockout_thresholds: vec![(3.0, 4), (1.0, 2), (0.5, 1)],
            rank_acceleration_thresholds: vec![(0.20, 3), (0.10, 2), (0.02, 1)],
            price_volatility_thresholds: vec![(0.20, 3), (0.10, 2), (0.05, 1)],
        }
    }
}

/// Factor tables for the time multiplier (range 0.5–2.0).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeMultiplierConfig {
    /// `(stockouts_per_month_at_least, factor)`, inclusive bounds.
    pub stockout_factors: Vec<(f64, f64)>,
    pub stockout_default: f64,
    /// `(churn_above, factor)`, strict bounds.
    pub churn_factors: Vec<(f64, f64)>,
    pub churn_default: f64,
    /// `(volatility_above, factor)`, strict bounds.
    pub volatility_factors: Vec<(f64, f64)>,
    pub volatility_default: f64,
    /// `(acceleration_above, factor)`, strict bounds.
    pub rank_acceleration_factors: Vec<(f64, f64)>,
    pub rank_acceleration_default: f64,
    pub clamp_min: f64,
    pub clamp_max: f64,
}

impl Default for TimeMultiplierConfig {
    fn default() -> Self {
        Self {
            stockout_factors: vec![(3.0, 1.5), (1.0, 1.2), (0.5, 1.0)],
            stockout_default: 0.8,
            churn_factors: vec![(0.30, 1.4), (0.20, 1.2), (0.10, 1.0)],
            churn_default: 0.8,
            volatility_factors: vec![(0.20, 1.3), (0.10, 1.1)],
            volatility_default: 1.0,
            rank_acceleration_factors: vec![(0.10, 1.4), (0.0, 1.2), (-0.05, 1.0)],
            rank_acceleration_default: 0.8,
            clamp_min: 0.5,
            clamp_max: 2.0,
        }
    }
}

/// One row of the multiplier → window classification table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowRule {
    pub multiplier_at_least: f64,
    pub urgency: OpportunityUrgency,
    pub window_days: i32,
    /// Weight applied to the risk-adjusted value when ranking the shortlist.
    pub rank_multiplier: f64,
}

/// Economic-value estimation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EconomicsConfig {
    /// `(rank_at_most, estimated_monthly_units)`.
    pub monthly_units_tiers: Vec<(i64, i64)>,
    pub monthly_units_floor: i64,
    /// Fraction of annual value written off for execution risk.
    pub risk_factor: f64,
    /// Weight of the review improvement score in the rank bonus.
    pub improvement_bonus_weight: f64,
}

impl Default for EconomicsConfig {
    fn default() -> Self {
        Self {
            monthly_units_tiers: vec![
                (1_000, 300),
                (5_000, 150),
                (20_000, 80),
                (50_000, 40),
                (100_000, 20),
            ],
            monthly_units_floor: 10,
            risk_factor: 0.3,
            improvement_bonus_weight: 0.2,
        }
    }
}

/// Shortlist admission gates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortlistConfig {
    pub min_score: i32,
    pub min_value: f64,
    pub max_items: usize,
}

impl Default for ShortlistConfig {
    fn default() -> Self {
        Self {
            min_score: 50,
            min_value: 5_000.0,
            max_items: 10,
        }
    }
}

/// The full frozen calibration record passed by reference to the scorer and
/// the review extractor. No process-global state: every run owns one value,
/// serialized into the run's `config_snapshot`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub margin: MarginConfig,
    pub velocity: VelocityConfig,
    pub competition: CompetitionConfig,
    pub gap: GapConfig,
    pub time_pressure: TimePressureConfig,
    pub time_multiplier: TimeMultiplierConfig,
    #[serde(default = "default_window_rules")]
    pub windows: Vec<WindowRule>,
    pub economics: EconomicsConfig,
    pub shortlist: ShortlistConfig,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            margin: MarginConfig::default(),
            velocity: VelocityConfig::default(),
            competition: CompetitionConfig::default(),
            gap: GapConfig::default(),
            time_pressure: TimePressureConfig::default(),
            time_multiplier: TimeMultiplierConfig::default(),
            windows: default_window_rules(),
            economics: EconomicsConfig::default(),
            shortlist: ShortlistConfig::default(),
        }
    }
}

fn default_window_rules() -> Vec<WindowRule> {
    vec![
        WindowRule {
            multiplier_at_least: 1.8,
            urgency: OpportunityUrgency::Critical,
            window_days: 14,
            rank_multiplier: 2.0,
        },
        WindowRule {
            multiplier_at_least: 1.4,
            urgency: OpportunityUrgency::Urgent,
            window_days: 30,
            rank_multiplier: 1.5,
        },
        WindowRule {
            multiplier_at_least: 1.1,
            urgency: OpportunityUrgency::Active,
            window_days: 60,
            rank_multiplier: 1.2,
        },
        WindowRule {
            multiplier_at_least: 0.9,
            urgency: OpportunityUrgency::Standard,
            window_days: 90,
            rank_multiplier: 1.0,
        },
        WindowRule {
            multiplier_at_least: f64::NEG_INFINITY,
            urgency: OpportunityUrgency::Extended,
            window_days: 180,
            rank_multiplier: 0.7,
        },
    ]
}

impl ScoringConfig {
    /// Checks internal consistency of the calibration.
    ///
    /// # Errors
    ///
    /// Returns a human-readable description of the first inconsistency.
    pub fn validate(&self) -> Result<(), String> {
        let total = self.margin.max_points
            + self.velocity.max_points
            + self.competition.max_points
            + self.gap.max_points
            + self.time_pressure.max_points;
        if total != 100 {
            return Err(format!("component caps sum to {total}, expected 100"));
        }
        if self.time_pressure.minimum_valid > self.time_pressure.max_points {
            return Err("time-pressure gate exceeds its component cap".to_string());
        }
        if self.windows.is_empty() {
            return Err("window classification table is empty".to_string());
        }
        if self.time_multiplier.clamp_min >= self.time_multiplier.clamp_max {
            return Err("time-multiplier clamp range is empty".to_string());
        }
        Ok(())
    }
}

impl ScoringConfig {
    /// Picks the window rule for a clamped time multiplier.
    #[must_use]
    pub fn window_for(&self, multiplier: f64) -> &WindowRule {
        self.windows
            .iter()
            .find(|w| multiplier >= w.multiplier_at_least)
            .unwrap_or_else(|| &self.windows[self.windows.len() - 1])
    }
}
