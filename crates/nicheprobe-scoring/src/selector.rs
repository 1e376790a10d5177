//! Shortlist selection over a run's scored opportunities.

use rust_decimal::Decimal;

use nicheprobe_core::{Asin, ShortlistConfig};

use crate::scorer::ScoredOpportunity;

/// One admitted entry, in rank order.
#[derive(Debug, Clone)]
pub struct ShortlistItem {
    pub asin: Asin,
    pub final_score: i32,
    pub rank_score: f64,
    pub window_days: i32,
    pub risk_adjusted_value: Decimal,
}

/// The selected shortlist plus its churn against the previous snapshot.
#[derive(Debug, Clone)]
pub struct ShortlistSelection {
    pub items: Vec<ShortlistItem>,
    pub total_potential_value: Decimal,
    pub added: Vec<String>,
    pub removed: Vec<String>,
    /// `|new ∩ previous| / max(1, |new ∪ previous|)`.
    pub stability: f64,
}

/// Ranks a run's opportunities and applies the admission gates.
///
/// Rejected artifacts never enter. Survivors need `final_score ≥ min_score`
/// and `risk_adjusted_value ≥ min_value`, are ordered by `rank_score`
/// descending (ties: higher final score, shorter window, lexical id), and
/// capped at `max_items`. `previous` is the currently-active snapshot's id
/// list, used for the stability accounting.
#[must_use]
pub fn select_shortlist(
    config: &ShortlistConfig,
    scored: &[ScoredOpportunity],
    previous: &[String],
) -> ShortlistSelection {
    let min_value = Decimal::try_from(config.min_value).unwrap_or(Decimal::ZERO);

    let mut viable: Vec<&ScoredOpportunity> = scored
        .iter()
        .filter(|o| {
            !o.rejected && o.final_score >= config.min_score && o.risk_adjusted_value >= min_value
        })
        .collect();

    viable.sort_by(|a, b| {
        b.rank_score
            .total_cmp(&a.rank_score)
            .then(b.final_score.cmp(&a.final_score))
            .then(a.window_days.cmp(&b.window_days))
            .then(a.asin.cmp(&b.asin))
    });
    viable.truncate(config.max_items);

    let items: Vec<ShortlistItem> = viable
        .iter()
        .map(|o| ShortlistItem {
            asin: o.asin.clone(),
            final_score: o.final_score,
            rank_score: o.rank_score,
            window_days: o.window_days,
            risk_adjusted_value: o.risk_adjusted_value,
        })
        .collect();

    let total_potential_value = items.iter().map(|i| i.risk_adjusted_value).sum();

    let new_ids: Vec<String> = items.iter().map(|i| i.asin.as_str().to_owned()).collect();
    let added: Vec<String> = new_ids
        .iter()
        .filter(|id| !previous.contains(id))
        .cloned()
        .collect();
    let removed: Vec<String> = previous
        .iter()
        .filter(|id| !new_ids.contains(id))
        .cloned()
        .collect();
    let intersection = new_ids.iter().filter(|id| previous.contains(id)).count();
    let union = new_ids.len() + previous.len() - intersection;
    #[allow(clippy::cast_precision_loss)]
    let stability = intersection as f64 / union.max(1) as f64;

    ShortlistSelection {
        items,
        total_potential_value,
        added,
        removed,
        stability,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::ScoringInput;
    use crate::scorer::score;
    use nicheprobe_core::ScoringConfig;
    use rust_decimal_macros::dec;

    fn opportunity(asin: &str, tweak: impl FnOnce(&mut ScoringInput)) -> ScoredOpportunity {
        let mut input = ScoringInput::empty(Asin::new(asin).unwrap());
        input.price = Some(dec!(29.99));
        input.rank = Some(4_000);
        input.rank_trend_7d = -0.20;
        input.rank_trend_30d = -0.10;
        input.reviews_per_month = 35.0;
        input.seller_count = Some(3);
        input.rotation_30d = 0.45;
        input.buybox_churn_30d = 0.35;
        input.review_gap_vs_top10 = 0.25;
        input.negative_share = 0.30;
        input.stockouts_per_month = 1.5;
        input.rank_acceleration = 0.15;
        input.price_volatility = 0.12;
        input.seller_churn = 0.25;
        tweak(&mut input);
        score(&ScoringConfig::default(), &input)
    }

    fn shortlist_config() -> ShortlistConfig {
        ShortlistConfig::default()
    }

    #[test]
    fn orders_by_rank_score_descending() {
        let strong = opportunity("B09MOUNT01", |_| {});
        let weaker = opportunity("B09MOUNT02", |i| i.rank = Some(15_000));
        assert!(strong.rank_score > weaker.rank_score);

        let selection = select_shortlist(
            &shortlist_config(),
            &[weaker.clone(), strong.clone()],
            &[],
        );
        assert_eq!(selection.items[0].asin, strong.asin);
        assert_eq!(selection.items[1].asin, weaker.asin);
    }

    #[test]
    fn ties_break_on_lexical_asin() {
        let a = opportunity("B09MOUNT01", |_| {});
        let b = opportunity("B09MOUNT02", |_| {});
        // Identical inputs except the id: rank_score, final_score, and
        // window all tie.
        let selection = select_shortlist(&shortlist_config(), &[b, a], &[]);
        assert_eq!(selection.items[0].asin.as_str(), "B09MOUNT01");
    }

    #[test]
    fn rejected_artifacts_never_enter() {
        let gated = opportunity("B09MOUNT03", |i| {
            i.stockouts_per_month = 0.0;
            i.rank_acceleration = 0.0;
            i.price_volatility = 0.0;
        });
        assert!(gated.rejected);
        let selection = select_shortlist(&shortlist_config(), &[gated], &[]);
        assert!(selection.items.is_empty());
    }

    #[test]
    fn value_gate_filters_small_opportunities() {
        let thin = opportunity("B09MOUNT04", |i| i.rank = Some(90_000));
        assert!(thin.risk_adjusted_value < dec!(5000));
        let selection = select_shortlist(&shortlist_config(), &[thin], &[]);
        assert!(selection.items.is_empty());
    }

    #[test]
    fn caps_at_max_items() {
        let mut config = shortlist_config();
        config.max_items = 2;
        let scored: Vec<ScoredOpportunity> = (1..=5)
            .map(|n| opportunity(&format!("B09MOUNT0{n}"), |_| {}))
            .collect();
        let selection = select_shortlist(&config, &scored, &[]);
        assert_eq!(selection.items.len(), 2);
    }

    #[test]
    fn stability_tracks_added_and_removed() {
        let a = opportunity("B09MOUNT01", |_| {});
        let b = opportunity("B09MOUNT02", |_| {});
        let previous = vec!["B09MOUNT01".to_string(), "B09MOUNT09".to_string()];

        let selection = select_shortlist(&shortlist_config(), &[a, b], &previous);
        assert_eq!(selection.added, vec!["B09MOUNT02".to_string()]);
        assert_eq!(selection.removed, vec!["B09MOUNT09".to_string()]);
        // intersection 1, union 3.
        assert!((selection.stability - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn empty_inputs_are_fully_stable() {
        let selection = select_shortlist(&shortlist_config(), &[], &[]);
        assert!(selection.items.is_empty());
        assert!(selection.stability.abs() < f64::EPSILON);
        assert_eq!(selection.total_potential_value, Decimal::ZERO);
    }

    #[test]
    fn total_value_sums_admitted_items() {
        let a = opportunity("B09MOUNT01", |_| {});
        let b = opportunity("B09MOUNT02", |_| {});
        let expected = a.risk_adjusted_value + b.risk_adjusted_value;
        let selection = select_shortlist(&shortlist_config(), &[a, b], &[]);
        assert_eq!(selection.total_potential_value, expected);
    }
}
