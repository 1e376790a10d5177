//! Per-product improvement profile aggregation.

use serde_json::json;

use crate::extractor::{DefectExtraction, DefectSignal, FeatureRequest};
use crate::lexicon::DefectType;

/// Negative reviews needed before downstream consumers may trust the
/// profile. Below this floor the profile is still stored, but
/// `reviews_ready` stays false and the scorer ignores it.
pub const MIN_NEGATIVE_FOR_READY: usize = 20;

/// Top defects kept on the profile, and the weights of their severities in
/// the weighted average (heaviest first).
const TOP_DEFECTS: usize = 5;
const SEVERITY_WEIGHTS: [f64; TOP_DEFECTS] = [3.0, 2.0, 1.5, 1.0, 1.0];

/// A wish must be phrased this often to earn the improvement-score bonus.
const WISH_BONUS_MENTIONS: u32 = 3;

/// The per-product aggregate over defect signals and feature requests.
///
/// `improvement_score` is consumed downstream only as a shortlist-rank
/// bonus; it never feeds the base score, preserving the component caps.
#[derive(Debug, Clone)]
pub struct ImprovementProfile {
    pub top_defects: Vec<DefectSignal>,
    pub missing_features: Vec<FeatureRequest>,
    pub dominant_pain: Option<DefectType>,
    pub improvement_score: f64,
    pub reviews_analyzed: usize,
    pub negative_reviews_analyzed: usize,
    pub reviews_ready: bool,
}

impl ImprovementProfile {
    /// Compact JSON for the profile row's `top_defects` column.
    #[must_use]
    pub fn defects_json(&self) -> serde_json::Value {
        json!(self
            .top_defects
            .iter()
            .map(|d| {
                json!({
                    "type": d.defect_type.as_str(),
                    "freq": d.frequency,
                    "severity": d.severity_score,
                })
            })
            .collect::<Vec<_>>())
    }

    /// Compact JSON for the profile row's `missing_features` column.
    #[must_use]
    pub fn features_json(&self) -> serde_json::Value {
        json!(self
            .missing_features
            .iter()
            .map(|f| {
                json!({
                    "feature": f.feature,
                    "mentions": f.mentions,
                    "confidence": f.confidence,
                })
            })
            .collect::<Vec<_>>())
    }
}

/// Builds the profile from one product's extraction results.
///
/// ```text
/// coverage     = matched_negative_reviews / max(1, negative_reviews)
/// defect_score = weighted_avg(top-5 severities) · (0.5 + 0.5·coverage)
/// wish_bonus   = min(0.2, 0.1 · |{wishes with mentions ≥ 3}|)
/// score        = min(1, defect_score + wish_bonus)
/// ```
///
/// Dominant pain is the highest-severity defect; the extractor's sort
/// already breaks ties by frequency and then type name.
#[must_use]
pub fn build_profile(extraction: &DefectExtraction, wishes: &[FeatureRequest]) -> ImprovementProfile {
    let top_defects: Vec<DefectSignal> =
        extraction.signals.iter().take(TOP_DEFECTS).cloned().collect();
    let top_wishes: Vec<FeatureRequest> = wishes.iter().take(TOP_DEFECTS).cloned().collect();

    let defect_score = if top_defects.is_empty() {
        0.0
    } else {
        let weights = &SEVERITY_WEIGHTS[..top_defects.len()];
        let weighted_sum: f64 = top_defects
            .iter()
            .zip(weights)
            .map(|(d, w)| d.severity_score * w)
            .sum();
        let weighted_avg = weighted_sum / weights.iter().sum::<f64>();

        #[allow(clippy::cast_precision_loss)]
        let coverage =
            extraction.matched_negative_reviews as f64 / extraction.negative_reviews.max(1) as f64;
        weighted_avg * (0.5 + 0.5 * coverage)
    };

    let wish_bonus = (0.1
        * wishes
            .iter()
            .filter(|w| w.mentions >= WISH_BONUS_MENTIONS)
            .count() as f64)
        .min(0.2);

    let improvement_score = (defect_score + wish_bonus).min(1.0);
    let dominant_pain = top_defects.first().map(|d| d.defect_type);

    ImprovementProfile {
        dominant_pain,
        improvement_score,
        top_defects,
        missing_features: top_wishes,
        reviews_analyzed: extraction.total_reviews,
        negative_reviews_analyzed: extraction.negative_reviews,
        reviews_ready: extraction.negative_reviews >= MIN_NEGATIVE_FOR_READY,
    }
}
