//! The per-run data-quality gate.

use nicheprobe_db::NewSnapshot;

/// Missingness percentages over the snapshots written by one run.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct DataQuality {
    pub price_missing_pct: f64,
    pub rank_missing_pct: f64,
    pub review_missing_pct: f64,
    pub passed: bool,
}

impl DataQuality {
    /// The vacuous gate for a run that wrote nothing.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            price_missing_pct: 0.0,
            rank_missing_pct: 0.0,
            review_missing_pct: 0.0,
            passed: true,
        }
    }
}

/// Evaluates the gate: each missingness percentage must stay below
/// `threshold_pct` for the gate to pass.
#[must_use]
pub fn evaluate(snapshots: &[NewSnapshot], threshold_pct: f64) -> DataQuality {
    if snapshots.is_empty() {
        return DataQuality::empty();
    }
    #[allow(clippy::cast_precision_loss)]
    let total = snapshots.len() as f64;
    let pct = |missing: usize| {
        #[allow(clippy::cast_precision_loss)]
        let m = missing as f64;
        100.0 * m / total
    };

    let price_missing_pct = pct(snapshots.iter().filter(|s| s.price_current.is_none()).count());
    let rank_missing_pct = pct(snapshots.iter().filter(|s| s.rank_primary.is_none()).count());
    let review_missing_pct = pct(snapshots.iter().filter(|s| s.review_count.is_none()).count());

    let passed = price_missing_pct < threshold_pct
        && rank_missing_pct < threshold_pct
        && review_missing_pct < threshold_pct;

    DataQuality {
        price_missing_pct,
        rank_missing_pct,
        review_missing_pct,
        passed,
    }
}
