//! Per-run audit collection: phase timings, counters, per-product errors.

use std::collections::BTreeMap;
use std::time::Instant;

use serde_json::json;
use uuid::Uuid;

use crate::dq::DataQuality;

/// One isolated per-product failure.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ProductError {
    pub asin: String,
    pub kind: String,
    pub message: String,
}

/// Collects everything the audit JSON and the run row need.
#[derive(Debug)]
pub struct RunAudit {
    pub run_id: Uuid,
    timings_ms: BTreeMap<String, u64>,
    counts: BTreeMap<String, u64>,
    errors: Vec<ProductError>,
    warnings: Vec<String>,
    pub dq: Option<DataQuality>,
    score_buckets: BTreeMap<&'static str, u64>,
}

impl RunAudit {
    #[must_use]
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            timings_ms: BTreeMap::new(),
            counts: BTreeMap::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            dq: None,
            score_buckets: BTreeMap::new(),
        }
    }

    pub fn record_phase(&mut self, name: &str, started: Instant) {
        let elapsed = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracing::info!(phase = name, elapsed_ms = elapsed, "phase finished");
        self.timings_ms.insert(name.to_owned(), elapsed);
    }

    pub fn record_count(&mut self, key: &str, value: u64) {
        self.counts.insert(key.to_owned(), value);
    }

    pub fn record_error(&mut self, asin: &str, kind: &str, message: &str) {
        let mut message = message.to_owned();
        message.truncate(200);
        self.errors.push(ProductError {
            asin: asin.to_owned(),
            kind: kind.to_owned(),
            message,
        });
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{message}");
        self.warnings.push(message);
    }

    /// Buckets a final score for the audit's scoring distribution.
    pub fn record_score(&mut self, final_score: i32, rejected: bool) {
        let bucket = if rejected {
            "rejected"
        } else if final_score < 20 {
            "0-19"
        } else if final_score < 40 {
            "20-39"
        } else if final_score < 60 {
            "40-59"
        } else if final_score < 80 {
            "60-79"
        } else {
            "80-100"
        };
        *self.score_buckets.entry(bucket).or_default() += 1;
    }

    #[must_use]
    pub fn failed_asins(&self) -> Vec<String> {
        self.errors.iter().map(|e| e.asin.clone()).collect()
    }

    #[must_use]
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Phase timings as the JSONB value stored on the run row.
    #[must_use]
    pub fn timings_json(&self) -> serde_json::Value {
        json!(self.timings_ms)
    }

    /// The complete audit document written next to the run record.
    #[must_use]
    pub fn summary(&self) -> serde_json::Value {
        json!({
            "run_id": self.run_id,
            "timings_ms": self.timings_ms,
            "counts": self.counts,
            "errors_count": self.errors.len(),
            "errors_sample": self.errors.iter().take(10).collect::<Vec<_>>(),
            "warnings": self.warnings,
            "data_quality": self.dq,
            "scoring_distribution": self.score_buckets,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_and_counts_land_in_the_summary() {
        let mut audit = RunAudit::new(Uuid::new_v4());
        audit.record_phase("fetch", Instant::now());
        audit.record_count("products_fetched", 88);
        audit.record_error("B09MOUNT99", "malformed", "undecodable record");
        audit.record_score(82, false);
        audit.record_score(10, false);
        audit.record_score(95, true);

        let summary = audit.summary();
        assert!(summary["timings_ms"]["fetch"].is_u64());
        assert_eq!(summary["counts"]["products_fetched"], 88);
        assert_eq!(summary["errors_count"], 1);
        assert_eq!(summary["scoring_distribution"]["80-100"], 1);
        assert_eq!(summary["scoring_distribution"]["0-19"], 1);
        assert_eq!(summary["scoring_distribution"]["rejected"], 1);
    }

    #[test]
    fn error_messages_are_truncated() {
        let mut audit = RunAudit::new(Uuid::new_v4());
        audit.record_error("B09MOUNT99", "transient", &"x".repeat(500));
        assert_eq!(audit.failed_asins(), vec!["B09MOUNT99".to_string()]);
        let summary = audit.summary();
        let msg = summary["errors_sample"][0]["message"].as_str().unwrap();
        assert!(msg.len() <= 200);
    }
}
