//! Deterministic review-signal extraction.
//!
//! No model calls anywhere in this crate: defects come from a closed keyword
//! lexicon, feature wishes from a fixed set of regex patterns, and the
//! per-product improvement profile from arithmetic over both. The same
//! review set always yields the same signals.

mod extractor;
mod lexicon;
mod profile;

pub use extractor::{
    extract_defects, extract_wishes, DefectExtraction, DefectSignal, FeatureRequest, ReviewDoc,
    MAX_QUOTES,
};
pub use lexicon::DefectType;
pub use profile::{build_profile, ImprovementProfile, MIN_NEGATIVE_FOR_READY};
