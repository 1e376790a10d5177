//! Deterministic opportunity scoring and shortlist selection.
//!
//! The scorer is a pure function of `(ScoringConfig, ScoringInput)`: no
//! clocks, no randomness, no I/O. Re-running it over the same configuration
//! snapshot and input tuple reproduces the artifact bit for bit, which is
//! what makes the per-run audit trail meaningful.

mod components;
mod input;
mod multiplier;
mod scorer;
mod selector;

pub use components::{ComponentBreakdown, ComponentScore};
pub use input::{ProductContext, ScoringInput};
pub use multiplier::TimeFactors;
pub use scorer::{score, ScoredOpportunity, REJECTION_NO_WINDOW};
pub use selector::{select_shortlist, ShortlistItem, ShortlistSelection};
