//! The controlled run orchestrator.
//!
//! One invocation walks the full pipeline — pre-flight, discovery,
//! freshness filter, fetch, store, data-quality gate, review extraction,
//! scoring, aggregate refresh, finalize — under explicit budgets: a token
//! budget on the external API, a data-quality gate on missingness, and an
//! error budget on per-product failures. A degraded or failed run never
//! replaces the served shortlist.

mod assemble;
mod audit;
mod dq;
mod run;

pub use audit::RunAudit;
pub use dq::DataQuality;
pub use run::{execute_run, PipelineError, RunOptions, RunReport};
