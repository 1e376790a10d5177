//! Shared configuration and domain types for the nicheprobe workspace.

mod app_config;
mod config;
mod scoring_config;
mod types;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use scoring_config::{
    CompetitionConfig, EconomicsConfig, GapConfig, MarginConfig, ScoringConfig,
    ShortlistConfig, TimeMultiplierConfig, TimePressureConfig, VelocityConfig, WindowRule,
};
pub use types::{
    Asin, EventSeverity, Fulfillment, MovementDirection, OpportunityUrgency, RunStatus,
    StockEventKind, StockStatus,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}

/// Error for strings that do not parse into a domain type.
#[derive(Debug, Error)]
#[error("invalid {kind}: {value:?}")]
pub struct ParseDomainError {
    pub kind: &'static str,
    pub value: String,
}
