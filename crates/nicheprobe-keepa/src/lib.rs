//! Token-budget-aware client for the Keepa product-data API.
//!
//! Wraps `reqwest` with typed endpoints, a local leaky bucket that is
//! re-synchronized from every response, transient-error retry with jitter,
//! and per-product failure isolation inside batch fetches.

mod budget;
mod client;
mod error;
mod retry;
mod types;

pub use budget::TokenBucket;
pub use client::{ClientOptions, KeepaClient, DISCOVERY_COST, MAX_BATCH_SIZE, PRODUCT_COST};
pub use error::KeepaError;
pub use types::{ApiHealth, Observation, ProductBatch, ProductFailure, ProductRecord};
