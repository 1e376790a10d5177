use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub artifacts_dir: PathBuf,
    pub keepa_api_key: Option<String>,

    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,

    pub keepa_domain: u8,
    pub keepa_bucket_capacity: u32,
    pub keepa_refill_per_minute: f64,
    pub keepa_request_timeout_secs: u64,
    pub keepa_max_retries: u32,
    pub keepa_retry_backoff_base_ms: u64,

    pub category_id: i64,
    pub batch_size: usize,
    pub freshness_threshold_hours: i64,
    pub max_products: usize,
    pub fetch_concurrency: usize,

    pub dq_threshold_pct: f64,
    pub error_budget_threshold: f64,
    pub event_retention_days: i64,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("artifacts_dir", &self.artifacts_dir)
            .field("database_url", &"[redacted]")
            .field(
                "keepa_api_key",
                &self.keepa_api_key.as_ref().map(|_| "[redacted]"),
            )
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("keepa_domain", &self.keepa_domain)
            .field("keepa_bucket_capacity", &self.keepa_bucket_capacity)
            .field("keepa_refill_per_minute", &self.keepa_refill_per_minute)
            .field(
                "keepa_request_timeout_secs",
                &self.keepa_request_timeout_secs,
            )
            .field("keepa_max_retries", &self.keepa_max_retries)
            .field(
                "keepa_retry_backoff_base_ms",
                &self.keepa_retry_backoff_base_ms,
            )
            .field("category_id", &self.category_id)
            .field("batch_size", &self.batch_size)
            .field("freshness_threshold_hours", &self.freshness_threshold_hours)
            .field("max_products", &self.max_products)
            .field("fetch_concurrency", &self.fetch_concurrency)
            .field("dq_threshold_pct", &self.dq_threshold_pct)
            .field("error_budget_threshold", &self.error_budget_threshold)
            .field("event_retention_days", &self.event_retention_days)
            .finish()
    }
}
