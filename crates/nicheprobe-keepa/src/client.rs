//! HTTP client for the Keepa REST API.
//!
//! Every endpoint shares one control path: wait on the local token bucket,
//! issue the request with transient-error retry, check the JSON envelope for
//! an application error, then re-synchronize the bucket from the response's
//! `tokensLeft`/`refillRate`. Rate-limit responses recompute the wait from
//! the refill rate and do not consume retries.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use reqwest::{Client, StatusCode, Url};

use nicheprobe_core::{AppConfig, Asin};

use crate::budget::TokenBucket;
use crate::error::KeepaError;
use crate::retry::retry_with_backoff;
use crate::types::{parse_product, ApiHealth, ProductBatch, ProductFailure, WireEnvelope};

const DEFAULT_BASE_URL: &str = "https://api.keepa.com/";

/// Budget units for one category-discovery call.
pub const DISCOVERY_COST: u32 = 1;
/// Budget units per product inside a batch fetch.
pub const PRODUCT_COST: u32 = 2;
/// Upper bound on products per fetch call.
pub const MAX_BATCH_SIZE: usize = 100;

/// Longest the client will block waiting for the bucket to refill.
const MAX_TOKEN_WAIT_SECS: u64 = 600;
/// Rate-limit rounds before the call is abandoned.
const MAX_RATE_LIMIT_ROUNDS: u32 = 5;

/// Construction-time knobs, usually sourced from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub timeout_secs: u64,
    pub domain: u8,
    pub bucket_capacity: u32,
    pub refill_per_minute: f64,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            domain: 1,
            bucket_capacity: 200,
            refill_per_minute: 21.0,
            max_retries: 3,
            backoff_base_ms: 1_000,
        }
    }
}

/// Client for the Keepa REST API.
pub struct KeepaClient {
    client: Client,
    api_key: String,
    base_url: Url,
    domain: u8,
    max_retries: u32,
    backoff_base_ms: u64,
    bucket: tokio::sync::Mutex<TokenBucket>,
    tokens_consumed: AtomicU64,
    last_error: std::sync::Mutex<Option<String>>,
}

impl KeepaClient {
    /// Creates a new client pointed at the production Keepa API.
    ///
    /// # Errors
    ///
    /// Returns [`KeepaError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(api_key: &str, options: ClientOptions) -> Result<Self, KeepaError> {
        Self::with_base_url(api_key, options, DEFAULT_BASE_URL)
    }

    /// Builds a client from the loaded application configuration.
    ///
    /// # Errors
    ///
    /// Returns [`KeepaError::MissingApiKey`] when no key is configured, or
    /// [`KeepaError::Http`] if the HTTP client cannot be constructed.
    pub fn from_app_config(config: &AppConfig) -> Result<Self, KeepaError> {
        let api_key = config
            .keepa_api_key
            .as_deref()
            .ok_or(KeepaError::MissingApiKey)?;
        Self::new(
            api_key,
            ClientOptions {
                timeout_secs: config.keepa_request_timeout_secs,
                domain: config.keepa_domain,
                bucket_capacity: config.keepa_bucket_capacity,
                refill_per_minute: config.keepa_refill_per_minute,
                max_retries: config.keepa_max_retries,
                backoff_base_ms: config.keepa_retry_backoff_base_ms,
            },
        )
    }

    /// Creates a new client with a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`KeepaError::Http`] if the HTTP client cannot be constructed,
    /// or [`KeepaError::Api`] if `base_url` is not a valid URL.
    pub fn with_base_url(
        api_key: &str,
        options: ClientOptions,
        base_url: &str,
    ) -> Result<Self, KeepaError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(options.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("nicheprobe/0.3 (marketplace-probe)")
            .build()?;

        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalised)
            .map_err(|e| KeepaError::Api(format!("invalid base URL '{base_url}': {e}")))?;

        Ok(Self {
            client,
            api_key: api_key.to_owned(),
            base_url,
            domain: options.domain,
            max_retries: options.max_retries,
            backoff_base_ms: options.backoff_base_ms,
            bucket: tokio::sync::Mutex::new(TokenBucket::new(
                options.bucket_capacity,
                options.refill_per_minute,
            )),
            tokens_consumed: AtomicU64::new(0),
            last_error: std::sync::Mutex::new(None),
        })
    }

    /// Tokens consumed by this client instance, for run audits.
    #[must_use]
    pub fn tokens_consumed(&self) -> u64 {
        self.tokens_consumed.load(Ordering::Relaxed)
    }

    /// Queries the remote token balance without gating on the local bucket.
    ///
    /// # Errors
    ///
    /// - [`KeepaError::Http`] on network failure or a non-2xx status.
    /// - [`KeepaError::Malformed`] if the body is not the expected shape.
    pub async fn health_check(&self) -> Result<ApiHealth, KeepaError> {
        let url = self.build_url("token", &[]);
        let body = retry_with_backoff(self.max_retries, self.backoff_base_ms, || {
            self.request_json(&url)
        })
        .await?;
        Self::check_api_error(&body)?;
        let envelope: WireEnvelope =
            serde_json::from_value(body).map_err(|e| KeepaError::Malformed {
                context: "token".to_owned(),
                source: e,
            })?;
        let tokens_left = envelope.tokens_left.unwrap_or(0);
        let refill_per_minute = envelope.refill_rate.unwrap_or(0.0);
        self.bucket.lock().await.sync(tokens_left, refill_per_minute);
        Ok(ApiHealth {
            tokens_left,
            refill_per_minute,
            last_error: self.last_error.lock().expect("lock poisoned").clone(),
        })
    }

    /// Lists best-selling product identifiers for a category.
    ///
    /// Costs [`DISCOVERY_COST`] budget units. Identifiers that do not parse
    /// as ASINs are logged and skipped.
    ///
    /// # Errors
    ///
    /// - [`KeepaError::Budget`] when the bucket cannot cover the call in time.
    /// - [`KeepaError::Api`] / [`KeepaError::Http`] / [`KeepaError::Malformed`]
    ///   per the shared call path.
    pub async fn discover_category(&self, category_id: i64) -> Result<Vec<Asin>, KeepaError> {
        let id_str = category_id.to_string();
        let url = self.build_url("bestsellers", &[("category", &id_str)]);
        let envelope = self
            .call(DISCOVERY_COST, &url, &format!("bestsellers(category={category_id})"))
            .await?;
        let list = envelope
            .best_sellers_list
            .ok_or_else(|| KeepaError::Api("bestsellers response carries no asin list".to_owned()))?;
        Ok(list
            .asin_list
            .iter()
            .filter_map(|raw| match Asin::new(raw) {
                Ok(asin) => Some(asin),
                Err(e) => {
                    tracing::warn!(raw = %raw, error = %e, "discovery returned invalid identifier — skipping");
                    None
                }
            })
            .collect())
    }

    /// Fetches up to [`MAX_BATCH_SIZE`] products in one call.
    ///
    /// Costs [`PRODUCT_COST`] budget units per product. A malformed record
    /// lands in `failures` and never fails the batch; products the remote
    /// silently dropped are reported as failures too.
    ///
    /// # Errors
    ///
    /// - [`KeepaError::BatchTooLarge`] when more than the per-call maximum is
    ///   requested.
    /// - [`KeepaError::Budget`] when the bucket cannot cover the call in time.
    /// - [`KeepaError::Api`] / [`KeepaError::Http`] / [`KeepaError::Malformed`]
    ///   per the shared call path.
    pub async fn fetch_products(
        &self,
        asins: &[Asin],
        include_history: bool,
    ) -> Result<ProductBatch, KeepaError> {
        if asins.is_empty() {
            return Ok(ProductBatch::default());
        }
        if asins.len() > MAX_BATCH_SIZE {
            return Err(KeepaError::BatchTooLarge(asins.len()));
        }

        let csv = asins
            .iter()
            .map(Asin::as_str)
            .collect::<Vec<_>>()
            .join(",");
        let mut params: Vec<(&str, &str)> = vec![("asin", &csv), ("stats", "30")];
        if include_history {
            params.push(("history", "1"));
        }
        let url = self.build_url("product", &params);

        #[allow(clippy::cast_possible_truncation)]
        let cost = PRODUCT_COST * asins.len() as u32;
        let envelope = self.call(cost, &url, "product batch").await?;

        let captured_at = Utc::now();
        let mut batch = ProductBatch::default();
        for value in envelope.products.unwrap_or_default() {
            match parse_product(&value, captured_at) {
                Ok(record) => batch.records.push(record),
                Err(reason) => {
                    let asin = value
                        .get("asin")
                        .and_then(serde_json::Value::as_str)
                        .unwrap_or("unknown")
                        .to_owned();
                    tracing::warn!(asin = %asin, reason = %reason, "skipping malformed product record");
                    batch.failures.push(ProductFailure { asin, reason });
                }
            }
        }

        let seen: HashSet<String> = batch
            .records
            .iter()
            .map(|r| r.asin.as_str().to_owned())
            .chain(batch.failures.iter().map(|f| f.asin.clone()))
            .collect();
        for requested in asins {
            if !seen.contains(requested.as_str()) {
                batch.failures.push(ProductFailure {
                    asin: requested.as_str().to_owned(),
                    reason: "not returned by the remote".to_owned(),
                });
            }
        }

        Ok(batch)
    }

    /// Shared call path: bucket wait → retried request → envelope checks →
    /// bucket re-sync.
    async fn call(
        &self,
        cost: u32,
        url: &Url,
        context: &str,
    ) -> Result<WireEnvelope, KeepaError> {
        let mut rate_limit_rounds = 0u32;
        loop {
            self.acquire(cost).await?;
            let result = retry_with_backoff(self.max_retries, self.backoff_base_ms, || {
                self.request_json(url)
            })
            .await;

            match result {
                Ok(body) => {
                    if let Err(e) = Self::check_api_error(&body) {
                        self.record_error(&e);
                        return Err(e);
                    }
                    let envelope: WireEnvelope =
                        serde_json::from_value(body).map_err(|e| KeepaError::Malformed {
                            context: context.to_owned(),
                            source: e,
                        })?;
                    if let Some(tokens_left) = envelope.tokens_left {
                        self.bucket
                            .lock()
                            .await
                            .sync(tokens_left, envelope.refill_rate.unwrap_or(0.0));
                    }
                    self.tokens_consumed
                        .fetch_add(u64::from(cost), Ordering::Relaxed);
                    *self.last_error.lock().expect("lock poisoned") = None;
                    return Ok(envelope);
                }
                Err(KeepaError::RateLimited {
                    tokens_left,
                    refill_per_minute,
                }) => {
                    rate_limit_rounds += 1;
                    if rate_limit_rounds > MAX_RATE_LIMIT_ROUNDS {
                        let err = KeepaError::RateLimited {
                            tokens_left,
                            refill_per_minute,
                        };
                        self.record_error(&err);
                        return Err(err);
                    }
                    let wait = {
                        let mut bucket = self.bucket.lock().await;
                        bucket.sync(tokens_left, refill_per_minute);
                        bucket.wait_for(cost)
                    };
                    let wait = wait.max(Duration::from_secs(1));
                    tracing::warn!(
                        context,
                        rate_limit_rounds,
                        wait_secs = wait.as_secs(),
                        "rate limited — waiting for remote refill"
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(e) => {
                    self.record_error(&e);
                    return Err(e);
                }
            }
        }
    }

    /// Blocks until the bucket covers `cost`, then reserves the tokens.
    async fn acquire(&self, cost: u32) -> Result<(), KeepaError> {
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                let wait = bucket.wait_for(cost);
                if wait.is_zero() {
                    bucket.consume(cost);
                    return Ok(());
                }
                wait
            };
            if wait.as_secs() > MAX_TOKEN_WAIT_SECS {
                return Err(KeepaError::Budget {
                    needed: cost,
                    wait_secs: wait.as_secs(),
                });
            }
            tracing::info!(
                cost,
                wait_secs = wait.as_secs(),
                "token bucket empty — sleeping until refill"
            );
            tokio::time::sleep(wait).await;
        }
    }

    fn record_error(&self, err: &KeepaError) {
        *self.last_error.lock().expect("lock poisoned") = Some(err.to_string());
    }

    /// Builds the full request URL with percent-encoded query parameters.
    fn build_url(&self, op: &str, extra: &[(&str, &str)]) -> Url {
        let mut url = self.base_url.clone();
        url.set_path(op);
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("key", &self.api_key);
            pairs.append_pair("domain", &self.domain.to_string());
            for (k, v) in extra {
                pairs.append_pair(k, v);
            }
        }
        url
    }

    /// Sends a GET request and parses the body as JSON.
    ///
    /// HTTP 429 is mapped to [`KeepaError::RateLimited`], reading the
    /// remote's balance out of the body when it provides one.
    async fn request_json(&self, url: &Url) -> Result<serde_json::Value, KeepaError> {
        let response = self.client.get(url.clone()).send().await?;
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            let body: serde_json::Value = response.json().await.unwrap_or_default();
            return Err(KeepaError::RateLimited {
                tokens_left: body
                    .get("tokensLeft")
                    .and_then(serde_json::Value::as_i64)
                    .unwrap_or(0),
                refill_per_minute: body
                    .get("refillRate")
                    .and_then(serde_json::Value::as_f64)
                    .unwrap_or(0.0),
            });
        }
        let response = response.error_for_status()?;
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| KeepaError::Malformed {
            context: url.path().to_owned(),
            source: e,
        })
    }

    /// Surfaces an application-level `error.message` as [`KeepaError::Api`].
    fn check_api_error(body: &serde_json::Value) -> Result<(), KeepaError> {
        if let Some(message) = body
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(serde_json::Value::as_str)
        {
            return Err(KeepaError::Api(message.to_owned()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client(base_url: &str) -> KeepaClient {
        KeepaClient::with_base_url("test-key", ClientOptions::default(), base_url)
            .expect("client construction should not fail")
    }

    #[test]
    fn build_url_constructs_correct_query_string() {
        let client = test_client("https://api.keepa.com");
        let url = client.build_url("token", &[]);
        assert_eq!(url.as_str(), "https://api.keepa.com/token?key=test-key&domain=1");
    }

    #[test]
    fn build_url_appends_extra_params() {
        let client = test_client("https://api.keepa.com/");
        let url = client.build_url("bestsellers", &[("category", "7072562011")]);
        assert_eq!(
            url.as_str(),
            "https://api.keepa.com/bestsellers?key=test-key&domain=1&category=7072562011"
        );
    }

    #[test]
    fn check_api_error_extracts_message() {
        let body = serde_json::json!({ "error": { "message": "invalid key" } });
        let err = KeepaClient::check_api_error(&body).unwrap_err();
        assert!(matches!(err, KeepaError::Api(ref m) if m == "invalid key"));
    }

    #[test]
    fn check_api_error_passes_clean_body() {
        let body = serde_json::json!({ "tokensLeft": 100 });
        assert!(KeepaClient::check_api_error(&body).is_ok());
    }

    #[test]
    fn from_app_config_requires_api_key() {
        let mut config = test_app_config();
        config.keepa_api_key = None;
        assert!(matches!(
            KeepaClient::from_app_config(&config),
            Err(KeepaError::MissingApiKey)
        ));
    }

    fn test_app_config() -> nicheprobe_core::AppConfig {
        std::env::set_var("DATABASE_URL", "postgres://localhost/test");
        nicheprobe_core::load_app_config_from_env().expect("config loads")
    }
}
