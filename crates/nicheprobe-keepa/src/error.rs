use thiserror::Error;

/// Errors returned by the Keepa API client.
#[derive(Debug, Error)]
pub enum KeepaError {
    /// Network or TLS failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API returned an application-level error message.
    #[error("Keepa API error: {0}")]
    Api(String),

    /// The remote signalled token depletion (HTTP 429 or an empty balance).
    #[error("rate limited: {tokens_left} tokens left, refill {refill_per_minute}/min")]
    RateLimited {
        tokens_left: i64,
        refill_per_minute: f64,
    },

    /// The response body could not be deserialized into the expected shape.
    #[error("malformed response for {context}: {source}")]
    Malformed {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// The local bucket cannot cover the call within the allowed wait.
    #[error("token budget exhausted: need {needed} tokens, wait of {wait_secs}s exceeds cap")]
    Budget { needed: u32, wait_secs: u64 },

    /// A single call may carry at most [`crate::MAX_BATCH_SIZE`] products.
    #[error("batch of {0} products exceeds the per-call maximum")]
    BatchTooLarge(usize),

    /// No API key was configured.
    #[error("KEEPA_API_KEY is not set")]
    MissingApiKey,
}
