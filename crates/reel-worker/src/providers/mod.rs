//! Stock media search providers.

mod pexels;
mod pixabay;

pub use pexels::PexelsProvider;
pub use pixabay::PixabayProvider;

use async_trait::async_trait;
use reel_media::JobContext;
use reel_models::Orientation;
use reqwest::header::HeaderMap;
use reqwest::Client;

use crate::config::ProviderConfig;
use crate::error::ProviderError;

/// A stock video search backend.
#[async_trait]
pub trait StockMediaProvider: Send + Sync {
    /// Short name used in logs and metrics.
    fn name(&self) -> &str;

    /// Candidate video URLs for `query`, best first.
    async fn search(
        &self,
        query: &str,
        orientation: Orientation,
        ctx: &JobContext,
    ) -> Result<Vec<String>, ProviderError>;
}

/// Shared HTTP client for searches and downloads.
pub fn build_http_client(config: &ProviderConfig) -> Result<Client, ProviderError> {
    Client::builder()
        .timeout(config.timeout)
        .connect_timeout(std::time::Duration::from_secs(10))
        .pool_max_idle_per_host(10)
        .user_agent(concat!("reel-worker/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(ProviderError::Http)
}

/// Seconds from a rate-limit header, if present and numeric.
pub(crate) fn retry_after_secs(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Values above this in a reset header are Unix timestamps, not delays.
const EPOCH_THRESHOLD: u64 = 1_000_000_000;

/// Longest response body kept in an error.
const MAX_ERROR_BODY_CHARS: usize = 500;

/// Seconds until a rate-limit window resets.
///
/// Accepts either a delay or a Unix timestamp, as providers disagree.
pub(crate) fn reset_delay_secs(value: u64, now: i64) -> u64 {
    if value > EPOCH_THRESHOLD {
        value.saturating_sub(now.max(0) as u64)
    } else {
        value
    }
}

/// First `max_chars` characters of `body`.
pub(crate) fn truncate_body(mut body: String, max_chars: usize) -> String {
    if let Some((cut, _)) = body.char_indices().nth(max_chars) {
        body.truncate(cut);
    }
    body
}

/// Map a non-success response to a provider error, keeping a short body.
pub(crate) async fn status_error(provider: &str, response: reqwest::Response) -> ProviderError {
    let status = response.status().as_u16();
    let retry_after = retry_after_secs(response.headers(), "Retry-After").or_else(|| {
        retry_after_secs(response.headers(), "X-RateLimit-Reset")
            .map(|reset| reset_delay_secs(reset, chrono::Utc::now().timestamp()))
    });
    let body = truncate_body(response.text().await.unwrap_or_default(), MAX_ERROR_BODY_CHARS);
    ProviderError::from_status(provider, status, body, retry_after)
}
