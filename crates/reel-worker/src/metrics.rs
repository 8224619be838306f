//! Pipeline metrics collection.
//!
//! Counters and histograms for scene rendering, media resolution and
//! provider health, exported through whatever recorder the binary installs.

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;

/// Install the Prometheus recorder with a scrape endpoint on `port`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(port: u16) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from(([0, 0, 0, 0], port)))
        .install()
}

// =============================================================================
// Metric Names
// =============================================================================

/// Metric name constants for consistency.
pub mod names {
    /// Scenes rendered successfully, by media tier.
    pub const SCENES_RENDERED_TOTAL: &str = "reel_scenes_rendered_total";

    /// Scenes dropped after exhausting retries.
    pub const SCENES_FAILED_TOTAL: &str = "reel_scenes_failed_total";

    /// Media selections by tier.
    pub const MEDIA_TIER_TOTAL: &str = "reel_media_tier_total";

    /// Stock URLs reused because nothing unused was left.
    pub const MEDIA_REUSED_TOTAL: &str = "reel_media_reused_total";

    /// Provider call failures by provider.
    pub const PROVIDER_ERRORS_TOTAL: &str = "reel_provider_errors_total";

    /// Retry attempts by operation.
    pub const RETRIES_TOTAL: &str = "reel_retries_total";

    /// Difference between clip and narration duration in seconds.
    pub const DURATION_DRIFT_SECONDS: &str = "reel_duration_drift_seconds";

    /// Caption overlays skipped after a failure.
    pub const CAPTION_DEGRADED_TOTAL: &str = "reel_caption_degraded_total";

    /// End-to-end job duration by status.
    pub const PIPELINE_SECONDS: &str = "reel_pipeline_seconds";
}

// =============================================================================
// Recording Functions
// =============================================================================

pub fn record_scene_rendered(tier: &str) {
    counter!(names::SCENES_RENDERED_TOTAL, "tier" => tier.to_string()).increment(1);
}

pub fn record_scene_failed() {
    counter!(names::SCENES_FAILED_TOTAL).increment(1);
}

pub fn record_media_tier(tier: &str) {
    counter!(names::MEDIA_TIER_TOTAL, "tier" => tier.to_string()).increment(1);
}

pub fn record_media_reused() {
    counter!(names::MEDIA_REUSED_TOTAL).increment(1);
}

pub fn record_provider_error(provider: &str) {
    counter!(names::PROVIDER_ERRORS_TOTAL, "provider" => provider.to_string()).increment(1);
}

/// Record a retry attempt.
pub fn record_retry(operation: &str) {
    counter!(names::RETRIES_TOTAL, "operation" => operation.to_string()).increment(1);
}

pub fn record_duration_drift(drift_secs: f64) {
    histogram!(names::DURATION_DRIFT_SECONDS).record(drift_secs);
}

pub fn record_caption_degraded() {
    counter!(names::CAPTION_DEGRADED_TOTAL).increment(1);
}

pub fn record_pipeline(status: &str, elapsed_secs: f64) {
    histogram!(names::PIPELINE_SECONDS, "status" => status.to_string()).record(elapsed_secs);
}
