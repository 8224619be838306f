//! Pipeline configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::retry::RetryPolicy;

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.trim().is_empty())
}

/// Orchestration configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Root for job workspaces and final artifacts
    pub storage_dir: PathBuf,
    /// Local placeholder clip used when nothing else resolves
    pub default_placeholder: PathBuf,
    /// Maximum scenes rendered at once
    pub max_scene_parallel: usize,
    /// Scene count at which the lower bound applies
    pub large_job_scenes: usize,
    /// Concurrency bound for large jobs
    pub large_job_parallel: usize,
    /// Whole-scene retry
    pub scene_retry: RetryPolicy,
    /// Stock search retry
    pub provider_retry: RetryPolicy,
    /// Media download retry
    pub download_retry: RetryPolicy,
    /// Narration engine retry
    pub synthesis_retry: RetryPolicy,
    /// Maximum keywords in the primary stock query
    pub keyword_limit: usize,
    /// Allowed clip/narration drift before a warning
    pub duration_tolerance: f64,
    /// Allowed concat drift per scene
    pub concat_tolerance_per_scene: f64,
    /// Minimum readable caption duration
    pub caption_min_segment: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let storage_dir = std::env::temp_dir();
        Self {
            default_placeholder: storage_dir.join("assets").join("placeholder.mp4"),
            storage_dir,
            max_scene_parallel: 3,
            large_job_scenes: 20,
            large_job_parallel: 2,
            scene_retry: RetryPolicy::new(3)
                .with_base_delay(Duration::from_secs(2))
                .with_max_delay(Duration::from_secs(30)),
            provider_retry: RetryPolicy::new(3)
                .with_base_delay(Duration::from_millis(500))
                .with_max_delay(Duration::from_secs(5)),
            download_retry: RetryPolicy::new(3)
                .with_base_delay(Duration::from_secs(1))
                .with_max_delay(Duration::from_secs(10)),
            synthesis_retry: RetryPolicy::new(3)
                .with_base_delay(Duration::from_secs(1))
                .with_max_delay(Duration::from_secs(10)),
            keyword_limit: 5,
            duration_tolerance: 1.0,
            concat_tolerance_per_scene: 0.1,
            caption_min_segment: 1.0,
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let storage_dir = env_non_empty("LOCAL_STORAGE_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.storage_dir.clone());
        let default_placeholder = env_non_empty("DEFAULT_PLACEHOLDER_VIDEO")
            .map(PathBuf::from)
            .unwrap_or_else(|| storage_dir.join("assets").join("placeholder.mp4"));

        let scene_retry = RetryPolicy::new(
            env_parse("PIPELINE_SCENE_MAX_ATTEMPTS").unwrap_or(defaults.scene_retry.max_attempts),
        )
        .with_base_delay(Duration::from_millis(
            env_parse("PIPELINE_SCENE_RETRY_BASE_MS").unwrap_or(2000),
        ))
        .with_max_delay(defaults.scene_retry.max_delay);

        Self {
            storage_dir,
            default_placeholder,
            max_scene_parallel: env_parse("PIPELINE_MAX_SCENE_PARALLEL")
                .unwrap_or(defaults.max_scene_parallel),
            large_job_scenes: env_parse("PIPELINE_LARGE_JOB_SCENES")
                .unwrap_or(defaults.large_job_scenes),
            large_job_parallel: env_parse("PIPELINE_LARGE_JOB_PARALLEL")
                .unwrap_or(defaults.large_job_parallel),
            scene_retry,
            caption_min_segment: env_parse("PIPELINE_CAPTION_MIN_SEGMENT_SECS")
                .unwrap_or(defaults.caption_min_segment),
            ..defaults
        }
    }

    /// Concurrency bound for a job with `scene_count` scenes.
    pub fn scene_parallelism(&self, scene_count: usize) -> usize {
        let limit = if scene_count >= self.large_job_scenes {
            self.large_job_parallel.min(self.max_scene_parallel)
        } else {
            self.max_scene_parallel
        };
        limit.max(1)
    }
}

/// Stock media provider configuration.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub pexels_api_key: Option<String>,
    pub pexels_base_url: String,
    pub pixabay_api_key: Option<String>,
    pub pixabay_base_url: String,
    /// Results requested per search
    pub per_page: u32,
    /// HTTP timeout for searches and downloads
    pub timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            pexels_api_key: None,
            pexels_base_url: "https://api.pexels.com".to_string(),
            pixabay_api_key: None,
            pixabay_base_url: "https://pixabay.com".to_string(),
            per_page: 5,
            timeout: Duration::from_secs(30),
        }
    }
}

impl ProviderConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            pexels_api_key: env_non_empty("PEXELS_API_KEY"),
            pexels_base_url: env_non_empty("PEXELS_BASE_URL").unwrap_or(defaults.pexels_base_url),
            pixabay_api_key: env_non_empty("PIXABAY_API_KEY"),
            pixabay_base_url: env_non_empty("PIXABAY_BASE_URL")
                .unwrap_or(defaults.pixabay_base_url),
            per_page: defaults.per_page,
            timeout: Duration::from_secs(env_parse("PROVIDER_TIMEOUT_SECS").unwrap_or(30)),
        }
    }
}

/// Narration engine configuration.
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    pub edge_tts_program: String,
    pub polly_url: String,
    pub kokoro_url: String,
    pub timeout: Duration,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            edge_tts_program: "edge-tts".to_string(),
            polly_url: "https://streamlabs.com/polly/speak".to_string(),
            kokoro_url: "http://localhost:8880".to_string(),
            timeout: Duration::from_secs(120),
        }
    }
}

impl VoiceConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            edge_tts_program: env_non_empty("EDGE_TTS_BIN").unwrap_or(defaults.edge_tts_program),
            polly_url: env_non_empty("STREAMLABS_POLLY_URL").unwrap_or(defaults.polly_url),
            kokoro_url: env_non_empty("KOKORO_API_URL").unwrap_or(defaults.kokoro_url),
            timeout: Duration::from_secs(env_parse("TTS_TIMEOUT_SECS").unwrap_or(120)),
        }
    }
}
