//! Pipeline error types.

use reel_media::MediaError;
use reel_models::{ModelError, TtsEngine};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::retry::Retryable;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Script contains no scenes")]
    EmptyScript,

    #[error("Synthesis failed: {0}")]
    Synthesis(#[from] SynthesisError),

    #[error("No media available for scene {index}")]
    NoMediaAvailable { index: usize },

    #[error("Scene {index} failed: {cause}")]
    SceneRender {
        index: usize,
        #[source]
        cause: Box<PipelineError>,
    },

    #[error("{failed} of {total} scenes failed")]
    TooManyFailedScenes {
        failed: usize,
        total: usize,
        failures: Vec<(usize, String)>,
    },

    #[error("Concatenation failed: {0}")]
    Concatenation(String),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ModelError> for PipelineError {
    fn from(e: ModelError) -> Self {
        Self::Validation(e.to_string())
    }
}

impl PipelineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn concatenation(msg: impl Into<String>) -> Self {
        Self::Concatenation(msg.into())
    }

    pub fn scene(index: usize, cause: PipelineError) -> Self {
        match cause {
            // Avoid nesting when a retried render is wrapped again
            already @ PipelineError::SceneRender { .. } => already,
            cause => Self::SceneRender {
                index,
                cause: Box::new(cause),
            },
        }
    }

    /// Stable error kind reported to callers.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Validation(_) => "validation",
            PipelineError::EmptyScript => "empty_script",
            PipelineError::Synthesis(_) => "synthesis",
            PipelineError::NoMediaAvailable { .. } => "no_media_available",
            PipelineError::SceneRender { .. } => "scene_render",
            PipelineError::TooManyFailedScenes { .. } => "too_many_failed_scenes",
            PipelineError::Concatenation(_) => "concatenation",
            PipelineError::Provider(_) => "provider",
            PipelineError::Media(MediaError::Cancelled) => "cancelled",
            PipelineError::Media(MediaError::DeadlineExceeded) => "deadline_exceeded",
            PipelineError::Media(_) => "media",
            PipelineError::Io(_) => "io",
        }
    }

    /// The cancellation or deadline error behind this failure, if any.
    pub fn interruption(&self) -> Option<&MediaError> {
        let media = match self {
            PipelineError::Media(e)
            | PipelineError::Synthesis(SynthesisError::Media(e))
            | PipelineError::Provider(ProviderError::Media(e)) => e,
            PipelineError::SceneRender { cause, .. } => return cause.interruption(),
            _ => return None,
        };
        media.is_interruption().then_some(media)
    }

    /// Whether the job was cancelled or ran past its deadline.
    pub fn is_interruption(&self) -> bool {
        self.interruption().is_some()
    }
}

impl Retryable for PipelineError {
    /// Scene renders are retried unless the job itself was stopped or the
    /// input can never succeed.
    fn is_retryable(&self) -> bool {
        if self.is_interruption() {
            return false;
        }
        match self {
            PipelineError::Validation(_) | PipelineError::EmptyScript => false,
            // A bad voice or missing engine fails the same way every time
            PipelineError::Synthesis(e) => e.is_retryable(),
            PipelineError::SceneRender { cause, .. } => cause.is_retryable(),
            _ => true,
        }
    }
}

/// Stock search and media download errors.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{provider} returned status {status}: {body}")]
    Status {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("{provider} rate limited")]
    RateLimited {
        provider: String,
        retry_after: Option<u64>,
    },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Unsupported media source: {0}")]
    UnsupportedSource(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),
}

impl ProviderError {
    /// Map a non-success HTTP status.
    pub fn from_status(provider: &str, status: u16, body: String, retry_after: Option<u64>) -> Self {
        if status == 429 {
            Self::RateLimited {
                provider: provider.to_string(),
                retry_after,
            }
        } else {
            Self::Status {
                provider: provider.to_string(),
                status,
                body,
            }
        }
    }
}

impl Retryable for ProviderError {
    fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Http(e) => is_transient_http(e),
            ProviderError::Status { status, .. } => *status >= 500 || *status == 408,
            ProviderError::RateLimited { .. } => true,
            ProviderError::Io(_) => true,
            ProviderError::Media(e) => e.is_retryable(),
            ProviderError::NotConfigured(_)
            | ProviderError::InvalidResponse(_)
            | ProviderError::UnsupportedSource(_) => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            ProviderError::RateLimited { retry_after, .. } => retry_after.map(Duration::from_secs),
            _ => None,
        }
    }
}

/// Narration synthesis errors.
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("TTS engine {0} is not available")]
    EngineUnavailable(TtsEngine),

    #[error("Invalid voice '{voice}' for {engine}")]
    InvalidVoice { engine: TtsEngine, voice: String },

    #[error("{engine} failed: {message}")]
    Engine {
        engine: TtsEngine,
        message: String,
        retryable: bool,
    },

    #[error("{engine} rate limited")]
    RateLimited {
        engine: TtsEngine,
        retry_after: Option<u64>,
    },

    #[error("{0} produced no audio file")]
    NoOutput(TtsEngine),

    #[error("{0} produced an empty audio file")]
    EmptyOutput(TtsEngine),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SynthesisError {
    pub fn engine(engine: TtsEngine, message: impl Into<String>, retryable: bool) -> Self {
        Self::Engine {
            engine,
            message: message.into(),
            retryable,
        }
    }
}

impl Retryable for SynthesisError {
    fn is_retryable(&self) -> bool {
        match self {
            SynthesisError::Engine { retryable, .. } => *retryable,
            SynthesisError::RateLimited { .. } => true,
            SynthesisError::NoOutput(_) | SynthesisError::EmptyOutput(_) => true,
            SynthesisError::Http(e) => is_transient_http(e),
            SynthesisError::Media(e) => e.is_retryable(),
            SynthesisError::Io(_) => true,
            SynthesisError::EngineUnavailable(_) | SynthesisError::InvalidVoice { .. } => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            SynthesisError::RateLimited { retry_after, .. } => retry_after.map(Duration::from_secs),
            _ => None,
        }
    }
}

fn is_transient_http(e: &reqwest::Error) -> bool {
    if e.is_timeout() || e.is_connect() || e.is_request() {
        return true;
    }
    e.status()
        .map(|s| s.is_server_error() || s.as_u16() == 429)
        .unwrap_or(false)
}

/// Pipeline state machine stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Decomposing,
    RenderingScenes,
    Concatenating,
    Captioning,
    Done,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Decomposing => "decomposing",
            PipelineStage::RenderingScenes => "rendering_scenes",
            PipelineStage::Concatenating => "concatenating",
            PipelineStage::Captioning => "captioning",
            PipelineStage::Done => "done",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Fatal job failure: the stage it happened in and why.
#[derive(Debug, Error)]
#[error("Pipeline failed during {stage}: {error}")]
pub struct PipelineFailure {
    pub stage: PipelineStage,
    #[source]
    pub error: PipelineError,
}

impl PipelineFailure {
    pub fn new(stage: PipelineStage, error: PipelineError) -> Self {
        Self { stage, error }
    }

    pub fn kind(&self) -> &'static str {
        match self.error.interruption() {
            Some(MediaError::DeadlineExceeded) => "deadline_exceeded",
            Some(_) => "cancelled",
            None => self.error.kind(),
        }
    }

    /// Structured form handed back to callers.
    pub fn report(&self) -> FailureReport {
        FailureReport {
            kind: self.kind().to_string(),
            stage: self.stage,
            message: self.error.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FailureReport {
    pub kind: String,
    pub stage: PipelineStage,
    pub message: String,
}
