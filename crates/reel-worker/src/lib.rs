//! Scripted video pipeline.
//!
//! This crate provides:
//! - Script decomposition into scenes
//! - Narration synthesis over interchangeable voice engines
//! - Tiered stock media resolution with per-job deduplication
//! - Bounded-parallel scene rendering with retry and placeholder fallback
//! - Concatenation, standardization and caption overlay

pub mod captions;
pub mod concat;
pub mod config;
pub mod dedup;
pub mod download;
pub mod error;
pub mod keywords;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod providers;
pub mod resolver;
pub mod retry;
pub mod scene;
pub mod script;
pub mod tts;
pub mod workspace;

pub use captions::{CaptionOverlay, TimingSource};
pub use concat::Concatenator;
pub use config::{PipelineConfig, ProviderConfig, VoiceConfig};
pub use dedup::DedupSet;
pub use download::{HttpFetcher, MediaFetcher};
pub use error::{
    FailureReport, PipelineError, PipelineFailure, PipelineResult, PipelineStage, ProviderError,
    SynthesisError,
};
pub use logging::JobLogger;
pub use pipeline::{PipelineDeps, ScriptedVideoPipeline};
pub use providers::StockMediaProvider;
pub use resolver::{MediaResolver, PlaceholderOptions};
pub use retry::{RetryPolicy, RetryResult, Retryable};
pub use scene::{SceneRenderer, SceneSettings};
pub use script::decompose;
pub use tts::{Narration, VoiceEngine, VoiceSynthesizer};
pub use workspace::JobWorkspace;
