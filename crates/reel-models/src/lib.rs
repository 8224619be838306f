//! Shared data models for the scripted video pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Pipeline requests and results
//! - Scenes and rendered scene clips
//! - Media candidates and their fallback tiers
//! - Aspect ratios, caption styling and encoding configuration

pub mod aspect;
pub mod caption;
pub mod encoding;
pub mod error;
pub mod job;
pub mod media;
pub mod request;
pub mod scene;

// Re-export common types
pub use aspect::{AspectRatio, AspectRatioParseError, Orientation};
pub use caption::{
    CaptionPosition, CaptionSettings, CaptionStyle, HorizontalAlign, ResolvedCaptionStyle, Rgb,
    VerticalPosition,
};
pub use encoding::EncodingConfig;
pub use error::{ModelError, ModelResult};
pub use job::JobId;
pub use media::{MediaCandidate, MediaTier};
pub use request::{CustomMedia, PipelineOutput, ScriptedVideoRequest, TtsEngine};
pub use scene::{RenderedScene, Scene};
