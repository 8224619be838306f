//! Scene definitions.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::MediaTier;

/// One paragraph-derived unit of the script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Scene {
    /// 0-based, contiguous, in document order
    pub index: usize,
    pub text: String,
}

impl Scene {
    pub fn new(index: usize, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
        }
    }

    /// Human-facing 1-based scene number.
    pub fn number(&self) -> usize {
        self.index + 1
    }
}

/// A finished, validated scene clip ready for concatenation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RenderedScene {
    pub index: usize,
    pub path: PathBuf,
    /// Probed duration of the muxed clip in seconds
    pub duration: f64,
    /// Narration duration the clip was trimmed to
    pub narration_duration: f64,
    /// True when the narration duration was estimated rather than probed
    #[serde(default)]
    pub duration_estimated: bool,
    pub tier: MediaTier,
}

impl RenderedScene {
    /// Absolute difference between clip and narration length.
    pub fn drift(&self) -> f64 {
        (self.duration - self.narration_duration).abs()
    }
}
