//! Visual media candidates chosen for a scene.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Fallback rank of a chosen visual source, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MediaTier {
    /// Caller-supplied media for this scene index
    Custom,
    /// Result of a stock media search
    Stock,
    /// Caller-supplied placeholder URL
    CustomPlaceholder,
    /// Configured local placeholder asset
    DefaultPlaceholder,
}

impl MediaTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaTier::Custom => "custom",
            MediaTier::Stock => "stock",
            MediaTier::CustomPlaceholder => "custom_placeholder",
            MediaTier::DefaultPlaceholder => "default_placeholder",
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, MediaTier::CustomPlaceholder | MediaTier::DefaultPlaceholder)
    }
}

impl fmt::Display for MediaTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A resolved visual source for one scene.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct MediaCandidate {
    /// Remote URL or local filesystem path
    pub url: String,
    pub tier: MediaTier,
    /// True when a stock URL already used by another scene was handed out
    /// because no unused candidate remained.
    #[serde(default)]
    pub reused: bool,
}

impl MediaCandidate {
    pub fn new(url: impl Into<String>, tier: MediaTier) -> Self {
        Self {
            url: url.into(),
            tier,
            reused: false,
        }
    }

    pub fn reused(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            tier: MediaTier::Stock,
            reused: true,
        }
    }

    /// Whether the candidate must be fetched over the network.
    pub fn is_remote(&self) -> bool {
        Url::parse(&self.url)
            .map(|u| matches!(u.scheme(), "http" | "https"))
            .unwrap_or(false)
    }
}
