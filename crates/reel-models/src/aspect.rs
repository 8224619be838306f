//! Output aspect ratios and their render resolutions.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Supported output aspect ratios.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
pub enum AspectRatio {
    /// Landscape (16:9)
    #[default]
    #[serde(rename = "16:9")]
    Landscape,
    /// Portrait (9:16) for Shorts/Reels
    #[serde(rename = "9:16")]
    Portrait,
    /// Square (1:1)
    #[serde(rename = "1:1")]
    Square,
}

/// Orientation hint passed to stock media searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Orientation {
    Landscape,
    Portrait,
    Square,
}

impl Orientation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Orientation::Landscape => "landscape",
            Orientation::Portrait => "portrait",
            Orientation::Square => "square",
        }
    }
}

impl AspectRatio {
    pub const ALL: &'static [AspectRatio] = &[
        AspectRatio::Landscape,
        AspectRatio::Portrait,
        AspectRatio::Square,
    ];

    /// Output resolution (width, height) in pixels.
    pub fn resolution(&self) -> (u32, u32) {
        match self {
            AspectRatio::Landscape => (1920, 1080),
            AspectRatio::Portrait => (1080, 1920),
            AspectRatio::Square => (1080, 1080),
        }
    }

    /// Returns the aspect ratio as a decimal.
    pub fn as_f64(&self) -> f64 {
        let (w, h) = self.resolution();
        w as f64 / h as f64
    }

    pub fn orientation(&self) -> Orientation {
        match self {
            AspectRatio::Landscape => Orientation::Landscape,
            AspectRatio::Portrait => Orientation::Portrait,
            AspectRatio::Square => Orientation::Square,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Landscape => "16:9",
            AspectRatio::Portrait => "9:16",
            AspectRatio::Square => "1:1",
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AspectRatio {
    type Err = AspectRatioParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (w, h) = trimmed
            .split_once(':')
            .ok_or_else(|| AspectRatioParseError::InvalidFormat(s.to_string()))?;

        match (w.trim(), h.trim()) {
            ("16", "9") => Ok(AspectRatio::Landscape),
            ("9", "16") => Ok(AspectRatio::Portrait),
            ("1", "1") => Ok(AspectRatio::Square),
            _ => Err(AspectRatioParseError::Unsupported(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum AspectRatioParseError {
    #[error("Invalid aspect ratio format: {0}, expected 'W:H'")]
    InvalidFormat(String),
    #[error("Unsupported aspect ratio: {0}, expected one of 16:9, 9:16, 1:1")]
    Unsupported(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aspect_ratio_parse() {
        assert_eq!("16:9".parse::<AspectRatio>().unwrap(), AspectRatio::Landscape);
        assert_eq!("9:16".parse::<AspectRatio>().unwrap(), AspectRatio::Portrait);
        assert_eq!(" 1:1 ".parse::<AspectRatio>().unwrap(), AspectRatio::Square);
        assert!(matches!(
            "4:5".parse::<AspectRatio>(),
            Err(AspectRatioParseError::Unsupported(_))
        ));
        assert!(matches!(
            "wide".parse::<AspectRatio>(),
            Err(AspectRatioParseError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_resolutions() {
        assert_eq!(AspectRatio::Landscape.resolution(), (1920, 1080));
        assert_eq!(AspectRatio::Portrait.resolution(), (1080, 1920));
        assert_eq!(AspectRatio::Square.resolution(), (1080, 1080));
    }

    #[test]
    fn test_serde_uses_ratio_strings() {
        let json = serde_json::to_string(&AspectRatio::Portrait).unwrap();
        assert_eq!(json, "\"9:16\"");
        let parsed: AspectRatio = serde_json::from_str("\"1:1\"").unwrap();
        assert_eq!(parsed, AspectRatio::Square);
        assert!(serde_json::from_str::<AspectRatio>("\"4:3\"").is_err());
    }
}
