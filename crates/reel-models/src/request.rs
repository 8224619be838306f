//! Pipeline request and result payloads.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use validator::Validate;

use crate::{AspectRatio, CaptionSettings, JobId, ModelError, ModelResult};

/// Narration engine selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TtsEngine {
    /// Microsoft Edge neural voices via the `edge-tts` CLI
    #[default]
    EdgeTts,
    /// Amazon Polly voices via the Streamlabs proxy
    StreamlabsPolly,
    /// Self-hosted Kokoro speech server
    Kokoro,
}

impl TtsEngine {
    pub const ALL: &'static [TtsEngine] = &[
        TtsEngine::EdgeTts,
        TtsEngine::StreamlabsPolly,
        TtsEngine::Kokoro,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TtsEngine::EdgeTts => "edge-tts",
            TtsEngine::StreamlabsPolly => "streamlabs-polly",
            TtsEngine::Kokoro => "kokoro",
        }
    }
}

impl fmt::Display for TtsEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TtsEngine {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "edge-tts" | "edge" => Ok(TtsEngine::EdgeTts),
            "streamlabs-polly" | "polly" => Ok(TtsEngine::StreamlabsPolly),
            "kokoro" => Ok(TtsEngine::Kokoro),
            _ => Err(ModelError::UnknownEngine(s.to_string())),
        }
    }
}

/// Caller-supplied media for a specific scene.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct CustomMedia {
    pub scene_index: usize,
    #[validate(url)]
    pub media_url: String,
}

fn default_use_placeholder() -> bool {
    true
}

/// Input for one scripted video job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct ScriptedVideoRequest {
    /// Plain-text script; paragraphs separated by blank lines become scenes
    #[validate(length(min = 1, message = "script must not be empty"))]
    pub script: String,

    #[serde(default)]
    pub tts_engine: TtsEngine,

    /// Engine voice; the engine default is used when unset
    #[serde(default)]
    pub voice: Option<String>,

    #[serde(default)]
    pub aspect_ratio: AspectRatio,

    #[serde(default)]
    pub add_captions: bool,

    #[serde(default)]
    #[validate(nested)]
    pub caption_settings: CaptionSettings,

    #[serde(default = "default_use_placeholder")]
    pub use_placeholder: bool,

    #[serde(default)]
    #[validate(url)]
    pub placeholder_url: Option<String>,

    #[serde(default)]
    #[validate(nested)]
    pub custom_media: Vec<CustomMedia>,
}

impl ScriptedVideoRequest {
    /// Request with defaults for everything but the script.
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            tts_engine: TtsEngine::default(),
            voice: None,
            aspect_ratio: AspectRatio::default(),
            add_captions: false,
            caption_settings: CaptionSettings::default(),
            use_placeholder: true,
            placeholder_url: None,
            custom_media: Vec::new(),
        }
    }

    /// Parse and validate a JSON payload.
    pub fn from_json(payload: &str) -> ModelResult<Self> {
        let request: Self =
            serde_json::from_str(payload).map_err(|e| ModelError::invalid(e.to_string()))?;
        request.check()?;
        Ok(request)
    }

    /// Run field validation.
    pub fn check(&self) -> ModelResult<()> {
        self.validate()
            .map_err(|e| ModelError::invalid(e.to_string()))
    }

    /// Custom media keyed by scene index. Later entries win on duplicates.
    pub fn custom_media_map(&self, scene_count: usize) -> ModelResult<HashMap<usize, String>> {
        let mut map = HashMap::with_capacity(self.custom_media.len());
        for item in &self.custom_media {
            if item.scene_index >= scene_count {
                return Err(ModelError::SceneIndexOutOfRange {
                    index: item.scene_index,
                    scene_count,
                });
            }
            map.insert(item.scene_index, item.media_url.clone());
        }
        Ok(map)
    }
}

/// Successful pipeline result handed back to the caller.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PipelineOutput {
    pub job_id: JobId,
    /// Final local artifact; the caller owns it from here on
    pub path: PathBuf,
    /// Probed duration in seconds
    pub duration: f64,
    /// Number of scenes in the final video
    pub scene_count: usize,
    /// Indices of scenes dropped after exhausting retries
    pub failed_scenes: Vec<usize>,
    pub captioned: bool,
    /// True when at least one scene used an estimated narration duration
    pub estimated_timing: bool,
    pub completed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_err;

    #[test]
    fn test_defaults_applied() {
        let req = ScriptedVideoRequest::from_json(r#"{"script": "Hello world"}"#).unwrap();
        assert_eq!(req.tts_engine, TtsEngine::EdgeTts);
        assert_eq!(req.aspect_ratio, AspectRatio::Landscape);
        assert!(req.use_placeholder);
        assert!(!req.add_captions);
        assert!(req.custom_media.is_empty());
    }

    #[test]
    fn test_full_payload() {
        let payload = r##"{
            "script": "One.\n\nTwo.",
            "tts_engine": "streamlabs-polly",
            "voice": "Joanna",
            "aspect_ratio": "9:16",
            "add_captions": true,
            "caption_settings": {"word_color": "#FF0000", "max_words_per_line": 5},
            "use_placeholder": false,
            "placeholder_url": "https://cdn.example.com/placeholder.mp4",
            "custom_media": [{"scene_index": 1, "media_url": "https://cdn.example.com/b.mp4"}]
        }"##;
        let req = ScriptedVideoRequest::from_json(payload).unwrap();
        assert_eq!(req.tts_engine, TtsEngine::StreamlabsPolly);
        assert_eq!(req.aspect_ratio, AspectRatio::Portrait);
        assert_eq!(req.caption_settings.max_words_per_line, Some(5));
        assert_eq!(req.custom_media.len(), 1);
    }

    #[test]
    fn test_rejects_unsupported_aspect_ratio() {
        let result = ScriptedVideoRequest::from_json(r#"{"script": "x", "aspect_ratio": "4:3"}"#);
        assert!(matches!(result, Err(ModelError::InvalidRequest(_))));
    }

    #[test]
    fn test_rejects_unknown_engine() {
        assert_err!(ScriptedVideoRequest::from_json(
            r#"{"script": "x", "tts_engine": "espeak"}"#
        ));
    }

    #[test]
    fn test_rejects_empty_script_and_bad_urls() {
        assert_err!(ScriptedVideoRequest::from_json(r#"{"script": ""}"#));
        assert_err!(ScriptedVideoRequest::from_json(
            r#"{"script": "x", "custom_media": [{"scene_index": 0, "media_url": "nope"}]}"#
        ));
        assert_err!(ScriptedVideoRequest::from_json(
            r#"{"script": "x", "caption_settings": {"max_words_per_line": 0}}"#
        ));
    }

    #[test]
    fn test_custom_media_map() {
        let mut req = ScriptedVideoRequest::new("a\n\nb\n\nc");
        req.custom_media = vec![
            CustomMedia {
                scene_index: 2,
                media_url: "https://a.example/1.mp4".to_string(),
            },
            CustomMedia {
                scene_index: 2,
                media_url: "https://a.example/2.mp4".to_string(),
            },
        ];
        let map = req.custom_media_map(3).unwrap();
        assert_eq!(map.get(&2).map(String::as_str), Some("https://a.example/2.mp4"));

        let err = req.custom_media_map(2).unwrap_err();
        assert!(matches!(
            err,
            ModelError::SceneIndexOutOfRange { index: 2, scene_count: 2 }
        ));
    }

    #[test]
    fn test_engine_parse() {
        assert_eq!("polly".parse::<TtsEngine>().unwrap(), TtsEngine::StreamlabsPolly);
        assert_eq!("Kokoro".parse::<TtsEngine>().unwrap(), TtsEngine::Kokoro);
        assert!("espeak".parse::<TtsEngine>().is_err());
    }
}
