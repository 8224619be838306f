use async_trait::async_trait;
use reel_media::{JobContext, MediaError, ToolRunner};
use reel_models::TtsEngine;
use std::ffi::OsStr;
use std::path::Path;
use std::time::Duration;

use super::VoiceEngine;
use crate::config::VoiceConfig;
use crate::error::SynthesisError;

const DEFAULT_VOICE: &str = "en-US-AriaNeural";

/// Microsoft Edge neural voices through the `edge-tts` CLI.
pub struct EdgeTtsEngine {
    program: String,
    timeout: Duration,
}

impl EdgeTtsEngine {
    pub fn new(config: &VoiceConfig) -> Self {
        Self {
            program: config.edge_tts_program.clone(),
            timeout: config.timeout,
        }
    }
}

#[async_trait]
impl VoiceEngine for EdgeTtsEngine {
    fn id(&self) -> TtsEngine {
        TtsEngine::EdgeTts
    }

    fn default_voice(&self) -> &str {
        DEFAULT_VOICE
    }

    async fn synthesize(
        &self,
        text: &str,
        voice: &str,
        output: &Path,
        ctx: &JobContext,
    ) -> Result<(), SynthesisError> {
        let runner = ToolRunner::new(&self.program)
            .with_context(ctx)
            .with_timeout(self.timeout);
        let args = [
            OsStr::new("--voice"),
            OsStr::new(voice),
            OsStr::new("--text"),
            OsStr::new(text),
            OsStr::new("--write-media"),
            output.as_os_str(),
        ];

        match runner.run(args).await {
            Ok(_) => Ok(()),
            Err(MediaError::ToolNotFound(_)) => Err(SynthesisError::EngineUnavailable(self.id())),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_binary_reports_unavailable() {
        let config = VoiceConfig {
            edge_tts_program: "edge-tts-definitely-not-installed".to_string(),
            ..VoiceConfig::default()
        };
        let dir = tempfile::TempDir::new().unwrap();
        let err = EdgeTtsEngine::new(&config)
            .synthesize("Hello", DEFAULT_VOICE, &dir.path().join("a.mp3"), &JobContext::background())
            .await
            .unwrap_err();
        assert!(matches!(err, SynthesisError::EngineUnavailable(TtsEngine::EdgeTts)));
    }
}
