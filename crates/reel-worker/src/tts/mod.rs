//! Narration synthesis behind interchangeable engines.

mod edge;
mod kokoro;
mod polly;

pub use edge::EdgeTtsEngine;
pub use kokoro::KokoroEngine;
pub use polly::{chunk_text, PollyEngine, POLLY_VOICES};

use async_trait::async_trait;
use reel_media::{JobContext, Transcoder};
use reel_models::TtsEngine;
use reqwest::Client;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::VoiceConfig;
use crate::error::SynthesisError;
use crate::retry::RetryPolicy;

/// Speaking rate used when an engine reports no timing.
const ESTIMATED_WORDS_PER_SECOND: f64 = 2.5;

/// A text-to-speech backend.
#[async_trait]
pub trait VoiceEngine: Send + Sync {
    fn id(&self) -> TtsEngine;

    fn default_voice(&self) -> &str;

    /// Whether the produced audio reliably carries its own duration.
    fn has_native_timing(&self) -> bool {
        true
    }

    /// Voice to use for a request; unset or blank selects the default.
    fn resolve_voice(&self, voice: Option<&str>) -> Result<String, SynthesisError> {
        Ok(voice
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(self.default_voice())
            .to_string())
    }

    /// Write narration audio for `text` to `output`.
    async fn synthesize(
        &self,
        text: &str,
        voice: &str,
        output: &Path,
        ctx: &JobContext,
    ) -> Result<(), SynthesisError>;
}

/// Synthesized narration for one scene.
#[derive(Debug, Clone, PartialEq)]
pub struct Narration {
    pub path: PathBuf,
    pub duration: f64,
    /// Duration came from a word-count estimate rather than a probe
    pub estimated: bool,
}

/// Rough narration length for `text`.
pub fn estimate_duration(text: &str) -> f64 {
    let words = text.split_whitespace().count().max(1);
    (words as f64 / ESTIMATED_WORDS_PER_SECOND).max(1.0)
}

/// Dispatches to the engine selected per request.
pub struct VoiceSynthesizer {
    engines: HashMap<TtsEngine, Arc<dyn VoiceEngine>>,
    transcoder: Arc<dyn Transcoder>,
    retry: RetryPolicy,
}

impl VoiceSynthesizer {
    pub fn new(transcoder: Arc<dyn Transcoder>, retry: RetryPolicy) -> Self {
        Self {
            engines: HashMap::new(),
            transcoder,
            retry,
        }
    }

    /// All built-in engines.
    pub fn from_config(
        config: &VoiceConfig,
        client: Client,
        transcoder: Arc<dyn Transcoder>,
        retry: RetryPolicy,
    ) -> Self {
        Self::new(Arc::clone(&transcoder), retry)
            .with_engine(Arc::new(EdgeTtsEngine::new(config)))
            .with_engine(Arc::new(PollyEngine::new(
                client.clone(),
                config,
                Arc::clone(&transcoder),
            )))
            .with_engine(Arc::new(KokoroEngine::new(client, config)))
    }

    pub fn with_engine(mut self, engine: Arc<dyn VoiceEngine>) -> Self {
        self.engines.insert(engine.id(), engine);
        self
    }

    fn backend(&self, engine: TtsEngine) -> Result<&Arc<dyn VoiceEngine>, SynthesisError> {
        self.engines
            .get(&engine)
            .ok_or(SynthesisError::EngineUnavailable(engine))
    }

    /// Voice `engine` will speak with, or why the pair can never work.
    pub fn resolve_voice(
        &self,
        engine: TtsEngine,
        voice: Option<&str>,
    ) -> Result<String, SynthesisError> {
        self.backend(engine)?.resolve_voice(voice)
    }

    /// Synthesize `text` into `output_dir/narration.mp3` and measure it.
    pub async fn synthesize(
        &self,
        text: &str,
        engine: TtsEngine,
        voice: Option<&str>,
        output_dir: &Path,
        ctx: &JobContext,
    ) -> Result<Narration, SynthesisError> {
        let backend = self.backend(engine)?;
        let voice = backend.resolve_voice(voice)?;
        let output = output_dir.join("narration.mp3");

        self.retry
            .run("synthesis", ctx, || async {
                backend.synthesize(text, &voice, &output, ctx).await?;
                check_audio_file(engine, &output).await
            })
            .await
            .into_result()?;

        let measured = match self.transcoder.probe(&output, ctx).await {
            Ok(info) if info.duration > 0.0 => Some(info.duration),
            Ok(_) => None,
            Err(e) if e.is_interruption() || backend.has_native_timing() => return Err(e.into()),
            Err(e) => {
                debug!(engine = %engine, error = %e, "Narration probe failed");
                None
            }
        };

        match measured {
            Some(duration) => {
                debug!(engine = %engine, voice = %voice, duration, "Narration ready");
                Ok(Narration {
                    path: output,
                    duration,
                    estimated: false,
                })
            }
            None if !backend.has_native_timing() => {
                let duration = estimate_duration(text);
                warn!(engine = %engine, duration, "Narration duration estimated from word count");
                Ok(Narration {
                    path: output,
                    duration,
                    estimated: true,
                })
            }
            None => Err(SynthesisError::EmptyOutput(engine)),
        }
    }
}

async fn check_audio_file(engine: TtsEngine, path: &Path) -> Result<(), SynthesisError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.len() > 0 => Ok(()),
        Ok(_) => Err(SynthesisError::EmptyOutput(engine)),
        Err(_) => Err(SynthesisError::NoOutput(engine)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_media::{CombineRequest, MediaError, MediaInfo, MediaResult, StreamFormat, TranscriptSegment};
    use reel_models::AspectRatio;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    /// Probes report a fixed duration, or fail when none is set.
    struct ProbeOnly(Option<f64>);

    #[async_trait]
    impl Transcoder for ProbeOnly {
        async fn probe(&self, path: &Path, _ctx: &JobContext) -> MediaResult<MediaInfo> {
            match self.0 {
                Some(duration) => Ok(MediaInfo {
                    duration,
                    size: 1,
                    video: None,
                    audio: None,
                }),
                None => Err(MediaError::ProbeFailed {
                    message: format!("unreadable {}", path.display()),
                    stderr: None,
                }),
            }
        }
        async fn crop_to_aspect(&self, _: &Path, _: &Path, _: AspectRatio, _: &JobContext) -> MediaResult<()> {
            Ok(())
        }
        async fn combine(&self, _: &CombineRequest, _: &JobContext) -> MediaResult<()> {
            Ok(())
        }
        async fn standardize(&self, _: &Path, _: &Path, _: &StreamFormat, _: &JobContext) -> MediaResult<()> {
            Ok(())
        }
        async fn join(&self, _: &[PathBuf], _: &Path, _: &JobContext) -> MediaResult<()> {
            Ok(())
        }
        async fn concat_audio(&self, _: &[PathBuf], _: &Path, _: &JobContext) -> MediaResult<()> {
            Ok(())
        }
        async fn transcribe(&self, _: &Path, _: &JobContext) -> MediaResult<Vec<TranscriptSegment>> {
            Ok(Vec::new())
        }
        async fn burn_subtitles(&self, _: &Path, _: &Path, _: &Path, _: &JobContext) -> MediaResult<()> {
            Ok(())
        }
    }

    /// Writes `body` on every call after `failures` failed calls.
    struct ScriptedEngine {
        id: TtsEngine,
        native_timing: bool,
        body: &'static [u8],
        failures: u32,
        calls: AtomicU32,
    }

    impl ScriptedEngine {
        fn new(id: TtsEngine, body: &'static [u8]) -> Self {
            Self {
                id,
                native_timing: true,
                body,
                failures: 0,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl VoiceEngine for ScriptedEngine {
        fn id(&self) -> TtsEngine {
            self.id
        }

        fn default_voice(&self) -> &str {
            "narrator"
        }

        fn has_native_timing(&self) -> bool {
            self.native_timing
        }

        async fn synthesize(
            &self,
            _text: &str,
            voice: &str,
            output: &Path,
            _ctx: &JobContext,
        ) -> Result<(), SynthesisError> {
            assert_eq!(voice, "narrator");
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(SynthesisError::engine(self.id, "temporary outage", true));
            }
            tokio::fs::write(output, self.body).await?;
            Ok(())
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::new(3).with_base_delay(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_probed_duration() {
        let dir = TempDir::new().unwrap();
        let synth = VoiceSynthesizer::new(Arc::new(ProbeOnly(Some(4.2))), fast_retry())
            .with_engine(Arc::new(ScriptedEngine::new(TtsEngine::EdgeTts, b"audio")));

        let narration = synth
            .synthesize("Hello there", TtsEngine::EdgeTts, None, dir.path(), &JobContext::background())
            .await
            .unwrap();
        assert_eq!(narration.duration, 4.2);
        assert!(!narration.estimated);
        assert!(narration.path.starts_with(dir.path()));
    }

    #[tokio::test]
    async fn test_transient_engine_failure_retried() {
        let dir = TempDir::new().unwrap();
        let engine = Arc::new(ScriptedEngine {
            failures: 2,
            ..ScriptedEngine::new(TtsEngine::EdgeTts, b"audio")
        });
        let synth = VoiceSynthesizer::new(Arc::new(ProbeOnly(Some(2.0))), fast_retry())
            .with_engine(engine.clone());

        synth
            .synthesize("Hi", TtsEngine::EdgeTts, Some("  "), dir.path(), &JobContext::background())
            .await
            .unwrap();
        assert_eq!(engine.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_zero_byte_output_fails() {
        let dir = TempDir::new().unwrap();
        let synth = VoiceSynthesizer::new(Arc::new(ProbeOnly(Some(2.0))), fast_retry())
            .with_engine(Arc::new(ScriptedEngine::new(TtsEngine::EdgeTts, b"")));

        let err = synth
            .synthesize("Hi", TtsEngine::EdgeTts, None, dir.path(), &JobContext::background())
            .await
            .unwrap_err();
        assert!(matches!(err, SynthesisError::EmptyOutput(TtsEngine::EdgeTts)));
    }

    #[tokio::test]
    async fn test_unregistered_engine() {
        let dir = TempDir::new().unwrap();
        let synth = VoiceSynthesizer::new(Arc::new(ProbeOnly(Some(2.0))), fast_retry());
        let err = synth
            .synthesize("Hi", TtsEngine::Kokoro, None, dir.path(), &JobContext::background())
            .await
            .unwrap_err();
        assert!(matches!(err, SynthesisError::EngineUnavailable(TtsEngine::Kokoro)));
    }

    #[test]
    fn test_resolve_voice_checks_registry() {
        let synth = VoiceSynthesizer::new(Arc::new(ProbeOnly(Some(2.0))), fast_retry())
            .with_engine(Arc::new(ScriptedEngine::new(TtsEngine::EdgeTts, b"audio")));

        assert_eq!(synth.resolve_voice(TtsEngine::EdgeTts, None).unwrap(), "narrator");
        assert_eq!(synth.resolve_voice(TtsEngine::EdgeTts, Some("  ")).unwrap(), "narrator");
        assert!(matches!(
            synth.resolve_voice(TtsEngine::Kokoro, Some("af_sky")),
            Err(SynthesisError::EngineUnavailable(TtsEngine::Kokoro))
        ));
    }

    #[tokio::test]
    async fn test_estimate_without_native_timing() {
        let dir = TempDir::new().unwrap();
        let engine = ScriptedEngine {
            native_timing: false,
            ..ScriptedEngine::new(TtsEngine::Kokoro, b"audio")
        };
        let synth = VoiceSynthesizer::new(Arc::new(ProbeOnly(None)), fast_retry())
            .with_engine(Arc::new(engine));

        let narration = synth
            .synthesize(
                "one two three four five",
                TtsEngine::Kokoro,
                None,
                dir.path(),
                &JobContext::background(),
            )
            .await
            .unwrap();
        assert!(narration.estimated);
        assert!((narration.duration - 2.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_probe_failure_with_native_timing_is_error() {
        let dir = TempDir::new().unwrap();
        let synth = VoiceSynthesizer::new(Arc::new(ProbeOnly(None)), fast_retry())
            .with_engine(Arc::new(ScriptedEngine::new(TtsEngine::EdgeTts, b"audio")));

        let err = synth
            .synthesize("Hi", TtsEngine::EdgeTts, None, dir.path(), &JobContext::background())
            .await
            .unwrap_err();
        assert!(matches!(err, SynthesisError::Media(MediaError::ProbeFailed { .. })));
    }

    #[test]
    fn test_estimate_duration_floor() {
        assert_eq!(estimate_duration(""), 1.0);
        assert_eq!(estimate_duration("a b c d e f g h i j"), 4.0);
    }
}
