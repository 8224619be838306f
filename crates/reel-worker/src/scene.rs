//! Rendering of one scene: narration, visual, crop, mux.

use reel_media::{remove_dir_quietly, remove_file_quietly, CombineRequest, JobContext, Transcoder};
use reel_models::{AspectRatio, MediaCandidate, MediaTier, RenderedScene, Scene, TtsEngine};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::dedup::DedupSet;
use crate::download::MediaFetcher;
use crate::error::{PipelineError, PipelineResult};
use crate::metrics;
use crate::resolver::{MediaResolver, PlaceholderOptions};
use crate::retry::RetryPolicy;
use crate::tts::VoiceSynthesizer;

/// Spoken in place of a scene whose text is blank.
pub const BLANK_SCENE_NARRATION: &str = "This scene has no narration.";

/// Name of the finished clip inside a scene directory.
pub const SCENE_OUTPUT_NAME: &str = "scene_final.mp4";

/// Job-wide options every scene is rendered with.
#[derive(Debug, Clone)]
pub struct SceneSettings {
    pub engine: TtsEngine,
    pub voice: Option<String>,
    pub aspect_ratio: AspectRatio,
    pub placeholders: PlaceholderOptions,
}

/// A cropped clip ready to be combined with narration.
struct PreparedVisual {
    path: PathBuf,
    duration: f64,
    tier: MediaTier,
}

/// Produces one validated clip per scene.
pub struct SceneRenderer {
    transcoder: Arc<dyn Transcoder>,
    synthesizer: Arc<VoiceSynthesizer>,
    resolver: Arc<MediaResolver>,
    fetcher: Arc<dyn MediaFetcher>,
    download_retry: RetryPolicy,
    duration_tolerance: f64,
}

impl SceneRenderer {
    pub fn new(
        transcoder: Arc<dyn Transcoder>,
        synthesizer: Arc<VoiceSynthesizer>,
        resolver: Arc<MediaResolver>,
        fetcher: Arc<dyn MediaFetcher>,
        download_retry: RetryPolicy,
        duration_tolerance: f64,
    ) -> Self {
        Self {
            transcoder,
            synthesizer,
            resolver,
            fetcher,
            download_retry,
            duration_tolerance,
        }
    }

    /// Render `scene` into `scene_dir`.
    ///
    /// The directory is reset first, so a retried render starts clean. On
    /// success only the final clip remains in it; on failure nothing does.
    pub async fn render(
        &self,
        scene: &Scene,
        custom_url: Option<&str>,
        settings: &SceneSettings,
        dedup: &DedupSet,
        scene_dir: &Path,
        ctx: &JobContext,
    ) -> PipelineResult<RenderedScene> {
        ctx.check()?;
        remove_dir_quietly(scene_dir).await;
        tokio::fs::create_dir_all(scene_dir).await?;

        let result = self
            .render_in(scene, custom_url, settings, dedup, scene_dir, ctx)
            .await;
        match result {
            Ok(rendered) => {
                clear_dir_except(scene_dir, &rendered.path).await;
                Ok(rendered)
            }
            Err(e) => {
                remove_dir_quietly(scene_dir).await;
                Err(PipelineError::scene(scene.index, e))
            }
        }
    }

    async fn render_in(
        &self,
        scene: &Scene,
        custom_url: Option<&str>,
        settings: &SceneSettings,
        dedup: &DedupSet,
        scene_dir: &Path,
        ctx: &JobContext,
    ) -> PipelineResult<RenderedScene> {
        let text = match scene.text.trim() {
            "" => {
                debug!(scene = scene.index, "Blank scene text, using stand-in narration");
                BLANK_SCENE_NARRATION
            }
            text => text,
        };

        let narration = self
            .synthesizer
            .synthesize(text, settings.engine, settings.voice.as_deref(), scene_dir, ctx)
            .await?;
        debug!(scene = scene.index, duration = narration.duration, "Narration synthesized");

        let candidate = self
            .resolver
            .resolve(
                scene.index,
                text,
                custom_url,
                settings.aspect_ratio.orientation(),
                dedup,
                &settings.placeholders,
                ctx,
            )
            .await?;

        let visual = self
            .prepare_visual(scene.index, candidate, settings, scene_dir, ctx)
            .await?;

        let output = scene_dir.join(SCENE_OUTPUT_NAME);
        let request = CombineRequest {
            video: visual.path.clone(),
            video_duration: visual.duration,
            audio: narration.path.clone(),
            audio_duration: narration.duration,
            output: output.clone(),
            work_dir: scene_dir.to_path_buf(),
        };
        self.transcoder.combine(&request, ctx).await?;

        let info = self.transcoder.validate_video(&output, ctx).await?;
        let rendered = RenderedScene {
            index: scene.index,
            path: output,
            duration: info.duration,
            narration_duration: narration.duration,
            duration_estimated: narration.estimated,
            tier: visual.tier,
        };

        let drift = rendered.drift();
        metrics::record_duration_drift(drift);
        if drift > self.duration_tolerance {
            warn!(
                scene = scene.index,
                clip_duration = rendered.duration,
                narration_duration = rendered.narration_duration,
                drift,
                "Scene duration drifted from narration"
            );
        }

        remove_file_quietly(&visual.path).await;
        remove_file_quietly(&narration.path).await;
        debug!(scene = scene.index, duration = rendered.duration, "Scene clip validated");
        Ok(rendered)
    }

    /// Acquire, validate and crop the resolved visual, falling back to the
    /// default placeholder when the source turns out unusable.
    async fn prepare_visual(
        &self,
        index: usize,
        candidate: MediaCandidate,
        settings: &SceneSettings,
        scene_dir: &Path,
        ctx: &JobContext,
    ) -> PipelineResult<PreparedVisual> {
        let mut candidate = candidate;
        loop {
            match self
                .try_visual(&candidate, settings.aspect_ratio, scene_dir, ctx)
                .await
            {
                Ok(visual) => return Ok(visual),
                Err(e) if e.is_interruption() => return Err(e),
                Err(e) => {
                    if candidate.tier == MediaTier::DefaultPlaceholder {
                        return Err(e);
                    }
                    let Some(fallback) = settings.placeholders.default_candidate().await else {
                        return Err(e);
                    };
                    warn!(
                        scene = index,
                        tier = candidate.tier.as_str(),
                        error = %e,
                        "Visual source unusable, falling back to default placeholder"
                    );
                    metrics::record_media_tier(fallback.tier.as_str());
                    candidate = fallback;
                }
            }
        }
    }

    async fn try_visual(
        &self,
        candidate: &MediaCandidate,
        aspect_ratio: AspectRatio,
        scene_dir: &Path,
        ctx: &JobContext,
    ) -> PipelineResult<PreparedVisual> {
        let raw = scene_dir.join("source_raw");
        let cropped = scene_dir.join("source_cropped.mp4");

        let result = async {
            self.acquire(candidate, &raw, ctx).await?;
            self.transcoder.validate_video(&raw, ctx).await?;
            self.transcoder
                .crop_to_aspect(&raw, &cropped, aspect_ratio, ctx)
                .await?;
            let info = self.transcoder.validate_video(&cropped, ctx).await?;
            Ok::<_, PipelineError>(info.duration)
        }
        .await;

        remove_file_quietly(&raw).await;
        match result {
            Ok(duration) => Ok(PreparedVisual {
                path: cropped,
                duration,
                tier: candidate.tier,
            }),
            Err(e) => {
                remove_file_quietly(&cropped).await;
                Err(e)
            }
        }
    }

    /// Copy a local placeholder or download a remote source to `dest`.
    async fn acquire(
        &self,
        candidate: &MediaCandidate,
        dest: &Path,
        ctx: &JobContext,
    ) -> PipelineResult<()> {
        if candidate.is_remote() {
            self.download_retry
                .run("download", ctx, || self.fetcher.fetch(&candidate.url, dest, ctx))
                .await
                .into_result()?;
        } else {
            tokio::fs::copy(&candidate.url, dest).await?;
        }
        Ok(())
    }
}

/// Delete every entry of `dir` other than `keep`.
async fn clear_dir_except(dir: &Path, keep: &Path) {
    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if path == keep {
            continue;
        }
        match entry.file_type().await {
            Ok(t) if t.is_dir() => remove_dir_quietly(&path).await,
            _ => remove_file_quietly(&path).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use reel_media::{MediaError, MediaInfo, MediaResult, StreamFormat, TranscriptSegment, VideoStream};
    use reel_models::Orientation;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    use crate::error::{ProviderError, SynthesisError};
    use crate::providers::StockMediaProvider;
    use crate::tts::VoiceEngine;

    const NARRATION_SECS: f64 = 2.0;

    /// Reports durations by file name; the muxed clip runs `mux_drift` long.
    struct NamedMedia {
        mux_drift: f64,
    }

    #[async_trait]
    impl Transcoder for NamedMedia {
        async fn probe(&self, path: &Path, _ctx: &JobContext) -> MediaResult<MediaInfo> {
            if !path.exists() {
                return Err(MediaError::FileNotFound(path.to_path_buf()));
            }
            let name = path.file_name().unwrap_or_default().to_string_lossy();
            let video = Some(VideoStream {
                width: 1920,
                height: 1080,
                codec: "h264".to_string(),
                pix_fmt: "yuv420p".to_string(),
                fps: 30.0,
            });
            let info = match name.as_ref() {
                "narration.mp3" => MediaInfo {
                    duration: NARRATION_SECS,
                    size: 5,
                    video: None,
                    audio: None,
                },
                SCENE_OUTPUT_NAME => MediaInfo {
                    duration: NARRATION_SECS + self.mux_drift,
                    size: 5,
                    video,
                    audio: None,
                },
                _ => MediaInfo {
                    duration: 6.0,
                    size: 5,
                    video,
                    audio: None,
                },
            };
            Ok(info)
        }
        async fn crop_to_aspect(&self, _: &Path, output: &Path, _: AspectRatio, _: &JobContext) -> MediaResult<()> {
            tokio::fs::write(output, b"cropped").await?;
            Ok(())
        }
        async fn combine(&self, request: &CombineRequest, _: &JobContext) -> MediaResult<()> {
            tokio::fs::write(&request.output, b"muxed").await?;
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

    #[derive(Default)]
    struct RecordingEngine {
        texts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl VoiceEngine for RecordingEngine {
        fn id(&self) -> TtsEngine {
            TtsEngine::EdgeTts
        }
        fn default_voice(&self) -> &str {
            "narrator"
        }
        async fn synthesize(
            &self,
            text: &str,
            _voice: &str,
            output: &Path,
            _ctx: &JobContext,
        ) -> Result<(), SynthesisError> {
            self.texts.lock().unwrap().push(text.to_string());
            tokio::fs::write(output, b"audio").await?;
            Ok(())
        }
    }

    struct NoSearch;

    #[async_trait]
    impl StockMediaProvider for NoSearch {
        fn name(&self) -> &str {
            "none"
        }
        async fn search(&self, _: &str, _: Orientation, _: &JobContext) -> Result<Vec<String>, ProviderError> {
            Ok(Vec::new())
        }
    }

    struct NoFetch;

    #[async_trait]
    impl MediaFetcher for NoFetch {
        async fn fetch(&self, url: &str, _: &Path, _: &JobContext) -> Result<(), ProviderError> {
            Err(ProviderError::UnsupportedSource(url.to_string()))
        }
    }

    fn renderer(mux_drift: f64, engine: Arc<RecordingEngine>) -> SceneRenderer {
        let transcoder: Arc<dyn Transcoder> = Arc::new(NamedMedia { mux_drift });
        let retry = RetryPolicy::new(1).with_base_delay(Duration::from_millis(1));
        let synthesizer =
            VoiceSynthesizer::new(Arc::clone(&transcoder), retry.clone()).with_engine(engine);
        let providers: Vec<Arc<dyn StockMediaProvider>> = vec![Arc::new(NoSearch)];
        let resolver = MediaResolver::new(providers, retry.clone(), 5);
        SceneRenderer::new(
            transcoder,
            Arc::new(synthesizer),
            Arc::new(resolver),
            Arc::new(NoFetch),
            retry,
            1.0,
        )
    }

    fn settings(placeholder: PathBuf) -> SceneSettings {
        SceneSettings {
            engine: TtsEngine::EdgeTts,
            voice: None,
            aspect_ratio: AspectRatio::Landscape,
            placeholders: PlaceholderOptions {
                allow: true,
                custom_url: None,
                default_path: placeholder,
            },
        }
    }

    fn placeholder(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("placeholder.mp4");
        std::fs::write(&path, b"placeholder").unwrap();
        path
    }

    #[tokio::test]
    async fn test_duration_drift_is_logged_not_fatal() {
        let dir = TempDir::new().unwrap();
        let engine = Arc::new(RecordingEngine::default());
        let scene_dir = dir.path().join("scene_0");
        let scene = Scene {
            index: 0,
            text: "Rockets launch into space".to_string(),
        };

        let rendered = renderer(1.5, engine)
            .render(
                &scene,
                None,
                &settings(placeholder(&dir)),
                &DedupSet::new(),
                &scene_dir,
                &JobContext::background(),
            )
            .await
            .unwrap();

        assert!(rendered.drift() > 1.0);
        assert_eq!(rendered.narration_duration, NARRATION_SECS);
        assert_eq!(rendered.tier, MediaTier::DefaultPlaceholder);
        let left: Vec<_> = std::fs::read_dir(&scene_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(left, vec![std::ffi::OsString::from(SCENE_OUTPUT_NAME)]);
    }

    #[tokio::test]
    async fn test_blank_scene_gets_stand_in_narration() {
        let dir = TempDir::new().unwrap();
        let engine = Arc::new(RecordingEngine::default());
        let scene = Scene {
            index: 3,
            text: "   ".to_string(),
        };

        renderer(0.0, Arc::clone(&engine))
            .render(
                &scene,
                None,
                &settings(placeholder(&dir)),
                &DedupSet::new(),
                &dir.path().join("scene_3"),
                &JobContext::background(),
            )
            .await
            .unwrap();

        assert_eq!(*engine.texts.lock().unwrap(), vec![BLANK_SCENE_NARRATION.to_string()]);
    }

    #[tokio::test]
    async fn test_failed_render_removes_scene_dir() {
        let dir = TempDir::new().unwrap();
        let scene_dir = dir.path().join("scene_1");
        let scene = Scene {
            index: 1,
            text: "Glaciers carve valleys".to_string(),
        };

        let err = renderer(0.0, Arc::new(RecordingEngine::default()))
            .render(
                &scene,
                None,
                &settings(dir.path().join("missing.mp4")),
                &DedupSet::new(),
                &scene_dir,
                &JobContext::background(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::SceneRender { index: 1, .. }));
        assert!(!scene_dir.exists());
    }
}
