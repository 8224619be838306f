//! Scripted video orchestration.
//!
//! A job moves through `Decomposing → RenderingScenes → Concatenating →
//! Captioning → Done`. Scenes render concurrently under a semaphore, each
//! with its own retry budget; the job fails once more than half of them
//! have failed for good.

use chrono::Utc;
use futures::future::join_all;
use reel_media::{
    move_file, remove_file_quietly, FfmpegTranscoder, JobContext, Transcoder, TranscoderConfig,
};
use reel_models::{JobId, PipelineOutput, RenderedScene, Scene, ScriptedVideoRequest};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::Instrument;

use crate::captions::CaptionOverlay;
use crate::concat::Concatenator;
use crate::config::{PipelineConfig, ProviderConfig, VoiceConfig};
use crate::dedup::DedupSet;
use crate::download::{HttpFetcher, MediaFetcher};
use crate::error::{PipelineError, PipelineFailure, PipelineResult, PipelineStage};
use crate::logging::JobLogger;
use crate::metrics;
use crate::providers::{build_http_client, PexelsProvider, PixabayProvider, StockMediaProvider};
use crate::resolver::{MediaResolver, PlaceholderOptions};
use crate::retry::{RetryResult, Retryable};
use crate::scene::{SceneRenderer, SceneSettings};
use crate::script;
use crate::tts::VoiceSynthesizer;
use crate::workspace::JobWorkspace;

/// External capabilities the pipeline is built from.
pub struct PipelineDeps {
    pub transcoder: Arc<dyn Transcoder>,
    pub synthesizer: Arc<VoiceSynthesizer>,
    pub resolver: Arc<MediaResolver>,
    pub fetcher: Arc<dyn MediaFetcher>,
}

impl PipelineDeps {
    /// FFmpeg, the built-in voice engines, Pexels then Pixabay, and HTTP
    /// downloads, all configured from the environment.
    pub fn from_env(config: &PipelineConfig) -> PipelineResult<Self> {
        let provider_config = ProviderConfig::from_env();
        let voice_config = VoiceConfig::from_env();
        let client = build_http_client(&provider_config)?;

        let transcoder: Arc<dyn Transcoder> =
            Arc::new(FfmpegTranscoder::new(TranscoderConfig::from_env()));
        let providers: Vec<Arc<dyn StockMediaProvider>> = vec![
            Arc::new(PexelsProvider::new(client.clone(), &provider_config)),
            Arc::new(PixabayProvider::new(client.clone(), &provider_config)),
        ];

        Ok(Self {
            synthesizer: Arc::new(VoiceSynthesizer::from_config(
                &voice_config,
                client.clone(),
                Arc::clone(&transcoder),
                config.synthesis_retry.clone(),
            )),
            resolver: Arc::new(MediaResolver::new(
                providers,
                config.provider_retry.clone(),
                config.keyword_limit,
            )),
            fetcher: Arc::new(HttpFetcher::new(client)),
            transcoder,
        })
    }
}

/// How one scene ended.
enum SceneOutcome {
    Rendered(RenderedScene),
    Failed { index: usize, error: PipelineError },
    /// Never started because the job had already failed too many scenes
    Skipped { index: usize },
}

/// Scenes that made it, plus those that did not, by index.
struct SceneBatch {
    rendered: Vec<RenderedScene>,
    failures: Vec<(usize, String)>,
}

/// Turns a script into a narrated, optionally captioned video.
pub struct ScriptedVideoPipeline {
    config: PipelineConfig,
    transcoder: Arc<dyn Transcoder>,
    synthesizer: Arc<VoiceSynthesizer>,
    renderer: SceneRenderer,
    concatenator: Concatenator,
    captions: CaptionOverlay,
}

impl ScriptedVideoPipeline {
    pub fn new(config: PipelineConfig, deps: PipelineDeps) -> Self {
        let renderer = SceneRenderer::new(
            Arc::clone(&deps.transcoder),
            Arc::clone(&deps.synthesizer),
            deps.resolver,
            deps.fetcher,
            config.download_retry.clone(),
            config.duration_tolerance,
        );
        Self {
            renderer,
            concatenator: Concatenator::new(
                Arc::clone(&deps.transcoder),
                config.concat_tolerance_per_scene,
            ),
            captions: CaptionOverlay::new(Arc::clone(&deps.transcoder), config.caption_min_segment),
            transcoder: deps.transcoder,
            synthesizer: deps.synthesizer,
            config,
        }
    }

    /// Pipeline with every setting and collaborator taken from the environment.
    pub fn from_env() -> PipelineResult<Self> {
        let config = PipelineConfig::from_env();
        let deps = PipelineDeps::from_env(&config)?;
        Ok(Self::new(config, deps))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run one job to completion.
    ///
    /// On success the video at `output.path` is the only file left behind
    /// and belongs to the caller. On failure nothing is left behind.
    pub async fn run(
        &self,
        job_id: &JobId,
        request: &ScriptedVideoRequest,
        logger: &JobLogger,
        ctx: &JobContext,
    ) -> Result<PipelineOutput, PipelineFailure> {
        let started = Instant::now();
        let result = self
            .execute(job_id, request, logger, ctx)
            .instrument(logger.create_span())
            .await;
        let elapsed = started.elapsed().as_secs_f64();

        match &result {
            Ok(output) => {
                metrics::record_pipeline("success", elapsed);
                logger.log_completion(&format!(
                    "{} scenes, {:.2}s video in {:.1}s",
                    output.scene_count, output.duration, elapsed
                ));
            }
            Err(failure) => {
                metrics::record_pipeline(failure.kind(), elapsed);
                logger.log_error(&failure.to_string());
            }
        }
        result
    }

    async fn execute(
        &self,
        job_id: &JobId,
        request: &ScriptedVideoRequest,
        logger: &JobLogger,
        ctx: &JobContext,
    ) -> Result<PipelineOutput, PipelineFailure> {
        let decomposing = |e: PipelineError| PipelineFailure::new(PipelineStage::Decomposing, e);

        logger.log_stage(PipelineStage::Decomposing);
        request.check().map_err(|e| decomposing(e.into()))?;
        // Checked once here, since every scene would fail the same way
        self.synthesizer
            .resolve_voice(request.tts_engine, request.voice.as_deref())
            .map_err(|e| decomposing(PipelineError::validation(e.to_string())))?;
        let scenes = script::decompose(&request.script).map_err(decomposing)?;
        let custom_media = request
            .custom_media_map(scenes.len())
            .map_err(|e| decomposing(e.into()))?;
        logger.log_start(&format!(
            "{} scenes, engine {}, aspect {}",
            scenes.len(),
            request.tts_engine,
            request.aspect_ratio
        ));

        let workspace = JobWorkspace::create(&self.config.storage_dir, job_id)
            .await
            .map_err(decomposing)?;

        let result = self
            .produce(job_id, &workspace, &scenes, &custom_media, request, logger, ctx)
            .await;
        workspace.cleanup().await;
        if result.is_err() {
            workspace.discard().await;
        }
        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn produce(
        &self,
        job_id: &JobId,
        workspace: &JobWorkspace,
        scenes: &[Scene],
        custom_media: &HashMap<usize, String>,
        request: &ScriptedVideoRequest,
        logger: &JobLogger,
        ctx: &JobContext,
    ) -> Result<PipelineOutput, PipelineFailure> {
        let batch = self
            .render_scenes(workspace, scenes, custom_media, request, logger, ctx)
            .await
            .map_err(|e| PipelineFailure::new(PipelineStage::RenderingScenes, e))?;

        let concatenating = |e: PipelineError| PipelineFailure::new(PipelineStage::Concatenating, e);
        logger.log_stage(PipelineStage::Concatenating);
        logger.log_progress(&format!("Joining {} scenes", batch.rendered.len()));
        let inputs: Vec<PathBuf> = batch.rendered.iter().map(|s| s.path.clone()).collect();
        let joined = workspace.job_dir().join("joined.mp4");
        let joined_info = self
            .concatenator
            .concatenate(&inputs, &joined, &workspace.job_dir().join("standardize"), ctx)
            .await
            .map_err(concatenating)?;
        for input in &inputs {
            remove_file_quietly(input).await;
        }

        let mut artifact = joined;
        let mut duration = joined_info.duration;
        let mut captioned = false;
        if request.add_captions {
            logger.log_stage(PipelineStage::Captioning);
            let output = workspace.job_dir().join("captioned.mp4");
            let texts: Vec<String> = captioned_texts(scenes, &batch.rendered);
            match self
                .captions
                .overlay(&artifact, &texts, &request.caption_settings, &output, workspace.job_dir(), ctx)
                .await
            {
                Ok(_) => {
                    remove_file_quietly(&artifact).await;
                    if let Ok(info) = self.transcoder.probe(&output, ctx).await {
                        duration = info.duration;
                    }
                    artifact = output;
                    captioned = true;
                }
                Err(e) if e.is_interruption() => {
                    return Err(PipelineFailure::new(PipelineStage::Captioning, e));
                }
                Err(e) => {
                    logger.log_warning(&format!("Captions skipped, returning uncaptioned video: {e}"));
                    metrics::record_caption_degraded();
                }
            }
        }

        let final_stage = if request.add_captions {
            PipelineStage::Captioning
        } else {
            PipelineStage::Concatenating
        };
        move_file(&artifact, workspace.final_path())
            .await
            .map_err(|e| PipelineFailure::new(final_stage, e.into()))?;

        let mut failed_scenes: Vec<usize> = batch.failures.iter().map(|(i, _)| *i).collect();
        failed_scenes.sort_unstable();
        logger.log_stage(PipelineStage::Done);
        Ok(PipelineOutput {
            job_id: job_id.clone(),
            path: workspace.final_path().to_path_buf(),
            duration,
            scene_count: batch.rendered.len(),
            failed_scenes,
            captioned,
            estimated_timing: batch.rendered.iter().any(|s| s.duration_estimated),
            completed_at: Utc::now(),
        })
    }

    /// Render every scene under the concurrency bound and apply the
    /// failure threshold.
    async fn render_scenes(
        &self,
        workspace: &JobWorkspace,
        scenes: &[Scene],
        custom_media: &HashMap<usize, String>,
        request: &ScriptedVideoRequest,
        logger: &JobLogger,
        ctx: &JobContext,
    ) -> PipelineResult<SceneBatch> {
        let total = scenes.len();
        let limit = self.config.scene_parallelism(total);
        logger.log_stage(PipelineStage::RenderingScenes);
        logger.log_progress(&format!("Rendering {total} scenes, {limit} at a time"));

        let semaphore = Semaphore::new(limit);
        let dedup = DedupSet::new();
        let failed = AtomicUsize::new(0);
        let halted = AtomicBool::new(false);
        let settings = SceneSettings {
            engine: request.tts_engine,
            voice: request.voice.clone(),
            aspect_ratio: request.aspect_ratio,
            placeholders: PlaceholderOptions {
                allow: request.use_placeholder,
                custom_url: request.placeholder_url.clone(),
                default_path: self.config.default_placeholder.clone(),
            },
        };

        let tasks = scenes.iter().map(|scene| {
            let semaphore = &semaphore;
            let dedup = &dedup;
            let failed = &failed;
            let halted = &halted;
            let settings = &settings;
            let custom_url = custom_media.get(&scene.index).map(String::as_str);
            let scene_dir = workspace.scene_dir(scene.index);

            async move {
                let Ok(_permit) = semaphore.acquire().await else {
                    return SceneOutcome::Skipped { index: scene.index };
                };
                if halted.load(Ordering::SeqCst) || ctx.is_cancelled() {
                    return SceneOutcome::Skipped { index: scene.index };
                }

                let attempts = AtomicU32::new(0);
                let result = self
                    .config
                    .scene_retry
                    .run_if(
                        "scene_render",
                        ctx,
                        || {
                            let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                            logger.log_scene_started(scene.index, attempt);
                            self.renderer
                                .render(scene, custom_url, settings, dedup, &scene_dir, ctx)
                        },
                        |e: &PipelineError| e.is_retryable() && !halted.load(Ordering::SeqCst),
                    )
                    .await;

                match result {
                    RetryResult::Success(rendered) => {
                        metrics::record_scene_rendered(rendered.tier.as_str());
                        logger.log_scene_completed(scene.index, rendered.duration, rendered.tier.as_str());
                        SceneOutcome::Rendered(rendered)
                    }
                    RetryResult::Failed { error, attempts } => {
                        metrics::record_scene_failed();
                        logger.log_scene_failed(scene.index, attempts, &error.to_string());
                        let failed_so_far = failed.fetch_add(1, Ordering::SeqCst) + 1;
                        if failed_so_far * 2 > total {
                            halted.store(true, Ordering::SeqCst);
                        }
                        SceneOutcome::Failed {
                            index: scene.index,
                            error,
                        }
                    }
                }
            }
            .instrument(logger.scene_span(scene.index))
        });

        let outcomes = join_all(tasks).await;
        ctx.check()?;

        let mut rendered = Vec::with_capacity(total);
        let mut failures = Vec::new();
        for outcome in outcomes {
            match outcome {
                SceneOutcome::Rendered(scene) => rendered.push(scene),
                SceneOutcome::Failed { index, error } => failures.push((index, error.to_string())),
                SceneOutcome::Skipped { index } => {
                    failures.push((index, "not started after too many scene failures".to_string()))
                }
            }
        }
        rendered.sort_by_key(|s| s.index);
        failures.sort_by_key(|(index, _)| *index);

        if failures.len() * 2 > total {
            for scene in &rendered {
                remove_file_quietly(&scene.path).await;
            }
            return Err(PipelineError::TooManyFailedScenes {
                failed: failures.len(),
                total,
                failures,
            });
        }
        if !failures.is_empty() {
            logger.log_warning(&format!(
                "{} of {total} scenes failed, continuing with the rest",
                failures.len()
            ));
        }

        Ok(SceneBatch { rendered, failures })
    }
}

/// Texts of the scenes that made it into the video, in order.
fn captioned_texts(scenes: &[Scene], rendered: &[RenderedScene]) -> Vec<String> {
    rendered
        .iter()
        .filter_map(|r| scenes.iter().find(|s| s.index == r.index))
        .map(|s| s.text.clone())
        .collect()
}
