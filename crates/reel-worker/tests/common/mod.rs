//! In-process fakes for pipeline tests.
//!
//! Fake media files describe themselves, e.g.
//! `dur=3.5;w=1920;h=1080;codec=h264;pix=yuv420p`, so the fake transcoder
//! can "probe" and "encode" without FFmpeg.

#![allow(dead_code)]

use async_trait::async_trait;
use reel_media::{
    AudioStream, CombineRequest, JobContext, MediaError, MediaInfo, MediaResult, StreamFormat,
    Transcoder, TranscriptSegment, VideoStream,
};
use reel_models::{AspectRatio, JobId, Orientation, PipelineOutput, ScriptedVideoRequest, TtsEngine};
use reel_worker::{
    JobLogger, MediaFetcher, MediaResolver, PipelineConfig, PipelineDeps, PipelineFailure,
    ProviderError, RetryPolicy, ScriptedVideoPipeline, StockMediaProvider, SynthesisError,
    VoiceEngine, VoiceSynthesizer,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

// =============================================================================
// Self-describing media
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct FakeMedia {
    pub duration: f64,
    pub format: Option<StreamFormat>,
    pub audio: bool,
}

impl FakeMedia {
    pub fn video(duration: f64, width: u32, height: u32) -> Self {
        Self {
            duration,
            format: Some(StreamFormat {
                width,
                height,
                codec: "h264".to_string(),
                pix_fmt: "yuv420p".to_string(),
            }),
            audio: false,
        }
    }

    pub fn audio(duration: f64) -> Self {
        Self {
            duration,
            format: None,
            audio: true,
        }
    }

    pub fn with_codec(mut self, codec: &str, pix_fmt: &str) -> Self {
        if let Some(format) = &mut self.format {
            format.codec = codec.to_string();
            format.pix_fmt = pix_fmt.to_string();
        }
        self
    }

    pub fn encode(&self) -> String {
        let mut out = format!("dur={:.3}", self.duration);
        if let Some(f) = &self.format {
            out.push_str(&format!(";w={};h={};codec={};pix={}", f.width, f.height, f.codec, f.pix_fmt));
        }
        if self.audio {
            out.push_str(";audio=aac");
        }
        out
    }

    pub fn decode(body: &str) -> Option<Self> {
        let fields: HashMap<&str, &str> = body
            .trim()
            .split(';')
            .filter_map(|kv| kv.split_once('='))
            .collect();
        let duration = fields.get("dur")?.parse().ok()?;
        let format = match (fields.get("w"), fields.get("h")) {
            (Some(w), Some(h)) => Some(StreamFormat {
                width: w.parse().ok()?,
                height: h.parse().ok()?,
                codec: fields.get("codec").unwrap_or(&"h264").to_string(),
                pix_fmt: fields.get("pix").unwrap_or(&"yuv420p").to_string(),
            }),
            _ => None,
        };
        Some(Self {
            duration,
            format,
            audio: fields.contains_key("audio"),
        })
    }

    pub fn write(&self, path: &Path) {
        std::fs::write(path, self.encode()).unwrap();
    }

    pub fn read(path: &Path) -> Option<Self> {
        Self::decode(&std::fs::read_to_string(path).ok()?)
    }
}

async fn read_media(path: &Path) -> MediaResult<FakeMedia> {
    let body = tokio::fs::read_to_string(path)
        .await
        .map_err(|_| MediaError::FileNotFound(path.to_path_buf()))?;
    FakeMedia::decode(&body).ok_or_else(|| MediaError::ProbeFailed {
        message: format!("unreadable media {}", path.display()),
        stderr: None,
    })
}

async fn write_media(path: &Path, media: &FakeMedia) -> MediaResult<()> {
    tokio::fs::write(path, media.encode()).await?;
    Ok(())
}

// =============================================================================
// Transcoder
// =============================================================================

#[derive(Default)]
pub struct TranscoderState {
    pub joins: Vec<Vec<PathBuf>>,
    pub standardized: Vec<PathBuf>,
    pub subtitles: Vec<String>,
}

/// Transcoder over self-describing files.
#[derive(Default)]
pub struct FakeTranscoder {
    pub state: Mutex<TranscoderState>,
    pub transcript: Option<Vec<TranscriptSegment>>,
    pub fail_burn: bool,
    /// Seconds lost by every join
    pub join_loss: f64,
}

impl FakeTranscoder {
    pub fn joins(&self) -> Vec<Vec<PathBuf>> {
        self.state.lock().unwrap().joins.clone()
    }

    pub fn subtitles(&self) -> Vec<String> {
        self.state.lock().unwrap().subtitles.clone()
    }

    pub fn standardized(&self) -> Vec<PathBuf> {
        self.state.lock().unwrap().standardized.clone()
    }
}

#[async_trait]
impl Transcoder for FakeTranscoder {
    async fn probe(&self, path: &Path, ctx: &JobContext) -> MediaResult<MediaInfo> {
        ctx.check()?;
        let media = read_media(path).await?;
        let size = tokio::fs::metadata(path).await?.len();
        Ok(MediaInfo {
            duration: media.duration,
            size,
            video: media.format.map(|f| VideoStream {
                width: f.width,
                height: f.height,
                codec: f.codec,
                pix_fmt: f.pix_fmt,
                fps: 30.0,
            }),
            audio: media.audio.then(|| AudioStream {
                codec: "aac".to_string(),
                sample_rate: 44100,
                channels: 2,
            }),
        })
    }

    async fn crop_to_aspect(
        &self,
        input: &Path,
        output: &Path,
        target: AspectRatio,
        ctx: &JobContext,
    ) -> MediaResult<()> {
        ctx.check()?;
        let source = read_media(input).await?;
        if source.format.is_none() {
            return Err(MediaError::invalid_video("no video stream"));
        }
        let (w, h) = target.resolution();
        write_media(output, &FakeMedia::video(source.duration, w, h)).await
    }

    async fn combine(&self, request: &CombineRequest, ctx: &JobContext) -> MediaResult<()> {
        ctx.check()?;
        let video = read_media(&request.video).await?;
        let mut muxed = FakeMedia {
            duration: request.audio_duration,
            ..video
        };
        muxed.audio = true;
        write_media(&request.output, &muxed).await
    }

    async fn standardize(
        &self,
        input: &Path,
        output: &Path,
        target: &StreamFormat,
        ctx: &JobContext,
    ) -> MediaResult<()> {
        ctx.check()?;
        let source = read_media(input).await?;
        self.state.lock().unwrap().standardized.push(input.to_path_buf());
        let media = FakeMedia {
            format: Some(target.clone()),
            audio: true,
            ..source
        };
        write_media(output, &media).await
    }

    async fn join(&self, inputs: &[PathBuf], output: &Path, ctx: &JobContext) -> MediaResult<()> {
        ctx.check()?;
        let mut total = 0.0;
        let mut first: Option<FakeMedia> = None;
        for input in inputs {
            let media = read_media(input).await?;
            total += media.duration;
            if let Some(first) = &first {
                if first.format != media.format {
                    return Err(MediaError::command_failed("ffmpeg", "mixed formats", None, Some(1)));
                }
            } else {
                first = Some(media);
            }
        }
        self.state.lock().unwrap().joins.push(inputs.to_vec());
        let Some(first) = first else {
            return Err(MediaError::internal("nothing to join"));
        };
        let joined = FakeMedia {
            duration: total - self.join_loss,
            ..first
        };
        write_media(output, &joined).await
    }

    async fn concat_audio(&self, inputs: &[PathBuf], output: &Path, ctx: &JobContext) -> MediaResult<()> {
        ctx.check()?;
        let mut total = 0.0;
        for input in inputs {
            total += read_media(input).await?.duration;
        }
        write_media(output, &FakeMedia::audio(total)).await
    }

    async fn transcribe(&self, _input: &Path, ctx: &JobContext) -> MediaResult<Vec<TranscriptSegment>> {
        ctx.check()?;
        self.transcript
            .clone()
            .ok_or_else(|| MediaError::TranscriptionFailed("whisper unavailable".to_string()))
    }

    async fn burn_subtitles(
        &self,
        input: &Path,
        subtitles: &Path,
        output: &Path,
        ctx: &JobContext,
    ) -> MediaResult<()> {
        ctx.check()?;
        if self.fail_burn {
            return Err(MediaError::command_failed("ffmpeg", "ass filter missing", None, Some(1)));
        }
        let document = tokio::fs::read_to_string(subtitles).await?;
        self.state.lock().unwrap().subtitles.push(document);
        tokio::fs::copy(input, output).await?;
        Ok(())
    }
}

// =============================================================================
// Voice engine
// =============================================================================

/// Narration of 0.4s per word (at least 1s). Texts containing `FAIL` always
/// fail with a retryable error; the voice `Nobody` does not exist.
#[derive(Default)]
pub struct FakeVoiceEngine {
    pub delay: Duration,
    pub texts: Mutex<Vec<String>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl FakeVoiceEngine {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn narration_duration(text: &str) -> f64 {
        (text.split_whitespace().count() as f64 * 0.4).max(1.0)
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }
}

#[async_trait]
impl VoiceEngine for FakeVoiceEngine {
    fn id(&self) -> TtsEngine {
        TtsEngine::EdgeTts
    }

    fn default_voice(&self) -> &str {
        "fake-voice"
    }

    fn resolve_voice(&self, voice: Option<&str>) -> Result<String, SynthesisError> {
        match voice.map(str::trim).filter(|v| !v.is_empty()) {
            Some("Nobody") => Err(SynthesisError::InvalidVoice {
                engine: TtsEngine::EdgeTts,
                voice: "Nobody".to_string(),
            }),
            Some(v) => Ok(v.to_string()),
            None => Ok(self.default_voice().to_string()),
        }
    }

    async fn synthesize(
        &self,
        text: &str,
        _voice: &str,
        output: &Path,
        _ctx: &JobContext,
    ) -> Result<(), SynthesisError> {
        self.texts.lock().unwrap().push(text.to_string());
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        // Earlier scenes (shorter texts in these tests) finish later
        let words = text.split_whitespace().count() as u32;
        tokio::time::sleep(self.delay * 10 / words.max(1)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);

        if text.contains("FAIL") {
            return Err(SynthesisError::engine(TtsEngine::EdgeTts, "engine exploded", true));
        }
        tokio::fs::write(output, FakeMedia::audio(Self::narration_duration(text)).encode()).await?;
        Ok(())
    }
}

// =============================================================================
// Stock provider and fetcher
// =============================================================================

/// Returns `per_query` URLs derived from each query.
pub struct FakeProvider {
    pub per_query: usize,
    pub queries: Mutex<Vec<String>>,
}

impl FakeProvider {
    pub fn new(per_query: usize) -> Self {
        Self {
            per_query,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl StockMediaProvider for FakeProvider {
    fn name(&self) -> &str {
        "fake-stock"
    }

    async fn search(
        &self,
        query: &str,
        _orientation: Orientation,
        _ctx: &JobContext,
    ) -> Result<Vec<String>, ProviderError> {
        self.queries.lock().unwrap().push(query.to_string());
        let slug = query.replace(' ', "-");
        Ok((0..self.per_query)
            .map(|i| format!("https://stock.test/{slug}-{i}.mp4"))
            .collect())
    }
}

/// Writes a 6s 1280x720 clip for every URL, or garbage when `corrupt`.
#[derive(Default)]
pub struct FakeFetcher {
    pub corrupt: bool,
    pub urls: Mutex<Vec<String>>,
}

impl FakeFetcher {
    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaFetcher for FakeFetcher {
    async fn fetch(&self, url: &str, dest: &Path, _ctx: &JobContext) -> Result<(), ProviderError> {
        self.urls.lock().unwrap().push(url.to_string());
        let body = if self.corrupt {
            "not a video".to_string()
        } else {
            FakeMedia::video(6.0, 1280, 720).encode()
        };
        tokio::fs::write(dest, body).await?;
        Ok(())
    }
}

// =============================================================================
// Harness
// =============================================================================

pub fn fast_retry(attempts: u32) -> RetryPolicy {
    RetryPolicy::new(attempts)
        .with_base_delay(Duration::from_millis(1))
        .with_max_delay(Duration::from_millis(5))
}

pub fn test_config(root: &Path) -> PipelineConfig {
    PipelineConfig {
        storage_dir: root.to_path_buf(),
        default_placeholder: root.join("assets").join("placeholder.mp4"),
        scene_retry: fast_retry(3),
        provider_retry: fast_retry(2),
        download_retry: fast_retry(2),
        synthesis_retry: fast_retry(1),
        ..PipelineConfig::default()
    }
}

pub struct Harness {
    pub root: TempDir,
    pub transcoder: Arc<FakeTranscoder>,
    pub engine: Arc<FakeVoiceEngine>,
    pub provider: Arc<FakeProvider>,
    pub fetcher: Arc<FakeFetcher>,
    pub pipeline: ScriptedVideoPipeline,
}

pub struct HarnessBuilder {
    transcoder: FakeTranscoder,
    engine: FakeVoiceEngine,
    fetcher: FakeFetcher,
    per_query: usize,
    configure: Box<dyn FnOnce(&mut PipelineConfig)>,
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self {
            transcoder: FakeTranscoder::default(),
            engine: FakeVoiceEngine::with_delay(Duration::from_millis(2)),
            fetcher: FakeFetcher::default(),
            per_query: 3,
            configure: Box::new(|_| {}),
        }
    }
}

impl HarnessBuilder {
    pub fn transcoder(mut self, transcoder: FakeTranscoder) -> Self {
        self.transcoder = transcoder;
        self
    }

    pub fn engine(mut self, engine: FakeVoiceEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn fetcher(mut self, fetcher: FakeFetcher) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn per_query(mut self, per_query: usize) -> Self {
        self.per_query = per_query;
        self
    }

    pub fn configure(mut self, configure: impl FnOnce(&mut PipelineConfig) + 'static) -> Self {
        self.configure = Box::new(configure);
        self
    }

    pub fn build(self) -> Harness {
        let root = TempDir::new().unwrap();
        let mut config = test_config(root.path());
        (self.configure)(&mut config);

        std::fs::create_dir_all(root.path().join("assets")).unwrap();
        FakeMedia::video(4.0, 1920, 1080).write(&config.default_placeholder);

        let transcoder = Arc::new(self.transcoder);
        let engine = Arc::new(self.engine);
        let provider = Arc::new(FakeProvider::new(self.per_query));
        let fetcher = Arc::new(self.fetcher);

        let synthesizer = VoiceSynthesizer::new(transcoder.clone(), config.synthesis_retry.clone())
            .with_engine(engine.clone());
        let resolver = MediaResolver::new(
            vec![provider.clone() as Arc<dyn StockMediaProvider>],
            config.provider_retry.clone(),
            config.keyword_limit,
        );
        let deps = PipelineDeps {
            transcoder: transcoder.clone(),
            synthesizer: Arc::new(synthesizer),
            resolver: Arc::new(resolver),
            fetcher: fetcher.clone(),
        };

        Harness {
            pipeline: ScriptedVideoPipeline::new(config, deps),
            root,
            transcoder,
            engine,
            provider,
            fetcher,
        }
    }
}

impl Harness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder::default()
    }

    pub fn new() -> Self {
        Self::builder().build()
    }

    pub async fn run(&self, request: &ScriptedVideoRequest) -> Result<PipelineOutput, PipelineFailure> {
        self.run_with(request, &JobContext::background()).await
    }

    pub async fn run_with(
        &self,
        request: &ScriptedVideoRequest,
        ctx: &JobContext,
    ) -> Result<PipelineOutput, PipelineFailure> {
        let job_id = JobId::new();
        let logger = JobLogger::new(&job_id, "scripted_video_test");
        self.pipeline.run(&job_id, request, &logger, ctx).await
    }

    /// Entries left in the storage root besides the placeholder asset.
    pub fn leftovers(&self) -> Vec<PathBuf> {
        std::fs::read_dir(self.root.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| !p.ends_with("assets"))
            .collect()
    }
}

pub fn script(paragraphs: &[&str]) -> String {
    paragraphs.join("\n\n")
}
