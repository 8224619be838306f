//! [`Transcoder`] backed by the ffmpeg, ffprobe and whisper CLIs.

use async_trait::async_trait;
use reel_models::{AspectRatio, EncodingConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::fs;
use tracing::{debug, info};

use crate::command::{FfmpegCommand, ToolRunner};
use crate::context::JobContext;
use crate::error::{MediaError, MediaResult};
use crate::filters::{
    build_aspect_filter, build_ass_filter, build_concat_filter, build_standardize_filter,
    build_xfade_chain, concat_list_entry, plan_loop, LoopPlan,
};
use crate::fs_utils::remove_file_quietly;
use crate::probe::{probe_media, MediaInfo};
use crate::transcoder::{CombineRequest, StreamFormat, Transcoder, TranscriptSegment};

/// FFmpeg transcoder configuration.
#[derive(Debug, Clone)]
pub struct TranscoderConfig {
    pub encoding: EncodingConfig,
    /// Length of each crossfade between loop copies
    pub crossfade_duration: f64,
    /// Clips shorter than this loop without crossfades
    pub crossfade_min_clip: f64,
    /// Letterbox instead of cropping when a crop keeps less than this share
    pub min_crop_retention: f64,
    /// Per-command timeout
    pub command_timeout: Duration,
    pub whisper_program: String,
    pub whisper_model: String,
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            encoding: EncodingConfig::default(),
            crossfade_duration: 0.5,
            crossfade_min_clip: 3.0,
            min_crop_retention: 0.3,
            command_timeout: Duration::from_secs(600),
            whisper_program: "whisper".to_string(),
            whisper_model: "base".to_string(),
        }
    }
}

impl TranscoderConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let mut encoding = defaults.encoding.clone();
        if let Ok(preset) = std::env::var("VIDEO_PRESET") {
            encoding.preset = preset;
        }
        encoding.crf = std::env::var("VIDEO_CRF")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(encoding.crf);

        Self {
            encoding,
            command_timeout: Duration::from_secs(
                std::env::var("FFMPEG_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(600),
            ),
            whisper_program: std::env::var("WHISPER_BIN")
                .unwrap_or_else(|_| defaults.whisper_program.clone()),
            whisper_model: std::env::var("WHISPER_MODEL")
                .unwrap_or_else(|_| defaults.whisper_model.clone()),
            ..defaults
        }
    }
}

/// Whisper `--output_format json` payload.
#[derive(Debug, Deserialize)]
struct WhisperOutput {
    #[serde(default)]
    segments: Vec<WhisperSegment>,
}

#[derive(Debug, Deserialize)]
struct WhisperSegment {
    start: f64,
    end: f64,
    text: String,
}

/// Transcoder that shells out to FFmpeg.
#[derive(Debug, Clone, Default)]
pub struct FfmpegTranscoder {
    config: TranscoderConfig,
}

impl FfmpegTranscoder {
    pub fn new(config: TranscoderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TranscoderConfig {
        &self.config
    }

    fn ffmpeg(&self, ctx: &JobContext) -> ToolRunner {
        ToolRunner::ffmpeg()
            .with_context(ctx)
            .with_timeout(self.config.command_timeout)
    }

    async fn run(&self, op: &'static str, cmd: FfmpegCommand, ctx: &JobContext) -> MediaResult<()> {
        let started = Instant::now();
        let result = self.ffmpeg(ctx).run_ffmpeg(&cmd).await;
        metrics::histogram!("reel_ffmpeg_seconds", "op" => op)
            .record(started.elapsed().as_secs_f64());
        if result.is_err() {
            metrics::counter!("reel_ffmpeg_failures_total", "op" => op).increment(1);
        }
        result?;
        ensure_non_empty(cmd.output_path()).await
    }

    /// Loop the clip per `plan`, returning the path that covers the narration.
    async fn loop_clip(
        &self,
        request: &CombineRequest,
        plan: LoopPlan,
        temps: &mut Vec<PathBuf>,
        ctx: &JobContext,
    ) -> MediaResult<PathBuf> {
        match plan {
            LoopPlan::TrimOnly => Ok(request.video.clone()),
            LoopPlan::Crossfade { copies } => {
                let looped = request.work_dir.join("looped.mp4");
                temps.push(looped.clone());
                let mut cmd = FfmpegCommand::new(&looped);
                for _ in 0..copies {
                    cmd = cmd.input(&request.video);
                }
                let cmd = cmd
                    .filter_complex(build_xfade_chain(
                        copies,
                        request.video_duration,
                        self.config.crossfade_duration,
                    ))
                    .map("[vout]")
                    .output_args(self.config.encoding.video_args())
                    .no_audio();
                self.run("loop_crossfade", cmd, ctx).await?;
                Ok(looped)
            }
            LoopPlan::ConcatDemux { copies } => {
                let list = request.work_dir.join("loop_list.txt");
                let looped = request.work_dir.join("looped.mp4");
                temps.push(list.clone());
                temps.push(looped.clone());

                let entry = concat_list_entry(&request.video.to_string_lossy());
                let body = vec![entry; copies].join("\n");
                fs::write(&list, body).await?;

                let cmd = FfmpegCommand::new(&looped)
                    .input_with_args(["-f", "concat", "-safe", "0"], &list)
                    .output_args(["-c", "copy"])
                    .no_audio();
                self.run("loop_concat", cmd, ctx).await?;
                Ok(looped)
            }
        }
    }
}

async fn ensure_non_empty(path: &Path) -> MediaResult<()> {
    match fs::metadata(path).await {
        Ok(meta) if meta.len() > 0 => Ok(()),
        Ok(_) => Err(MediaError::EmptyOutput(path.to_path_buf())),
        Err(_) => Err(MediaError::FileNotFound(path.to_path_buf())),
    }
}

async fn write_concat_list(list: &Path, inputs: &[PathBuf]) -> MediaResult<()> {
    let body = inputs
        .iter()
        .map(|p| concat_list_entry(&p.to_string_lossy()))
        .collect::<Vec<_>>()
        .join("\n");
    fs::write(list, body).await?;
    Ok(())
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn probe(&self, path: &Path, ctx: &JobContext) -> MediaResult<MediaInfo> {
        probe_media(path, ctx).await
    }

    async fn crop_to_aspect(
        &self,
        input: &Path,
        output: &Path,
        target: AspectRatio,
        ctx: &JobContext,
    ) -> MediaResult<()> {
        let info = self.validate_video(input, ctx).await?;
        let (src_w, src_h) = info
            .video
            .as_ref()
            .map(|v| (v.width, v.height))
            .unwrap_or((0, 0));

        let filter = build_aspect_filter(
            src_w,
            src_h,
            target,
            self.config.encoding.fps,
            &self.config.encoding.pix_fmt,
            self.config.min_crop_retention,
        );
        debug!(src_w, src_h, target = %target, filter = %filter, "Fitting clip to aspect ratio");

        let cmd = FfmpegCommand::new(output)
            .input(input)
            .video_filter(filter)
            .output_args(self.config.encoding.video_args())
            .no_audio();
        self.run("crop", cmd, ctx).await
    }

    async fn combine(&self, request: &CombineRequest, ctx: &JobContext) -> MediaResult<()> {
        let plan = plan_loop(
            request.video_duration,
            request.audio_duration,
            self.config.crossfade_min_clip,
            self.config.crossfade_duration,
        );
        debug!(
            clip = request.video_duration,
            narration = request.audio_duration,
            plan = ?plan,
            "Combining clip with narration"
        );

        let mut temps = Vec::new();
        let result = async {
            let video = self.loop_clip(request, plan, &mut temps, ctx).await?;
            let cmd = FfmpegCommand::new(&request.output)
                .input(&video)
                .input(&request.audio)
                .map("0:v:0")
                .map("1:a:0")
                .duration(request.audio_duration)
                .output_args(self.config.encoding.to_ffmpeg_args())
                .output_args(["-movflags", "+faststart"]);
            self.run("mux", cmd, ctx).await
        }
        .await;

        for temp in &temps {
            remove_file_quietly(temp).await;
        }
        result
    }

    async fn standardize(
        &self,
        input: &Path,
        output: &Path,
        target: &StreamFormat,
        ctx: &JobContext,
    ) -> MediaResult<()> {
        let info = self.validate_video(input, ctx).await?;
        let (src_w, src_h) = info
            .video
            .as_ref()
            .map(|v| (v.width, v.height))
            .unwrap_or((0, 0));
        let encoding = self
            .config
            .encoding
            .clone()
            .matching(&target.codec, &target.pix_fmt);

        let mut cmd = FfmpegCommand::new(output).input(input);
        if info.audio.is_none() {
            // Joining needs an audio stream on every input
            cmd = cmd
                .input_with_args(
                    ["-f", "lavfi"],
                    format!("anullsrc=r={}:cl=stereo", encoding.sample_rate),
                )
                .map("0:v:0")
                .map("1:a:0")
                .output_arg("-shortest");
        }
        let cmd = cmd
            .video_filter(build_standardize_filter(src_w, src_h, target.width, target.height))
            .output_args(["-r".to_string(), encoding.fps.to_string()])
            .output_args(encoding.to_ffmpeg_args());
        self.run("standardize", cmd, ctx).await
    }

    async fn join(&self, inputs: &[PathBuf], output: &Path, ctx: &JobContext) -> MediaResult<()> {
        if inputs.is_empty() {
            return Err(MediaError::internal("join called without inputs"));
        }
        let mut cmd = FfmpegCommand::new(output);
        for input in inputs {
            cmd = cmd.input(input);
        }
        let cmd = cmd
            .filter_complex(build_concat_filter(inputs.len()))
            .map("[v]")
            .map("[a]")
            .output_args(self.config.encoding.to_ffmpeg_args())
            .output_args(["-movflags", "+faststart"]);
        info!(inputs = inputs.len(), output = %output.display(), "Joining clips");
        self.run("join", cmd, ctx).await
    }

    async fn concat_audio(
        &self,
        inputs: &[PathBuf],
        output: &Path,
        ctx: &JobContext,
    ) -> MediaResult<()> {
        if inputs.is_empty() {
            return Err(MediaError::internal("concat_audio called without inputs"));
        }
        let list = output.with_extension("list.txt");
        write_concat_list(&list, inputs).await?;
        let cmd = FfmpegCommand::new(output)
            .input_with_args(["-f", "concat", "-safe", "0"], &list)
            .output_args(["-c", "copy"]);
        let result = self.run("concat_audio", cmd, ctx).await;
        remove_file_quietly(&list).await;
        result
    }

    async fn transcribe(&self, input: &Path, ctx: &JobContext) -> MediaResult<Vec<TranscriptSegment>> {
        let out_dir = tempfile::TempDir::new()?;
        let runner = ToolRunner::new(&self.config.whisper_program)
            .with_context(ctx)
            .with_timeout(self.config.command_timeout);

        let args: Vec<std::ffi::OsString> = vec![
            input.as_os_str().to_os_string(),
            "--model".into(),
            self.config.whisper_model.clone().into(),
            "--output_format".into(),
            "json".into(),
            "--output_dir".into(),
            out_dir.path().as_os_str().to_os_string(),
            "--fp16".into(),
            "False".into(),
            "--verbose".into(),
            "False".into(),
        ];
        runner.run(args).await.map_err(|e| match e {
            MediaError::CommandFailed { message, .. } => MediaError::TranscriptionFailed(message),
            other => other,
        })?;

        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .ok_or_else(|| MediaError::TranscriptionFailed("input has no file name".to_string()))?;
        let json_path = out_dir.path().join(format!("{stem}.json"));
        let raw = fs::read(&json_path).await.map_err(|e| {
            MediaError::TranscriptionFailed(format!("missing transcript {}: {e}", json_path.display()))
        })?;
        parse_whisper_output(&raw)
    }

    async fn burn_subtitles(
        &self,
        input: &Path,
        subtitles: &Path,
        output: &Path,
        ctx: &JobContext,
    ) -> MediaResult<()> {
        let cmd = FfmpegCommand::new(output)
            .input(input)
            .video_filter(build_ass_filter(&subtitles.to_string_lossy()))
            .output_args(self.config.encoding.video_args())
            .audio_codec("copy");
        self.run("burn_subtitles", cmd, ctx).await
    }
}

/// Parse whisper's JSON transcript into non-empty segments.
fn parse_whisper_output(raw: &[u8]) -> MediaResult<Vec<TranscriptSegment>> {
    let output: WhisperOutput = serde_json::from_slice(raw)?;
    Ok(output
        .segments
        .into_iter()
        .filter(|s| !s.text.trim().is_empty() && s.end > s.start)
        .map(|s| TranscriptSegment {
            start: s.start,
            end: s.end,
            text: s.text.trim().to_string(),
        })
        .collect())
}
