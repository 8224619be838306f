//! Transcoding capability the pipeline is written against.

use async_trait::async_trait;
use reel_models::AspectRatio;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::context::JobContext;
use crate::error::MediaResult;
use crate::probe::MediaInfo;

/// Properties that must agree across inputs before they can be joined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamFormat {
    pub width: u32,
    pub height: u32,
    pub codec: String,
    pub pix_fmt: String,
}

impl StreamFormat {
    /// Format of the file's video stream, if it has one.
    pub fn from_info(info: &MediaInfo) -> Option<Self> {
        info.video.as_ref().map(|v| Self {
            width: v.width,
            height: v.height,
            codec: v.codec.clone(),
            pix_fmt: v.pix_fmt.clone(),
        })
    }
}

/// A timed speech-to-text segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Loop/trim a visual clip to a narration and mux them.
#[derive(Debug, Clone)]
pub struct CombineRequest {
    pub video: PathBuf,
    pub video_duration: f64,
    pub audio: PathBuf,
    pub audio_duration: f64,
    pub output: PathBuf,
    /// Directory for loop intermediates
    pub work_dir: PathBuf,
}

/// Probe, crop, mux, standardize, join and transcribe media.
///
/// Every call takes the job context so cancellation and the job deadline
/// reach each external invocation.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Inspect a media file.
    async fn probe(&self, path: &Path, ctx: &JobContext) -> MediaResult<MediaInfo>;

    /// Fit a clip to the target aspect ratio and resolution, dropping its audio.
    async fn crop_to_aspect(
        &self,
        input: &Path,
        output: &Path,
        target: AspectRatio,
        ctx: &JobContext,
    ) -> MediaResult<()>;

    /// Cover the narration with the clip and mux narration as the only audio.
    async fn combine(&self, request: &CombineRequest, ctx: &JobContext) -> MediaResult<()>;

    /// Re-encode to the given resolution/codec/pixel format.
    async fn standardize(
        &self,
        input: &Path,
        output: &Path,
        target: &StreamFormat,
        ctx: &JobContext,
    ) -> MediaResult<()>;

    /// Join clips in order with a full re-encode.
    async fn join(&self, inputs: &[PathBuf], output: &Path, ctx: &JobContext) -> MediaResult<()>;

    /// Join audio files in order.
    async fn concat_audio(
        &self,
        inputs: &[PathBuf],
        output: &Path,
        ctx: &JobContext,
    ) -> MediaResult<()>;

    /// Speech-to-text with segment timing.
    async fn transcribe(&self, input: &Path, ctx: &JobContext) -> MediaResult<Vec<TranscriptSegment>>;

    /// Burn an ASS subtitle file into the video.
    async fn burn_subtitles(
        &self,
        input: &Path,
        subtitles: &Path,
        output: &Path,
        ctx: &JobContext,
    ) -> MediaResult<()>;

    /// Probe and require a decodable video stream with a positive duration.
    async fn validate_video(&self, path: &Path, ctx: &JobContext) -> MediaResult<MediaInfo> {
        let info = self.probe(path, ctx).await?;
        info.require_video()?;
        Ok(info)
    }
}
