//! Joining rendered scenes into one video.

use reel_media::{move_file, remove_file_quietly, JobContext, MediaInfo, StreamFormat, Transcoder};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{PipelineError, PipelineResult};

/// Joins scene clips in order, standardizing them first when their formats
/// disagree.
pub struct Concatenator {
    transcoder: Arc<dyn Transcoder>,
    tolerance_per_input: f64,
}

impl Concatenator {
    pub fn new(transcoder: Arc<dyn Transcoder>, tolerance_per_input: f64) -> Self {
        Self {
            transcoder,
            tolerance_per_input,
        }
    }

    /// Join `inputs` into `output` and return the probed result.
    ///
    /// Standardization temporaries go to `work_dir` and are removed whatever
    /// the outcome. A single input is moved into place as is.
    pub async fn concatenate(
        &self,
        inputs: &[PathBuf],
        output: &Path,
        work_dir: &Path,
        ctx: &JobContext,
    ) -> PipelineResult<MediaInfo> {
        self.concatenate_inner(inputs, output, work_dir, ctx)
            .await
            .map_err(|e| match e {
                e if e.is_interruption() => e,
                e @ PipelineError::Concatenation(_) => e,
                e => PipelineError::concatenation(e.to_string()),
            })
    }

    async fn concatenate_inner(
        &self,
        inputs: &[PathBuf],
        output: &Path,
        work_dir: &Path,
        ctx: &JobContext,
    ) -> PipelineResult<MediaInfo> {
        if inputs.is_empty() {
            return Err(PipelineError::concatenation("no scenes to join"));
        }

        let mut formats = Vec::with_capacity(inputs.len());
        let mut expected = 0.0;
        for input in inputs {
            let info = self.transcoder.probe(input, ctx).await?;
            let format = StreamFormat::from_info(&info).ok_or_else(|| {
                PipelineError::concatenation(format!("{} has no video stream", input.display()))
            })?;
            expected += info.duration;
            formats.push(format);
        }

        let mut temporaries = Vec::new();
        let result = self
            .join(inputs, &formats, output, work_dir, &mut temporaries, ctx)
            .await;
        for temp in &temporaries {
            remove_file_quietly(temp).await;
        }
        if let Err(e) = result {
            remove_file_quietly(output).await;
            return Err(e);
        }

        let validated = self.validate(output, expected, inputs.len(), ctx).await;
        if validated.is_err() {
            remove_file_quietly(output).await;
        }
        validated
    }

    async fn join(
        &self,
        inputs: &[PathBuf],
        formats: &[StreamFormat],
        output: &Path,
        work_dir: &Path,
        temporaries: &mut Vec<PathBuf>,
        ctx: &JobContext,
    ) -> PipelineResult<()> {
        if let [single] = inputs {
            debug!(input = ?single, "Single scene, moving into place");
            move_file(single, output).await?;
            return Ok(());
        }

        let target = &formats[0];
        let uniform = formats.iter().all(|f| f == target);
        if uniform {
            self.transcoder.join(inputs, output, ctx).await?;
            return Ok(());
        }

        info!(
            inputs = inputs.len(),
            width = target.width,
            height = target.height,
            codec = %target.codec,
            "Input formats differ, standardizing before join"
        );
        tokio::fs::create_dir_all(work_dir).await?;
        for (i, input) in inputs.iter().enumerate() {
            let standardized = work_dir.join(format!("standardized_{i:03}.mp4"));
            temporaries.push(standardized.clone());
            self.transcoder
                .standardize(input, &standardized, target, ctx)
                .await?;
        }
        self.transcoder
            .join(temporaries.as_slice(), output, ctx)
            .await?;
        Ok(())
    }

    async fn validate(
        &self,
        output: &Path,
        expected: f64,
        count: usize,
        ctx: &JobContext,
    ) -> PipelineResult<MediaInfo> {
        let info = self
            .transcoder
            .validate_video(output, ctx)
            .await
            .map_err(|e| match e {
                e if e.is_interruption() => PipelineError::Media(e),
                e => PipelineError::concatenation(format!("joined video is invalid: {e}")),
            })?;

        let tolerance = self.tolerance_per_input * count as f64;
        let drift = (info.duration - expected).abs();
        if drift > tolerance {
            return Err(PipelineError::concatenation(format!(
                "joined duration {:.2}s differs from scene total {:.2}s by more than {:.2}s",
                info.duration, expected, tolerance
            )));
        }
        debug!(duration = info.duration, expected, "Concatenation validated");
        Ok(info)
    }
}
