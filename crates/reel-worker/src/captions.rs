//! Burned-in captions for the joined video.

use reel_media::{
    build_ass_document, remove_file_quietly, CaptionCue, JobContext, Transcoder, TranscriptSegment,
};
use reel_models::CaptionSettings;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, PipelineResult};

/// Where caption timing came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimingSource {
    Transcript,
    /// Script text spread evenly over the video
    Estimated,
}

/// Lengthen segments shorter than `min_duration`, never past `total`.
///
/// Blank segments and segments starting at or after `total` are dropped.
pub fn stretch_segments(
    segments: Vec<TranscriptSegment>,
    min_duration: f64,
    total: f64,
) -> Vec<CaptionCue> {
    let mut cues: Vec<CaptionCue> = segments
        .into_iter()
        .filter(|s| !s.text.trim().is_empty())
        .map(|s| {
            let start = s.start.max(0.0);
            let mut end = s.end.min(total).max(start);
            if end - start < min_duration {
                end = (start + min_duration).min(total);
            }
            CaptionCue::new(start, end, s.text.trim())
        })
        .filter(|c| c.start < total)
        .collect();
    cues.sort_by(|a, b| a.start.total_cmp(&b.start));
    cues
}

/// One cue per scene text, each taking an equal share of `total`.
pub fn even_timing(texts: &[String], total: f64) -> Vec<CaptionCue> {
    let texts: Vec<&str> = texts
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .collect();
    if texts.is_empty() || total <= 0.0 {
        return Vec::new();
    }
    let share = total / texts.len() as f64;
    texts
        .iter()
        .enumerate()
        .map(|(i, text)| {
            let start = share * i as f64;
            let end = if i + 1 == texts.len() { total } else { start + share };
            CaptionCue::new(start, end, *text)
        })
        .collect()
}

/// Transcribes a video, or falls back to script timing, and burns the
/// styled captions in.
pub struct CaptionOverlay {
    transcoder: Arc<dyn Transcoder>,
    min_segment: f64,
}

impl CaptionOverlay {
    pub fn new(transcoder: Arc<dyn Transcoder>, min_segment: f64) -> Self {
        Self {
            transcoder,
            min_segment,
        }
    }

    /// Write a captioned copy of `video` to `output`.
    ///
    /// Errors are returned to the caller, which decides whether to degrade.
    pub async fn overlay(
        &self,
        video: &Path,
        scene_texts: &[String],
        settings: &CaptionSettings,
        output: &Path,
        work_dir: &Path,
        ctx: &JobContext,
    ) -> PipelineResult<TimingSource> {
        let info = self.transcoder.validate_video(video, ctx).await?;
        let (width, height) = info
            .video
            .as_ref()
            .map(|v| (v.width, v.height))
            .unwrap_or((1920, 1080));

        let (style, warnings) = settings.resolve();
        for warning in &warnings {
            warn!(warning = %warning, "Caption setting ignored");
        }

        let (cues, source) = self.timing(video, scene_texts, info.duration, ctx).await?;
        if cues.is_empty() {
            return Err(PipelineError::validation("no caption text to render"));
        }

        let lines: Vec<CaptionCue> = cues
            .iter()
            .flat_map(|cue| cue.split_lines(style.max_words_per_line))
            .collect();
        let document = build_ass_document(&lines, &style, (width, height));

        tokio::fs::create_dir_all(work_dir).await?;
        let subtitles = work_dir.join("captions.ass");
        tokio::fs::write(&subtitles, document).await?;

        let burned = self
            .transcoder
            .burn_subtitles(video, &subtitles, output, ctx)
            .await;
        remove_file_quietly(&subtitles).await;
        if let Err(e) = burned {
            remove_file_quietly(output).await;
            return Err(e.into());
        }

        if let Err(e) = self.transcoder.validate_video(output, ctx).await {
            remove_file_quietly(output).await;
            return Err(e.into());
        }
        info!(lines = lines.len(), source = ?source, "Captions burned in");
        Ok(source)
    }

    async fn timing(
        &self,
        video: &Path,
        scene_texts: &[String],
        duration: f64,
        ctx: &JobContext,
    ) -> PipelineResult<(Vec<CaptionCue>, TimingSource)> {
        match self.transcoder.transcribe(video, ctx).await {
            Ok(segments) => {
                let cues = stretch_segments(segments, self.min_segment, duration);
                if !cues.is_empty() {
                    debug!(segments = cues.len(), "Using transcript timing");
                    return Ok((cues, TimingSource::Transcript));
                }
                warn!("Transcript was empty, estimating caption timing from script");
            }
            Err(e) if e.is_interruption() => return Err(e.into()),
            Err(e) => {
                warn!(error = %e, "Transcription failed, estimating caption timing from script");
            }
        }
        Ok((even_timing(scene_texts, duration), TimingSource::Estimated))
    }
}
