//! FFprobe media information.

use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::path::Path;

use crate::command::ToolRunner;
use crate::context::JobContext;
use crate::error::{MediaError, MediaResult};

/// Media file information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Duration in seconds
    pub duration: f64,
    /// File size in bytes
    pub size: u64,
    /// First video stream, if any
    pub video: Option<VideoStream>,
    /// First audio stream, if any
    pub audio: Option<AudioStream>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoStream {
    pub width: u32,
    pub height: u32,
    pub codec: String,
    pub pix_fmt: String,
    pub fps: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioStream {
    pub codec: String,
    pub sample_rate: u32,
    pub channels: u32,
}

impl MediaInfo {
    /// Require a decodable video stream and a positive duration.
    pub fn require_video(&self) -> MediaResult<&VideoStream> {
        let video = self
            .video
            .as_ref()
            .ok_or_else(|| MediaError::invalid_video("no video stream found"))?;
        if video.width == 0 || video.height == 0 {
            return Err(MediaError::invalid_video("video stream has zero dimensions"));
        }
        if self.duration <= 0.0 {
            return Err(MediaError::invalid_video("duration is zero"));
        }
        Ok(video)
    }
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    pix_fmt: Option<String>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u32>,
    duration: Option<String>,
}

/// Probe a media file (video or audio-only).
pub async fn probe_media(path: impl AsRef<Path>, ctx: &JobContext) -> MediaResult<MediaInfo> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }
    if tokio::fs::metadata(path).await?.len() == 0 {
        return Err(MediaError::EmptyOutput(path.to_path_buf()));
    }

    let mut args: Vec<&OsStr> = ["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"]
        .into_iter()
        .map(OsStr::new)
        .collect();
    args.push(path.as_os_str());

    let output = ToolRunner::ffprobe()
        .with_context(ctx)
        .run(args)
        .await
        .map_err(|e| match e {
            MediaError::CommandFailed { stderr, .. } => MediaError::ProbeFailed {
                message: format!("could not read {}", path.display()),
                stderr,
            },
            other => other,
        })?;

    parse_probe_output(&output.stdout)
}

/// Parse `ffprobe -print_format json -show_format -show_streams` output.
pub fn parse_probe_output(stdout: &[u8]) -> MediaResult<MediaInfo> {
    let probe: FfprobeOutput = serde_json::from_slice(stdout)?;

    let video_stream = probe.streams.iter().find(|s| s.codec_type == "video");
    let audio_stream = probe.streams.iter().find(|s| s.codec_type == "audio");

    // Container duration, falling back to the longest stream duration
    let duration = probe
        .format
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
        .or_else(|| {
            probe
                .streams
                .iter()
                .filter_map(|s| s.duration.as_deref()?.parse::<f64>().ok())
                .reduce(f64::max)
        })
        .unwrap_or(0.0);

    let size = probe
        .format
        .size
        .as_deref()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);

    let video = video_stream.map(|s| VideoStream {
        width: s.width.unwrap_or(0),
        height: s.height.unwrap_or(0),
        codec: s.codec_name.clone().unwrap_or_default(),
        pix_fmt: s.pix_fmt.clone().unwrap_or_default(),
        fps: s
            .avg_frame_rate
            .as_deref()
            .and_then(parse_frame_rate)
            .or_else(|| s.r_frame_rate.as_deref().and_then(parse_frame_rate))
            .unwrap_or(30.0),
    });

    let audio = audio_stream.map(|s| AudioStream {
        codec: s.codec_name.clone().unwrap_or_default(),
        sample_rate: s
            .sample_rate
            .as_deref()
            .and_then(|r| r.parse().ok())
            .unwrap_or(0),
        channels: s.channels.unwrap_or(0),
    });

    Ok(MediaInfo {
        duration,
        size,
        video,
        audio,
    })
}

/// Parse frame rate string (e.g., "30/1" or "29.97").
fn parse_frame_rate(s: &str) -> Option<f64> {
    if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den > 0.0 && num > 0.0 {
            return Some(num / den);
        }
        return None;
    }
    s.parse().ok()
}
