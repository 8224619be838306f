//! FFmpeg CLI wrapper for the scripted video pipeline.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building with multiple inputs
//! - Subprocess execution bound to a job's cancellation and deadline
//! - Probing, cropping, looping, standardization and concatenation
//! - Whisper transcription and ASS caption rendering
//! - The [`Transcoder`] trait the pipeline is written against

pub mod command;
pub mod context;
pub mod error;
pub mod ffmpeg;
pub mod filters;
pub mod fs_utils;
pub mod probe;
pub mod subtitles;
pub mod transcoder;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, ToolOutput, ToolRunner};
pub use context::{CancelHandle, JobContext};
pub use error::{MediaError, MediaResult};
pub use ffmpeg::{FfmpegTranscoder, TranscoderConfig};
pub use fs_utils::{move_file, remove_dir_quietly, remove_file_quietly};
pub use probe::{probe_media, AudioStream, MediaInfo, VideoStream};
pub use subtitles::{build_ass_document, CaptionCue};
pub use transcoder::{CombineRequest, StreamFormat, Transcoder, TranscriptSegment};
