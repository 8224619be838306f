//! FFmpeg filter graph builders.

use reel_models::AspectRatio;

/// Ratios closer than this are treated as equal.
const RATIO_EPSILON: f64 = 0.01;

/// How a clip is stretched to cover a narration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPlan {
    /// Clip already covers the narration
    TrimOnly,
    /// Repeat the clip with short crossfades at each seam
    Crossfade { copies: usize },
    /// Repeat the clip through the concat demuxer
    ConcatDemux { copies: usize },
}

/// Decide how to cover `target` seconds with a `clip` seconds long clip.
pub fn plan_loop(clip: f64, target: f64, crossfade_min_clip: f64, fade: f64) -> LoopPlan {
    if clip <= 0.0 || clip >= target {
        return LoopPlan::TrimOnly;
    }
    if clip >= crossfade_min_clip && clip > fade {
        // Each seam overlaps by `fade`, so every extra copy adds clip - fade
        let copies = ((target - fade) / (clip - fade)).floor() as usize + 1;
        LoopPlan::Crossfade {
            copies: copies.max(2),
        }
    } else {
        let copies = (target / clip).floor() as usize + 1;
        LoopPlan::ConcatDemux {
            copies: copies.max(2),
        }
    }
}

fn round_even(v: f64) -> u32 {
    let r = v.round() as u32;
    r - (r % 2)
}

/// Filter that fits a `src_w`x`src_h` clip to `target`.
///
/// Center-crops toward the target ratio unless that would keep less than
/// `min_retention` of the frame, in which case the clip is letterboxed.
pub fn build_aspect_filter(
    src_w: u32,
    src_h: u32,
    target: AspectRatio,
    fps: u32,
    pix_fmt: &str,
    min_retention: f64,
) -> String {
    let (out_w, out_h) = target.resolution();
    let tail = format!("setsar=1,fps={fps},format={pix_fmt}");

    if src_w == 0 || src_h == 0 {
        return format!("{},{}", letterbox(out_w, out_h), tail);
    }

    let src_ratio = src_w as f64 / src_h as f64;
    let target_ratio = target.as_f64();

    if (src_ratio - target_ratio).abs() < RATIO_EPSILON {
        return format!("scale={out_w}:{out_h},{tail}");
    }

    let retention = src_ratio.min(target_ratio) / src_ratio.max(target_ratio);
    if retention < min_retention {
        return format!("{},{}", letterbox(out_w, out_h), tail);
    }

    let crop = if src_ratio > target_ratio {
        // Too wide: keep full height
        let new_w = round_even(src_h as f64 * target_ratio).min(src_w);
        format!("crop={}:{}:{}:0", new_w, src_h, (src_w - new_w) / 2)
    } else {
        // Too tall: keep full width
        let new_h = round_even(src_w as f64 / target_ratio).min(src_h);
        format!("crop={}:{}:0:{}", src_w, new_h, (src_h - new_h) / 2)
    };

    format!("{crop},scale={out_w}:{out_h},{tail}")
}

fn letterbox(out_w: u32, out_h: u32) -> String {
    format!(
        "scale={out_w}:{out_h}:force_original_aspect_ratio=decrease,pad={out_w}:{out_h}:(ow-iw)/2:(oh-ih)/2:black"
    )
}

/// Filter that brings a clip to an exact resolution before joining.
pub fn build_standardize_filter(src_w: u32, src_h: u32, out_w: u32, out_h: u32) -> String {
    let same_ratio = src_w > 0
        && src_h > 0
        && ((src_w as f64 / src_h as f64) - (out_w as f64 / out_h as f64)).abs() < RATIO_EPSILON;
    if same_ratio {
        format!("scale={out_w}:{out_h},setsar=1")
    } else {
        format!("{},setsar=1", letterbox(out_w, out_h))
    }
}

/// Chain `copies` inputs of the same clip with `xfade` transitions.
///
/// Inputs are `[0:v]..[copies-1:v]`; the result is labelled `[vout]`.
pub fn build_xfade_chain(copies: usize, clip_duration: f64, fade: f64) -> String {
    if copies <= 1 {
        return "[0:v]null[vout]".to_string();
    }

    let mut parts = Vec::with_capacity(copies - 1);
    let mut prev = "[0:v]".to_string();
    for k in 1..copies {
        let out = if k == copies - 1 {
            "[vout]".to_string()
        } else {
            format!("[x{k}]")
        };
        let offset = k as f64 * (clip_duration - fade);
        parts.push(format!(
            "{prev}[{k}:v]xfade=transition=fade:duration={fade:.3}:offset={offset:.3}{out}"
        ));
        prev = out;
    }
    parts.join(";")
}

/// Concat filter joining `n` inputs that each carry one video and one audio stream.
pub fn build_concat_filter(n: usize) -> String {
    let inputs: String = (0..n).map(|i| format!("[{i}:v][{i}:a]")).collect();
    format!("{inputs}concat=n={n}:v=1:a=1[v][a]")
}

/// One line of a concat demuxer list.
pub fn concat_list_entry(path: &str) -> String {
    format!("file '{}'", path.replace('\'', "'\\''"))
}

/// Escape a path for use inside a filter argument.
pub fn escape_filter_path(path: &str) -> String {
    path.replace('\\', "\\\\")
        .replace('\'', "\\'")
        .replace(':', "\\:")
}

/// Filter burning an ASS subtitle file.
pub fn build_ass_filter(subtitle_path: &str) -> String {
    format!("ass='{}'", escape_filter_path(subtitle_path))
}
