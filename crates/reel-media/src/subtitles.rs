//! ASS subtitle generation for burned-in captions.

use reel_models::{CaptionStyle, ResolvedCaptionStyle, Rgb};
use std::fmt::Write;

/// One timed caption line.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionCue {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

impl CaptionCue {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }

    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }

    /// Split into lines of at most `max_words` words, sharing the cue's time
    /// in proportion to each line's word count.
    pub fn split_lines(&self, max_words: usize) -> Vec<CaptionCue> {
        let words: Vec<&str> = self.text.split_whitespace().collect();
        if words.is_empty() {
            return Vec::new();
        }
        let max_words = max_words.max(1);
        let per_word = self.duration() / words.len() as f64;

        let mut cues = Vec::with_capacity(words.len().div_ceil(max_words));
        let mut cursor = self.start;
        for chunk in words.chunks(max_words) {
            let end = (cursor + per_word * chunk.len() as f64).min(self.end);
            cues.push(CaptionCue::new(cursor, end, chunk.join(" ")));
            cursor = end;
        }
        if let Some(last) = cues.last_mut() {
            last.end = self.end;
        }
        cues
    }
}

/// `&HAABBGGRR` with full opacity.
fn ass_color(rgb: Rgb) -> String {
    format!("&H00{:02X}{:02X}{:02X}", rgb.2, rgb.1, rgb.0)
}

fn ass_bool(v: bool) -> i8 {
    if v {
        -1
    } else {
        0
    }
}

/// Format seconds as `H:MM:SS.cc`.
pub fn format_ass_time(seconds: f64) -> String {
    let total_cs = (seconds.max(0.0) * 100.0).round() as u64;
    let cs = total_cs % 100;
    let total_secs = total_cs / 100;
    format!(
        "{}:{:02}:{:02}.{:02}",
        total_secs / 3600,
        (total_secs % 3600) / 60,
        total_secs % 60,
        cs
    )
}

/// Strip characters that would be read as ASS override tags.
fn sanitize_text(text: &str, all_caps: bool) -> String {
    let cleaned: String = text
        .chars()
        .filter(|c| !matches!(c, '{' | '}' | '\\'))
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .collect();
    let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    if all_caps {
        cleaned.to_uppercase()
    } else {
        cleaned
    }
}

/// Karaoke-tagged text; each word lights up in turn over the cue's duration.
fn karaoke_text(text: &str, duration: f64) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return String::new();
    }
    let total_cs = (duration * 100.0).round().max(0.0) as u64;
    let per_word = total_cs / words.len() as u64;
    let remainder = total_cs - per_word * words.len() as u64;

    let mut out = String::new();
    for (i, word) in words.iter().enumerate() {
        let cs = if i == words.len() - 1 {
            per_word + remainder
        } else {
            per_word
        };
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{{\\k{cs}}}{word}");
    }
    out
}

/// Render a complete ASS document.
pub fn build_ass_document(
    cues: &[CaptionCue],
    style: &ResolvedCaptionStyle,
    play_res: (u32, u32),
) -> String {
    let (primary, secondary) = match style.style {
        CaptionStyle::Highlight => (style.word_color, style.line_color),
        CaptionStyle::Classic => (style.line_color, style.line_color),
    };
    let (width, height) = play_res;
    let margin_v = (height / 20).max(10);
    let margin_h = (width / 24).max(10);

    let mut doc = String::new();
    let _ = writeln!(doc, "[Script Info]");
    let _ = writeln!(doc, "ScriptType: v4.00+");
    let _ = writeln!(doc, "PlayResX: {width}");
    let _ = writeln!(doc, "PlayResY: {height}");
    let _ = writeln!(doc, "WrapStyle: 0");
    let _ = writeln!(doc, "ScaledBorderAndShadow: yes");
    let _ = writeln!(doc);
    let _ = writeln!(doc, "[V4+ Styles]");
    let _ = writeln!(
        doc,
        "Format: Name, Fontname, Fontsize, PrimaryColour, SecondaryColour, OutlineColour, BackColour, \
         Bold, Italic, Underline, StrikeOut, ScaleX, ScaleY, Spacing, Angle, BorderStyle, Outline, \
         Shadow, Alignment, MarginL, MarginR, MarginV, Encoding"
    );
    let _ = writeln!(
        doc,
        "Style: Default,{},{},{},{},{},&H80000000,{},{},0,0,100,100,0,0,1,3,0,{},{},{},{},1",
        style.font_family,
        style.font_size,
        ass_color(primary),
        ass_color(secondary),
        ass_color(style.outline_color),
        ass_bool(style.bold),
        ass_bool(style.italic),
        style.position.ass_alignment(),
        margin_h,
        margin_h,
        margin_v,
    );
    let _ = writeln!(doc);
    let _ = writeln!(doc, "[Events]");
    let _ = writeln!(
        doc,
        "Format: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text"
    );

    for cue in cues {
        let text = sanitize_text(&cue.text, style.all_caps);
        if text.is_empty() || cue.duration() <= 0.0 {
            continue;
        }
        let body = match style.style {
            CaptionStyle::Highlight => karaoke_text(&text, cue.duration()),
            CaptionStyle::Classic => text,
        };
        let _ = writeln!(
            doc,
            "Dialogue: 0,{},{},Default,,0,0,0,,{}",
            format_ass_time(cue.start),
            format_ass_time(cue.end),
            body
        );
    }

    doc
}
