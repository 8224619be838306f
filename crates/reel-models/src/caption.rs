//! Caption styling settings.
//!
//! Callers send a sparse [`CaptionSettings`] object; every unset or invalid
//! option falls back to the default bundle when resolved.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::Validate;

pub const DEFAULT_LINE_COLOR: Rgb = Rgb(0xFF, 0xFF, 0xFF);
pub const DEFAULT_WORD_COLOR: Rgb = Rgb(0xFF, 0xFF, 0x00);
pub const DEFAULT_OUTLINE_COLOR: Rgb = Rgb(0x00, 0x00, 0x00);
pub const DEFAULT_MAX_WORDS_PER_LINE: usize = 8;
pub const DEFAULT_FONT_FAMILY: &str = "Arial";
pub const DEFAULT_FONT_SIZE: u32 = 48;

/// How caption lines are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum CaptionStyle {
    /// Per-word highlight as narration progresses
    #[default]
    Highlight,
    /// Plain lines in a single colour
    Classic,
}

/// Caller-supplied caption options. All fields are optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
#[serde(deny_unknown_fields)]
pub struct CaptionSettings {
    #[serde(default)]
    pub style: Option<CaptionStyle>,
    #[serde(default)]
    pub line_color: Option<String>,
    #[serde(default)]
    pub word_color: Option<String>,
    #[serde(default)]
    pub outline_color: Option<String>,
    #[serde(default)]
    pub all_caps: Option<bool>,
    #[serde(default)]
    #[validate(range(min = 1, max = 20))]
    pub max_words_per_line: Option<u32>,
    /// e.g. "bottom_center", "top_left"
    #[serde(default)]
    pub position: Option<String>,
    /// "left", "center" or "right"
    #[serde(default)]
    pub alignment: Option<String>,
    #[serde(default)]
    pub font_family: Option<String>,
    #[serde(default)]
    #[validate(range(min = 8, max = 200))]
    pub font_size: Option<u32>,
    #[serde(default)]
    pub bold: Option<bool>,
    #[serde(default)]
    pub italic: Option<bool>,
}

/// 8-bit RGB colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    /// Parse `#RRGGBB`, `RRGGBB` or a handful of common colour names.
    pub fn parse(value: &str) -> Option<Rgb> {
        let v = value.trim().to_lowercase();
        let named = match v.as_str() {
            "white" => Some(Rgb(0xFF, 0xFF, 0xFF)),
            "black" => Some(Rgb(0x00, 0x00, 0x00)),
            "yellow" => Some(Rgb(0xFF, 0xFF, 0x00)),
            "red" => Some(Rgb(0xFF, 0x00, 0x00)),
            "green" => Some(Rgb(0x00, 0x80, 0x00)),
            "blue" => Some(Rgb(0x00, 0x00, 0xFF)),
            "cyan" => Some(Rgb(0x00, 0xFF, 0xFF)),
            "magenta" => Some(Rgb(0xFF, 0x00, 0xFF)),
            "orange" => Some(Rgb(0xFF, 0xA5, 0x00)),
            _ => None,
        };
        if named.is_some() {
            return named;
        }

        let hex = v.strip_prefix('#').unwrap_or(&v);
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        Some(Rgb(channel(0)?, channel(2)?, channel(4)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VerticalPosition {
    Top,
    Middle,
    #[default]
    Bottom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HorizontalAlign {
    Left,
    #[default]
    Center,
    Right,
}

impl HorizontalAlign {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "left" => Some(HorizontalAlign::Left),
            "center" | "centre" => Some(HorizontalAlign::Center),
            "right" => Some(HorizontalAlign::Right),
            _ => None,
        }
    }
}

/// Screen anchor for the caption block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CaptionPosition {
    pub vertical: VerticalPosition,
    pub horizontal: HorizontalAlign,
}

impl CaptionPosition {
    /// Parse `top|middle|bottom` optionally suffixed with `_left|_center|_right`.
    pub fn parse(s: &str) -> Option<Self> {
        let lower = s.trim().to_lowercase();
        let (v, h) = match lower.split_once('_') {
            Some((v, h)) => (v, Some(h)),
            None => (lower.as_str(), None),
        };
        let vertical = match v {
            "top" => VerticalPosition::Top,
            "middle" | "center" => VerticalPosition::Middle,
            "bottom" => VerticalPosition::Bottom,
            _ => return None,
        };
        let horizontal = match h {
            Some(h) => HorizontalAlign::parse(h)?,
            None => HorizontalAlign::Center,
        };
        Some(Self { vertical, horizontal })
    }

    /// ASS numpad alignment code (1-9).
    pub fn ass_alignment(&self) -> u8 {
        let base = match self.vertical {
            VerticalPosition::Bottom => 1,
            VerticalPosition::Middle => 4,
            VerticalPosition::Top => 7,
        };
        base + match self.horizontal {
            HorizontalAlign::Left => 0,
            HorizontalAlign::Center => 1,
            HorizontalAlign::Right => 2,
        }
    }
}

/// Caption settings merged over the default bundle.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedCaptionStyle {
    pub style: CaptionStyle,
    pub line_color: Rgb,
    pub word_color: Rgb,
    pub outline_color: Rgb,
    pub all_caps: bool,
    pub max_words_per_line: usize,
    pub position: CaptionPosition,
    pub font_family: String,
    pub font_size: u32,
    pub bold: bool,
    pub italic: bool,
}

impl Default for ResolvedCaptionStyle {
    fn default() -> Self {
        Self {
            style: CaptionStyle::Highlight,
            line_color: DEFAULT_LINE_COLOR,
            word_color: DEFAULT_WORD_COLOR,
            outline_color: DEFAULT_OUTLINE_COLOR,
            all_caps: false,
            max_words_per_line: DEFAULT_MAX_WORDS_PER_LINE,
            position: CaptionPosition::default(),
            font_family: DEFAULT_FONT_FAMILY.to_string(),
            font_size: DEFAULT_FONT_SIZE,
            bold: true,
            italic: false,
        }
    }
}

impl CaptionSettings {
    /// Merge over the defaults. Returns the resolved style plus a warning for
    /// each option that was present but unusable.
    pub fn resolve(&self) -> (ResolvedCaptionStyle, Vec<String>) {
        let defaults = ResolvedCaptionStyle::default();
        let mut warnings = Vec::new();

        let mut color = |name: &str, value: &Option<String>, fallback: Rgb| match value {
            Some(v) => Rgb::parse(v).unwrap_or_else(|| {
                warnings.push(format!("invalid {name} '{v}', using default"));
                fallback
            }),
            None => fallback,
        };
        let line_color = color("line_color", &self.line_color, defaults.line_color);
        let word_color = color("word_color", &self.word_color, defaults.word_color);
        let outline_color = color("outline_color", &self.outline_color, defaults.outline_color);

        let mut position = match &self.position {
            Some(p) => CaptionPosition::parse(p).unwrap_or_else(|| {
                warnings.push(format!("invalid position '{p}', using default"));
                defaults.position
            }),
            None => defaults.position,
        };
        if let Some(a) = &self.alignment {
            match HorizontalAlign::parse(a) {
                Some(h) => position.horizontal = h,
                None => warnings.push(format!("invalid alignment '{a}', using default")),
            }
        }

        let font_family = self
            .font_family
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(str::to_string)
            .unwrap_or(defaults.font_family);

        let resolved = ResolvedCaptionStyle {
            style: self.style.unwrap_or(defaults.style),
            line_color,
            word_color,
            outline_color,
            all_caps: self.all_caps.unwrap_or(defaults.all_caps),
            max_words_per_line: self
                .max_words_per_line
                .map(|n| n.max(1) as usize)
                .unwrap_or(defaults.max_words_per_line),
            position,
            font_family,
            font_size: self.font_size.unwrap_or(defaults.font_size),
            bold: self.bold.unwrap_or(defaults.bold),
            italic: self.italic.unwrap_or(defaults.italic),
        };

        (resolved, warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_settings_resolve_to_defaults() {
        let (style, warnings) = CaptionSettings::default().resolve();
        assert_eq!(style, ResolvedCaptionStyle::default());
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_settings_merge_over_defaults() {
        let settings = CaptionSettings {
            word_color: Some("#00FF00".to_string()),
            max_words_per_line: Some(4),
            position: Some("top_left".to_string()),
            alignment: Some("right".to_string()),
            ..Default::default()
        };
        let (style, warnings) = settings.resolve();
        assert!(warnings.is_empty());
        assert_eq!(style.word_color, Rgb(0, 0xFF, 0));
        assert_eq!(style.line_color, DEFAULT_LINE_COLOR);
        assert_eq!(style.max_words_per_line, 4);
        assert_eq!(style.position.vertical, VerticalPosition::Top);
        assert_eq!(style.position.horizontal, HorizontalAlign::Right);
        assert_eq!(style.position.ass_alignment(), 9);
    }

    #[test]
    fn test_invalid_values_fall_back_with_warnings() {
        let settings = CaptionSettings {
            line_color: Some("not-a-colour".to_string()),
            position: Some("sideways".to_string()),
            ..Default::default()
        };
        let (style, warnings) = settings.resolve();
        assert_eq!(style.line_color, DEFAULT_LINE_COLOR);
        assert_eq!(style.position, CaptionPosition::default());
        assert_eq!(warnings.len(), 2);
    }

    #[test]
    fn test_color_parse() {
        assert_eq!(Rgb::parse("ff8800"), Some(Rgb(0xFF, 0x88, 0x00)));
        assert_eq!(Rgb::parse("#FFFFFF"), Some(Rgb(0xFF, 0xFF, 0xFF)));
        assert_eq!(Rgb::parse("Yellow"), Some(Rgb(0xFF, 0xFF, 0x00)));
        assert_eq!(Rgb::parse("#FFF"), None);
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let result: Result<CaptionSettings, _> = serde_json::from_str(r#"{"glow": true}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_ass_alignment_codes() {
        assert_eq!(CaptionPosition::parse("bottom_center").unwrap().ass_alignment(), 2);
        assert_eq!(CaptionPosition::parse("middle").unwrap().ass_alignment(), 5);
        assert_eq!(CaptionPosition::parse("bottom_left").unwrap().ass_alignment(), 1);
    }
}
