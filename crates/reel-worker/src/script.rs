//! Script decomposition into scenes.

use regex::Regex;
use reel_models::Scene;
use std::sync::LazyLock;

use crate::error::{PipelineError, PipelineResult};

/// A blank line, possibly holding whitespace, separates paragraphs.
static PARAGRAPH_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t\f\v]*\n").unwrap());

/// Split a script into scenes, one per non-empty paragraph.
///
/// Paragraph text is trimmed; indices are 0-based and contiguous in
/// document order.
pub fn decompose(script: &str) -> PipelineResult<Vec<Scene>> {
    let normalized = script.replace("\r\n", "\n");
    let scenes: Vec<Scene> = PARAGRAPH_SEPARATOR
        .split(&normalized)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .enumerate()
        .map(|(index, text)| Scene::new(index, text))
        .collect();

    if scenes.is_empty() {
        return Err(PipelineError::EmptyScript);
    }
    Ok(scenes)
}
