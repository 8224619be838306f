//! Model-level errors.

use thiserror::Error;

pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unsupported aspect ratio: {0}")]
    UnsupportedAspectRatio(String),

    #[error("Unknown TTS engine: {0}")]
    UnknownEngine(String),

    #[error("Custom media scene index {index} is out of range for {scene_count} scenes")]
    SceneIndexOutOfRange { index: usize, scene_count: usize },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ModelError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }
}
