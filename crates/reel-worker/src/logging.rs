//! Structured job logging.
//!
//! [`JobLogger`] is the per-job logger the pipeline reports progress to.
//! Every entry carries the job ID and operation; scene helpers add the
//! scene index as a field.

use reel_models::JobId;
use tracing::{error, info, warn, Span};

use crate::error::PipelineStage;

/// Job logger for structured logging with consistent fields.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    operation: String,
}

impl JobLogger {
    pub fn new(job_id: &JobId, operation: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            operation: operation.to_string(),
        }
    }

    pub fn from_string(job_id: &str, operation: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            operation: operation.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(job_id = %self.job_id, operation = %self.operation, "Job started: {}", message);
    }

    pub fn log_progress(&self, message: &str) {
        info!(job_id = %self.job_id, operation = %self.operation, "Job progress: {}", message);
    }

    pub fn log_warning(&self, message: &str) {
        warn!(job_id = %self.job_id, operation = %self.operation, "Job warning: {}", message);
    }

    pub fn log_error(&self, message: &str) {
        error!(job_id = %self.job_id, operation = %self.operation, "Job error: {}", message);
    }

    pub fn log_completion(&self, message: &str) {
        info!(job_id = %self.job_id, operation = %self.operation, "Job completed: {}", message);
    }

    pub fn log_stage(&self, stage: PipelineStage) {
        info!(job_id = %self.job_id, operation = %self.operation, stage = %stage, "Job stage");
    }

    pub fn log_scene_started(&self, index: usize, attempt: u32) {
        info!(job_id = %self.job_id, scene = index, attempt, "Rendering scene");
    }

    pub fn log_scene_completed(&self, index: usize, duration: f64, tier: &str) {
        info!(
            job_id = %self.job_id,
            scene = index,
            duration_secs = duration,
            tier,
            "Scene rendered"
        );
    }

    pub fn log_scene_failed(&self, index: usize, attempts: u32, error: &str) {
        error!(
            job_id = %self.job_id,
            scene = index,
            attempts,
            error,
            "Scene failed permanently"
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Span covering the whole job.
    pub fn create_span(&self) -> Span {
        tracing::info_span!("job", job_id = %self.job_id, operation = %self.operation)
    }

    /// Span covering one scene render.
    pub fn scene_span(&self, index: usize) -> Span {
        tracing::info_span!("scene", job_id = %self.job_id, scene = index)
    }
}
