//! Per-job working directories.

use reel_media::{remove_dir_quietly, remove_file_quietly};
use reel_models::JobId;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{PipelineError, PipelineResult};

/// Layout of one job under the storage root:
/// `<root>/<job_id>/scene_<n>/` for scene work and `<root>/<job_id>.mp4`
/// for the finished artifact.
#[derive(Debug, Clone)]
pub struct JobWorkspace {
    job_dir: PathBuf,
    final_path: PathBuf,
}

impl JobWorkspace {
    /// Create the job directory.
    pub async fn create(root: &Path, job_id: &JobId) -> PipelineResult<Self> {
        if !job_id.is_path_safe() {
            return Err(PipelineError::validation(format!(
                "job id '{job_id}' cannot be used as a directory name"
            )));
        }
        let job_dir = root.join(job_id.as_str());
        tokio::fs::create_dir_all(&job_dir).await?;
        debug!(dir = ?job_dir, "Created job workspace");
        Ok(Self {
            final_path: root.join(format!("{}.mp4", job_id.as_str())),
            job_dir,
        })
    }

    pub fn job_dir(&self) -> &Path {
        &self.job_dir
    }

    /// Working directory for scene `index`; scenes never share one.
    pub fn scene_dir(&self, index: usize) -> PathBuf {
        self.job_dir.join(format!("scene_{index}"))
    }

    /// Where the finished video ends up.
    pub fn final_path(&self) -> &Path {
        &self.final_path
    }

    /// Remove everything but the final artifact.
    pub async fn cleanup(&self) {
        remove_dir_quietly(&self.job_dir).await;
    }

    /// Remove everything, the final artifact included.
    pub async fn discard(&self) {
        self.cleanup().await;
        remove_file_quietly(&self.final_path).await;
    }
}
