//! HTTP adapter: training jobs on the platform control plane.

use serde::de::IgnoredAny;
use serde::Deserialize;

use crate::common::error::{PipelineError, PipelineResult};
use crate::common::http::{PlatformClient, RemoteError};
use crate::store::StorePath;

use super::domain::{JobSpec, JobState, JobStatus, TrainingPlatform};

/// Job status names reported by the platform.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
pub enum RemoteJobStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Stopped,
}

impl From<RemoteJobStatus> for JobState {
    fn from(status: RemoteJobStatus) -> Self {
        match status {
            RemoteJobStatus::Pending => JobState::Submitted,
            RemoteJobStatus::InProgress => JobState::Running,
            RemoteJobStatus::Completed => JobState::Succeeded,
            RemoteJobStatus::Failed | RemoteJobStatus::Stopped => JobState::Failed,
        }
    }
}

#[derive(Debug, Deserialize)]
struct DescribeJobResponse {
    status: RemoteJobStatus,
    #[serde(default)]
    failure_reason: Option<String>,
    #[serde(default)]
    model_artifacts: Option<StorePath>,
}

impl DescribeJobResponse {
    fn into_status(self) -> JobStatus {
        let failure_reason = match (self.status, self.failure_reason) {
            (RemoteJobStatus::Stopped, None) => Some("job was stopped".to_string()),
            (_, reason) => reason,
        };
        JobStatus {
            state: self.status.into(),
            failure_reason,
            model_artifacts: self.model_artifacts,
        }
    }
}

impl TrainingPlatform for PlatformClient {
    fn submit(&self, spec: &JobSpec) -> PipelineResult<()> {
        self.post_json::<_, IgnoredAny>("/training-jobs", spec)
            .map_err(|err| match err {
                RemoteError::Status { .. } => PipelineError::TrainingJobFailed {
                    job: spec.job_name.clone(),
                    reason: err.reason(),
                },
                other => other.into(),
            })?;
        Ok(())
    }

    fn describe(&self, job_name: &str) -> PipelineResult<JobStatus> {
        let response: DescribeJobResponse =
            self.get_json(&format!("/training-jobs/{job_name}"))?;
        Ok(response.into_status())
    }
}
