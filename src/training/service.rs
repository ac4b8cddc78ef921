//! Submits a training job and blocks until it reaches a terminal state.

use std::thread;
use std::time::Duration;

use crate::common::error::{PipelineError, PipelineResult};
use crate::common::log;

use super::domain::{JobSpec, JobState, TrainedArtifact, TrainingPlatform};

/// Artifact location assumed when the platform does not report one.
const DEFAULT_ARTIFACT: &str = "output/model.tar.gz";

pub struct TrainingJobClient<'a> {
    platform: &'a dyn TrainingPlatform,
    poll_interval: Duration,
}

impl<'a> TrainingJobClient<'a> {
    pub fn new(platform: &'a dyn TrainingPlatform, poll_interval: Duration) -> Self {
        Self {
            platform,
            poll_interval,
        }
    }

    /// Submit `spec`, then poll until the job succeeds or fails.
    ///
    /// A failed job surfaces as [`PipelineError::TrainingJobFailed`]
    /// carrying the platform's reason. Nothing is retried.
    pub fn fit(&self, spec: &JobSpec) -> PipelineResult<TrainedArtifact> {
        log::banner("start training-job");
        let job = spec.job_name.as_str();
        let mut state = JobState::Configured;

        self.platform.submit(spec)?;
        state = state.advance(JobState::Submitted);
        tracing::info!(job, instance_type = %spec.instance_type, "training job submitted");

        let status = loop {
            let status = self.platform.describe(job)?;
            let next = state.advance(status.state);
            if next != state {
                tracing::info!(job, from = ?state, to = ?next, "training job state changed");
                state = next;
            }
            if state.is_terminal() {
                break status;
            }
            tracing::debug!(job, state = ?state, "waiting for training job");
            thread::sleep(self.poll_interval);
        };

        if state == JobState::Failed {
            let reason = status
                .failure_reason
                .unwrap_or_else(|| "no reason reported".to_string());
            tracing::error!(job, %reason, "training job failed");
            return Err(PipelineError::TrainingJobFailed {
                job: job.to_string(),
                reason,
            });
        }

        let model_data = status.model_artifacts.unwrap_or_else(|| {
            spec.output_path
                .join(job)
                .join(DEFAULT_ARTIFACT)
        });
        log::banner("training-job is finished");
        tracing::info!(job, %model_data, "model artifact ready");
        Ok(TrainedArtifact {
            job_name: job.to_string(),
            model_data,
            image: spec.image.clone(),
        })
    }
}
