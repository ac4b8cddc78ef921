//! Domain types for remote training jobs.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::common::config::PipelineConfig;
use crate::common::error::PipelineResult;
use crate::common::time::{self, Frequency};
use crate::store::StorePath;

/// Hyperparameters handed to the forecasting algorithm.
///
/// Fields are private; a set is fixed once built.
#[derive(Clone, Debug, PartialEq)]
pub struct Hyperparameters {
    time_freq: Frequency,
    epochs: u32,
    early_stopping_patience: u32,
    mini_batch_size: u32,
    learning_rate: f64,
    context_length: usize,
    prediction_length: usize,
}

impl Hyperparameters {
    pub fn from_config(cfg: &PipelineConfig) -> Self {
        Self {
            time_freq: cfg.dataset.freq.clone(),
            epochs: cfg.training.epochs,
            early_stopping_patience: cfg.training.early_stopping_patience,
            mini_batch_size: cfg.training.mini_batch_size,
            learning_rate: cfg.training.learning_rate,
            context_length: cfg.dataset.context_length,
            prediction_length: cfg.dataset.prediction_length,
        }
    }

    pub fn time_freq(&self) -> &Frequency {
        &self.time_freq
    }

    pub fn epochs(&self) -> u32 {
        self.epochs
    }

    pub fn early_stopping_patience(&self) -> u32 {
        self.early_stopping_patience
    }

    pub fn mini_batch_size(&self) -> u32 {
        self.mini_batch_size
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    pub fn context_length(&self) -> usize {
        self.context_length
    }

    pub fn prediction_length(&self) -> usize {
        self.prediction_length
    }

    /// String map sent to the platform. The learning rate uses exponent
    /// notation (`5E-4`).
    pub fn to_wire(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("time_freq".to_string(), self.time_freq.to_string()),
            ("epochs".to_string(), self.epochs.to_string()),
            (
                "early_stopping_patience".to_string(),
                self.early_stopping_patience.to_string(),
            ),
            ("mini_batch_size".to_string(), self.mini_batch_size.to_string()),
            ("learning_rate".to_string(), format!("{:E}", self.learning_rate)),
            ("context_length".to_string(), self.context_length.to_string()),
            (
                "prediction_length".to_string(),
                self.prediction_length.to_string(),
            ),
        ])
    }
}

/// Everything the platform needs to start a job.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct JobSpec {
    pub job_name: String,
    pub image: String,
    pub role: String,
    pub instance_count: u32,
    pub instance_type: String,
    pub output_path: StorePath,
    pub hyperparameters: BTreeMap<String, String>,
    /// Named data channels, `train` and `test`.
    pub channels: BTreeMap<String, StorePath>,
}

impl JobSpec {
    pub fn new(
        cfg: &PipelineConfig,
        hyperparameters: &Hyperparameters,
        train: StorePath,
        test: StorePath,
        now: DateTime<Utc>,
    ) -> Self {
        let tr = &cfg.training;
        Self {
            job_name: format!("{}-{}", tr.base_job_name, time::job_suffix(now)),
            image: tr.image.clone(),
            role: tr.role.clone(),
            instance_count: tr.instance_count,
            instance_type: tr.instance_type.clone(),
            output_path: cfg.output_path(),
            hyperparameters: hyperparameters.to_wire(),
            channels: BTreeMap::from([("train".to_string(), train), ("test".to_string(), test)]),
        }
    }
}

/// Lifecycle of a job as seen by the client.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum JobState {
    Configured,
    Submitted,
    Running,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }

    fn rank(self) -> u8 {
        match self {
            JobState::Configured => 0,
            JobState::Submitted => 1,
            JobState::Running => 2,
            JobState::Succeeded | JobState::Failed => 3,
        }
    }

    /// State after observing `observed`. Terminal states are final and
    /// the state never moves backwards.
    pub fn advance(self, observed: JobState) -> JobState {
        if self.is_terminal() || observed.rank() < self.rank() {
            self
        } else {
            observed
        }
    }
}

/// Snapshot returned by the platform when a job is described.
#[derive(Clone, Debug, PartialEq)]
pub struct JobStatus {
    pub state: JobState,
    pub failure_reason: Option<String>,
    pub model_artifacts: Option<StorePath>,
}

/// Handle on the model produced by a successful job.
#[derive(Clone, Debug, PartialEq)]
pub struct TrainedArtifact {
    pub job_name: String,
    pub model_data: StorePath,
    pub image: String,
}

/// Remote training service.
#[cfg_attr(test, mockall::automock)]
pub trait TrainingPlatform {
    fn submit(&self, spec: &JobSpec) -> PipelineResult<()>;

    fn describe(&self, job_name: &str) -> PipelineResult<JobStatus>;
}
