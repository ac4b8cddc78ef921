//! Training domain: job specification, submission and the blocking wait.

pub mod domain;
pub mod remote;
pub mod service;

pub use domain::{Hyperparameters, JobSpec, JobState, JobStatus, TrainedArtifact, TrainingPlatform};
pub use service::TrainingJobClient;
