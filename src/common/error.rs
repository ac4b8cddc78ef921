//! Error handling primitives shared across the pipeline.
//!
//! Every failure surfaces as a [`PipelineError`]; local recovery is limited to
//! the overwrite-skip decision in the artifact writer, everything else
//! propagates to the caller.

use thiserror::Error;

/// Stable error codes, handy for process exit statuses and log filtering.
#[repr(u32)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ErrorCode {
    /// Malformed or non-monotonic input data.
    DataFormat = 1,
    /// Object store list/get/put failure.
    Store = 2,
    /// Remote training job reached a failed terminal state.
    TrainingJobFailed = 3,
    /// Platform rejected an endpoint create/update.
    EndpointDeploy = 4,
    /// Inference response did not match the wire protocol.
    ResponseFormat = 5,
    /// Missing or inconsistent configuration.
    Config = 6,
    /// HTTP-level failure talking to the platform.
    Transport = 7,
}

/// Canonical error type for the crate.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("data format error: {0}")]
    DataFormat(String),

    #[error("object store error at '{path}': {reason}")]
    Store { path: String, reason: String },

    #[error("training job '{job}' failed: {reason}")]
    TrainingJobFailed { job: String, reason: String },

    #[error("deploying endpoint '{endpoint}' failed: {reason}")]
    EndpointDeploy { endpoint: String, reason: String },

    #[error("malformed inference response: {0}")]
    ResponseFormat(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("platform request to '{url}' failed: {reason}")]
    Transport { url: String, reason: String },
}

/// Result alias used throughout the crate.
pub type PipelineResult<T> = Result<T, PipelineError>;

impl PipelineError {
    /// Machine readable code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            PipelineError::DataFormat(_) => ErrorCode::DataFormat,
            PipelineError::Store { .. } => ErrorCode::Store,
            PipelineError::TrainingJobFailed { .. } => ErrorCode::TrainingJobFailed,
            PipelineError::EndpointDeploy { .. } => ErrorCode::EndpointDeploy,
            PipelineError::ResponseFormat(_) => ErrorCode::ResponseFormat,
            PipelineError::Config(_) => ErrorCode::Config,
            PipelineError::Transport { .. } => ErrorCode::Transport,
        }
    }

    /// Validation helper.
    pub fn data_format(msg: impl Into<String>) -> Self {
        PipelineError::DataFormat(msg.into())
    }

    /// Store helper.
    pub fn store(path: impl ToString, reason: impl ToString) -> Self {
        PipelineError::Store {
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Configuration helper.
    pub fn config(msg: impl Into<String>) -> Self {
        PipelineError::Config(msg.into())
    }

    /// Inference response helper.
    pub fn response_format(msg: impl Into<String>) -> Self {
        PipelineError::ResponseFormat(msg.into())
    }
}
