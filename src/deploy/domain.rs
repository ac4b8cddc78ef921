//! Endpoint deployment types and the platform contract.

use serde::Serialize;

use crate::common::config::EndpointCfg;
use crate::common::error::PipelineResult;
use crate::training::TrainedArtifact;

/// Options of one deploy call.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DeployConfig {
    pub instance_count: u32,
    pub instance_type: String,
    pub endpoint_name: String,
    /// Replace the model behind an existing endpoint instead of creating one.
    pub update: bool,
    /// Block until the endpoint is serving.
    pub wait: bool,
}

impl DeployConfig {
    pub fn from_config(cfg: &EndpointCfg) -> Self {
        Self {
            instance_count: cfg.instance_count,
            instance_type: cfg.instance_type.clone(),
            endpoint_name: cfg.name.clone(),
            update: false,
            wait: cfg.wait,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DeployAction {
    Created,
    Updated,
}

/// Named reference to a deployed model.
#[derive(Clone, Debug, PartialEq)]
pub struct EndpointHandle {
    pub name: String,
    pub model: TrainedArtifact,
    pub action: DeployAction,
}

/// Endpoint management on the serving platform.
#[cfg_attr(test, mockall::automock)]
pub trait EndpointPlatform {
    /// Names of all existing endpoints.
    fn list_endpoints(&self) -> PipelineResult<Vec<String>>;

    /// Create or, when `config.update` is set, update the endpoint.
    fn deploy(&self, artifact: &TrainedArtifact, config: &DeployConfig) -> PipelineResult<()>;
}
