//! Create-or-update deployment of a trained model.

use crate::common::error::{PipelineError, PipelineResult};
use crate::common::log;
use crate::training::TrainedArtifact;

use super::domain::{DeployAction, DeployConfig, EndpointHandle, EndpointPlatform};

pub struct EndpointDeployer<'a> {
    platform: &'a dyn EndpointPlatform,
    defaults: DeployConfig,
}

impl<'a> EndpointDeployer<'a> {
    pub fn new(platform: &'a dyn EndpointPlatform, defaults: DeployConfig) -> Self {
        Self { platform, defaults }
    }

    /// Update `endpoint_name` in place when it exists, create it otherwise.
    pub fn deploy(
        &self,
        artifact: &TrainedArtifact,
        endpoint_name: &str,
    ) -> PipelineResult<EndpointHandle> {
        if endpoint_name.trim().is_empty() {
            return Err(PipelineError::config("endpoint name must not be empty"));
        }

        let existing = self.platform.list_endpoints()?;
        let update = existing.iter().any(|name| name == endpoint_name);
        let (action, verb) = if update {
            (DeployAction::Updated, "updating")
        } else {
            (DeployAction::Created, "creating")
        };

        let config = DeployConfig {
            endpoint_name: endpoint_name.to_string(),
            update,
            ..self.defaults.clone()
        };
        log::banner(&format!("start {verb} endpoint"));
        tracing::info!(
            endpoint = endpoint_name,
            model = %artifact.model_data,
            instance_type = %config.instance_type,
            instance_count = config.instance_count,
            update,
            "deploying"
        );
        self.platform.deploy(artifact, &config)?;
        log::banner(&format!("finish {verb} endpoint"));

        Ok(EndpointHandle {
            name: endpoint_name.to_string(),
            model: artifact.clone(),
            action,
        })
    }
}
