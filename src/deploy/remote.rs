//! HTTP adapter: endpoints on the platform control plane.

use std::thread;

use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};

use crate::common::error::{PipelineError, PipelineResult};
use crate::common::http::{PlatformClient, RemoteError};
use crate::store::StorePath;
use crate::training::TrainedArtifact;

use super::domain::{DeployConfig, EndpointPlatform};

#[derive(Debug, Deserialize)]
struct ListEndpointsResponse {
    endpoints: Vec<EndpointSummary>,
}

#[derive(Debug, Deserialize)]
struct EndpointSummary {
    endpoint_name: String,
}

#[derive(Debug, Serialize)]
struct DeployRequest<'a> {
    endpoint_name: &'a str,
    model_data: &'a StorePath,
    image: &'a str,
    instance_count: u32,
    instance_type: &'a str,
}

/// Endpoint status names reported by the platform.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
pub enum EndpointStatus {
    Creating,
    Updating,
    InService,
    Failed,
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct DescribeEndpointResponse {
    status: EndpointStatus,
    #[serde(default)]
    failure_reason: Option<String>,
}

fn deploy_error(endpoint: &str, err: RemoteError) -> PipelineError {
    match err {
        RemoteError::Status { .. } => PipelineError::EndpointDeploy {
            endpoint: endpoint.to_string(),
            reason: err.reason(),
        },
        other => other.into(),
    }
}

impl PlatformClient {
    fn wait_in_service(&self, endpoint: &str) -> PipelineResult<()> {
        loop {
            let described: DescribeEndpointResponse = self
                .get_json(&format!("/endpoints/{endpoint}"))
                .map_err(|err| deploy_error(endpoint, err))?;
            match described.status {
                EndpointStatus::InService => return Ok(()),
                EndpointStatus::Failed => {
                    return Err(PipelineError::EndpointDeploy {
                        endpoint: endpoint.to_string(),
                        reason: described
                            .failure_reason
                            .unwrap_or_else(|| "endpoint failed".to_string()),
                    })
                }
                status => {
                    tracing::debug!(endpoint, ?status, "waiting for endpoint");
                    thread::sleep(self.poll_interval());
                }
            }
        }
    }
}

impl EndpointPlatform for PlatformClient {
    fn list_endpoints(&self) -> PipelineResult<Vec<String>> {
        let response: ListEndpointsResponse = self.get_json("/endpoints")?;
        Ok(response
            .endpoints
            .into_iter()
            .map(|e| e.endpoint_name)
            .collect())
    }

    fn deploy(&self, artifact: &TrainedArtifact, config: &DeployConfig) -> PipelineResult<()> {
        let name = config.endpoint_name.as_str();
        let request = DeployRequest {
            endpoint_name: name,
            model_data: &artifact.model_data,
            image: &artifact.image,
            instance_count: config.instance_count,
            instance_type: &config.instance_type,
        };
        let sent = if config.update {
            self.put_json::<_, IgnoredAny>(&format!("/endpoints/{name}"), &request)
        } else {
            self.post_json::<_, IgnoredAny>("/endpoints", &request)
        };
        sent.map_err(|err| deploy_error(name, err))?;

        if config.wait {
            self.wait_in_service(name)?;
        }
        Ok(())
    }
}
