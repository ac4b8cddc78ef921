//! End-to-end flow: prepare data, train, deploy.

use chrono::Utc;
use std::time::Duration;

use crate::common::config::PipelineConfig;
use crate::common::error::PipelineResult;
use crate::data::{self, PreparedData};
use crate::deploy::{DeployConfig, EndpointDeployer, EndpointHandle, EndpointPlatform};
use crate::store::ObjectStore;
use crate::training::{Hyperparameters, JobSpec, TrainingJobClient, TrainingPlatform};

/// External collaborators of a pipeline run.
pub struct Platforms<'a> {
    pub store: &'a dyn ObjectStore,
    pub training: &'a dyn TrainingPlatform,
    pub endpoints: &'a dyn EndpointPlatform,
}

#[derive(Debug)]
pub struct PipelineRun {
    pub data: PreparedData,
    pub endpoint: EndpointHandle,
}

/// Reader, builder and writer, then training, then deployment.
pub fn run(cfg: &PipelineConfig, platforms: &Platforms<'_>) -> PipelineResult<PipelineRun> {
    let prepared = data::prepare(platforms.store, cfg)?;

    let hyperparameters = Hyperparameters::from_config(cfg);
    let spec = JobSpec::new(
        cfg,
        &hyperparameters,
        prepared.train_path.clone(),
        prepared.test_path.clone(),
        Utc::now(),
    );
    let poll = Duration::from_secs(cfg.training.poll_interval_secs);
    let artifact = TrainingJobClient::new(platforms.training, poll).fit(&spec)?;

    let deployer = EndpointDeployer::new(platforms.endpoints, DeployConfig::from_config(&cfg.endpoint));
    let endpoint = deployer.deploy(&artifact, &cfg.endpoint.name)?;
    tracing::info!(endpoint = %endpoint.name, action = ?endpoint.action, "pipeline finished");

    Ok(PipelineRun {
        data: prepared,
        endpoint,
    })
}
