//! Deploy domain: create or update the serving endpoint.

pub mod domain;
pub mod remote;
pub mod service;

pub use domain::{DeployAction, DeployConfig, EndpointHandle, EndpointPlatform};
pub use service::EndpointDeployer;
