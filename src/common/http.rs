//! Blocking JSON-over-HTTP client for the platform control plane.
//!
//! Domain modules implement their platform traits on [`PlatformClient`] and
//! translate [`RemoteError`] into the matching [`PipelineError`] variant.

use std::io::Read;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::common::config::PlatformCfg;
use crate::common::error::PipelineError;

/// Failure of a single control-plane call.
#[derive(Debug)]
pub enum RemoteError {
    /// The platform answered with a non-success status.
    Status { url: String, code: u16, body: String },
    /// The request never produced a response.
    Transport { url: String, reason: String },
    /// The response body was not the expected JSON.
    Decode { url: String, reason: String },
}

impl RemoteError {
    /// Human readable reason, preferring the platform's own message.
    pub fn reason(&self) -> String {
        match self {
            RemoteError::Status { code, body, .. } => format!("HTTP {code}: {body}"),
            RemoteError::Transport { reason, .. } | RemoteError::Decode { reason, .. } => {
                reason.clone()
            }
        }
    }

    pub fn url(&self) -> &str {
        match self {
            RemoteError::Status { url, .. }
            | RemoteError::Transport { url, .. }
            | RemoteError::Decode { url, .. } => url,
        }
    }
}

impl From<RemoteError> for PipelineError {
    fn from(err: RemoteError) -> Self {
        PipelineError::Transport {
            url: err.url().to_string(),
            reason: err.reason(),
        }
    }
}

/// Handle on the platform API, shared by the training, deploy and
/// inference adapters.
#[derive(Clone)]
pub struct PlatformClient {
    base_url: String,
    agent: ureq::Agent,
    poll_interval: Duration,
}

impl PlatformClient {
    pub fn new(cfg: &PlatformCfg) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build();
        Self {
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            agent,
            poll_interval: Duration::from_secs(cfg.poll_interval_secs),
        }
    }

    /// Interval used when an adapter has to wait on a remote state change.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, RemoteError> {
        let url = self.url(path);
        tracing::debug!(%url, "GET");
        let response = self.agent.get(&url).call();
        Self::decode(url, response)
    }

    pub fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, RemoteError> {
        self.send_json("POST", path, body)
    }

    pub fn put_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, RemoteError> {
        self.send_json("PUT", path, body)
    }

    /// POST an opaque payload and return the raw response body.
    pub fn post_bytes(
        &self,
        path: &str,
        content_type: &str,
        body: &[u8],
    ) -> Result<Vec<u8>, RemoteError> {
        let url = self.url(path);
        tracing::debug!(%url, bytes = body.len(), "POST");
        let response = self
            .agent
            .post(&url)
            .set("Content-Type", content_type)
            .set("Accept", "application/json")
            .send_bytes(body);
        let response = Self::check(url.clone(), response)?;
        let mut out = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut out)
            .map_err(|err| RemoteError::Transport {
                url,
                reason: err.to_string(),
            })?;
        Ok(out)
    }

    fn send_json<B: Serialize, T: DeserializeOwned>(
        &self,
        method: &str,
        path: &str,
        body: &B,
    ) -> Result<T, RemoteError> {
        let url = self.url(path);
        let payload = serde_json::to_string(body).map_err(|err| RemoteError::Decode {
            url: url.clone(),
            reason: err.to_string(),
        })?;
        tracing::debug!(%url, method, "sending request");
        let response = self
            .agent
            .request(method, &url)
            .set("Content-Type", "application/json")
            .send_string(&payload);
        Self::decode(url, response)
    }

    fn check(
        url: String,
        response: Result<ureq::Response, ureq::Error>,
    ) -> Result<ureq::Response, RemoteError> {
        match response {
            Ok(resp) => Ok(resp),
            Err(ureq::Error::Status(code, resp)) => Err(RemoteError::Status {
                url,
                code,
                body: resp.into_string().unwrap_or_default(),
            }),
            Err(err) => Err(RemoteError::Transport {
                url,
                reason: err.to_string(),
            }),
        }
    }

    fn decode<T: DeserializeOwned>(
        url: String,
        response: Result<ureq::Response, ureq::Error>,
    ) -> Result<T, RemoteError> {
        let response = Self::check(url.clone(), response)?;
        let body = response.into_string().map_err(|err| RemoteError::Transport {
            url: url.clone(),
            reason: err.to_string(),
        })?;
        serde_json::from_str(&body).map_err(|err| RemoteError::Decode {
            url,
            reason: err.to_string(),
        })
    }
}
