//! HTTP adapter: endpoint invocations.

use crate::common::error::PipelineResult;
use crate::common::http::PlatformClient;

use super::domain::InferenceTransport;

impl InferenceTransport for PlatformClient {
    fn invoke(&self, endpoint: &str, body: &[u8]) -> PipelineResult<Vec<u8>> {
        Ok(self.post_bytes(
            &format!("/endpoints/{endpoint}/invocations"),
            "application/json",
            body,
        )?)
    }
}
