//! HTTP transport seam. `JsonApiClient` talks to this trait rather than to
//! `reqwest` directly, the same shape as `holon-todoist`'s `fake_wrapper.rs`
//! swapping a fake implementation of a datasource trait in for tests —
//! here the swapped trait is the HTTP boundary itself.

use async_trait::async_trait;
use reqwest::Method;

use conduit_api::ConduitError;

/// A single JSON:API request/response round trip, already decoded to a
/// `serde_json::Value` (or rejected into `ConduitError::ServerError` if the
/// response status was not a success).
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, ConduitError>;
}

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        let mut builder = reqwest::Client::builder();
        #[cfg(not(target_arch = "wasm32"))]
        {
            builder = builder.timeout(std::time::Duration::from_secs(30));
        }
        Self {
            client: builder.build().expect("failed to build reqwest client"),
        }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

/// Mirrors `holon-todoist/client.rs`'s `format_reqwest_error`: classify the
/// failure mode so the resulting `ConduitError` is actionable rather than a
/// bare `reqwest::Error` debug dump.
fn format_reqwest_error(e: reqwest::Error, url: &str, operation: &str) -> String {
    if e.is_timeout() {
        format!("{operation} {url}: timeout")
    } else if e.is_connect() {
        format!("{operation} {url}: connection error: {e}")
    } else if e.is_decode() {
        format!("{operation} {url}: could not decode response body: {e}")
    } else {
        format!("{operation} {url}: {e}")
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, ConduitError> {
        let mut request = self
            .client
            .request(method, url)
            .header("Content-Type", "application/vnd.api+json")
            .header("Accept", "application/vnd.api+json");
        if let Some(body) = &body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            ConduitError::other(format_reqwest_error(e, url, "request failed"))
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            ConduitError::other(format_reqwest_error(e, url, "failed reading response body for"))
        })?;

        let parsed: serde_json::Value = if text.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_str(&text)
                .map_err(|e| ConduitError::other(format!("invalid JSON from {url}: {e}")))?
        };

        if !status.is_success() {
            return Err(ConduitError::ServerError {
                status: status.as_u16(),
                body: parsed,
            });
        }

        Ok(parsed)
    }
}
