//! facesift-bridge — HTTP client for the messaging bridge.
//!
//! The bridge exposes a single endpoint, `POST /api/send`, taking a JSON
//! body with an optional media attachment. Media travels by local path:
//! the bridge runs on the same host and reads the file itself, so only
//! the path string crosses the wire.
//!
//! All calls are blocking with a bounded timeout; the pipeline runs them
//! from its dedicated worker thread.

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("invalid endpoint url {0}")]
    Endpoint(String),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("bridge returned status {0}")]
    Status(u16),
}

/// JSON body for `POST /api/send`.
///
/// The media fields are omitted for plain text messages, matching the
/// bridge's `omitempty` contract.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SendMessageRequest {
    pub phone: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

impl SendMessageRequest {
    /// Plain text message to a recipient or group.
    pub fn text(phone: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            phone: phone.into(),
            message: message.into(),
            media_url: None,
            media_type: None,
            caption: None,
        }
    }

    /// Image attachment with a caption. `media_path` is a path on the
    /// bridge's local filesystem.
    pub fn image(
        phone: impl Into<String>,
        media_path: impl Into<String>,
        caption: impl Into<String>,
    ) -> Self {
        Self {
            phone: phone.into(),
            message: String::new(),
            media_url: Some(media_path.into()),
            media_type: Some("image".to_string()),
            caption: Some(caption.into()),
        }
    }
}

/// Blocking client for the bridge's send endpoint.
pub struct BridgeClient {
    client: Client,
    endpoint: reqwest::Url,
}

impl BridgeClient {
    /// Build a client against the full send-endpoint URL.
    ///
    /// The timeout bounds each send; a hung bridge surfaces as a request
    /// error rather than a stalled pipeline.
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, BridgeError> {
        let endpoint = reqwest::Url::parse(endpoint)
            .map_err(|e| BridgeError::Endpoint(format!("{endpoint:?}: {e}")))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .user_agent("facesift")
            .timeout(timeout)
            .build()?;

        Ok(Self { client, endpoint })
    }

    /// POST one message. Any non-2xx response is an error.
    pub fn send(&self, request: &SendMessageRequest) -> Result<(), BridgeError> {
        let response = self.client.post(self.endpoint.clone()).json(request).send()?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), phone = %request.phone, "bridge rejected message");
            return Err(BridgeError::Status(status.as_u16()));
        }

        tracing::debug!(phone = %request.phone, "message accepted by bridge");
        Ok(())
    }
}
