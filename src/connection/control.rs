//! Control channel: one HTTP round trip per action

use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use teleop_shared::command::HttpMethod;
use teleop_shared::ControlEndpoint;
use tracing::debug;

use crate::error::RequestError;

/// Raw response to a control request
#[derive(Debug, Clone, PartialEq)]
pub struct ControlReply {
    pub status: u16,
    /// Parsed JSON body, or the body text as a JSON string if it is not JSON
    pub body: Value,
}

impl ControlReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Request/response transport to the vehicle driver
///
/// Implementations report transport failures only; status handling is left
/// to the caller.
#[async_trait]
pub trait ControlChannel: Send + Sync {
    async fn request(&self, endpoint: ControlEndpoint) -> Result<ControlReply, RequestError>;
}

/// HTTP control channel backed by `reqwest`
pub struct HttpControlChannel {
    http: reqwest::Client,
    base_url: reqwest::Url,
}

impl HttpControlChannel {
    /// `timeout` of `None` waits for the driver indefinitely
    pub fn new(base_url: &str, timeout: Option<Duration>) -> anyhow::Result<Self> {
        let mut base_url = reqwest::Url::parse(base_url).context("invalid control channel url")?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            http: builder.build().context("failed to build http client")?,
            base_url,
        })
    }

    pub fn url_for(&self, endpoint: ControlEndpoint) -> Result<reqwest::Url, RequestError> {
        self.base_url
            .join(endpoint.path().trim_start_matches('/'))
            .map_err(|e| RequestError::Transport {
                endpoint,
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl ControlChannel for HttpControlChannel {
    async fn request(&self, endpoint: ControlEndpoint) -> Result<ControlReply, RequestError> {
        let transport = |reason: String| RequestError::Transport { endpoint, reason };

        let url = self.url_for(endpoint)?;
        let request = match endpoint.method() {
            HttpMethod::Get => self.http.get(url),
            HttpMethod::Post => self.http.post(url),
        };

        debug!("-> {:?} {}", endpoint.method(), endpoint);
        let response = request.send().await.map_err(|e| transport(e.to_string()))?;
        let status = response.status().as_u16();
        let bytes = response.bytes().await.map_err(|e| transport(e.to_string()))?;

        let body = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        debug!("<- {} {}", status, endpoint);

        Ok(ControlReply { status, body })
    }
}
