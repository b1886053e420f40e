//! HTTP transport for the log collection endpoint
//!
//! Wire format: one `POST` per batch, JSON body `{"__logs__": [event, ...]}`,
//! with an `x-log-apiversion` header naming the log protocol version.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::event::Event;

/// Log protocol version sent in the `x-log-apiversion` header
pub const LOG_API_VERSION: &str = "0.6.0";

const API_VERSION_HEADER: &str = "x-log-apiversion";

/// Request body for a batch upload
#[derive(Serialize)]
struct LogsPayload<'a> {
    #[serde(rename = "__logs__")]
    logs: &'a [Event],
}

/// Shared HTTP client used by the adapters' `send`
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http_client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(API_VERSION_HEADER, HeaderValue::from_static(LOG_API_VERSION));

        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { http_client })
    }

    /// Post one batch; any non-2xx status is a failure
    pub async fn send(&self, events: &[Event], url: &str) -> Result<()> {
        let body = LogsPayload { logs: events };

        let response = self
            .http_client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown".to_string());
        Err(Error::Transport(format!(
            "endpoint error ({}): {}",
            status, error_text
        )))
    }
}
