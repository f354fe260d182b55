//! Stateless transport: one HTTP POST per call.
//!
//! HTTP pairs each response with its request, so no correlation table is
//! kept and calls share nothing beyond the connection pool inside
//! `reqwest::Client`.

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};

/// HTTP strategy of the RPC executor
pub struct HttpExecutor {
    url: String,
    http: reqwest::Client,
    timeout: Option<Duration>,
}

impl HttpExecutor {
    #[must_use]
    pub fn new(url: impl Into<String>, timeout: Option<Duration>) -> Self {
        Self {
            url: url.into(),
            http: reqwest::Client::new(),
            timeout,
        }
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// POST `payload` and decode the response body.
    ///
    /// # Errors
    ///
    /// - `Error::Status` for a non-success status code, carrying the code
    ///   and its reason phrase
    /// - `Error::Timeout` if a timeout is configured and expires
    /// - `Error::Http` for any other transport failure
    /// - `Error::Json` if the body is not JSON
    pub async fn call(&self, id: u64, payload: String) -> Result<Value> {
        let mut request = self
            .http
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .body(payload);
        if let Some(limit) = self.timeout {
            request = request.timeout(limit);
        }

        let response = request.send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        debug!(id, %status, "HTTP response");

        if !status.is_success() {
            return Err(Error::Status {
                status: status.as_u16(),
                text: status
                    .canonical_reason()
                    .unwrap_or("Unknown Status")
                    .to_string(),
            });
        }

        let body = response.bytes().await.map_err(map_reqwest_error)?;
        Ok(serde_json::from_slice(&body)?)
    }
}

fn map_reqwest_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout
    } else {
        Error::Http(e)
    }
}
