//! JSON-RPC client for the tinc-web daemon.
//!
//! Wraps whichever transport the endpoint selected: assigns ids, builds the
//! envelope, and splits the decoded response into a result or a daemon
//! error. Behaves identically over WebSocket and HTTP.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::Result;
use crate::protocol::{Request, Response};
use crate::transport::{Executor, TransportKind};

/// RPC client bound to one daemon endpoint
pub struct RpcClient {
    executor: Executor,
    /// Last id handed out; the first request gets 2
    last_id: AtomicU64,
}

impl RpcClient {
    /// Create a client for `endpoint` with default settings.
    ///
    /// No connection is made until the first call.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidEndpoint` if `endpoint` is not a valid URL.
    pub fn new(endpoint: &str) -> Result<Self> {
        Self::with_config(&ClientConfig::new(endpoint))
    }

    /// Create a client from a full configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidEndpoint` if the configured endpoint is not a valid URL.
    pub fn with_config(config: &ClientConfig) -> Result<Self> {
        let executor = Executor::for_endpoint(&config.endpoint, config.request_timeout())?;
        debug!(
            "RPC client for {} using {} transport",
            config.endpoint,
            executor.kind()
        );
        Ok(Self {
            executor,
            last_id: AtomicU64::new(1),
        })
    }

    #[must_use]
    pub fn transport(&self) -> TransportKind {
        self.executor.kind()
    }

    #[must_use]
    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    fn next_id(&self) -> u64 {
        self.last_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Call `method` with raw JSON params and return the raw result.
    ///
    /// # Errors
    ///
    /// - `Error::Rpc` if the daemon answered with an error object
    /// - a transport error if the request could not be delivered or answered
    /// - `Error::Json` if the response body is not a JSON-RPC response
    pub async fn call_raw(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id();
        let request = Request::new(method, params, id);
        let payload = serde_json::to_string(&request)?;

        debug!(id, method, "Calling");
        let body = self.executor.call(id, payload).await?;

        let response: Response = serde_json::from_value(body)?;
        Ok(response.into_result()?)
    }

    /// Call `method` with serializable params and deserialize the result.
    ///
    /// # Errors
    ///
    /// Same as [`RpcClient::call_raw`], plus `Error::Json` if params cannot be
    /// serialized or the result does not match `R`.
    pub async fn call<P, R>(&self, method: &str, params: P) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let params = serde_json::to_value(params)?;
        let result = self.call_raw(method, params).await?;
        Ok(serde_json::from_value(result)?)
    }
}
