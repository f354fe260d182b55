//! RPC executor: moves one serialized request to the daemon and returns the
//! decoded response body.
//!
//! The strategy is picked once from the endpoint scheme:
//!
//! | scheme          | strategy                                  |
//! |-----------------|-------------------------------------------|
//! | `ws`, `wss`     | [`WsExecutor`], one multiplexed WebSocket |
//! | anything else   | [`HttpExecutor`], one POST per call       |

mod http;
mod ws;

use std::time::Duration;

use serde_json::Value;
use url::Url;

use crate::error::{Error, Result};

pub use http::HttpExecutor;
pub use ws::{ConnectionState, WsExecutor};

/// Which strategy an executor uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    WebSocket,
    Http,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::WebSocket => f.write_str("websocket"),
            TransportKind::Http => f.write_str("http"),
        }
    }
}

/// Transport strategy bound to one endpoint for its whole lifetime
pub enum Executor {
    WebSocket(WsExecutor),
    Http(HttpExecutor),
}

impl Executor {
    /// Select the strategy for `endpoint` by its URL scheme.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidEndpoint` if `endpoint` is not a valid URL.
    pub fn for_endpoint(endpoint: &str, timeout: Option<Duration>) -> Result<Self> {
        let url =
            Url::parse(endpoint).map_err(|e| Error::InvalidEndpoint(format!("{endpoint}: {e}")))?;

        Ok(match url.scheme() {
            "ws" | "wss" => Executor::WebSocket(WsExecutor::new(endpoint, timeout)),
            _ => Executor::Http(HttpExecutor::new(endpoint, timeout)),
        })
    }

    #[must_use]
    pub fn kind(&self) -> TransportKind {
        match self {
            Executor::WebSocket(_) => TransportKind::WebSocket,
            Executor::Http(_) => TransportKind::Http,
        }
    }

    #[must_use]
    pub fn url(&self) -> &str {
        match self {
            Executor::WebSocket(ws) => ws.url(),
            Executor::Http(http) => http.url(),
        }
    }

    /// Deliver `payload` (a serialized request carrying `id`) and return the
    /// decoded response body.
    ///
    /// # Errors
    ///
    /// Returns whatever the active strategy reports; see [`WsExecutor::call`]
    /// and [`HttpExecutor::call`].
    pub async fn call(&self, id: u64, payload: String) -> Result<Value> {
        match self {
            Executor::WebSocket(ws) => ws.call(id, payload).await,
            Executor::Http(http) => http.call(id, payload).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ws_schemes_select_websocket() {
        for endpoint in ["ws://127.0.0.1:8686/api/", "wss://vpn.example.com/api/t/"] {
            let executor = Executor::for_endpoint(endpoint, None).unwrap();
            assert_eq!(executor.kind(), TransportKind::WebSocket);
            assert_eq!(executor.url(), endpoint);
        }
    }

    #[test]
    fn test_http_and_unknown_schemes_select_http() {
        for endpoint in [
            "http://127.0.0.1:8686/api/",
            "https://vpn.example.com/api/",
            "unix:/run/tincweb.sock",
        ] {
            let executor = Executor::for_endpoint(endpoint, None).unwrap();
            assert_eq!(executor.kind(), TransportKind::Http);
        }
    }

    #[test]
    fn test_invalid_endpoint() {
        let result = Executor::for_endpoint("127.0.0.1:8686", None);
        assert!(matches!(result, Err(Error::InvalidEndpoint(_))));
    }

    #[test]
    fn test_transport_kind_display() {
        assert_eq!(TransportKind::WebSocket.to_string(), "websocket");
        assert_eq!(TransportKind::Http.to_string(), "http");
    }
}
