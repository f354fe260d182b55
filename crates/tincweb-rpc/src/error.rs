//! Error types for the tincweb-rpc crate.
//!
//! This module provides a unified error type for all RPC-related operations.
//! Variants fall into three families callers branch on: transport failures
//! (retryable with a fresh call), correlation misuse (a caller bug), and
//! application errors reported by the daemon.

use crate::protocol::RpcError;

/// Unified error type for RPC operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("{status} {text}")]
    Status { status: u16, text: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Request timeout")]
    Timeout,

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("already exists pending request with id {0}")]
    DuplicateId(u64),

    #[error("RPC error {0}")]
    Rpc(RpcError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),
}

impl Error {
    /// Connectivity problem; the same call may succeed if issued again
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Connect(_)
                | Error::ConnectionClosed
                | Error::Status { .. }
                | Error::Http(_)
                | Error::WebSocket(_)
                | Error::Timeout
        )
    }

    /// Error reported by the daemon in a well-formed response
    #[must_use]
    pub fn is_application(&self) -> bool {
        matches!(self, Error::Rpc(_))
    }

    /// Daemon error object, if this is an application error
    #[must_use]
    pub fn rpc_error(&self) -> Option<&RpcError> {
        match self {
            Error::Rpc(e) => Some(e),
            _ => None,
        }
    }
}

impl From<RpcError> for Error {
    fn from(e: RpcError) -> Self {
        Self::Rpc(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
