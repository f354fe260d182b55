//! JSON-RPC 2.0 protocol types.
//!
//! This module provides the JSON-RPC 2.0 envelopes exchanged with the
//! tinc-web daemon, plus the event frame pushed on the event stream.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";
pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

fn default_version() -> String {
    JSONRPC_VERSION.to_string()
}

/// JSON-RPC 2.0 Request
///
/// `params` is always sent, as a positional array for the tinc-web methods.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub jsonrpc: String,
    pub method: String,
    pub id: u64,
    pub params: Value,
}

impl Request {
    #[must_use]
    pub fn new(method: impl Into<String>, params: Value, id: u64) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            id,
            params,
        }
    }
}

/// JSON-RPC 2.0 Response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    #[serde(default = "default_version")]
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    /// Null when the daemon could not read the request id
    #[serde(default)]
    pub id: Option<u64>,
}

impl Response {
    /// Split the envelope into its outcome.
    ///
    /// An `error` member wins over `result`; a response carrying neither
    /// resolves to `null`.
    ///
    /// # Errors
    ///
    /// Returns the daemon-reported [`RpcError`] when present.
    pub fn into_result(self) -> Result<Value, RpcError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// JSON-RPC 2.0 Error object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    #[must_use]
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for RpcError {}

/// Unsolicited frame on the event stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventFrame {
    pub event: String,
    #[serde(default)]
    pub payload: Value,
}

impl EventFrame {
    /// Parse a text frame from the event stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a JSON `{event, payload}` object.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Correlation id of a decoded inbound frame, if it carries a numeric one
#[must_use]
pub fn frame_id(frame: &Value) -> Option<u64> {
    frame.get("id").and_then(Value::as_u64)
}
