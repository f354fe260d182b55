//! Shared types for tinc-web client components.
//!
//! This crate provides the data types exchanged with the tinc-web daemon:
//! network and peer descriptions returned by RPC methods, and the payloads
//! pushed on the event stream. All types are serializable for RPC transport
//! and use the daemon's camelCase field names.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Deserialize a Vec that may be null or missing (both become empty vec)
fn deserialize_null_as_empty_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let opt: Option<Vec<T>> = Option::deserialize(deserializer)?;
    Ok(opt.unwrap_or_default())
}

// ============================================================================
// Networks
// ============================================================================

/// Network summary as returned by `TincWeb.Networks` and friends
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    pub name: String,
    pub running: bool,
    /// Only present for detailed requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<NetworkConfig>,
}

/// Network configuration (tinc.conf plus tinc-web extras)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfig {
    pub name: String,
    pub port: u16,
    pub interface: String,
    #[serde(rename = "autostart")]
    pub auto_start: bool,
    #[serde(default)]
    pub mode: String,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub mask: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_null_as_empty_vec",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub connect_to: Vec<String>,
    #[serde(default)]
    pub broadcast: String,
}

// ============================================================================
// Peers and nodes
// ============================================================================

/// Peer entry as returned by `TincWeb.Peers` / `TincWeb.Peer`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub name: String,
    pub online: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Peer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Node>,
}

/// Runtime status of a peer reported by tincd
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    /// Address tincd sees the peer at
    #[serde(default)]
    pub address: String,
    /// Whether the host file was fetched from the peer
    #[serde(default)]
    pub fetched: bool,
    /// Host definition, present once fetched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Node>,
}

impl Peer {
    /// Node name, known only once the host file was fetched
    #[must_use]
    pub fn node_name(&self) -> Option<&str> {
        self.config
            .as_ref()
            .filter(|_| self.fetched)
            .map(|node| node.name.as_str())
    }
}

/// Host definition of a node in a network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub name: String,
    pub subnet: String,
    pub port: u16,
    #[serde(
        default,
        deserialize_with = "deserialize_null_as_empty_vec",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub address: Vec<Address>,
    pub public_key: String,
    #[serde(default)]
    pub version: i64,
}

/// Public address of a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

/// Exported network definition used by `Share` and `Import`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sharing {
    pub name: String,
    #[serde(default)]
    pub subnet: String,
    #[serde(
        default,
        deserialize_with = "deserialize_null_as_empty_vec",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub node: Vec<Node>,
}

/// Partial update of the self node, applied by `TincWeb.Upgrade`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Upgrade {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(
        default,
        deserialize_with = "deserialize_null_as_empty_vec",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub address: Vec<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
}

// ============================================================================
// UI support
// ============================================================================

/// Where an endpoint is reachable from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointKind {
    Local,
    Public,
}

/// Address the web UI can be reached on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub kind: EndpointKind,
}

/// Instance configuration reported by `TincWebUI.Configuration`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiConfig {
    pub binding: String,
}

// ============================================================================
// Events
// ============================================================================

/// Payload of `Started` and `Stopped`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkId {
    pub name: String,
}

/// Payload of `PeerDiscovered`, `PeerJoined` and `PeerLeft`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerId {
    pub network: String,
    pub node: String,
    #[serde(default)]
    pub subnet: Option<String>,
}

/// Name of an event pushed by the daemon on the event stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventName {
    Started,
    Stopped,
    PeerDiscovered,
    PeerJoined,
    PeerLeft,
}

impl EventName {
    pub const ALL: [EventName; 5] = [
        EventName::Started,
        EventName::Stopped,
        EventName::PeerDiscovered,
        EventName::PeerJoined,
        EventName::PeerLeft,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EventName::Started => "Started",
            EventName::Stopped => "Stopped",
            EventName::PeerDiscovered => "PeerDiscovered",
            EventName::PeerJoined => "PeerJoined",
            EventName::PeerLeft => "PeerLeft",
        }
    }

    /// Whether the payload of this event is a [`PeerId`]
    #[must_use]
    pub fn is_peer_event(self) -> bool {
        matches!(
            self,
            EventName::PeerDiscovered | EventName::PeerJoined | EventName::PeerLeft
        )
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an event name outside the known vocabulary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEventName(pub String);

impl fmt::Display for UnknownEventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown event: {}", self.0)
    }
}

impl std::error::Error for UnknownEventName {}

impl FromStr for EventName {
    type Err = UnknownEventName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| UnknownEventName(s.to_string()))
    }
}

/// Decoded event payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum EventPayload {
    Network(NetworkId),
    Peer(PeerId),
}

impl EventPayload {
    /// Decode a raw payload using the shape implied by the event name.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload does not match the expected shape.
    pub fn decode(name: EventName, payload: serde_json::Value) -> serde_json::Result<Self> {
        if name.is_peer_event() {
            serde_json::from_value(payload).map(EventPayload::Peer)
        } else {
            serde_json::from_value(payload).map(EventPayload::Network)
        }
    }

    #[must_use]
    pub fn as_network(&self) -> Option<&NetworkId> {
        match self {
            EventPayload::Network(id) => Some(id),
            EventPayload::Peer(_) => None,
        }
    }

    #[must_use]
    pub fn as_peer(&self) -> Option<&PeerId> {
        match self {
            EventPayload::Peer(id) => Some(id),
            EventPayload::Network(_) => None,
        }
    }

    /// Network the event refers to
    #[must_use]
    pub fn network(&self) -> &str {
        match self {
            EventPayload::Network(id) => &id.name,
            EventPayload::Peer(id) => &id.network,
        }
    }
}
