//! Client core for the tinc-web daemon.
//!
//! This crate talks JSON-RPC 2.0 to the daemon and follows its event stream.
//!
//! # Architecture
//!
//! - [`transport`]: RPC executor. One multiplexed WebSocket for `ws://`
//!   endpoints, one HTTP POST per call otherwise
//! - [`client`]: id assignment, request envelope, response decoding
//! - [`api`]: typed wrappers for the `TincWeb` and `TincWebUI` namespaces
//! - [`events`]: reconnecting event subscriber and its handler registry
//! - [`protocol`]: JSON-RPC message types
//! - [`config`]: client configuration file
//! - [`error`]: error type and `Result` alias
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use tincweb_rpc::{EventName, EventSubscriber, RpcClient};
//!
//! # async fn example() -> tincweb_rpc::Result<()> {
//! let client = RpcClient::new("ws://127.0.0.1:8686/api/")?;
//! for network in client.tinc_web().networks().await? {
//!     println!("{} running={}", network.name, network.running);
//! }
//!
//! let events = EventSubscriber::start(
//!     "ws://127.0.0.1:8686/api/events",
//!     Duration::from_secs(1),
//! );
//! events.on(EventName::PeerJoined, |payload, name| {
//!     println!("{name}: {payload:?}");
//!     Ok(())
//! });
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod protocol;
pub mod transport;

pub use api::{TincWeb, TincWebMajordomo, TincWebUi};
pub use client::RpcClient;
pub use config::{ClientConfig, default_config_path, events_url_for};
pub use error::{Error, Result};
pub use events::{DispatchOutcome, EventHandler, EventSubscriber, Handlers, ReconnectState};
pub use protocol::{
    EventFrame, INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST, JSONRPC_VERSION,
    METHOD_NOT_FOUND, PARSE_ERROR, Request, Response, RpcError,
};
pub use transport::{ConnectionState, Executor, HttpExecutor, TransportKind, WsExecutor};

pub use tincweb_types::{
    Address, Endpoint, EndpointKind, EventName, EventPayload, Network, NetworkConfig, NetworkId,
    Node, Peer, PeerId, PeerInfo, Sharing, UiConfig, Upgrade,
};
