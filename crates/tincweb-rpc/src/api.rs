//! Typed wrappers for the daemon's JSON-RPC namespaces.
//!
//! Each method sends positional params in declaration order and decodes the
//! result into the matching `tincweb-types` struct.

use std::time::Duration;

use serde_json::json;
use tincweb_types::{Endpoint, Network, Node, PeerInfo, Sharing, UiConfig, Upgrade};

use crate::client::RpcClient;
use crate::error::Result;

impl RpcClient {
    /// Network and peer management (`TincWeb.*`)
    #[must_use]
    pub fn tinc_web(&self) -> TincWeb<'_> {
        TincWeb { client: self }
    }

    /// UI support calls (`TincWebUI.*`)
    #[must_use]
    pub fn ui(&self) -> TincWebUi<'_> {
        TincWebUi { client: self }
    }

    /// Joining public networks (`TincWebMajordomo.*`)
    #[must_use]
    pub fn majordomo(&self) -> TincWebMajordomo<'_> {
        TincWebMajordomo { client: self }
    }
}

/// Render a duration the way the daemon parses it (`"90s"`, `"1500ms"`)
fn go_duration(d: Duration) -> String {
    if d.subsec_millis() == 0 {
        format!("{}s", d.as_secs())
    } else {
        format!("{}ms", d.as_millis())
    }
}

/// `TincWeb` namespace
pub struct TincWeb<'a> {
    client: &'a RpcClient,
}

impl TincWeb<'_> {
    /// List of available networks (briefly, without config).
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails or the result cannot be decoded.
    pub async fn networks(&self) -> Result<Vec<Network>> {
        self.client.call("TincWeb.Networks", json!([])).await
    }

    /// Detailed network info.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails or the result cannot be decoded.
    pub async fn network(&self, name: &str) -> Result<Network> {
        self.client.call("TincWeb.Network", json!([name])).await
    }

    /// Create a network if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails or the result cannot be decoded.
    pub async fn create(&self, name: &str, subnet: &str) -> Result<Network> {
        self.client.call("TincWeb.Create", json!([name, subnet])).await
    }

    /// Remove a network; `true` if it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails or the result cannot be decoded.
    pub async fn remove(&self, network: &str) -> Result<bool> {
        self.client.call("TincWeb.Remove", json!([network])).await
    }

    /// Start or restart a network.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails or the result cannot be decoded.
    pub async fn start(&self, network: &str) -> Result<Network> {
        self.client.call("TincWeb.Start", json!([network])).await
    }

    /// Stop a network.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails or the result cannot be decoded.
    pub async fn stop(&self, network: &str) -> Result<Network> {
        self.client.call("TincWeb.Stop", json!([network])).await
    }

    /// Peers in a network (briefly, without config).
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails or the result cannot be decoded.
    pub async fn peers(&self, network: &str) -> Result<Vec<PeerInfo>> {
        self.client.call("TincWeb.Peers", json!([network])).await
    }

    /// Detailed info for one peer.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails or the result cannot be decoded.
    pub async fn peer(&self, network: &str, name: &str) -> Result<PeerInfo> {
        self.client.call("TincWeb.Peer", json!([network, name])).await
    }

    /// Import a shared network definition, letting its nodes join.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails or the result cannot be decoded.
    pub async fn import(&self, sharing: &Sharing) -> Result<Network> {
        self.client.call("TincWeb.Import", json!([sharing])).await
    }

    /// Export a network definition for sharing.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails or the result cannot be decoded.
    pub async fn share(&self, network: &str) -> Result<Sharing> {
        self.client.call("TincWeb.Share", json!([network])).await
    }

    /// Self node definition in a network.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails or the result cannot be decoded.
    pub async fn node(&self, network: &str) -> Result<Node> {
        self.client.call("TincWeb.Node", json!([network])).await
    }

    /// Update self node parameters. Some changes need a restart.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails or the result cannot be decoded.
    pub async fn upgrade(&self, network: &str, update: &Upgrade) -> Result<Node> {
        self.client
            .call("TincWeb.Upgrade", json!([network, update]))
            .await
    }

    /// Generate a Majordomo link for easy sharing.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails or the result cannot be decoded.
    pub async fn majordomo(&self, network: &str, lifetime: Duration) -> Result<String> {
        self.client
            .call("TincWeb.Majordomo", json!([network, go_duration(lifetime)]))
            .await
    }

    /// Join a network by Majordomo link.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails or the result cannot be decoded.
    pub async fn join(&self, url: &str, start: bool) -> Result<Network> {
        self.client.call("TincWeb.Join", json!([url, start])).await
    }
}

/// `TincWebUI` namespace
pub struct TincWebUi<'a> {
    client: &'a RpcClient,
}

impl TincWebUi<'_> {
    /// Issue and sign an access token.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails or the result cannot be decoded.
    pub async fn issue_access_token(&self, valid_days: u32) -> Result<String> {
        self.client
            .call("TincWebUI.IssueAccessToken", json!([valid_days]))
            .await
    }

    /// Desktop notification, if the host supports it.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails or the result cannot be decoded.
    pub async fn notify(&self, title: &str, message: &str) -> Result<bool> {
        self.client
            .call("TincWebUI.Notify", json!([title, message]))
            .await
    }

    /// Endpoints the web UI is reachable on.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails or the result cannot be decoded.
    pub async fn endpoints(&self) -> Result<Vec<Endpoint>> {
        self.client.call("TincWebUI.Endpoints", json!([])).await
    }

    /// Instance configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails or the result cannot be decoded.
    pub async fn configuration(&self) -> Result<UiConfig> {
        self.client.call("TincWebUI.Configuration", json!([])).await
    }
}

/// `TincWebMajordomo` namespace
pub struct TincWebMajordomo<'a> {
    client: &'a RpcClient,
}

impl TincWebMajordomo<'_> {
    /// Join a public network if `code` matches.
    ///
    /// The daemon rejects a node whose subnet does not fit the network.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails or the result cannot be decoded.
    pub async fn join(&self, network: &str, code: &str, self_node: &Node) -> Result<Sharing> {
        self.client
            .call("TincWebMajordomo.Join", json!([network, code, self_node]))
            .await
    }
}
