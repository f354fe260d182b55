//! tinc-web command line client
//!
//! Calls the daemon's JSON-RPC API and follows its event stream.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::{Value, json};
use tincweb_rpc::{ClientConfig, EventName, EventSubscriber, RpcClient, default_config_path};
use tokio::sync::mpsc;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// tinc-web client
#[derive(Parser, Debug)]
#[command(name = "tincweb")]
#[command(about = "Manage tinc networks through the tinc-web daemon")]
#[command(version)]
#[command(after_help = "\
Examples:
  tincweb networks                      List networks
  tincweb create office 10.10.0.0/16    Create a network
  tincweb peers office                  List peers of a network
  tincweb call TincWeb.Peer '[\"office\", \"n1\"]'
  tincweb --endpoint http://127.0.0.1:8686/api/ networks
  tincweb watch                         Print events until Ctrl-C
")]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// RPC endpoint; `ws://` keeps one connection, `http://` posts each call
    #[arg(long, global = true, value_name = "URL")]
    endpoint: Option<String>,

    /// Per-call timeout in seconds
    #[arg(long, global = true, value_name = "SECS")]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List networks
    Networks,

    /// Show one network with its config
    Network { name: String },

    /// Create a network
    Create { name: String, subnet: String },

    /// Remove a network
    Remove { name: String },

    /// Start or restart a network
    Start { name: String },

    /// Stop a network
    Stop { name: String },

    /// List peers of a network
    Peers { network: String },

    /// Show one peer
    Peer { network: String, name: String },

    /// Export a network definition for sharing
    Share { network: String },

    /// Show the self node of a network
    Node { network: String },

    /// List endpoints the web UI listens on
    Endpoints,

    /// Call any method with raw JSON params
    Call {
        /// Method name, e.g. `TincWeb.Networks`
        method: String,
        /// Params as a JSON array or object
        #[arg(default_value = "[]")]
        params: String,
    },

    /// Follow the event stream, one JSON line per event
    Watch {
        /// Event stream URL (derived from the endpoint by default)
        #[arg(long, value_name = "URL")]
        events: Option<String>,
    },

    /// Print the effective configuration
    Config,
}

/// Logs go to stderr so command output stays machine readable.
fn setup_logging() {
    let default_level = if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("tincweb={default_level}")));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging();

    let config = effective_config(&cli)?;
    debug!(?config, "Effective configuration");

    match cli.command {
        Commands::Config => print_json(&config),
        Commands::Watch { events } => run_watch(&config, events).await,
        command => run_call(&config, command).await,
    }
}

/// Merge the config file with command line overrides
fn effective_config(cli: &Cli) -> Result<ClientConfig> {
    let path = match &cli.config {
        Some(path) => path.clone(),
        None => default_config_path()?,
    };
    let mut config = ClientConfig::load(&path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;

    if let Some(endpoint) = &cli.endpoint {
        config.endpoint.clone_from(endpoint);
    }
    if let Some(secs) = cli.timeout {
        config.request_timeout_ms = Some(secs.saturating_mul(1000));
    }
    Ok(config)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_params(raw: &str) -> Result<Value> {
    let params: Value =
        serde_json::from_str(raw).with_context(|| format!("Params are not valid JSON: {raw}"))?;
    if !(params.is_array() || params.is_object()) {
        anyhow::bail!("Params must be a JSON array or object");
    }
    Ok(params)
}

async fn run_call(config: &ClientConfig, command: Commands) -> Result<()> {
    let client = RpcClient::with_config(config)
        .with_context(|| format!("Invalid endpoint {}", config.endpoint))?;
    let api = client.tinc_web();

    match command {
        Commands::Networks => print_json(&api.networks().await?),
        Commands::Network { name } => print_json(&api.network(&name).await?),
        Commands::Create { name, subnet } => print_json(&api.create(&name, &subnet).await?),
        Commands::Remove { name } => print_json(&api.remove(&name).await?),
        Commands::Start { name } => print_json(&api.start(&name).await?),
        Commands::Stop { name } => print_json(&api.stop(&name).await?),
        Commands::Peers { network } => print_json(&api.peers(&network).await?),
        Commands::Peer { network, name } => print_json(&api.peer(&network, &name).await?),
        Commands::Share { network } => print_json(&api.share(&network).await?),
        Commands::Node { network } => print_json(&api.node(&network).await?),
        Commands::Endpoints => print_json(&client.ui().endpoints().await?),
        Commands::Call { method, params } => {
            let params = parse_params(&params)?;
            let result = client
                .call_raw(&method, params)
                .await
                .with_context(|| format!("{method} failed"))?;
            print_json(&result)
        }
        other => anyhow::bail!("{other:?} is not an RPC call"),
    }
}

async fn run_watch(config: &ClientConfig, events: Option<String>) -> Result<()> {
    let url = match events {
        Some(url) => url,
        None => config.events_url().context("Cannot derive event stream URL")?,
    };

    let (tx, mut rx) = mpsc::unbounded_channel();
    let subscriber = EventSubscriber::start(url.clone(), config.reconnect_interval());
    for name in EventName::ALL {
        let tx = tx.clone();
        subscriber.on(name, move |payload, event| {
            tx.send(json!({"event": event, "payload": payload}))?;
            Ok(())
        });
    }
    info!("Watching events at {url}");

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                break;
            }
            Some(line) = rx.recv() => println!("{line}"),
        }
    }

    if tokio::time::timeout(Duration::from_secs(2), subscriber.shutdown())
        .await
        .is_err()
    {
        debug!("Event subscriber did not stop in time");
    }
    Ok(())
}
