//! Event stream subscriber.
//!
//! Keeps a WebSocket to the daemon's event endpoint open for as long as the
//! subscriber lives, reconnecting after a fixed delay whenever it drops.
//! Each `{event, payload}` frame is handed to the single handler registered
//! for that event name, if any.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tincweb_types::{EventName, EventPayload, NetworkId, PeerId};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::protocol::EventFrame;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Callback for one event name. Receives the decoded payload and the name.
pub type EventHandler = Arc<dyn Fn(EventPayload, EventName) -> anyhow::Result<()> + Send + Sync>;

/// What happened to one inbound frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The registered handler ran and returned `Ok`
    Delivered,
    /// No handler is registered for the event, or the name is unknown
    Unhandled,
    /// The frame or its payload could not be decoded
    Malformed,
    /// The handler returned an error or panicked
    HandlerFailed,
}

/// Single-slot handler registry: at most one handler per event name.
///
/// Cloning shares the registry, so handlers can be changed while the
/// subscriber is running.
#[derive(Clone, Default)]
pub struct Handlers {
    slots: Arc<RwLock<HashMap<EventName, EventHandler>>>,
}

impl Handlers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `name`, replacing any previous one
    pub fn on<F>(&self, name: EventName, handler: F)
    where
        F: Fn(EventPayload, EventName) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, Arc::new(handler));
    }

    /// Remove the handler for `name`; no-op if none is registered
    pub fn off(&self, name: EventName) {
        self.slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&name);
    }

    #[must_use]
    pub fn get(&self, name: EventName) -> Option<EventHandler> {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&name)
            .cloned()
    }

    #[must_use]
    pub fn contains(&self, name: EventName) -> bool {
        self.get(name).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn on_started<F>(&self, handler: F)
    where
        F: Fn(NetworkId, EventName) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_network(EventName::Started, handler);
    }

    pub fn off_started(&self) {
        self.off(EventName::Started);
    }

    pub fn on_stopped<F>(&self, handler: F)
    where
        F: Fn(NetworkId, EventName) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_network(EventName::Stopped, handler);
    }

    pub fn off_stopped(&self) {
        self.off(EventName::Stopped);
    }

    pub fn on_peer_discovered<F>(&self, handler: F)
    where
        F: Fn(PeerId, EventName) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_peer(EventName::PeerDiscovered, handler);
    }

    pub fn off_peer_discovered(&self) {
        self.off(EventName::PeerDiscovered);
    }

    pub fn on_peer_joined<F>(&self, handler: F)
    where
        F: Fn(PeerId, EventName) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_peer(EventName::PeerJoined, handler);
    }

    pub fn off_peer_joined(&self) {
        self.off(EventName::PeerJoined);
    }

    pub fn on_peer_left<F>(&self, handler: F)
    where
        F: Fn(PeerId, EventName) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_peer(EventName::PeerLeft, handler);
    }

    pub fn off_peer_left(&self) {
        self.off(EventName::PeerLeft);
    }

    fn on_network<F>(&self, name: EventName, handler: F)
    where
        F: Fn(NetworkId, EventName) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on(name, move |payload, event| match payload {
            EventPayload::Network(id) => handler(id, event),
            EventPayload::Peer(_) => Ok(()),
        });
    }

    fn on_peer<F>(&self, name: EventName, handler: F)
    where
        F: Fn(PeerId, EventName) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on(name, move |payload, event| match payload {
            EventPayload::Peer(id) => handler(id, event),
            EventPayload::Network(_) => Ok(()),
        });
    }

    /// Decode one text frame and run the matching handler.
    ///
    /// Handler errors and panics are logged and contained here.
    pub fn dispatch(&self, text: &str) -> DispatchOutcome {
        let frame = match EventFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Failed to parse event frame: {e}");
                return DispatchOutcome::Malformed;
            }
        };

        let Ok(name) = frame.event.parse::<EventName>() else {
            debug!("Ignoring unknown event {}", frame.event);
            return DispatchOutcome::Unhandled;
        };

        // Look up before decoding so unhandled events cost nothing
        let Some(handler) = self.get(name) else {
            return DispatchOutcome::Unhandled;
        };

        let payload = match EventPayload::decode(name, frame.payload) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Invalid payload for event {name}: {e}");
                return DispatchOutcome::Malformed;
            }
        };

        match std::panic::catch_unwind(AssertUnwindSafe(|| handler(payload, name))) {
            Ok(Ok(())) => DispatchOutcome::Delivered,
            Ok(Err(e)) => {
                error!("failed to process handler for event {name}: {e:#}");
                DispatchOutcome::HandlerFailed
            }
            Err(_) => {
                error!("handler for event {name} panicked");
                DispatchOutcome::HandlerFailed
            }
        }
    }
}

/// Reconnect bookkeeping for one connection.
///
/// A dropped socket can report both an error and a close; only the first
/// signal schedules a reconnect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReconnectState {
    #[default]
    Idle,
    Scheduled,
}

impl ReconnectState {
    /// Returns `true` only on the transition from `Idle` to `Scheduled`
    pub fn schedule(&mut self) -> bool {
        if *self == ReconnectState::Idle {
            *self = ReconnectState::Scheduled;
            true
        } else {
            false
        }
    }

    pub fn reset(&mut self) {
        *self = ReconnectState::Idle;
    }

    #[must_use]
    pub fn is_scheduled(self) -> bool {
        self == ReconnectState::Scheduled
    }
}

/// Handle to a running event subscription.
///
/// Dropping the handle stops the subscription.
pub struct EventSubscriber {
    url: String,
    handlers: Handlers,
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl EventSubscriber {
    /// Start following `url` with an empty handler registry.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn start(url: impl Into<String>, reconnect_interval: Duration) -> Self {
        Self::with_handlers(url, reconnect_interval, Handlers::new())
    }

    /// Start following `url`, dispatching to an existing registry.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn with_handlers(
        url: impl Into<String>,
        reconnect_interval: Duration,
        handlers: Handlers,
    ) -> Self {
        let url = url.into();
        let token = CancellationToken::new();
        let task = tokio::spawn(run(
            url.clone(),
            reconnect_interval,
            handlers.clone(),
            token.clone(),
        ));

        Self {
            url,
            handlers,
            token,
            task: Some(task),
        }
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn handlers(&self) -> &Handlers {
        &self.handlers
    }

    pub fn on<F>(&self, name: EventName, handler: F)
    where
        F: Fn(EventPayload, EventName) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.handlers.on(name, handler);
    }

    pub fn off(&self, name: EventName) {
        self.handlers.off(name);
    }

    /// Stop following the stream. No reconnect is attempted afterwards.
    pub fn stop(&self) {
        self.token.cancel();
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Stop and wait for the subscription task to finish
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            warn!("Event subscriber task ended abnormally: {e}");
        }
    }
}

impl Drop for EventSubscriber {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn run(url: String, interval: Duration, handlers: Handlers, token: CancellationToken) {
    let mut reconnect = ReconnectState::default();

    loop {
        reconnect.reset();

        let connected = tokio::select! {
            () = token.cancelled() => break,
            result = connect_async(&url) => result,
        };

        match connected {
            Ok((ws, _response)) => {
                info!("Event stream connected to {url}");
                follow(ws, &handlers, &token, &mut reconnect).await;
            }
            Err(e) => {
                if reconnect.schedule() {
                    warn!("Event stream connect to {url} failed: {e}");
                }
            }
        }

        if token.is_cancelled() || !reconnect.is_scheduled() {
            break;
        }

        debug!("Reconnecting event stream in {interval:?}");
        tokio::select! {
            () = token.cancelled() => break,
            () = tokio::time::sleep(interval) => {}
        }
    }

    debug!("Event subscriber for {url} stopped");
}

/// Pump frames from one connection until it drops or the token fires.
/// A drop schedules a reconnect through `reconnect`; cancellation does not.
async fn follow(
    ws: WsStream,
    handlers: &Handlers,
    token: &CancellationToken,
    reconnect: &mut ReconnectState,
) {
    let (mut sink, mut stream) = ws.split();

    loop {
        let frame = tokio::select! {
            () = token.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                return;
            }
            frame = stream.next() => frame,
        };

        match frame {
            Some(Ok(Message::Text(text))) => {
                handlers.dispatch(text.as_str());
            }
            Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                Ok(text) => {
                    handlers.dispatch(text);
                }
                Err(e) => warn!("Dropping non UTF-8 event frame: {e}"),
            },
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                if reconnect.schedule() {
                    warn!("Event stream error: {e}");
                }
                break;
            }
        }
    }

    if reconnect.schedule() {
        warn!("Event stream closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter(handlers: &Handlers, name: EventName) -> Arc<AtomicUsize> {
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = hits.clone();
        handlers.on(name, move |_, _| {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        hits
    }

    const PEER_JOINED: &str =
        r#"{"event":"PeerJoined","payload":{"network":"office","node":"n1","subnet":null}}"#;

    #[test]
    fn test_dispatch_invokes_only_matching_handler() {
        let handlers = Handlers::new();
        let joined = counter(&handlers, EventName::PeerJoined);
        let left = counter(&handlers, EventName::PeerLeft);
        let started = counter(&handlers, EventName::Started);

        assert_eq!(handlers.dispatch(PEER_JOINED), DispatchOutcome::Delivered);

        assert_eq!(joined.load(Ordering::SeqCst), 1);
        assert_eq!(left.load(Ordering::SeqCst), 0);
        assert_eq!(started.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_handler_receives_payload_and_event_name() {
        let handlers = Handlers::new();
        let seen = Arc::new(Mutex::new(None));
        let slot = seen.clone();
        handlers.on(EventName::PeerJoined, move |payload, name| {
            *slot.lock().unwrap() = Some((payload, name));
            Ok(())
        });

        handlers.dispatch(PEER_JOINED);

        let (payload, name) = seen.lock().unwrap().take().unwrap();
        assert_eq!(name, EventName::PeerJoined);
        assert_eq!(
            payload,
            EventPayload::Peer(PeerId {
                network: "office".to_string(),
                node: "n1".to_string(),
                subnet: None,
            })
        );
    }

    #[test]
    fn test_register_replaces_previous_handler() {
        let handlers = Handlers::new();
        let first = counter(&handlers, EventName::Started);
        let second = counter(&handlers, EventName::Started);

        handlers.dispatch(r#"{"event":"Started","payload":{"name":"office"}}"#);

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
        assert_eq!(handlers.len(), 1);
    }

    #[test]
    fn test_off_removes_and_tolerates_absent() {
        let handlers = Handlers::new();
        let hits = counter(&handlers, EventName::Stopped);

        handlers.off(EventName::Stopped);
        handlers.off(EventName::Stopped);
        handlers.off(EventName::PeerLeft);

        assert_eq!(
            handlers.dispatch(r#"{"event":"Stopped","payload":{"name":"office"}}"#),
            DispatchOutcome::Unhandled
        );
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert!(handlers.is_empty());
    }

    #[test]
    fn test_malformed_frames_are_ignored() {
        let handlers = Handlers::new();
        let hits = counter(&handlers, EventName::PeerJoined);

        assert_eq!(handlers.dispatch("{oops"), DispatchOutcome::Malformed);
        assert_eq!(
            handlers.dispatch(r#"{"event":"PeerJoined","payload":{"name":"office"}}"#),
            DispatchOutcome::Malformed
        );
        assert_eq!(
            handlers.dispatch(r#"{"event":"Exploded","payload":{}}"#),
            DispatchOutcome::Unhandled
        );
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_handler_error_is_contained() {
        let handlers = Handlers::new();
        handlers.on(EventName::PeerJoined, |_, _| anyhow::bail!("store rejected update"));
        let left = counter(&handlers, EventName::PeerLeft);

        assert_eq!(handlers.dispatch(PEER_JOINED), DispatchOutcome::HandlerFailed);
        assert_eq!(
            handlers.dispatch(
                r#"{"event":"PeerLeft","payload":{"network":"office","node":"n1"}}"#
            ),
            DispatchOutcome::Delivered
        );
        assert_eq!(left.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_handler_panic_is_contained() {
        let handlers = Handlers::new();
        handlers.on(EventName::PeerJoined, |_, _| panic!("boom"));

        assert_eq!(handlers.dispatch(PEER_JOINED), DispatchOutcome::HandlerFailed);
        // Registry still usable after the panic
        assert!(handlers.contains(EventName::PeerJoined));
    }

    #[test]
    fn test_typed_helpers() {
        let handlers = Handlers::new();
        let names = Arc::new(Mutex::new(Vec::new()));

        let sink = names.clone();
        handlers.on_started(move |id, _| {
            sink.lock().unwrap().push(id.name);
            Ok(())
        });
        let sink = names.clone();
        handlers.on_peer_left(move |id, event| {
            sink.lock().unwrap().push(format!("{event}:{}", id.node));
            Ok(())
        });

        handlers.dispatch(r#"{"event":"Started","payload":{"name":"office"}}"#);
        handlers.dispatch(r#"{"event":"PeerLeft","payload":{"network":"office","node":"n2"}}"#);
        handlers.off_started();
        handlers.dispatch(r#"{"event":"Started","payload":{"name":"home"}}"#);

        assert_eq!(*names.lock().unwrap(), vec!["office", "PeerLeft:n2"]);
    }

    #[test]
    fn test_clones_share_registry() {
        let handlers = Handlers::new();
        let other = handlers.clone();
        let hits = counter(&other, EventName::PeerJoined);

        handlers.dispatch(PEER_JOINED);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reconnect_scheduled_once_per_failure() {
        let mut state = ReconnectState::default();
        assert!(!state.is_scheduled());

        // error then close for the same connection
        assert!(state.schedule());
        assert!(!state.schedule());
        assert!(state.is_scheduled());

        state.reset();
        assert!(state.schedule());
    }

    #[tokio::test]
    async fn test_stop_before_connect_ends_task() {
        let subscriber =
            EventSubscriber::start("ws://127.0.0.1:9/api/events", Duration::from_secs(60));
        subscriber.stop();
        assert!(subscriber.is_stopped());

        tokio::time::timeout(Duration::from_secs(5), subscriber.shutdown())
            .await
            .unwrap();
    }
}
