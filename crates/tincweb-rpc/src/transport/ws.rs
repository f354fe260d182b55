//! Persistent multiplexed transport over a single WebSocket.
//!
//! All calls share one connection. Responses are matched to callers by the
//! JSON-RPC `id` through a pending-request table owned by the live
//! connection. The connection is opened lazily by the first call and again
//! by the first call after it drops.
//!
//! Connection attempts are serialized by an async mutex around the
//! connection slot. Tokio's mutex is fair, so callers that arrive while an
//! attempt is in flight queue behind it and are released in arrival order
//! once it concludes. A failed attempt is reported only to the caller that
//! made it; each queued caller then takes its own turn at the gate.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{Mutex as AsyncMutex, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::protocol::frame_id;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Pending request waiting for its response frame
type PendingTx = oneshot::Sender<Result<Value>>;

/// Lifecycle of the shared connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Pending-request table of one connection.
///
/// Once closed it accepts no new entries, so a caller racing a connection
/// failure is rejected instead of waiting forever on a dead socket.
#[derive(Default)]
struct PendingTable {
    entries: HashMap<u64, PendingTx>,
    closed: bool,
}

impl PendingTable {
    fn register(&mut self, id: u64) -> Result<oneshot::Receiver<Result<Value>>> {
        if self.closed {
            return Err(Error::ConnectionClosed);
        }
        if self.entries.contains_key(&id) {
            return Err(Error::DuplicateId(id));
        }
        let (tx, rx) = oneshot::channel();
        self.entries.insert(id, tx);
        Ok(rx)
    }

    /// Close the table and hand back every waiter. Only the first call
    /// returns entries; later calls for the same failure get `None`.
    fn close(&mut self) -> Option<Vec<PendingTx>> {
        if self.closed {
            return None;
        }
        self.closed = true;
        Some(self.entries.drain().map(|(_, tx)| tx).collect())
    }
}

/// The table is never held across an await, so a plain mutex is enough and
/// lets [`PendingGuard`] clean up from `Drop`.
fn lock(table: &Mutex<PendingTable>) -> MutexGuard<'_, PendingTable> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Removes a caller's entry when its call ends without a response: timeout,
/// or the future dropped by the caller.
struct PendingGuard<'a> {
    pending: &'a Mutex<PendingTable>,
    id: u64,
    armed: bool,
}

impl PendingGuard<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.armed && lock(self.pending).entries.remove(&self.id).is_some() {
            debug!(id = self.id, "Abandoned request removed");
        }
    }
}

/// Resets the state to `Disconnected` unless the attempt succeeded, so a
/// timed out or dropped attempt never leaves the executor `Connecting`.
struct ConnectAttempt<'a> {
    state: &'a watch::Sender<ConnectionState>,
    connected: bool,
}

impl Drop for ConnectAttempt<'_> {
    fn drop(&mut self) {
        if !self.connected {
            self.state.send_replace(ConnectionState::Disconnected);
        }
    }
}

/// One established WebSocket connection
struct Connection {
    generation: u64,
    sink: AsyncMutex<SplitSink<WsStream, Message>>,
    pending: Arc<Mutex<PendingTable>>,
    reader: JoinHandle<()>,
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// State shared between the executor and its connection reader task
struct Shared {
    slot: AsyncMutex<Option<Arc<Connection>>>,
    state: watch::Sender<ConnectionState>,
    generation: AtomicU64,
}

impl Shared {
    /// Tear down a failed connection: reject all of its pending calls and
    /// free the slot so the next call reconnects. Safe to invoke several
    /// times for the same connection; only the first one rejects anything.
    async fn connection_lost(&self, generation: u64, pending: &Mutex<PendingTable>) {
        let drained = lock(pending).close();

        if let Some(waiters) = drained {
            if !waiters.is_empty() {
                warn!(
                    "Connection lost, rejecting {} pending request(s)",
                    waiters.len()
                );
            }
            for tx in waiters {
                let _ = tx.send(Err(Error::ConnectionClosed));
            }
        }

        let released = {
            let mut slot = self.slot.lock().await;
            if slot.as_ref().is_some_and(|c| c.generation == generation) {
                self.state.send_replace(ConnectionState::Disconnected);
                slot.take()
            } else {
                None
            }
        };

        if released.is_some() {
            debug!(generation, "Connection released");
        }
    }
}

/// WebSocket strategy of the RPC executor
pub struct WsExecutor {
    url: String,
    timeout: Option<Duration>,
    shared: Arc<Shared>,
}

impl WsExecutor {
    #[must_use]
    pub fn new(url: impl Into<String>, timeout: Option<Duration>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            url: url.into(),
            timeout,
            shared: Arc::new(Shared {
                slot: AsyncMutex::new(None),
                state,
                generation: AtomicU64::new(0),
            }),
        }
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Watch connection state transitions
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Number of calls currently waiting for a response
    pub async fn pending_count(&self) -> usize {
        let conn = self.shared.slot.lock().await.clone();
        match conn {
            Some(conn) => lock(&conn.pending).entries.len(),
            None => 0,
        }
    }

    /// Send `payload` and wait for the frame whose `id` matches.
    ///
    /// A configured timeout bounds the connect phase and the wait for the
    /// response separately.
    ///
    /// # Errors
    ///
    /// - `Error::Connect` if no connection could be established
    /// - `Error::DuplicateId` if `id` is already pending; nothing is sent
    /// - `Error::ConnectionClosed` if the connection drops before the response
    /// - `Error::Timeout` if a timeout is configured and expires
    pub async fn call(&self, id: u64, payload: String) -> Result<Value> {
        let conn = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.connect_if_needed())
                .await
                .map_err(|_| {
                    warn!("Connecting to {} timed out after {limit:?}", self.url);
                    Error::Timeout
                })??,
            None => self.connect_if_needed().await?,
        };

        let rx = lock(&conn.pending).register(id)?;
        let mut guard = PendingGuard {
            pending: &conn.pending,
            id,
            armed: true,
        };

        let sent = conn.sink.lock().await.send(Message::text(payload)).await;
        if let Err(e) = sent {
            warn!(id, "Failed to send request: {e}");
            self.shared
                .connection_lost(conn.generation, &conn.pending)
                .await;
            return Err(e.into());
        }
        debug!(id, "Request sent");

        let outcome = match self.timeout {
            Some(limit) => {
                if let Ok(outcome) = tokio::time::timeout(limit, rx).await {
                    outcome
                } else {
                    // The guard drops the entry; a late response is ignored
                    debug!(id, "Request timed out");
                    return Err(Error::Timeout);
                }
            }
            None => rx.await,
        };
        guard.disarm();

        outcome.map_err(|_| Error::ConnectionClosed)?
    }

    async fn connect_if_needed(&self) -> Result<Arc<Connection>> {
        let mut slot = self.shared.slot.lock().await;
        if let Some(conn) = slot.as_ref() {
            return Ok(conn.clone());
        }

        self.shared.state.send_replace(ConnectionState::Connecting);
        let mut attempt = ConnectAttempt {
            state: &self.shared.state,
            connected: false,
        };
        debug!("Connecting to {}", self.url);

        let ws = match connect_async(&self.url).await {
            Ok((ws, _response)) => ws,
            Err(e) => return Err(Error::Connect(format!("{}: {e}", self.url))),
        };

        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (sink, stream) = ws.split();
        let pending = Arc::new(Mutex::new(PendingTable::default()));
        let reader = tokio::spawn(read_loop(
            stream,
            pending.clone(),
            Arc::downgrade(&self.shared),
            generation,
        ));

        let conn = Arc::new(Connection {
            generation,
            sink: AsyncMutex::new(sink),
            pending,
            reader,
        });
        *slot = Some(conn.clone());
        attempt.connected = true;
        self.shared.state.send_replace(ConnectionState::Connected);
        info!(generation, "Connected to {}", self.url);

        Ok(conn)
    }
}

/// Route inbound frames to their callers until the connection ends
async fn read_loop(
    mut stream: SplitStream<WsStream>,
    pending: Arc<Mutex<PendingTable>>,
    shared: Weak<Shared>,
    generation: u64,
) {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => resolve(&pending, text.as_str()),
            Ok(Message::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                Ok(text) => resolve(&pending, text),
                Err(e) => warn!("Dropping non UTF-8 frame: {e}"),
            },
            Ok(Message::Close(reason)) => {
                debug!(generation, "Server closed connection: {reason:?}");
                break;
            }
            Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
            Err(e) => {
                warn!(generation, "Connection error: {e}");
                break;
            }
        }
    }

    if let Some(shared) = shared.upgrade() {
        shared.connection_lost(generation, &pending).await;
    } else {
        // Executor is gone; still release anyone waiting
        let drained = lock(&pending).close();
        if let Some(waiters) = drained {
            for tx in waiters {
                let _ = tx.send(Err(Error::ConnectionClosed));
            }
        }
    }
}

fn resolve(pending: &Mutex<PendingTable>, text: &str) {
    let frame: Value = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("Failed to parse response frame: {e}");
            return;
        }
    };

    let Some(id) = frame_id(&frame) else {
        debug!("Dropping frame without numeric id");
        return;
    };

    let waiter = lock(pending).entries.remove(&id);
    match waiter {
        Some(tx) => {
            let _ = tx.send(Ok(frame));
        }
        None => debug!(id, "Dropping response with no pending request"),
    }
}
