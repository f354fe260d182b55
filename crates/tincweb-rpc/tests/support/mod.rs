//! Mock daemon endpoints for integration tests.
//!
//! `MockWsServer` hands each accepted WebSocket to the test so it can read
//! requests and answer them in whatever order the test needs.
//! `MockHttpServer` answers every POST through a responder closure.

// Each test binary uses a different subset of these helpers
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{WebSocketStream, accept_async};

pub const WAIT: Duration = Duration::from_secs(5);

/// Reserve a local port and free it, leaving nothing listening there
pub async fn dead_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Accept TCP connections and never answer the WebSocket handshake
pub async fn stalled_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
    addr
}

pub struct MockWsServer {
    addr: SocketAddr,
    accepted: Arc<AtomicUsize>,
    conns: mpsc::UnboundedReceiver<ServerConn>,
}

impl MockWsServer {
    pub async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));
        let (tx, conns) = mpsc::unbounded_channel();

        let counter = accepted.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let tx = tx.clone();
                let counter = counter.clone();
                tokio::spawn(async move {
                    if let Ok(ws) = accept_async(stream).await {
                        counter.fetch_add(1, Ordering::SeqCst);
                        let _ = tx.send(ServerConn { ws });
                    }
                });
            }
        });

        Self {
            addr,
            accepted,
            conns,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("ws://{}{path}", self.addr)
    }

    /// Number of completed WebSocket handshakes so far
    pub fn connections(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    pub async fn next_conn(&mut self) -> ServerConn {
        tokio::time::timeout(WAIT, self.conns.recv())
            .await
            .expect("no client connected in time")
            .expect("accept loop ended")
    }

    /// Wait up to `wait` for another connection
    pub async fn try_next_conn(&mut self, wait: Duration) -> Option<ServerConn> {
        tokio::time::timeout(wait, self.conns.recv())
            .await
            .ok()
            .flatten()
    }
}

pub struct ServerConn {
    ws: WebSocketStream<TcpStream>,
}

impl ServerConn {
    /// Next JSON text frame from the client
    pub async fn recv_json(&mut self) -> Value {
        self.try_recv_json(WAIT)
            .await
            .expect("no frame received in time")
    }

    pub async fn try_recv_json(&mut self, wait: Duration) -> Option<Value> {
        let read = async {
            while let Some(frame) = self.ws.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        return Some(serde_json::from_str(text.as_str()).unwrap());
                    }
                    Ok(Message::Close(_)) | Err(_) => return None,
                    Ok(_) => {}
                }
            }
            None
        };
        tokio::time::timeout(wait, read).await.ok().flatten()
    }

    pub async fn send_json(&mut self, value: &Value) {
        self.ws
            .send(Message::text(value.to_string()))
            .await
            .unwrap();
    }

    pub async fn respond(&mut self, id: &Value, result: Value) {
        self.send_json(&json!({"jsonrpc": "2.0", "id": id, "result": result}))
            .await;
    }

    pub async fn send_event(&mut self, event: &str, payload: Value) {
        self.send_json(&json!({"event": event, "payload": payload}))
            .await;
    }

    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}

/// One request as seen by the HTTP mock
#[derive(Debug)]
pub struct CapturedRequest {
    pub head: String,
    pub body: Value,
}

pub struct MockHttpServer {
    addr: SocketAddr,
    requests: mpsc::UnboundedReceiver<CapturedRequest>,
}

impl MockHttpServer {
    /// Serve POSTs, replying with the `(status line, body)` from `respond`
    pub async fn serve<F>(respond: F) -> Self
    where
        F: Fn(&Value) -> (String, String) + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, requests) = mpsc::unbounded_channel();
        let respond = Arc::new(respond);

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let tx = tx.clone();
                let respond = respond.clone();
                tokio::spawn(async move {
                    let _ = handle_http(stream, tx, respond.as_ref()).await;
                });
            }
        });

        Self { addr, requests }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub async fn next_request(&mut self) -> CapturedRequest {
        tokio::time::timeout(WAIT, self.requests.recv())
            .await
            .expect("no request received in time")
            .expect("server ended")
    }
}

async fn handle_http<F>(
    mut stream: TcpStream,
    tx: mpsc::UnboundedSender<CapturedRequest>,
    respond: &F,
) -> std::io::Result<()>
where
    F: Fn(&Value) -> (String, String),
{
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let head_end = loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let length = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);

    while buf.len() < head_end + length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let end = (head_end + length).min(buf.len());
    let body: Value = serde_json::from_slice(&buf[head_end..end]).unwrap_or(Value::Null);
    let (status_line, reply) = respond(&body);
    let _ = tx.send(CapturedRequest { head, body });

    let response = format!(
        "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{reply}",
        reply.len()
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}
