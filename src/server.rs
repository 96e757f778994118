//! Broadcast Server: a hand-rolled WebSocket push/control server sharing a
//! single TCP port between the WebSocket upgrade path and a small HTTP
//! control surface (`/info`, `/control`), grounded in the original
//! `websocket_server.cpp`'s single `handleConnection` dispatch. Built on a
//! raw `TcpListener` rather than `tokio-tungstenite`'s server helpers or an
//! HTTP framework, because the spec's co-hosted port is exactly the boundary
//! the original draws and replicating it is simpler than bolting a WS
//! upgrade onto a web framework's router.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use base64::Engine;
use sha1::{Digest, Sha1};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::types::{now_ms, WsOutbound};

const WS_MAGIC_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";
const HEARTBEAT_INTERVAL_MS: u64 = 5000;

/// Rejected-handshake reasons, surfaced only as a log line — the wire
/// response is always `400 Bad Request` regardless of which check failed.
#[derive(Debug, thiserror::Error)]
enum HandshakeError {
    #[error("missing Sec-WebSocket-Key header")]
    MissingKey,
}

/// Implemented by the Coordinator to answer the two control endpoints.
/// `control` receives the parsed `?key=value` query pairs from `/control`.
pub trait ControlHandler: Send + Sync {
    fn info(&self) -> String;
    fn control(&self, query: &HashMap<String, String>) -> String;
}

struct ConnectedClient {
    writer: OwnedWriteHalf,
}

/// Accepts raw TCP connections, completes the WebSocket handshake for
/// upgrade requests, and fans broadcast messages out to every connected
/// client under one registry lock with per-client failure isolation.
pub struct BroadcastServer {
    addr: String,
    control_handler: Arc<dyn ControlHandler>,
    clients: Arc<Mutex<HashMap<u64, ConnectedClient>>>,
    next_client_id: Arc<AtomicU64>,
    disconnect_tx: mpsc::UnboundedSender<u64>,
    running: Arc<AtomicBool>,
    accept_task: Option<JoinHandle<()>>,
    heartbeat_task: Option<JoinHandle<()>>,
}

impl BroadcastServer {
    pub fn new(
        addr: impl Into<String>,
        control_handler: Arc<dyn ControlHandler>,
        disconnect_tx: mpsc::UnboundedSender<u64>,
    ) -> Self {
        BroadcastServer {
            addr: addr.into(),
            control_handler,
            clients: Arc::new(Mutex::new(HashMap::new())),
            next_client_id: Arc::new(AtomicU64::new(0)),
            disconnect_tx,
            running: Arc::new(AtomicBool::new(false)),
            accept_task: None,
            heartbeat_task: None,
        }
    }

    pub async fn client_count(&self) -> usize {
        self.clients.lock().await.len()
    }

    /// Idempotent. Binds the listener and spawns the accept loop plus the
    /// 5s heartbeat worker.
    pub async fn start(&mut self) -> std::io::Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let listener = TcpListener::bind(&self.addr).await?;
        info!(addr = %self.addr, "broadcast server listening");

        let clients = self.clients.clone();
        let next_id = self.next_client_id.clone();
        let control_handler = self.control_handler.clone();
        let disconnect_tx = self.disconnect_tx.clone();
        let running = self.running.clone();
        self.accept_task = Some(tokio::spawn(async move {
            accept_loop(listener, clients, next_id, control_handler, disconnect_tx, running).await;
        }));

        let clients = self.clients.clone();
        let running = self.running.clone();
        let disconnect_tx = self.disconnect_tx.clone();
        self.heartbeat_task = Some(tokio::spawn(async move {
            heartbeat_loop(clients, running, disconnect_tx).await;
        }));

        Ok(())
    }

    /// Idempotent. Aborts the accept loop and heartbeat worker; in-flight
    /// client handler tasks are left to notice the closed listener and
    /// unwind on their own next read/write.
    pub async fn stop(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(task) = self.accept_task.take() {
            task.abort();
            let _ = task.await;
        }
        if let Some(task) = self.heartbeat_task.take() {
            task.abort();
            let _ = task.await;
        }
        self.clients.lock().await.clear();
    }

    /// Serializes `msg` once and sends the resulting frame to every
    /// connected client under the registry lock. A client whose send fails
    /// is evicted and reported on `disconnect_tx` without aborting delivery
    /// to the remaining clients.
    pub async fn broadcast(&self, msg: &WsOutbound) {
        broadcast_frame(&self.clients, &self.disconnect_tx, &encode_text_frame(msg.to_json().as_bytes())).await;
    }
}

async fn broadcast_frame(
    clients: &Mutex<HashMap<u64, ConnectedClient>>,
    disconnect_tx: &mpsc::UnboundedSender<u64>,
    frame: &[u8],
) {
    let mut clients = clients.lock().await;
    let mut dead = Vec::new();
    for (id, client) in clients.iter_mut() {
        if let Err(e) = client.writer.write_all(frame).await {
            debug!(client_id = id, error = %e, "client send failed, evicting");
            dead.push(*id);
        }
    }
    for id in dead {
        clients.remove(&id);
        let _ = disconnect_tx.send(id);
    }
}

async fn heartbeat_loop(
    clients: Arc<Mutex<HashMap<u64, ConnectedClient>>>,
    running: Arc<AtomicBool>,
    disconnect_tx: mpsc::UnboundedSender<u64>,
) {
    let mut ticker = tokio::time::interval(std::time::Duration::from_millis(HEARTBEAT_INTERVAL_MS));
    while running.load(Ordering::Relaxed) {
        ticker.tick().await;
        if !running.load(Ordering::Relaxed) {
            break;
        }
        let frame = encode_text_frame(
            WsOutbound::Heartbeat {
                server_ts_ms: now_ms(),
            }
            .to_json()
            .as_bytes(),
        );
        broadcast_frame(&clients, &disconnect_tx, &frame).await;
    }
}

async fn accept_loop(
    listener: TcpListener,
    clients: Arc<Mutex<HashMap<u64, ConnectedClient>>>,
    next_id: Arc<AtomicU64>,
    control_handler: Arc<dyn ControlHandler>,
    disconnect_tx: mpsc::UnboundedSender<u64>,
    running: Arc<AtomicBool>,
) {
    while running.load(Ordering::Relaxed) {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let clients = clients.clone();
                let next_id = next_id.clone();
                let control_handler = control_handler.clone();
                let disconnect_tx = disconnect_tx.clone();
                tokio::spawn(async move {
                    if let Err(e) =
                        handle_connection(stream, clients, next_id, control_handler, disconnect_tx).await
                    {
                        debug!(%peer, error = %e, "connection handler exited with error");
                    }
                });
            }
            Err(e) => {
                warn!(error = %e, "accept failed");
            }
        }
    }
}

struct RequestHead {
    method: String,
    path: String,
    query: HashMap<String, String>,
    headers: HashMap<String, String>,
}

async fn read_request_head<R: tokio::io::AsyncBufRead + Unpin>(
    reader: &mut R,
) -> std::io::Result<Option<RequestHead>> {
    let mut request_line = String::new();
    if reader.read_line(&mut request_line).await? == 0 {
        return Ok(None);
    }
    let mut parts = request_line.trim_end().splitn(3, ' ');
    let method = parts.next().unwrap_or("").to_string();
    let target = parts.next().unwrap_or("").to_string();
    let (path, query) = match target.split_once('?') {
        Some((p, q)) => (p.to_string(), parse_query(q)),
        None => (target, HashMap::new()),
    };

    let mut headers = HashMap::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            break;
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_ascii_lowercase(), v.trim().to_string());
        }
    }

    Ok(Some(RequestHead {
        method,
        path,
        query,
        headers,
    }))
}

fn parse_query(q: &str) -> HashMap<String, String> {
    q.split('&')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (percent_decode(k), percent_decode(v)))
        .collect()
}

/// Minimal `%XX` and `+`-as-space decoding; control-plane query values are
/// simple tokens (symbols, strategy names, numbers) so this need not be a
/// full RFC 3986 decoder.
fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                if let Ok(byte) = u8::from_str_radix(&s[i + 1..i + 3], 16) {
                    out.push(byte);
                    i += 3;
                } else {
                    out.push(bytes[i]);
                    i += 1;
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

const CORS_HEADERS: &str = "Access-Control-Allow-Origin: *\r\nAccess-Control-Allow-Methods: GET, OPTIONS\r\n";

async fn handle_connection(
    stream: TcpStream,
    clients: Arc<Mutex<HashMap<u64, ConnectedClient>>>,
    next_id: Arc<AtomicU64>,
    control_handler: Arc<dyn ControlHandler>,
    disconnect_tx: mpsc::UnboundedSender<u64>,
) -> std::io::Result<()> {
    stream.set_nodelay(true).ok();
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let Some(head) = read_request_head(&mut reader).await? else {
        return Ok(());
    };

    let is_upgrade = head
        .headers
        .get("upgrade")
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);

    if is_upgrade {
        let Some(key) = head.headers.get("sec-websocket-key") else {
            debug!(error = %HandshakeError::MissingKey, "rejecting websocket upgrade");
            write_half
                .write_all(b"HTTP/1.1 400 Bad Request\r\nConnection: close\r\n\r\n")
                .await?;
            return Ok(());
        };
        let accept = compute_accept_key(key);
        let response = format!(
            "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Accept: {accept}\r\n\r\n"
        );
        write_half.write_all(response.as_bytes()).await?;

        let id = next_id.fetch_add(1, Ordering::Relaxed);
        clients
            .lock()
            .await
            .insert(id, ConnectedClient { writer: write_half });
        debug!(client_id = id, "client upgraded to websocket");

        // Inbound frames are read and discarded; the protocol is push-only.
        let mut buf = [0u8; 4096];
        loop {
            use tokio::io::AsyncReadExt;
            match reader.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => continue,
            }
        }

        if clients.lock().await.remove(&id).is_some() {
            let _ = disconnect_tx.send(id);
        }
        return Ok(());
    }

    if head.method.eq_ignore_ascii_case("OPTIONS") {
        let response = format!("HTTP/1.1 204 No Content\r\n{CORS_HEADERS}\r\n");
        write_half.write_all(response.as_bytes()).await?;
        return Ok(());
    }

    let body = match head.path.as_str() {
        "/info" => control_handler.info(),
        "/control" => control_handler.control(&head.query),
        _ => "TradePulse WebSocket Server".to_string(),
    };
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\n{CORS_HEADERS}\r\n{}",
        body.len(),
        body
    );
    write_half.write_all(response.as_bytes()).await?;
    Ok(())
}

fn compute_accept_key(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(WS_MAGIC_GUID.as_bytes());
    let digest = hasher.finalize();
    base64::engine::general_purpose::STANDARD.encode(digest)
}

fn encode_text_frame(payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(payload.len() + 10);
    frame.push(0x81); // FIN=1, opcode=1 (text)
    let len = payload.len();
    if len <= 125 {
        frame.push(len as u8);
    } else if len <= 65_535 {
        frame.push(126);
        frame.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        frame.push(127);
        frame.extend_from_slice(&(len as u64).to_be_bytes());
    }
    frame.extend_from_slice(payload);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_key_matches_rfc6455_example() {
        // The canonical RFC 6455 §1.3 handshake example.
        let accept = compute_accept_key("dGhlIHNhbXBsZSBub25jZQ==");
        assert_eq!(accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    #[test]
    fn frame_header_length_encoding() {
        let small = encode_text_frame(b"hi");
        assert_eq!(small[0], 0x81);
        assert_eq!(small[1], 2);

        let mid = encode_text_frame(&vec![0u8; 200]);
        assert_eq!(mid[1], 126);

        let payload = vec![0u8; 70_000];
        let big = encode_text_frame(&payload);
        assert_eq!(big[1], 127);
    }

    #[test]
    fn query_parsing_handles_percent_and_plus() {
        let q = parse_query("symbol=BTC%2DUSD&strategy=mean_reversion&note=a+b");
        assert_eq!(q.get("symbol"), Some(&"BTC-USD".to_string()));
        assert_eq!(q.get("strategy"), Some(&"mean_reversion".to_string()));
        assert_eq!(q.get("note"), Some(&"a b".to_string()));
    }
}
