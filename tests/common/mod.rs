//! Test support: a fake feed server.
//!
//! Serves both endpoints the client talks to on a single port, the way the
//! `Manual` provider expects: `GET /auth` answers with a plain-text token
//! (or a configured failure status), and `GET /socket/websocket` completes
//! a WebSocket handshake and then plays a per-test script (send canned
//! frames, drop the connection, or just record what the client sends).

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::Role;

use intrinio_realtime::{Config, Provider, ReconnectConfig};

/// What the fake feed should do.
#[derive(Clone)]
pub struct FeedOptions {
    /// Status for `/auth` responses.
    pub auth_status: u16,
    /// Token body for successful `/auth` responses.
    pub token: String,
    /// Binary frames pushed to the client right after each WS handshake.
    pub frames_on_connect: Vec<Vec<u8>>,
    /// Text messages pushed right after each WS handshake.
    pub text_on_connect: Vec<String>,
    /// Close the first N WebSocket connections ~250 ms after accepting
    /// (after recording whatever the client sent).
    pub drop_connections: usize,
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self {
            auth_status: 200,
            token: "test-token".to_string(),
            frames_on_connect: Vec::new(),
            text_on_connect: Vec::new(),
            drop_connections: 0,
        }
    }
}

/// A message the fake feed received from the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceivedMessage {
    Text(String),
    Binary(Vec<u8>),
}

/// Observable server state.
pub struct FeedState {
    options: FeedOptions,
    /// Completed WS handshakes.
    pub ws_connections: AtomicUsize,
    /// `/auth` requests served.
    pub auth_requests: AtomicUsize,
    /// Messages received, grouped per WS connection in accept order.
    pub received: Mutex<Vec<Vec<ReceivedMessage>>>,
}

impl FeedState {
    /// Messages the given connection (0-based) has sent so far.
    pub fn messages_for(&self, connection: usize) -> Vec<ReceivedMessage> {
        self.received
            .lock()
            .get(connection)
            .cloned()
            .unwrap_or_default()
    }

    /// Binary messages for a connection, convenience for control frames.
    pub fn binary_for(&self, connection: usize) -> Vec<Vec<u8>> {
        self.messages_for(connection)
            .into_iter()
            .filter_map(|m| match m {
                ReceivedMessage::Binary(b) => Some(b),
                ReceivedMessage::Text(_) => None,
            })
            .collect()
    }
}

/// Running fake feed.
pub struct FakeFeed {
    pub addr: SocketAddr,
    pub state: Arc<FeedState>,
    handle: tokio::task::JoinHandle<()>,
}

impl Drop for FakeFeed {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl FakeFeed {
    pub async fn spawn(options: FeedOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(FeedState {
            options,
            ws_connections: AtomicUsize::new(0),
            auth_requests: AtomicUsize::new(0),
            received: Mutex::new(Vec::new()),
        });

        let accept_state = Arc::clone(&state);
        let handle = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let state = Arc::clone(&accept_state);
                tokio::spawn(async move {
                    let _ = handle_connection(stream, state).await;
                });
            }
        });

        Self {
            addr,
            state,
            handle,
        }
    }
}

async fn handle_connection(mut stream: TcpStream, state: Arc<FeedState>) -> std::io::Result<()> {
    let head = read_request_head(&mut stream).await?;
    let path = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("")
        .to_string();

    if path.starts_with("/auth") {
        state.auth_requests.fetch_add(1, Ordering::SeqCst);
        let options = &state.options;
        let (status_line, body) = if options.auth_status == 200 {
            ("200 OK", options.token.clone())
        } else if options.auth_status == 401 {
            ("401 Unauthorized", String::new())
        } else {
            ("500 Internal Server Error", String::new())
        };
        let response = format!(
            "HTTP/1.1 {status_line}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(response.as_bytes()).await?;
        stream.flush().await?;
        return Ok(());
    }

    if path.starts_with("/socket/websocket") {
        let key = header_value(&head, "sec-websocket-key").unwrap_or_default();
        let accept = derive_accept_key(key.as_bytes());
        let response = format!(
            "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Accept: {accept}\r\n\r\n"
        );
        stream.write_all(response.as_bytes()).await?;
        stream.flush().await?;

        let ws = WebSocketStream::from_raw_socket(stream, Role::Server, None).await;
        run_ws_session(ws, state).await;
        return Ok(());
    }

    stream
        .write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n")
        .await?;
    Ok(())
}

async fn run_ws_session(mut ws: WebSocketStream<TcpStream>, state: Arc<FeedState>) {
    let index = state.ws_connections.fetch_add(1, Ordering::SeqCst);
    state.received.lock().push(Vec::new());

    let drop_this = index < state.options.drop_connections;

    for text in &state.options.text_on_connect {
        let _ = ws.send(Message::Text(text.clone().into())).await;
    }
    for frame in &state.options.frames_on_connect {
        let _ = ws.send(Message::Binary(frame.clone().into())).await;
    }

    if drop_this {
        // Give the client a moment to flush its joins, record them, then
        // hang up to force a reconnect.
        let deadline = tokio::time::Instant::now() + Duration::from_millis(250);
        loop {
            match tokio::time::timeout_at(deadline, ws.next()).await {
                Ok(Some(Ok(message))) => record(&state, index, message),
                Ok(_) => break,
                Err(_) => break,
            }
        }
        let _ = ws.send(Message::Close(None)).await;
        let _ = ws.close(None).await;
        return;
    }

    while let Some(Ok(message)) = ws.next().await {
        match &message {
            Message::Ping(payload) => {
                let _ = ws.send(Message::Pong(payload.clone())).await;
            }
            Message::Close(_) => break,
            _ => record(&state, index, message),
        }
    }
}

fn record(state: &FeedState, index: usize, message: Message) {
    let received = match message {
        Message::Text(text) => ReceivedMessage::Text(text.to_string()),
        Message::Binary(bytes) => ReceivedMessage::Binary(bytes.to_vec()),
        _ => return,
    };
    let mut all = state.received.lock();
    if let Some(connection) = all.get_mut(index) {
        connection.push(received);
    }
}

async fn read_request_head(stream: &mut TcpStream) -> std::io::Result<String> {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        let n = stream.read(&mut byte).await?;
        if n == 0 {
            break;
        }
        head.push(byte[0]);
        if head.len() > 16 * 1024 {
            break;
        }
    }
    Ok(String::from_utf8_lossy(&head).into_owned())
}

fn header_value(head: &str, name: &str) -> Option<String> {
    head.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        if key.trim().eq_ignore_ascii_case(name) {
            Some(value.trim().to_string())
        } else {
            None
        }
    })
}

// =============================================================================
// Client config and wire helpers
// =============================================================================

/// Client config pointed at the fake feed through the `Manual` provider.
/// Heartbeats are slow enough not to interfere unless a test tunes them.
pub fn manual_config(addr: SocketAddr) -> Config {
    let mut config = Config::new("test-key", Provider::Manual);
    config.manual_ip_address = Some(addr.to_string());
    config.heartbeat.interval = Duration::from_secs(5);
    config.reconnect = ReconnectConfig {
        base_delay: Duration::from_millis(50),
        max_delay: Duration::from_millis(200),
        max_attempts: 20,
    };
    config
}

/// One options quote record (47 bytes) with the given prices.
pub fn options_quote_record(contract: &str, ask4: i32, ask_size: u32, bid4: i32, bid_size: u32, ts_us: u64) -> Vec<u8> {
    let mut contract_bytes = [b'_'; 21];
    contract_bytes[..contract.len()].copy_from_slice(contract.as_bytes());

    let mut buf = vec![2u8, 47];
    buf.extend_from_slice(&contract_bytes);
    buf.extend_from_slice(&ask4.to_le_bytes());
    buf.extend_from_slice(&ask_size.to_le_bytes());
    buf.extend_from_slice(&bid4.to_le_bytes());
    buf.extend_from_slice(&bid_size.to_le_bytes());
    buf.extend_from_slice(&ts_us.to_le_bytes());
    buf
}

/// One options trade record (68 bytes).
pub fn options_trade_record(contract: &str, price4: i32, size: u32, ts_us: u64) -> Vec<u8> {
    let mut contract_bytes = [b'_'; 21];
    contract_bytes[..contract.len()].copy_from_slice(contract.as_bytes());

    let mut buf = vec![1u8, 68];
    buf.extend_from_slice(&contract_bytes);
    buf.push(b'C');
    buf.extend_from_slice(&price4.to_le_bytes());
    buf.extend_from_slice(&size.to_le_bytes());
    buf.extend_from_slice(&ts_us.to_le_bytes());
    buf.extend_from_slice(&u64::from(size).to_le_bytes());
    buf.extend_from_slice(&[0u8; 4]);
    buf.extend_from_slice(&(price4 + 100).to_le_bytes());
    buf.extend_from_slice(&(price4 - 100).to_le_bytes());
    buf.extend_from_slice(&1_800_000i64.to_le_bytes());
    buf
}

/// One equities trade record.
pub fn equities_trade_record(symbol: &str, price: f32, size: u32, ts_ns: u64, volume: u32) -> Vec<u8> {
    let mut buf = vec![0u8, u8::try_from(symbol.len()).unwrap()];
    buf.extend_from_slice(symbol.as_bytes());
    buf.extend_from_slice(&price.to_le_bytes());
    buf.extend_from_slice(&size.to_le_bytes());
    buf.extend_from_slice(&ts_ns.to_le_bytes());
    buf.extend_from_slice(&volume.to_le_bytes());
    buf.push(6); // IEX
    buf.extend_from_slice(&(u16::from(b'N')).to_le_bytes());
    buf.extend_from_slice(b"@       ");
    buf
}

/// Wrap records into one wire frame.
pub fn frame(records: &[Vec<u8>]) -> Vec<u8> {
    let mut buf = vec![u8::try_from(records.len()).unwrap()];
    for record in records {
        buf.extend_from_slice(record);
    }
    buf
}

/// Poll `condition` until it holds or `timeout` elapses.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
