// tests/integration/test_helpers.rs

//! Test helpers: an in-memory server and a client that talks to it over a
//! `tokio::io::duplex` pipe instead of a socket.

use bytes::BytesMut;
use netshell::config::Config;
use netshell::connection::{ConnectionHandler, ListenerKind, UpgradePolicy};
use netshell::core::NetShellError;
use netshell::core::protocol::ws_frame::{OpCode, encode_frame};
use netshell::core::state::ServerState;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::OwnedSemaphorePermit;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

const READ_TIMEOUT: Duration = Duration::from_secs(5);
const PIPE_CAPACITY: usize = 64 * 1024;
const CLIENT_MASK: [u8; 4] = [0x12, 0x34, 0x56, 0x78];

pub const WS_KEY: &str = "dGhlIHNhbXBsZSBub25jZQ==";

/// The request a browser sends to open a WebSocket on `path`.
pub fn upgrade_request(path: &str) -> String {
    format!(
        "GET {path} HTTP/1.1\r\n\
         Host: localhost:18080\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: {WS_KEY}\r\n\
         Sec-WebSocket-Version: 13\r\n\
         \r\n"
    )
}

/// A server without listeners; each `connect` runs one connection handler.
pub struct TestServer {
    pub state: Arc<ServerState>,
    next_port: u16,
}

impl TestServer {
    /// Creates a new test server with default configuration
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let _ = tracing_subscriber::registry()
            .with(EnvFilter::new("warn"))
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .try_init();

        let state = ServerState::initialize(config).expect("Failed to initialize server state");
        Self {
            state,
            next_port: 40000,
        }
    }

    pub fn connect(&mut self, kind: ListenerKind) -> TestClient {
        self.connect_with_permit(kind, None)
    }

    /// Connects holding an admission permit, as the accept loop does.
    pub fn connect_with_permit(
        &mut self,
        kind: ListenerKind,
        permit: Option<OwnedSemaphorePermit>,
    ) -> TestClient {
        self.spawn_handler(kind, permit, None)
    }

    /// Connects with a custom hook deciding WebSocket upgrades.
    pub fn connect_with_policy(
        &mut self,
        kind: ListenerKind,
        policy: Arc<dyn UpgradePolicy>,
    ) -> TestClient {
        self.spawn_handler(kind, None, Some(policy))
    }

    fn spawn_handler(
        &mut self,
        kind: ListenerKind,
        permit: Option<OwnedSemaphorePermit>,
        policy: Option<Arc<dyn UpgradePolicy>>,
    ) -> TestClient {
        self.next_port += 1;
        let addr: SocketAddr = format!("127.0.0.1:{}", self.next_port)
            .parse()
            .expect("valid address");
        let (client, server) = tokio::io::duplex(PIPE_CAPACITY);
        let mut handler = ConnectionHandler::new(server, addr, self.state.clone(), kind);
        if let Some(policy) = policy {
            handler = handler.with_upgrade_policy(policy);
        }
        let session_id = handler.session_id();
        let task = tokio::spawn(handler.run(permit));
        TestClient {
            stream: client,
            buf: BytesMut::new(),
            task: Some(task),
            session_id,
        }
    }

    pub fn console(&mut self) -> TestClient {
        self.connect(ListenerKind::Console)
    }

    pub fn websocket(&mut self) -> TestClient {
        self.connect(ListenerKind::WebSocket)
    }
}

/// The peer end of one in-memory connection.
pub struct TestClient {
    stream: DuplexStream,
    buf: BytesMut,
    task: Option<JoinHandle<Result<(), NetShellError>>>,
    pub session_id: u64,
}

impl TestClient {
    pub async fn send(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.expect("write failed");
    }

    pub async fn send_line(&mut self, line: &str) {
        self.send(format!("{line}\n").as_bytes()).await;
    }

    /// Sends a masked client text frame.
    pub async fn send_text_frame(&mut self, text: &str) {
        let frame = encode_frame(OpCode::Text, text.as_bytes(), Some(CLIENT_MASK))
            .expect("payload fits one client frame");
        self.send(&frame).await;
    }

    /// Closes our write side; the server sees end-of-stream.
    pub async fn close_write(&mut self) {
        self.stream.shutdown().await.expect("shutdown failed");
    }

    async fn fill(&mut self) -> usize {
        let mut chunk = [0u8; 4096];
        let n = tokio::time::timeout(READ_TIMEOUT, self.stream.read(&mut chunk))
            .await
            .expect("timed out waiting for server output")
            .expect("read failed");
        self.buf.extend_from_slice(&chunk[..n]);
        n
    }

    /// Reads until `needle` has arrived and returns everything up to and including it.
    pub async fn read_until(&mut self, needle: &str) -> String {
        loop {
            if let Some(pos) = self
                .buf
                .windows(needle.len())
                .position(|w| w == needle.as_bytes())
            {
                let taken = self.buf.split_to(pos + needle.len());
                return String::from_utf8_lossy(&taken).into_owned();
            }
            let n = self.fill().await;
            assert!(
                n > 0,
                "connection closed before {needle:?} arrived; got {:?}",
                String::from_utf8_lossy(&self.buf)
            );
        }
    }

    /// Reads until the server closes the connection.
    pub async fn read_to_end(&mut self) -> String {
        while self.fill().await > 0 {}
        let rest = self.buf.split();
        String::from_utf8_lossy(&rest).into_owned()
    }

    async fn read_bytes(&mut self, n: usize) -> Vec<u8> {
        while self.buf.len() < n {
            assert!(self.fill().await > 0, "connection closed mid-frame");
        }
        self.buf.split_to(n).to_vec()
    }

    /// Reads one server frame, returning its first header byte and payload.
    pub async fn read_frame(&mut self) -> (u8, Vec<u8>) {
        let header = self.read_bytes(2).await;
        assert_eq!(header[1] & 0x80, 0, "server frames are never masked");
        let len = match header[1] & 0x7f {
            126 => {
                let ext = self.read_bytes(2).await;
                u16::from_be_bytes([ext[0], ext[1]]) as usize
            }
            127 => {
                let ext = self.read_bytes(8).await;
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&ext);
                u64::from_be_bytes(raw) as usize
            }
            short => short as usize,
        };
        let payload = self.read_bytes(len).await;
        (header[0], payload)
    }

    /// Reads one text frame and returns its payload as a string.
    pub async fn read_text_frame(&mut self) -> String {
        let (first, payload) = self.read_frame().await;
        assert_eq!(first, 0x81, "expected a text frame");
        String::from_utf8(payload).expect("text frame is UTF-8")
    }

    /// Performs the upgrade handshake and checks the server's reply.
    pub async fn upgrade(&mut self, path: &str) {
        self.send(upgrade_request(path).as_bytes()).await;
        let response = self.read_until("\r\n\r\n").await;
        assert!(
            response.starts_with("HTTP/1.1 101 Switching Protocols\r\n"),
            "unexpected upgrade response: {response:?}"
        );
    }

    /// Waits for the connection task and returns its result.
    pub async fn finish(&mut self) -> Result<(), NetShellError> {
        let task = self.task.take().expect("finish called twice");
        tokio::time::timeout(READ_TIMEOUT, task)
            .await
            .expect("connection task did not finish")
            .expect("connection task panicked")
    }
}
