// tests/integration/websocket_session_test.rs

//! End-to-end tests of the WebSocket listener: the upgrade handshake, frame
//! traffic and the plain HTTP fallbacks.

use super::test_helpers::{TestServer, upgrade_request};
use netshell::config::Config;
use netshell::connection::{ListenerKind, UpgradePolicy};
use netshell::core::NetShellError;
use netshell::core::modules::ModuleManager;
use netshell::core::protocol::{UpgradeDecision, UpgradeRequest};
use netshell::core::state::{ConnectionMode, ServerState};
use std::sync::Arc;

/// Declines every upgrade but keeps the connection as a line session.
struct StayPlain;

impl UpgradePolicy for StayPlain {
    fn decide(&self, request: &UpgradeRequest, _state: &ServerState) -> UpgradeDecision {
        assert!(request.websocket);
        assert_eq!(request.url, "/term");
        UpgradeDecision::Plain
    }
}

#[tokio::test]
async fn test_upgrade_returns_accept_key() {
    let mut server = TestServer::new();
    let mut client = server.websocket();

    client.send(upgrade_request("/").as_bytes()).await;
    let response = client.read_until("\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
    assert!(response.contains("Upgrade: websocket\r\n"));
    assert!(response.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"));
}

#[tokio::test]
async fn test_text_frames_reach_the_json_shell() {
    let mut server = TestServer::new();
    let mut client = server.websocket();
    client.upgrade("/").await;

    client.send_text_frame(r#"{ "a" : 1 }"#).await;
    assert_eq!(client.read_text_frame().await, "{\"a\":1}\n");

    client.send_text_frame("[1, 2]\r").await;
    assert_eq!(client.read_text_frame().await, "[1,2]\n");
}

#[tokio::test]
async fn test_ping_then_text_yields_pong_and_one_line() {
    let mut server = TestServer::new();
    let mut client = server.websocket();
    client.upgrade("/").await;
    let lines_before = server.state.stats.total_lines();

    client.send(&[0x89, 0x02, b'h', b'i']).await;
    client.send_text_frame("true").await;

    assert_eq!(client.read_frame().await, (0x8a, b"hi".to_vec()));
    assert_eq!(client.read_text_frame().await, "true\n");
    assert_eq!(server.state.stats.total_lines(), lines_before + 1);
}

#[tokio::test]
async fn test_close_frame_ends_the_session() {
    let mut server = TestServer::new();
    let mut client = server.websocket();
    client.upgrade("/").await;

    client.send(&[0x88, 0x80, 0, 0, 0, 0]).await;
    assert_eq!(client.read_to_end().await, "");
    assert!(client.finish().await.is_ok());
    assert_eq!(server.state.stats.open_connections(), 0);
}

#[tokio::test]
async fn test_unmasked_frame_closes_silently() {
    let mut server = TestServer::new();
    let mut client = server.websocket();
    client.upgrade("/").await;

    client.send(&[0x81, 0x02, b'h', b'i']).await;
    assert_eq!(client.read_to_end().await, "");
    assert!(matches!(
        client.finish().await,
        Err(NetShellError::Protocol(_))
    ));
    assert!(server.state.clients.is_empty());
}

#[tokio::test]
async fn test_commands_work_over_frames() {
    let mut server = TestServer::new();
    let mut client = server.websocket();
    client.upgrade("/").await;

    client.send_text_frame("help").await;
    let menu = client.read_text_frame().await;
    assert!(menu.starts_with("Available commands:\n"));
    assert!(menu.len() > 125, "menu needs an extended length frame");

    client.send_text_frame("quit").await;
    assert_eq!(client.read_to_end().await, "");
}

#[tokio::test]
async fn test_plain_http_request_gets_stats_page() {
    let mut server = TestServer::new();
    let mut client = server.websocket();

    client
        .send(b"GET /stats HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await;
    let page = client.read_to_end().await;
    assert!(page.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(page.contains("tot-cnct: 1"));
    assert!(page.contains("Stats Legend"));
}

#[tokio::test]
async fn test_non_get_request_gets_501() {
    let mut server = TestServer::new();
    let mut client = server.websocket();

    client.send(b"POST / HTTP/1.1\r\n\r\n").await;
    let reply = client.read_to_end().await;
    assert!(reply.starts_with("HTTP/1.1 501 Not Implemented\r\n"));
}

#[tokio::test]
async fn test_disallowed_path_gets_404() {
    let mut config = Config::default();
    config.websocket.allowed_paths = vec!["/shell".to_string()];
    let mut server = TestServer::with_config(config);

    let mut denied = server.websocket();
    denied.send(upgrade_request("/other").as_bytes()).await;
    assert!(denied
        .read_to_end()
        .await
        .starts_with("HTTP/1.1 404 Not Found\r\n"));

    let mut allowed = server.websocket();
    allowed.upgrade("/shell").await;
    allowed.send_text_frame("3").await;
    assert_eq!(allowed.read_text_frame().await, "3\n");
}

#[tokio::test]
async fn test_websocket_prompts_when_enabled() {
    let mut config = Config::default();
    config.websocket.show_prompt = true;
    let mut server = TestServer::with_config(config);
    let mut client = server.websocket();
    client.upgrade("/").await;

    assert_eq!(client.read_text_frame().await, "json> ");
    client.send_text_frame("null").await;
    assert_eq!(client.read_text_frame().await, "null\njson> ");
}

#[tokio::test]
async fn test_unloaded_websocket_shell_rejects_session() {
    let mut server = TestServer::new();
    server.state.modules.unload("json-shell").unwrap();

    let mut client = server.websocket();
    client.upgrade("/").await;
    let reason = client.read_text_frame().await;
    assert!(reason.contains("loadmodule json-shell"));
    assert_eq!(client.read_to_end().await, "");
}

#[tokio::test]
async fn test_custom_policy_keeps_connection_plain() {
    let mut server = TestServer::new();
    let mut client = server.connect_with_policy(ListenerKind::WebSocket, Arc::new(StayPlain));

    client.send(upgrade_request("/term").as_bytes()).await;
    let greeting = client.read_until("netshell> ").await;
    assert_eq!(greeting, "netshell> ");
    let mode = server
        .state
        .clients
        .get(&client.session_id)
        .map(|entry| entry.row.mode());
    assert_eq!(mode, Some(ConnectionMode::Plain));

    // Lines stay unframed after the declined upgrade.
    client.send_line("help").await;
    let menu = client.read_until("netshell> ").await;
    assert!(menu.starts_with("Available commands:\n"), "got {menu:?}");

    client.send_line("quit").await;
    client.read_to_end().await;
    client.finish().await.unwrap();
}
