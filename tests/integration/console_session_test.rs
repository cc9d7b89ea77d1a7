// tests/integration/console_session_test.rs

//! End-to-end tests of plain line sessions on the console listener.

use super::test_helpers::TestServer;
use netshell::config::Config;

#[tokio::test]
async fn test_prompt_on_connect_and_help_menu() {
    let mut server = TestServer::new();
    let mut client = server.console();

    assert_eq!(client.read_until("netshell> ").await, "netshell> ");

    client.send_line("help").await;
    let menu = client.read_until("netshell> ").await;
    assert!(menu.starts_with("Available commands:\n"));
    assert!(menu.contains("  stats:"));
    assert!(!menu.contains("exit:"));
}

#[tokio::test]
async fn test_unknown_command_uses_abort_prompt() {
    let mut server = TestServer::new();
    let mut client = server.console();
    client.read_until("netshell> ").await;

    client.send_line("frobnicate now").await;
    let reply = client.read_until("netshell! ").await;
    assert_eq!(reply, "no such command: frobnicate\nnetshell! ");

    // The session carries on after a recoverable error.
    client.send_line("").await;
    assert_eq!(client.read_until("netshell> ").await, "netshell> ");
}

#[tokio::test]
async fn test_telnet_interrupt_before_a_command() {
    let mut server = TestServer::new();
    let mut client = server.console();
    client.read_until("netshell> ").await;

    client.send(&[0xff, 0xf4, 0xff, 0xfd, 0x06]).await;
    client.send_line("help").await;
    let menu = client.read_until("netshell> ").await;
    assert!(menu.starts_with("Available commands:\n"), "got {menu:?}");
    assert!(!menu.contains("no such command"));
}

#[tokio::test]
async fn test_quit_closes_the_session() {
    let mut server = TestServer::new();
    let mut client = server.console();
    client.read_until("netshell> ").await;

    client.send_line("quit").await;
    assert_eq!(client.read_to_end().await, "");
    assert!(client.finish().await.is_ok());
    assert_eq!(server.state.stats.open_connections(), 0);
    assert!(server.state.clients.is_empty());
}

#[tokio::test]
async fn test_ctrl_d_closes_the_session() {
    let mut server = TestServer::new();
    let mut client = server.console();
    client.read_until("netshell> ").await;

    client.send(b"\x04").await;
    assert_eq!(client.read_to_end().await, "");
    assert!(client.finish().await.is_ok());
}

#[tokio::test]
async fn test_echo_shell_round_trip() {
    let mut server = TestServer::new();
    let mut client = server.console();
    client.read_until("netshell> ").await;

    client.send_line("echo").await;
    assert_eq!(
        client.read_until("echo> ").await,
        "Entering the echo shell.\necho> "
    );
    client.send_line("hello world").await;
    assert_eq!(client.read_until("echo> ").await, "hello world\necho> ");

    // Commands still resolve inside a shell.
    client.send_line("quit").await;
    assert_eq!(client.read_to_end().await, "");
}

#[tokio::test]
async fn test_lines_are_answered_in_order() {
    let mut server = TestServer::new();
    let mut client = server.console();
    client.read_until("netshell> ").await;

    client.send(b"echo\nfirst\nsecond\nthird\n").await;
    let out = client.read_until("third\n").await;
    let first = out.find("first\n").expect("first answered");
    let second = out.find("second\n").expect("second answered");
    assert!(first < second);
}

#[tokio::test]
async fn test_queued_lines_run_after_peer_eof() {
    let mut server = TestServer::new();
    let mut client = server.console();
    client.read_until("netshell> ").await;

    client.send(b"echo\nlast words").await;
    client.close_write().await;

    let out = client.read_to_end().await;
    assert!(out.contains("Entering the echo shell.\n"));
    assert!(out.contains("last words\n"));
    assert!(client.finish().await.is_ok());
}

#[tokio::test]
async fn test_lines_are_counted() {
    let mut server = TestServer::new();
    let mut client = server.console();
    client.read_until("netshell> ").await;

    client.send(b"\n\n\n").await;
    for _ in 0..3 {
        client.read_until("netshell> ").await;
    }
    assert_eq!(server.state.stats.total_lines(), 3);
}

#[tokio::test]
async fn test_stats_lists_this_connection() {
    let mut server = TestServer::new();
    let mut client = server.console();
    client.read_until("netshell> ").await;

    client.send_line("stats").await;
    let report = client.read_until("netshell> ").await;
    assert!(report.contains("cur-open-socks: 1"));
    assert!(report.contains("OPEN-DATE        THREAD"));
    let row = report
        .lines()
        .find(|line| line.contains(" run "))
        .expect("the session running stats is listed");
    assert!(row.contains(&client.session_id.to_string()));
}

#[tokio::test]
async fn test_shutdown_notifies_other_sessions() {
    let mut server = TestServer::new();
    let mut admin = server.console();
    let mut bystander = server.console();
    admin.read_until("netshell> ").await;
    bystander.read_until("netshell> ").await;

    admin.send_line("shutdown").await;
    let ack = admin.read_to_end().await;
    assert!(ack.starts_with("Shutting down the server.\n"));
    assert!(ack.ends_with("Server is shutting down.\n"));

    let notice = bystander.read_to_end().await;
    assert_eq!(notice, "Server is shutting down.\n");
}

#[tokio::test]
async fn test_hidden_console_prompt() {
    let mut config = Config::default();
    config.console.show_prompt = false;
    let mut server = TestServer::with_config(config);
    let mut client = server.console();

    client.send_line("echo").await;
    client.send_line("quiet").await;
    client.send_line("quit").await;
    assert_eq!(
        client.read_to_end().await,
        "Entering the echo shell.\nquiet\n"
    );
}

#[tokio::test]
async fn test_console_can_start_in_a_shell() {
    let mut config = Config::default();
    config.console.shell = Some("json".to_string());
    let mut server = TestServer::with_config(config);
    let mut client = server.console();

    assert_eq!(client.read_until("json> ").await, "json> ");
    client.send_line(r#"{"b": [true, null]}"#).await;
    assert_eq!(
        client.read_until("json> ").await,
        "{\"b\":[true,null]}\njson> "
    );

    client.send_line("{broken").await;
    let reply = client.read_until("json! ").await;
    assert!(reply.starts_with("JSON error:"));
}
