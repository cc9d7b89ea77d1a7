// src/server/context.rs

use crate::core::state::ServerState;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinSet;

/// Holds all the initialized state required to run the server's main loop.
pub struct ServerContext {
    pub state: Arc<ServerState>,
    /// `None` when the console listener is disabled.
    pub console_listener: Option<TcpListener>,
    /// `None` when the WebSocket listener is disabled.
    pub web_listener: Option<TcpListener>,
    pub background_tasks: JoinSet<Result<(), anyhow::Error>>,
}
