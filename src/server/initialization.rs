// src/server/initialization.rs

//! Handles server initialization: shared state, module autoload and binding
//! the enabled listeners.

use super::context::ServerContext;
use crate::config::Config;
use crate::core::state::{LogReloadHandle, ServerState};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tracing::{info, warn};

/// Initializes all server components before starting the main loop.
pub async fn setup(
    config: Config,
    log_reload_handle: Arc<LogReloadHandle>,
) -> Result<ServerContext> {
    log_startup_info(&config);

    let state = ServerState::initialize_with_log_reload(config, Some(log_reload_handle))
        .context("Failed to initialize server state")?;

    let console = &state.config.console;
    let console_listener = if console.enabled {
        Some(bind(&state.config.host, console.port, "console").await?)
    } else {
        info!("Console listener is disabled in the configuration.");
        None
    };

    let websocket = &state.config.websocket;
    let web_listener = if websocket.enabled {
        Some(bind(&state.config.host, websocket.port, "WebSocket").await?)
    } else {
        info!("WebSocket listener is disabled in the configuration.");
        None
    };

    Ok(ServerContext {
        state,
        console_listener,
        web_listener,
        background_tasks: JoinSet::new(),
    })
}

async fn bind(host: &str, port: u16, label: &str) -> Result<TcpListener> {
    let listener = TcpListener::bind((host, port))
        .await
        .with_context(|| format!("Failed to bind the {label} listener on {host}:{port}"))?;
    info!("NetShell {} listener on {}:{}", label, host, port);
    Ok(listener)
}

/// Logs key configuration parameters at startup.
fn log_startup_info(config: &Config) {
    info!(
        "At most {} open connections, {} queued lines per connection.",
        config.max_open_connections, config.max_queued_lines
    );
    if let Some(shell) = &config.console.shell {
        info!("Console sessions start in the '{}' shell.", shell);
    }
    if config.websocket.enabled {
        if config.websocket.allowed_paths.is_empty() {
            warn!("WebSocket upgrades are accepted on any URL path.");
        } else {
            info!(
                "WebSocket upgrades are accepted on: {}",
                config.websocket.allowed_paths.join(", ")
            );
        }
    }
}
