// src/server/connection_loop.rs

//! Contains the main server loop for accepting connections and handling graceful shutdown.

use super::context::ServerContext;
use crate::connection::{ConnectionHandler, ListenerKind};
use crate::core::state::ServerState;
use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::signal::unix::{SignalKind, signal};
use tokio::task::JoinSet;
use tracing::{Instrument, error, info, info_span, warn};

/// How long connections get to write their final output after shutdown.
const CLIENT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// The main server loop that accepts connections and handles graceful shutdown.
pub async fn run(mut ctx: ServerContext) -> anyhow::Result<()> {
    let mut client_tasks = JoinSet::new();
    let mut shutdown_rx = ctx.state.shutdown_tx.subscribe();

    let mut sigint = signal(SignalKind::interrupt()).context("Failed to register SIGINT handler")?;
    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to register SIGTERM handler")?;

    loop {
        tokio::select! {
            biased;

            _ = sigint.recv() => {
                info!("SIGINT received, initiating graceful shutdown.");
                break;
            }
            _ = sigterm.recv() => {
                info!("SIGTERM received, initiating graceful shutdown.");
                break;
            }
            _ = shutdown_rx.recv() => {
                info!("Shutdown command received, initiating graceful shutdown.");
                break;
            }

            Some(res) = ctx.background_tasks.join_next() => {
                match res {
                    Ok(Ok(())) => warn!("A background task finished unexpectedly without an error."),
                    Ok(Err(e)) => { error!("CRITICAL: Background task failed: {:#}. Shutting down.", e); break; }
                    Err(e) => { error!("CRITICAL: Background task panicked: {e:?}. Shutting down."); break; }
                }
            },

            res = accept(ctx.console_listener.as_ref()) => {
                on_accept(res, &ctx.state, ListenerKind::Console, &mut client_tasks);
            },

            res = accept(ctx.web_listener.as_ref()) => {
                on_accept(res, &ctx.state, ListenerKind::WebSocket, &mut client_tasks);
            },

            Some(res) = client_tasks.join_next() => {
                if let Err(e) = res
                    && e.is_panic()
                {
                    error!("A client handler panicked: {e:?}");
                }
            },
        }
    }

    info!("Shutting down. Sending signal to all tasks.");
    // Fails only when no receiver is left, i.e. nothing is running.
    let _ = ctx.state.shutdown_tx.send(());
    ctx.state.limiter.close();

    if tokio::time::timeout(CLIENT_DRAIN_TIMEOUT, async {
        while client_tasks.join_next().await.is_some() {}
    })
    .await
    .is_err()
    {
        warn!("Timed out waiting for client connections; aborting the rest.");
    }
    client_tasks.shutdown().await;
    info!("All client connections closed.");

    info!("Waiting for background tasks to finish...");
    if tokio::time::timeout(Duration::from_secs(10), async {
        while ctx.background_tasks.join_next().await.is_some() {}
    })
    .await
    .is_err()
    {
        warn!("Timed out waiting for background tasks to finish cleanly.");
    };
    info!("Server shutdown complete.");
    Ok(())
}

/// Accepts on a listener; never resolves for a disabled one.
async fn accept(listener: Option<&TcpListener>) -> std::io::Result<(TcpStream, SocketAddr)> {
    match listener {
        Some(listener) => listener.accept().await,
        None => std::future::pending().await,
    }
}

fn on_accept(
    res: std::io::Result<(TcpStream, SocketAddr)>,
    state: &Arc<ServerState>,
    kind: ListenerKind,
    client_tasks: &mut JoinSet<()>,
) {
    let (socket, addr) = match res {
        Ok(accepted) => accepted,
        Err(e) => {
            error!("Failed to accept {} connection: {}", kind.label(), e);
            return;
        }
    };
    info!("Accepted new {} connection from: {}", kind.label(), addr);
    if let Err(e) = socket.set_nodelay(true) {
        warn!("Failed to set TCP_NODELAY for {}: {}", addr, e);
    }

    let state = state.clone();
    client_tasks.spawn(async move {
        // Admission waits here, so a full server stalls new peers instead of
        // refusing them.
        let permit = match state.limiter.admit(&state.stats).await {
            Ok(permit) => permit,
            Err(e) => {
                warn!("Dropping connection from {} before admission: {}", addr, e);
                return;
            }
        };
        if state.limiter.available() == 0 {
            state.half_ping();
        }

        let handler = ConnectionHandler::new(socket, addr, state, kind);
        let span = info_span!(
            "connection",
            id = handler.session_id(),
            %addr,
            listener = kind.label()
        );
        if let Err(e) = handler.run(Some(permit)).instrument(span).await {
            warn!("Connection from {} terminated unexpectedly: {}", addr, e);
        }
    });
}
