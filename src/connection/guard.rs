// src/connection/guard.rs

//! Defines `ConnectionGuard`, an RAII guard for connection resource management.

use crate::core::state::{ConnectionRow, ConnectionState, ServerState};
use std::sync::Arc;
use tokio::sync::OwnedSemaphorePermit;
use tracing::debug;

/// An RAII guard to ensure connection resources are always cleaned up when a
/// connection handler's scope is exited.
///
/// Fields drop after `Drop::drop` runs, so the admission permit is released
/// only once the open count has already been decremented.
pub struct ConnectionGuard {
    state: Arc<ServerState>,
    row: Arc<ConnectionRow>,
    _permit: Option<OwnedSemaphorePermit>,
}

impl ConnectionGuard {
    pub(crate) fn new(
        state: Arc<ServerState>,
        row: Arc<ConnectionRow>,
        permit: Option<OwnedSemaphorePermit>,
    ) -> Self {
        Self {
            state,
            row,
            _permit: permit,
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        debug!(
            "ConnectionGuard dropping, cleaning up resources for connection {}",
            self.row.addr
        );
        self.row.set_state(ConnectionState::Down);
        self.state.clients.remove(&self.row.session_id);
        self.state.stats.on_connection_close(self.row.session_id);
    }
}
