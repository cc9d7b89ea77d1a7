// src/core/state/admission.rs

//! Caps the number of concurrently open connections.

use super::stats::ServerStats;
use crate::core::NetShellError;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::debug;

/// Hands out one permit per open connection. A connection that arrives while
/// all permits are taken is counted as a stall and waits for a free slot.
#[derive(Debug)]
pub struct ConnectionLimiter {
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl ConnectionLimiter {
    pub fn new(capacity: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Waits until a connection slot is free. The permit must be held for the
    /// whole life of the connection.
    pub async fn admit(&self, stats: &ServerStats) -> Result<OwnedSemaphorePermit, NetShellError> {
        match Arc::clone(&self.permits).try_acquire_owned() {
            Ok(permit) => Ok(permit),
            Err(TryAcquireError::NoPermits) => {
                stats.on_stall();
                debug!(
                    "All {} connection slots are busy; waiting for one to free up.",
                    self.capacity
                );
                Arc::clone(&self.permits)
                    .acquire_owned()
                    .await
                    .map_err(|_| NetShellError::Internal("connection limiter closed".into()))
            }
            Err(TryAcquireError::Closed) => Err(NetShellError::Internal(
                "connection limiter closed".into(),
            )),
        }
    }

    /// Stops admitting; waiters are released with an error.
    pub fn close(&self) {
        self.permits.close();
    }
}
