// src/connection/output.rs

//! The per-connection write queue and the task that drains it to the socket.

use crate::core::NetShellError;
use crate::core::metrics;
use crate::core::protocol::ws_frame::encode_text;
use crate::core::state::{ConnectionMode, ConnectionRow};
use bytes::Bytes;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Queued output past which the peer is reported as not reading.
pub const PENDING_OUTPUT_WARN_BYTES: usize = 1024 * 1024;

/// A cloneable handle for queueing output on one connection.
///
/// Every enqueued buffer is added to the row's pending-output counter and
/// subtracted again once the writer task has written it.
#[derive(Debug, Clone)]
pub struct OutputQueue {
    tx: mpsc::UnboundedSender<Bytes>,
    row: Arc<ConnectionRow>,
}

impl OutputQueue {
    pub fn channel(row: Arc<ConnectionRow>) -> (Self, mpsc::UnboundedReceiver<Bytes>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, row }, rx)
    }

    /// Queues bytes exactly as given.
    pub fn send_raw(&self, bytes: Bytes) -> Result<(), NetShellError> {
        let len = bytes.len();
        let pending = self.row.add_pending(len);
        if pending >= PENDING_OUTPUT_WARN_BYTES && pending - len < PENDING_OUTPUT_WARN_BYTES {
            metrics::OUTPUT_BACKLOG_WARNINGS_TOTAL.inc();
            warn!(
                "Session {} ({}): {} bytes of output queued; the peer is not reading.",
                self.row.session_id, self.row.addr, pending
            );
        }
        self.tx.send(bytes).map_err(|_| {
            self.row.sub_pending(len);
            NetShellError::QueueClosed
        })
    }

    /// Queues text, wrapped in a text frame once the connection is framed.
    pub fn send_text(&self, text: &str) -> Result<(), NetShellError> {
        if text.is_empty() {
            return Ok(());
        }
        let bytes = if self.row.mode() == ConnectionMode::Framed {
            encode_text(text)
        } else {
            Bytes::copy_from_slice(text.as_bytes())
        };
        self.send_raw(bytes)
    }
}

/// Writes queued buffers in order until every sender is gone or the socket fails.
pub async fn run_writer<W>(
    mut writer: W,
    mut rx: mpsc::UnboundedReceiver<Bytes>,
    row: Arc<ConnectionRow>,
) where
    W: AsyncWrite + Unpin,
{
    let _use = row.acquire_use();
    while let Some(buf) = rx.recv().await {
        let len = buf.len();
        let result = writer.write_all(&buf).await;
        row.sub_pending(len);
        if let Err(e) = result {
            debug!("Session {}: write failed: {}", row.session_id, e);
            rx.close();
            while let Ok(dropped) = rx.try_recv() {
                row.sub_pending(dropped.len());
            }
            return;
        }
    }
    let _ = writer.flush().await;
    let _ = writer.shutdown().await;
}
