// src/connection/mod.rs

//! Manages the lifecycle of a single client TCP connection: the handshake,
//! framing, line dispatch and the output queue.

// Declare the private sub-modules of the `connection` module.
mod guard;
mod handler;
mod output;
mod upgrade;

// Publicly re-export the primary types from the sub-modules.
pub use guard::ConnectionGuard;
pub use handler::{ConnectionHandler, ListenerKind};
pub use output::{OutputQueue, PENDING_OUTPUT_WARN_BYTES, run_writer};
pub use upgrade::{UpgradePolicy, WebUpgradePolicy};
