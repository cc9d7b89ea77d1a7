// src/core/errors.rs

//! Defines the primary error type for the entire application.

use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing every failure the connection layer can report.
///
/// `Io`, `Protocol` and `QueueClosed` end the connection when they escape the
/// handler loop. The remaining variants are rendered as text for the requesting
/// client and the session carries on.
#[derive(Error, Debug)]
pub enum NetShellError {
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    /// A malformed handshake line, a bad mask bit or an unsupported opcode.
    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("no such command: {0}")]
    UnknownCommand(String),

    #[error("no such module: {0}")]
    UnknownModule(String),

    #[error("Wrong number of arguments for '{0}' command")]
    WrongArgumentCount(String),

    /// The evaluator rejected or failed on its input.
    #[error("{0}")]
    Evaluation(String),

    /// A collaborator operation that exists in the interface but has no implementation.
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("payload of {0} bytes exceeds the frame limit")]
    PayloadTooLarge(usize),

    #[error("connection output queue is closed")]
    QueueClosed,

    #[error("Internal Server Error: {0}")]
    Internal(String),
}

// Manual implementation of Clone because `std::io::Error` is not cloneable.
impl Clone for NetShellError {
    fn clone(&self) -> Self {
        match self {
            NetShellError::Io(e) => NetShellError::Io(Arc::clone(e)),
            NetShellError::Protocol(s) => NetShellError::Protocol(s.clone()),
            NetShellError::UnknownCommand(s) => NetShellError::UnknownCommand(s.clone()),
            NetShellError::UnknownModule(s) => NetShellError::UnknownModule(s.clone()),
            NetShellError::WrongArgumentCount(s) => NetShellError::WrongArgumentCount(s.clone()),
            NetShellError::Evaluation(s) => NetShellError::Evaluation(s.clone()),
            NetShellError::NotImplemented(s) => NetShellError::NotImplemented(s.clone()),
            NetShellError::PayloadTooLarge(n) => NetShellError::PayloadTooLarge(*n),
            NetShellError::QueueClosed => NetShellError::QueueClosed,
            NetShellError::Internal(s) => NetShellError::Internal(s.clone()),
        }
    }
}

impl PartialEq for NetShellError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (NetShellError::Io(e1), NetShellError::Io(e2)) => e1.kind() == e2.kind(),
            (NetShellError::Protocol(s1), NetShellError::Protocol(s2)) => s1 == s2,
            (NetShellError::UnknownCommand(s1), NetShellError::UnknownCommand(s2)) => s1 == s2,
            (NetShellError::UnknownModule(s1), NetShellError::UnknownModule(s2)) => s1 == s2,
            (NetShellError::WrongArgumentCount(s1), NetShellError::WrongArgumentCount(s2)) => {
                s1 == s2
            }
            (NetShellError::Evaluation(s1), NetShellError::Evaluation(s2)) => s1 == s2,
            (NetShellError::NotImplemented(s1), NetShellError::NotImplemented(s2)) => s1 == s2,
            (NetShellError::PayloadTooLarge(n1), NetShellError::PayloadTooLarge(n2)) => n1 == n2,
            (NetShellError::Internal(s1), NetShellError::Internal(s2)) => s1 == s2,
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

impl From<std::io::Error> for NetShellError {
    fn from(e: std::io::Error) -> Self {
        NetShellError::Io(Arc::new(e))
    }
}

impl From<serde_json::Error> for NetShellError {
    fn from(e: serde_json::Error) -> Self {
        NetShellError::Evaluation(format!("JSON error: {e}"))
    }
}
