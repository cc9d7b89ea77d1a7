// src/core/mod.rs

//! The central module containing the core logic and data structures of NetShell.

pub mod commands;
pub mod errors;
pub mod metrics;
pub mod modules;
pub mod protocol;
pub mod shell;
pub mod state;

pub use errors::NetShellError;
