// src/core/state/mod.rs

//! Defines the central `ServerState` struct and all related state components.
//! This module is broken down into logical parts for better organization.

mod admission;
mod client;
mod core;
mod stats;

pub use admission::ConnectionLimiter;
pub use client::*;
pub use core::{LogReloadHandle, ServerState};
pub use stats::{AggregateStats, ProcessUsage, ServerStats, StatsSnapshot};
