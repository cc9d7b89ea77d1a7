// src/core/state/core.rs

//! Defines the central `ServerState` struct, holding all shared server-wide state.

use super::admission::ConnectionLimiter;
use super::client::{ClientMap, ConnectionMode, ConnectionState};
use super::stats::ServerStats;
use crate::config::Config;
use crate::core::NetShellError;
use crate::core::commands::{CommandRegistry, builtin_registry};
use crate::core::modules::{ModuleManager, ModuleRegistry};
use crate::core::shell::{Prompts, ShellProfile};
use bytes::Bytes;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use tracing_subscriber::{filter::EnvFilter, reload};

/// The handle `loglevel` uses to swap the active log filter.
pub type LogReloadHandle = reload::Handle<EnvFilter, tracing_subscriber::Registry>;

/// Seconds a connection must sit in `iwait` before a half-ping is sent.
const HALF_PING_IDLE_SECS: i64 = 10;

/// ASCII SYN, written to idle peers so half-open sockets surface as errors.
const HALF_PING_BYTE: &[u8] = &[0x16];

/// The central struct holding all shared, server-wide state.
/// This struct is wrapped in an `Arc` and passed to every connection handler.
#[derive(Debug)]
pub struct ServerState {
    pub config: Arc<Config>,
    /// Output handles of all live connections, keyed by session id.
    pub clients: ClientMap,
    pub stats: ServerStats,
    pub limiter: ConnectionLimiter,
    pub commands: CommandRegistry,
    pub modules: ModuleRegistry,
    /// Fans the global shutdown out to every task.
    pub shutdown_tx: broadcast::Sender<()>,
    /// Absent when the process did not install a reloadable subscriber.
    pub log_reload_handle: Option<Arc<LogReloadHandle>>,
    session_counter: AtomicU64,
}

impl ServerState {
    /// Initializes the entire server state from the given configuration.
    pub fn initialize(config: Config) -> Result<Arc<Self>, NetShellError> {
        Self::initialize_with_log_reload(config, None)
    }

    pub fn initialize_with_log_reload(
        config: Config,
        log_reload_handle: Option<Arc<LogReloadHandle>>,
    ) -> Result<Arc<Self>, NetShellError> {
        let modules = ModuleRegistry::new();
        for name in &config.modules.autoload {
            modules.load(name)?;
        }
        let commands = builtin_registry(&modules)?;
        let (shutdown_tx, _) = broadcast::channel(1);

        info!(
            "Server state initialized: {} commands, {} modules loaded, {} connection slots.",
            commands.visible().count(),
            modules.list().len(),
            config.max_open_connections
        );

        Ok(Arc::new(Self {
            limiter: ConnectionLimiter::new(config.max_open_connections),
            config: Arc::new(config),
            clients: Arc::new(DashMap::new()),
            stats: ServerStats::new(),
            commands,
            modules,
            shutdown_tx,
            log_reload_handle,
            session_counter: AtomicU64::new(1),
        }))
    }

    pub fn next_session_id(&self) -> u64 {
        self.session_counter.fetch_add(1, Ordering::Relaxed)
    }

    /// The shell a console session starts in. A configured shell whose module
    /// is not loaded falls back to the command-only console.
    pub fn console_profile(&self) -> ShellProfile {
        let console = &self.config.console;
        if let Some(shell) = &console.shell {
            match self.shell_profile(shell) {
                Ok(mut profile) => {
                    profile.show_prompt = console.show_prompt;
                    return profile;
                }
                Err(e) => warn!("Console shell '{}' is unavailable: {}", shell, e),
            }
        }
        ShellProfile::new(
            "cmd",
            Prompts {
                normal: console.prompt.clone(),
                abort: console.abort_prompt.clone(),
                pending: console.pending_prompt.clone(),
            },
            console.show_prompt,
        )
    }

    /// The shell an upgraded WebSocket session runs.
    pub fn websocket_profile(&self) -> Result<ShellProfile, NetShellError> {
        let mut profile = self.shell_profile(&self.config.websocket.shell)?;
        profile.show_prompt = self.config.websocket.show_prompt;
        Ok(profile)
    }

    /// Builds the profile of a loaded module's shell.
    pub fn shell_profile(&self, shell: &str) -> Result<ShellProfile, NetShellError> {
        let module = self.modules.shell(shell)?;
        Ok(
            ShellProfile::new(shell, Prompts::for_shell(shell), true)
                .with_evaluator(module.evaluator()),
        )
    }

    /// Sends one SYN byte to every plain connection idle in `iwait` for more
    /// than ten seconds. A dead peer then fails its next read or write.
    pub fn half_ping(&self) {
        let now = Utc::now();
        let mut pinged = 0usize;
        for entry in self.clients.iter() {
            let row = &entry.row;
            if row.state() == ConnectionState::IWait
                && row.mode() == ConnectionMode::Plain
                && row.idle_secs(now) > HALF_PING_IDLE_SECS
                && entry.output.send_raw(Bytes::from_static(HALF_PING_BYTE)).is_ok()
            {
                pinged += 1;
            }
        }
        if pinged > 0 {
            debug!("Half-pinged {} idle connections.", pinged);
        }
    }
}
