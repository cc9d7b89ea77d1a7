// src/config.rs

//! Manages server configuration: loading, resolving defaults, and validation.

use crate::core::modules::is_known_shell;
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Settings for the plain-text console listener.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ConsoleConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_console_port")]
    pub port: u16,
    #[serde(default = "default_prompt")]
    pub prompt: String,
    /// Shown after a line failed to evaluate.
    #[serde(default = "default_abort_prompt")]
    pub abort_prompt: String,
    /// Shown while more input is already queued behind the running line.
    #[serde(default = "default_pending_prompt")]
    pub pending_prompt: String,
    #[serde(default = "default_true")]
    pub show_prompt: bool,
    /// A shell to enter as soon as a console session opens.
    #[serde(default)]
    pub shell: Option<String>,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_console_port(),
            prompt: default_prompt(),
            abort_prompt: default_abort_prompt(),
            pending_prompt: default_pending_prompt(),
            show_prompt: true,
            shell: None,
        }
    }
}

/// Settings for the WebSocket listener.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WebSocketConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_websocket_port")]
    pub port: u16,
    /// The shell every upgraded session runs.
    #[serde(default = "default_websocket_shell")]
    pub shell: String,
    #[serde(default)]
    pub show_prompt: bool,
    /// URLs that may be upgraded. Empty allows any URL.
    #[serde(default)]
    pub allowed_paths: Vec<String>,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_websocket_port(),
            shell: default_websocket_shell(),
            show_prompt: false,
            allowed_paths: Vec::new(),
        }
    }
}

/// Modules loaded at startup.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ModulesConfig {
    #[serde(default = "default_autoload")]
    pub autoload: Vec<String>,
}

impl Default for ModulesConfig {
    fn default() -> Self {
        Self {
            autoload: default_autoload(),
        }
    }
}

/// Configuration for the Prometheus metrics exporter.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct MetricsConfig {
    /// If true, an HTTP server will be started to expose Prometheus metrics.
    #[serde(default)]
    pub enabled: bool,
    /// The port for the Prometheus metrics server.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_true() -> bool {
    true
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_console_port() -> u16 {
    17001
}
fn default_websocket_port() -> u16 {
    18080
}
fn default_metrics_port() -> u16 {
    8878
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_max_open_connections() -> usize {
    10
}
fn default_max_queued_lines() -> usize {
    64
}
fn default_prompt() -> String {
    "netshell> ".to_string()
}
fn default_abort_prompt() -> String {
    "netshell! ".to_string()
}
fn default_pending_prompt() -> String {
    "... ".to_string()
}
fn default_websocket_shell() -> String {
    "json".to_string()
}
fn default_autoload() -> Vec<String> {
    vec!["echo-shell".to_string(), "json-shell".to_string()]
}

/// The raw structure deserialized from the TOML file before validation.
#[derive(Deserialize, Debug)]
struct RawConfig {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default = "default_max_open_connections")]
    max_open_connections: usize,
    #[serde(default = "default_max_queued_lines")]
    max_queued_lines: usize,
    #[serde(default)]
    console: ConsoleConfig,
    #[serde(default)]
    websocket: WebSocketConfig,
    #[serde(default)]
    modules: ModulesConfig,
    #[serde(default)]
    metrics: MetricsConfig,
}

/// The main configuration struct for the server, after validation.
#[derive(Serialize, Debug, Clone)]
pub struct Config {
    pub host: String,
    pub log_level: String,
    /// How many connections may be open at once; further ones wait.
    pub max_open_connections: usize,
    /// How many received lines a session may hold before reading pauses.
    pub max_queued_lines: usize,
    pub console: ConsoleConfig,
    pub websocket: WebSocketConfig,
    pub modules: ModulesConfig,
    pub metrics: MetricsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            log_level: default_log_level(),
            max_open_connections: default_max_open_connections(),
            max_queued_lines: default_max_queued_lines(),
            console: ConsoleConfig::default(),
            websocket: WebSocketConfig::default(),
            modules: ModulesConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Config {
    /// Loads the config at `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &str) -> Result<Self> {
        if !Path::new(path).exists() {
            info!("Config file '{}' not found; using built-in defaults.", path);
            let config = Config::default();
            config.validate()?;
            return Ok(config);
        }
        Self::from_file(path)
    }

    /// Creates a new `Config` instance by reading and parsing a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Invalid configuration in '{path}'"))
    }

    /// Parses and validates configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let raw_config: RawConfig =
            toml::from_str(contents).context("Failed to parse TOML configuration")?;

        let config = Config {
            host: raw_config.host,
            log_level: raw_config.log_level,
            max_open_connections: raw_config.max_open_connections,
            max_queued_lines: raw_config.max_queued_lines,
            console: raw_config.console,
            websocket: raw_config.websocket,
            modules: raw_config.modules,
            metrics: raw_config.metrics,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(anyhow!("host cannot be empty"));
        }
        if self.max_open_connections == 0 {
            return Err(anyhow!("max_open_connections cannot be 0"));
        }
        if self.max_queued_lines == 0 {
            return Err(anyhow!("max_queued_lines cannot be 0"));
        }
        if !self.console.enabled && !self.websocket.enabled {
            return Err(anyhow!(
                "at least one of console.enabled and websocket.enabled must be true"
            ));
        }

        let mut ports: Vec<(&str, u16)> = Vec::new();
        if self.console.enabled {
            ports.push(("console.port", self.console.port));
        }
        if self.websocket.enabled {
            ports.push(("websocket.port", self.websocket.port));
        }
        if self.metrics.enabled {
            ports.push(("metrics.port", self.metrics.port));
        }
        for (i, (name, port)) in ports.iter().enumerate() {
            if *port == 0 {
                return Err(anyhow!("{name} cannot be 0"));
            }
            if let Some((other, _)) = ports[..i].iter().find(|(_, p)| p == port) {
                return Err(anyhow!("{name} cannot be the same as {other}"));
            }
        }

        if let Some(shell) = &self.console.shell
            && !is_known_shell(shell)
        {
            return Err(anyhow!("console.shell '{shell}' is not a known shell"));
        }
        if self.websocket.enabled && !is_known_shell(&self.websocket.shell) {
            return Err(anyhow!(
                "websocket.shell '{}' is not a known shell",
                self.websocket.shell
            ));
        }

        if self.max_open_connections < 2 {
            warn!(
                "max_open_connections is {}; a second client will stall until the first disconnects.",
                self.max_open_connections
            );
        }
        Ok(())
    }
}
