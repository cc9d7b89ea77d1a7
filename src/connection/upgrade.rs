// src/connection/upgrade.rs

//! Decides what happens to an HTTP request once its header block is complete.

use crate::core::commands::stats::render_html_response;
use crate::core::protocol::{UpgradeDecision, UpgradeRequest};
use crate::core::state::ServerState;

const NOT_FOUND_RESPONSE: &str = "HTTP/1.1 404 Not Found\r\n\
Server: NetShell\r\n\
Content-Type: text/plain\r\n\
\r\n\
404 Not Found\n";

/// The hook a WebSocket listener consults before switching protocols.
pub trait UpgradePolicy: Send + Sync {
    fn decide(&self, request: &UpgradeRequest, state: &ServerState) -> UpgradeDecision;
}

/// Serves the HTML stats page to plain HTTP requests and upgrades WebSocket
/// requests whose URL is allowed.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebUpgradePolicy;

impl UpgradePolicy for WebUpgradePolicy {
    fn decide(&self, request: &UpgradeRequest, state: &ServerState) -> UpgradeDecision {
        if !request.websocket {
            state.half_ping();
            return UpgradeDecision::Respond(render_html_response(&state.stats.snapshot()));
        }
        let allowed = &state.config.websocket.allowed_paths;
        if !allowed.is_empty() && !allowed.iter().any(|path| path == &request.url) {
            return UpgradeDecision::Respond(NOT_FOUND_RESPONSE.to_string());
        }
        UpgradeDecision::Accept
    }
}
