// src/core/protocol/handshake.rs

//! The HTTP Upgrade state machine that turns a fresh connection into a framed
//! WebSocket session, or leaves it as a plain one.

use super::ws_frame::encode_handshake_accept;
use crate::core::NetShellError;

const UPGRADE_HEADER: &str = "Upgrade: websocket";
const KEY_HEADER: &str = "Sec-WebSocket-Key: ";

/// Sent when the first request line is not a `GET`.
pub const NOT_IMPLEMENTED_RESPONSE: &str =
    "HTTP/1.1 501 Not Implemented\r\nServer: NetShell\r\n\r\n";

/// Where the negotiator is in the header exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakePhase {
    Start,
    HeaderScan,
    HeaderDone,
    Framed,
    Plain,
}

/// What the request looked like once the header block is complete. This is
/// what the upgrade hook gets to decide on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeRequest {
    pub url: String,
    pub websocket: bool,
}

/// The owning session's verdict on a completed header block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpgradeDecision {
    /// Go ahead with the WebSocket upgrade.
    Accept,
    /// Send this text, then close.
    Respond(String),
    /// Close without sending anything.
    Reject,
    /// Keep the connection as a plain line session.
    Plain,
}

/// The tagged result of feeding one handshake step, propagated to the
/// connection's run loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeFlow {
    /// Keep reading header lines.
    Continue,
    /// The header block is complete; ask the upgrade hook.
    HeadersComplete(UpgradeRequest),
    /// Send the switching-protocols response; framing starts after it.
    Upgrade(String),
    /// The session stays a plain line session.
    Plain,
    /// Send this text, then close.
    CloseWithResponse(String),
    /// Close without sending anything.
    CloseSilently,
}

/// Accumulates HTTP header state for one not-yet-framed connection.
#[derive(Debug)]
pub struct HandshakeNegotiator {
    phase: HandshakePhase,
    url: String,
    got_websocket_header: bool,
    websocket_key: String,
}

impl Default for HandshakeNegotiator {
    fn default() -> Self {
        Self::new()
    }
}

impl HandshakeNegotiator {
    pub fn new() -> Self {
        Self {
            phase: HandshakePhase::Start,
            url: String::new(),
            got_websocket_header: false,
            websocket_key: String::new(),
        }
    }

    pub fn phase(&self) -> HandshakePhase {
        self.phase
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn got_websocket_header(&self) -> bool {
        self.got_websocket_header
    }

    pub fn websocket_key(&self) -> &str {
        &self.websocket_key
    }

    /// Feeds one received line (already stripped of its line terminator).
    pub fn feed_line(&mut self, line: &str) -> Result<HandshakeFlow, NetShellError> {
        match self.phase {
            HandshakePhase::Start => {
                let Some(rest) = line.strip_prefix("GET ") else {
                    self.phase = HandshakePhase::Plain;
                    return Ok(HandshakeFlow::CloseWithResponse(
                        NOT_IMPLEMENTED_RESPONSE.to_string(),
                    ));
                };
                self.url = rest.split(' ').next().unwrap_or_default().to_string();
                self.phase = HandshakePhase::HeaderScan;
                Ok(HandshakeFlow::Continue)
            }
            HandshakePhase::HeaderScan => {
                if line.is_empty() {
                    self.phase = HandshakePhase::HeaderDone;
                    return Ok(HandshakeFlow::HeadersComplete(UpgradeRequest {
                        url: self.url.clone(),
                        websocket: self.got_websocket_header,
                    }));
                }
                if line.starts_with(UPGRADE_HEADER) {
                    self.got_websocket_header = true;
                } else if let Some(key) = line.strip_prefix(KEY_HEADER) {
                    self.websocket_key = key.trim().to_string();
                }
                Ok(HandshakeFlow::Continue)
            }
            HandshakePhase::HeaderDone | HandshakePhase::Framed | HandshakePhase::Plain => {
                Err(NetShellError::Protocol(format!(
                    "handshake line received in phase {:?}",
                    self.phase
                )))
            }
        }
    }

    /// Applies the upgrade hook's decision once the header block is complete.
    pub fn resolve(&mut self, decision: UpgradeDecision) -> HandshakeFlow {
        if self.phase != HandshakePhase::HeaderDone {
            return HandshakeFlow::CloseSilently;
        }
        match decision {
            UpgradeDecision::Respond(text) => {
                self.phase = HandshakePhase::Plain;
                HandshakeFlow::CloseWithResponse(text)
            }
            UpgradeDecision::Reject => {
                self.phase = HandshakePhase::Plain;
                HandshakeFlow::CloseSilently
            }
            UpgradeDecision::Plain => {
                self.phase = HandshakePhase::Plain;
                HandshakeFlow::Plain
            }
            // The hook asked for an upgrade the client never requested.
            UpgradeDecision::Accept if !self.got_websocket_header => {
                self.phase = HandshakePhase::Plain;
                HandshakeFlow::CloseSilently
            }
            UpgradeDecision::Accept => {
                self.phase = HandshakePhase::Framed;
                HandshakeFlow::Upgrade(switching_protocols_response(&self.websocket_key))
            }
        }
    }
}

/// Builds the `101 Switching Protocols` response for a client key.
pub fn switching_protocols_response(key: &str) -> String {
    format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {}\r\n\
         \r\n",
        encode_handshake_accept(key)
    )
}
