// src/core/protocol/mod.rs

//! Wire formats: the plain line transport, the HTTP upgrade handshake and the
//! reduced WebSocket frame codec.

pub mod handshake;
pub mod line;
pub mod ws_frame;

pub use handshake::{HandshakeFlow, HandshakeNegotiator, UpgradeDecision, UpgradeRequest};
pub use line::{EOF_MARKER, LineCodec};
pub use ws_frame::{Frame, FrameCodec, OpCode};

use crate::core::NetShellError;
use bytes::BytesMut;
use tokio_util::codec::Decoder;

/// One unit read from a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Line(String),
    Frame(Frame),
}

/// A decoder that starts out reading lines and can be switched to frames
/// once the handshake completes. Bytes already buffered stay in place across
/// the switch.
#[derive(Debug, Default)]
pub struct ConnectionCodec {
    framed: bool,
    lines: LineCodec,
    frames: FrameCodec,
}

impl ConnectionCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn switch_to_frames(&mut self) {
        self.framed = true;
    }
}

impl Decoder for ConnectionCodec {
    type Item = Inbound;
    type Error = NetShellError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.framed {
            Ok(self.frames.decode(src)?.map(Inbound::Frame))
        } else {
            Ok(self.lines.decode(src)?.map(Inbound::Line))
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.framed {
            // A truncated frame at EOF is simply dropped.
            Ok(self.frames.decode(src)?.map(Inbound::Frame))
        } else {
            Ok(self.lines.decode_eof(src)?.map(Inbound::Line))
        }
    }
}
