// src/core/protocol/line.rs

//! The plain line transport used before (or instead of) WebSocket framing.

use crate::core::NetShellError;
use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;

/// ASCII EOT, sent by terminals for ctrl-D.
pub const EOT: u8 = 0x04;

/// The line produced by an EOT on an otherwise empty line.
pub const EOF_MARKER: &str = "\u{4}";

/// Lines longer than this are treated as a protocol violation.
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Telnet "interpret as command", the start of every telnet control sequence.
pub const IAC: u8 = 0xff;

/// Once an IAC has been seen, the first byte at or below this value ends the sequence.
const TELNET_SEQUENCE_END: u8 = 0xf0;

/// Splits the byte stream at `\n` or EOT, stripping a trailing `\r`.
///
/// A telnet control sequence (a ctrl-C arrives as `IAC IP`, usually followed
/// by `IAC DO TIMING-MARK`) also ends the current unit. That unit, together
/// with any text typed before it, is discarded rather than delivered.
#[derive(Debug, Default)]
pub struct LineCodec {
    /// How far into the buffer we have already searched for a terminator.
    scanned: usize,
    /// An IAC byte has been seen in the unit being scanned.
    in_telnet_command: bool,
}

impl LineCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Finds the end of the next unit, resuming where the last call stopped.
    fn find_terminator(&mut self, src: &BytesMut) -> Option<usize> {
        for (offset, &byte) in src[self.scanned..].iter().enumerate() {
            if byte == IAC {
                self.in_telnet_command = true;
            }
            if byte == b'\n'
                || byte == EOT
                || (self.in_telnet_command && byte <= TELNET_SEQUENCE_END)
            {
                return Some(self.scanned + offset);
            }
        }
        None
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = NetShellError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let Some(pos) = self.find_terminator(src) else {
                if src.len() > MAX_LINE_LENGTH {
                    return Err(NetShellError::Protocol(format!(
                        "line exceeds {MAX_LINE_LENGTH} bytes"
                    )));
                }
                self.scanned = src.len();
                return Ok(None);
            };

            self.scanned = 0;
            let terminator = src[pos];
            let raw = src.split_to(pos);
            src.advance(1);

            if std::mem::take(&mut self.in_telnet_command) {
                continue;
            }
            let line = to_line(&raw);
            if terminator == EOT && line.is_empty() {
                return Ok(Some(EOF_MARKER.to_string()));
            }
            return Ok(Some(line));
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }
        // Netcat-style clients often omit the final newline.
        self.scanned = 0;
        if src.is_empty() {
            return Ok(None);
        }
        let raw = src.split_to(src.len());
        if std::mem::take(&mut self.in_telnet_command) {
            return Ok(None);
        }
        let line = to_line(&raw);
        if line.is_empty() {
            Ok(None)
        } else {
            Ok(Some(line))
        }
    }
}

fn to_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}
