// src/core/protocol/ws_frame.rs

//! Implements the reduced WebSocket frame format: single-frame masked text
//! messages from the client, plus ping and close control frames.
//!
//! Extended payload lengths are not understood on the read side. The second
//! header byte carries a literal 7-bit length, so a client frame holds at most
//! 127 payload bytes.

use crate::core::NetShellError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use sha1::{Digest, Sha1};
use tokio_util::codec::Decoder;

/// The fixed GUID appended to the client key when computing the accept hash.
pub const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Largest payload a single client frame can carry.
pub const MAX_CLIENT_PAYLOAD: usize = 0x7f;

/// The header byte written in reply to a ping: FIN plus opcode 0xA.
pub const PONG_HEADER: u8 = 0x8a;

const FIN_BIT: u8 = 0x80;
const MASK_BIT: u8 = 0x80;
const LEN_MASK: u8 = 0x7f;
const MASK_KEY_LEN: usize = 4;

/// The 4-bit frame opcodes this implementation distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    Text = 0x1,
    Binary = 0x2,
    Close = 0x8,
    Ping = 0x9,
    Pong = 0xa,
}

impl OpCode {
    fn from_nibble(nibble: u8) -> Option<Self> {
        match nibble {
            0x1 => Some(OpCode::Text),
            0x2 => Some(OpCode::Binary),
            0x8 => Some(OpCode::Close),
            0x9 => Some(OpCode::Ping),
            0xa => Some(OpCode::Pong),
            _ => None,
        }
    }
}

/// A decoded client frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// An unmasked text payload, handed on as one logical line.
    Text(String),
    /// A ping whose payload must be echoed back in a pong.
    Ping(Bytes),
    /// The peer asked to close the connection.
    Close,
}

/// A `tokio_util::codec` decoder for client frames.
#[derive(Debug, Default)]
pub struct FrameCodec;

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = NetShellError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        decode_frame(src)
    }
}

/// Decodes one frame from the front of `src`.
///
/// Returns `Ok(None)` without consuming anything when the buffer does not yet
/// hold a complete frame. Any violation of the frame rules is returned as
/// `NetShellError::Protocol`, after which the buffer contents are meaningless.
pub fn decode_frame(src: &mut BytesMut) -> Result<Option<Frame>, NetShellError> {
    if src.is_empty() {
        return Ok(None);
    }

    // The FIN bit is ignored: fragments are never reassembled.
    let nibble = src[0] & 0x0f;
    let opcode = OpCode::from_nibble(nibble);

    match opcode {
        Some(OpCode::Close) => {
            src.advance(1);
            Ok(Some(Frame::Close))
        }
        Some(OpCode::Ping) => decode_ping(src),
        Some(OpCode::Text) => decode_text(src),
        _ => Err(NetShellError::Protocol(format!(
            "unsupported websocket opcode {nibble:#x}"
        ))),
    }
}

fn decode_ping(src: &mut BytesMut) -> Result<Option<Frame>, NetShellError> {
    if src.len() < 2 {
        return Ok(None);
    }
    if src[1] & MASK_BIT != 0 {
        return Err(NetShellError::Protocol(
            "unexpected mask bit on a websocket ping".into(),
        ));
    }
    let paylen = (src[1] & LEN_MASK) as usize;
    if src.len() < 2 + paylen {
        return Ok(None);
    }
    src.advance(2);
    Ok(Some(Frame::Ping(src.split_to(paylen).freeze())))
}

fn decode_text(src: &mut BytesMut) -> Result<Option<Frame>, NetShellError> {
    if src.len() < 2 {
        return Ok(None);
    }
    if src[1] & MASK_BIT == 0 {
        return Err(NetShellError::Protocol(
            "client text frame without a mask".into(),
        ));
    }
    let paylen = (src[1] & LEN_MASK) as usize;
    let total = 2 + MASK_KEY_LEN + paylen;
    if src.len() < total {
        return Ok(None);
    }

    src.advance(2);
    let mut key = [0u8; MASK_KEY_LEN];
    src.copy_to_slice(&mut key);
    let mut payload = src.split_to(paylen);
    apply_mask(&mut payload, key);

    Ok(Some(Frame::Text(String::from_utf8_lossy(&payload).into_owned())))
}

/// XORs `payload` in place with the repeating 4-byte `key`.
///
/// Whole 4-byte words are handled together; the remaining tail is done byte by
/// byte. Applying the same key twice restores the original bytes.
pub fn apply_mask(payload: &mut [u8], key: [u8; MASK_KEY_LEN]) {
    let word_key = u32::from_ne_bytes(key);
    let mut words = payload.chunks_exact_mut(MASK_KEY_LEN);
    for word in &mut words {
        let masked = u32::from_ne_bytes([word[0], word[1], word[2], word[3]]) ^ word_key;
        word.copy_from_slice(&masked.to_ne_bytes());
    }
    for (i, byte) in words.into_remainder().iter_mut().enumerate() {
        *byte ^= key[i];
    }
}

/// Encodes a frame.
///
/// With `mask` set this produces a client-direction frame, which is limited to
/// [`MAX_CLIENT_PAYLOAD`] bytes with a literal 7-bit length. Without a mask it
/// produces a server-direction frame and switches to 16- or 64-bit extended
/// lengths for payloads of 126 bytes and more.
pub fn encode_frame(
    opcode: OpCode,
    payload: &[u8],
    mask: Option<[u8; MASK_KEY_LEN]>,
) -> Result<Bytes, NetShellError> {
    let Some(key) = mask else {
        return Ok(encode_unmasked(opcode, payload));
    };

    let paylen = payload.len();
    if paylen > MAX_CLIENT_PAYLOAD {
        return Err(NetShellError::PayloadTooLarge(paylen));
    }
    let mut buf = BytesMut::with_capacity(paylen + 2 + MASK_KEY_LEN);
    buf.put_u8(FIN_BIT | opcode as u8);
    buf.put_u8(MASK_BIT | paylen as u8);
    buf.put_slice(&key);
    let start = buf.len();
    buf.put_slice(payload);
    apply_mask(&mut buf[start..], key);
    Ok(buf.freeze())
}

/// Encodes a server text frame carrying `text`.
pub fn encode_text(text: &str) -> Bytes {
    encode_unmasked(OpCode::Text, text.as_bytes())
}

fn encode_unmasked(opcode: OpCode, payload: &[u8]) -> Bytes {
    let paylen = payload.len();
    let mut buf = BytesMut::with_capacity(paylen + 10);
    buf.put_u8(FIN_BIT | opcode as u8);
    if paylen < 126 {
        buf.put_u8(paylen as u8);
    } else if paylen < 65536 {
        buf.put_u8(126);
        buf.put_u16(paylen as u16);
    } else {
        buf.put_u8(127);
        buf.put_u64(paylen as u64);
    }
    buf.put_slice(payload);
    buf.freeze()
}

/// Encodes the reply to a ping, echoing its payload verbatim.
pub fn encode_pong(payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(payload.len() + 2);
    buf.put_u8(PONG_HEADER);
    buf.put_u8((payload.len() & LEN_MASK as usize) as u8);
    buf.put_slice(payload);
    buf.freeze()
}

/// Computes the `Sec-WebSocket-Accept` value for a client key.
pub fn encode_handshake_accept(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    STANDARD.encode(hasher.finalize())
}
