// tests/property/line_codec_test.rs

//! Property-based tests for the plain line transport.

use bytes::BytesMut;
use netshell::core::protocol::LineCodec;
use proptest::prelude::*;
use tokio_util::codec::Decoder;

fn decode_in_chunks(input: &[u8], chunk: usize) -> Vec<String> {
    let mut codec = LineCodec::new();
    let mut buf = BytesMut::new();
    let mut lines = Vec::new();
    for piece in input.chunks(chunk.max(1)) {
        buf.extend_from_slice(piece);
        while let Some(line) = codec.decode(&mut buf).unwrap() {
            lines.push(line);
        }
    }
    while let Some(line) = codec.decode_eof(&mut buf).unwrap() {
        lines.push(line);
    }
    lines
}

proptest! {
    #[test]
    fn test_chunking_does_not_change_lines(
        lines in proptest::collection::vec("[a-zA-Z0-9 ]{0,40}", 0..20),
        chunk in 1usize..64,
    ) {
        let mut input = String::new();
        for line in &lines {
            input.push_str(line);
            input.push_str("\r\n");
        }
        let whole = decode_in_chunks(input.as_bytes(), input.len().max(1));
        let chunked = decode_in_chunks(input.as_bytes(), chunk);
        prop_assert_eq!(&whole, &lines);
        prop_assert_eq!(chunked, lines);
    }
}
