// tests/property/frame_codec_test.rs

//! Property-based tests for the WebSocket frame codec.

use bytes::BytesMut;
use netshell::core::protocol::ws_frame::{
    Frame, MAX_CLIENT_PAYLOAD, OpCode, apply_mask, decode_frame, encode_frame, encode_text,
};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        ..ProptestConfig::default()
    })]

    #[test]
    fn test_mask_twice_restores_payload(
        payload in proptest::collection::vec(any::<u8>(), 0..512),
        key in any::<[u8; 4]>(),
    ) {
        let mut data = payload.clone();
        apply_mask(&mut data, key);
        apply_mask(&mut data, key);
        prop_assert_eq!(data, payload);
    }

    #[test]
    fn test_masked_text_frames_decode_to_their_text(
        text in "[ -~]{0,127}",
        key in any::<[u8; 4]>(),
    ) {
        prop_assume!(text.len() <= MAX_CLIENT_PAYLOAD);
        let encoded = encode_frame(OpCode::Text, text.as_bytes(), Some(key)).unwrap();
        let mut buf = BytesMut::from(&encoded[..]);
        prop_assert_eq!(decode_frame(&mut buf).unwrap(), Some(Frame::Text(text)));
        prop_assert!(buf.is_empty());
    }

    #[test]
    fn test_truncated_frames_never_consume(
        text in "[a-z]{1,100}",
        key in any::<[u8; 4]>(),
        cut in 0usize..100,
    ) {
        let encoded = encode_frame(OpCode::Text, text.as_bytes(), Some(key)).unwrap();
        let cut = cut % encoded.len();
        let mut buf = BytesMut::from(&encoded[..cut]);
        prop_assert_eq!(decode_frame(&mut buf).unwrap(), None);
        prop_assert_eq!(buf.len(), cut);
    }

    #[test]
    fn test_server_frame_length_header_matches_payload(len in 0usize..70_000) {
        let text = "x".repeat(len);
        let frame = encode_text(&text);
        let header = match len {
            0..=125 => 2,
            126..=65_535 => 4,
            _ => 10,
        };
        prop_assert_eq!(frame[0], 0x81);
        prop_assert_eq!(frame.len(), header + len);
    }
}
