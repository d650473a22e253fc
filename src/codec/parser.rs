//! Incremental frame parser.
//!
//! Network chunk boundaries are arbitrary, so the parser keeps just enough
//! state to resume anywhere inside a frame. Each frame walks three states,
//! one per self-describing region of the frame:
//!
//! 1. `AwaitingHeader`: the fixed two bytes.
//! 2. `AwaitingLengthAndMask`: 0, 2 or 8 bytes of extended length plus the
//!    4-byte masking key.
//! 3. `AwaitingPayload`: exactly the declared number of payload bytes.
//!
//! When a chunk carries the whole payload and the accumulator is empty,
//! the payload is split off the chunk instead of copied.

use bytes::{Buf, BytesMut};

use super::encoder::apply_mask;
use super::frame::{Frame, FrameHeader, LENGTH_U16, LENGTH_U64, MASK_KEY_LEN};

/// Default upper bound on a single frame payload.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024; // 16MB

/// Position inside the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    AwaitingHeader,
    AwaitingLengthAndMask,
    AwaitingPayload,
}

/// Health of the frame stream. Once it leaves `Active` it never returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Active,
    /// The peer closed the byte stream.
    Closed,
    /// The peer violated the framing protocol.
    Error,
}

/// Outcome of feeding one chunk.
#[derive(Debug)]
pub enum ConsumeResult {
    /// The whole chunk was consumed without finishing a frame.
    NeedMore,
    /// A frame was completed. `leftover` holds the bytes after the frame
    /// boundary and must be fed again before reading more input.
    Complete { frame: Frame, leftover: BytesMut },
    /// The stream ended or was rejected; see [`FrameParser::connection_state`].
    Halted,
}

/// Frame decoder for client-to-server traffic.
#[derive(Debug)]
pub struct FrameParser {
    state: ParserState,
    connection_state: ConnectionState,
    /// Partial header bytes carried across chunks.
    scratch: Vec<u8>,
    header: Option<FrameHeader>,
    payload_len: usize,
    mask_key: [u8; MASK_KEY_LEN],
    /// Copy-path accumulator for payloads split across chunks.
    payload: BytesMut,
    max_payload: usize,
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameParser {
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD)
    }

    /// Create a parser that rejects frames longer than `max_payload`.
    pub fn with_max_payload(max_payload: usize) -> Self {
        Self {
            state: ParserState::AwaitingHeader,
            connection_state: ConnectionState::Active,
            scratch: Vec::with_capacity(2 + 8 + MASK_KEY_LEN),
            header: None,
            payload_len: 0,
            mask_key: [0; MASK_KEY_LEN],
            payload: BytesMut::new(),
            max_payload,
        }
    }

    pub fn state(&self) -> ParserState {
        self.state
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection_state
    }

    pub fn is_valid(&self) -> bool {
        self.connection_state == ConnectionState::Active
    }

    /// Feed one chunk of input. An empty chunk means end of stream.
    pub fn feed(&mut self, mut data: BytesMut) -> ConsumeResult {
        if self.connection_state != ConnectionState::Active {
            return ConsumeResult::Halted;
        }
        if data.is_empty() {
            self.connection_state = ConnectionState::Closed;
            return ConsumeResult::Halted;
        }

        if self.state == ParserState::AwaitingHeader {
            if !self.fill_scratch(&mut data, 2) {
                return ConsumeResult::NeedMore;
            }
            let header = FrameHeader::parse([self.scratch[0], self.scratch[1]]);
            self.scratch.clear();

            // RFC 6455 5.1: client frames must be masked, RSV bits must be
            // zero without a negotiated extension, opcodes must be known.
            if !header.masked || header.has_reserved_bits() || !header.opcode.is_known() {
                return self.fail();
            }
            self.header = Some(header);
            self.state = ParserState::AwaitingLengthAndMask;
        }

        if self.state == ParserState::AwaitingLengthAndMask {
            let Some(header) = self.header else {
                return self.fail();
            };
            if !self.fill_scratch(&mut data, header.rest_of_header_len()) {
                return ConsumeResult::NeedMore;
            }
            let (length, key) = match header.length_code {
                LENGTH_U16 => (
                    u16::from_be_bytes([self.scratch[0], self.scratch[1]]) as u64,
                    &self.scratch[2..],
                ),
                LENGTH_U64 => {
                    let mut raw = [0u8; 8];
                    raw.copy_from_slice(&self.scratch[..8]);
                    (u64::from_be_bytes(raw), &self.scratch[8..])
                }
                code => (code as u64, &self.scratch[..]),
            };
            self.mask_key.copy_from_slice(&key[..MASK_KEY_LEN]);
            self.scratch.clear();

            match usize::try_from(length) {
                Ok(len) if len <= self.max_payload => self.payload_len = len,
                _ => return self.fail(),
            }
            self.payload = BytesMut::new();
            self.state = ParserState::AwaitingPayload;
        }

        let remaining = self.payload_len - self.payload.len();
        if data.len() < remaining {
            if self.payload.capacity() == 0 {
                self.payload.reserve(self.payload_len);
            }
            self.payload.extend_from_slice(&data);
            return ConsumeResult::NeedMore;
        }

        let mut payload = if self.payload.is_empty() {
            data.split_to(remaining)
        } else {
            self.payload.extend_from_slice(&data[..remaining]);
            data.advance(remaining);
            std::mem::take(&mut self.payload)
        };
        apply_mask(&mut payload, self.mask_key);

        self.state = ParserState::AwaitingHeader;
        self.payload_len = 0;
        match self.header.take() {
            Some(header) => ConsumeResult::Complete {
                frame: Frame { header, payload },
                leftover: data,
            },
            None => self.fail(),
        }
    }

    /// Move bytes from `data` into the scratch buffer until it holds
    /// `required` bytes. Returns false when `data` ran out first.
    fn fill_scratch(&mut self, data: &mut BytesMut, required: usize) -> bool {
        let needed = required.saturating_sub(self.scratch.len());
        if data.len() < needed {
            self.scratch.extend_from_slice(data);
            data.clear();
            return false;
        }
        self.scratch.extend_from_slice(&data.split_to(needed));
        true
    }

    fn fail(&mut self) -> ConsumeResult {
        self.connection_state = ConnectionState::Error;
        self.scratch.clear();
        self.payload = BytesMut::new();
        ConsumeResult::Halted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::frame::MASKED_MASK;
    use crate::codec::{encode_header, Opcode, MAX_HEADER_LEN};
    use crate::test_util::masked_frame;

    fn chunk(bytes: &[u8]) -> BytesMut {
        BytesMut::from(bytes)
    }

    /// Feed `bytes` in pieces of `step` and collect every completed frame.
    fn decode_stepped(parser: &mut FrameParser, bytes: &[u8], step: usize) -> Vec<Frame> {
        let mut frames = Vec::new();
        for piece in bytes.chunks(step) {
            let mut pending = chunk(piece);
            while !pending.is_empty() {
                match parser.feed(pending) {
                    ConsumeResult::NeedMore => break,
                    ConsumeResult::Complete { frame, leftover } => {
                        frames.push(frame);
                        pending = leftover;
                    }
                    ConsumeResult::Halted => return frames,
                }
            }
        }
        frames
    }

    #[test]
    fn test_rfc_masked_hello() {
        let wire = [
            0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58,
        ];
        let mut parser = FrameParser::new();
        match parser.feed(chunk(&wire)) {
            ConsumeResult::Complete { frame, leftover } => {
                assert_eq!(frame.opcode(), Opcode::Text);
                assert!(frame.header.fin);
                assert_eq!(&frame.payload[..], b"Hello");
                assert!(leftover.is_empty());
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(parser.state(), ParserState::AwaitingHeader);
        assert!(parser.is_valid());
    }

    #[test]
    fn test_byte_at_a_time() {
        let wire = masked_frame(Opcode::Binary, b"incremental", [1, 2, 3, 4]);
        let mut parser = FrameParser::new();

        for (i, byte) in wire.iter().enumerate() {
            match parser.feed(chunk(&[*byte])) {
                ConsumeResult::NeedMore => assert!(i < wire.len() - 1),
                ConsumeResult::Complete { frame, .. } => {
                    assert_eq!(i, wire.len() - 1);
                    assert_eq!(&frame.payload[..], b"incremental");
                }
                ConsumeResult::Halted => panic!("halted at byte {}", i),
            }
        }
    }

    #[test]
    fn test_every_split_point() {
        let payload: Vec<u8> = (0..300u32).map(|i| (i % 251) as u8).collect();
        let wire = masked_frame(Opcode::Binary, &payload, [0xde, 0xad, 0xbe, 0xef]);

        for split in 1..wire.len() {
            let mut parser = FrameParser::new();
            assert!(matches!(
                parser.feed(chunk(&wire[..split])),
                ConsumeResult::NeedMore
            ));
            match parser.feed(chunk(&wire[split..])) {
                ConsumeResult::Complete { frame, leftover } => {
                    assert_eq!(&frame.payload[..], &payload[..], "split at {}", split);
                    assert!(leftover.is_empty());
                }
                other => panic!("split at {}: {:?}", split, other),
            }
        }
    }

    #[test]
    fn test_length_boundaries() {
        for len in [0usize, 1, 125, 126, 65535, 65536] {
            let payload = vec![0x5a; len];
            let wire = masked_frame(Opcode::Binary, &payload, [9, 8, 7, 6]);
            let expected_header = match len {
                0..=125 => 2 + 4,
                126..=65535 => 4 + 4,
                _ => 10 + 4,
            };
            assert_eq!(wire.len(), expected_header + len);

            let mut parser = FrameParser::new();
            let frames = decode_stepped(&mut parser, &wire, 4096);
            assert_eq!(frames.len(), 1, "length {}", len);
            assert_eq!(frames[0].payload.len(), len);
            assert!(frames[0].payload.iter().all(|b| *b == 0x5a));
        }
    }

    #[test]
    fn test_server_encoding_decodes_when_masked() {
        let key = [0x11, 0x22, 0x33, 0x44];
        for opcode in [Opcode::Text, Opcode::Binary] {
            for len in [0usize, 1, 125, 126, 127, 65535, 65536] {
                let payload: Vec<u8> = (0..len).map(|i| (i % 253) as u8).collect();

                let mut header = [0u8; MAX_HEADER_LEN];
                let header_len = encode_header(opcode, len, &mut header);
                let mut wire = header[..header_len].to_vec();
                wire[1] |= MASKED_MASK;
                wire.extend_from_slice(&key);
                let start = wire.len();
                wire.extend_from_slice(&payload);
                apply_mask(&mut wire[start..], key);

                let mut parser = FrameParser::new();
                let frames = decode_stepped(&mut parser, &wire, 1000);
                assert_eq!(frames.len(), 1, "{:?} length {}", opcode, len);
                assert_eq!(frames[0].opcode(), opcode);
                assert!(frames[0].header.fin);
                assert_eq!(&frames[0].payload[..], &payload[..], "{:?} length {}", opcode, len);
                assert!(parser.is_valid());
            }
        }
    }

    #[test]
    fn test_leftover_carries_next_frame() {
        let mut wire = masked_frame(Opcode::Text, b"first", [1, 1, 1, 1]);
        wire.extend(masked_frame(Opcode::Binary, b"second", [2, 2, 2, 2]));
        wire.extend(masked_frame(Opcode::Ping, b"", [3, 3, 3, 3]));

        let mut parser = FrameParser::new();
        let frames = decode_stepped(&mut parser, &wire, wire.len());
        assert_eq!(frames.len(), 3);
        assert_eq!(&frames[0].payload[..], b"first");
        assert_eq!(&frames[1].payload[..], b"second");
        assert_eq!(frames[2].opcode(), Opcode::Ping);
        assert!(frames[2].payload.is_empty());
    }

    #[test]
    fn test_chunking_invariance() {
        let mut wire = Vec::new();
        for i in 0..5u8 {
            let payload = vec![i; 40 * i as usize + 3];
            wire.extend(masked_frame(Opcode::Binary, &payload, [i, 7, i, 9]));
        }

        let mut reference = FrameParser::new();
        let expected: Vec<Vec<u8>> = decode_stepped(&mut reference, &wire, wire.len())
            .into_iter()
            .map(|f| f.payload.to_vec())
            .collect();
        assert_eq!(expected.len(), 5);

        for step in [1, 2, 3, 7, 13, 64] {
            let mut parser = FrameParser::new();
            let got: Vec<Vec<u8>> = decode_stepped(&mut parser, &wire, step)
                .into_iter()
                .map(|f| f.payload.to_vec())
                .collect();
            assert_eq!(got, expected, "step {}", step);
        }
    }

    #[test]
    fn test_unmasked_frame_rejected() {
        let mut parser = FrameParser::new();
        let result = parser.feed(chunk(&[0x82, 0x03, b'a', b'b', b'c']));
        assert!(matches!(result, ConsumeResult::Halted));
        assert_eq!(parser.connection_state(), ConnectionState::Error);
    }

    #[test]
    fn test_reserved_bits_rejected() {
        let mut wire = masked_frame(Opcode::Text, b"x", [1, 2, 3, 4]);
        wire[0] |= 0x40;
        let mut parser = FrameParser::new();
        assert!(matches!(parser.feed(chunk(&wire)), ConsumeResult::Halted));
        assert_eq!(parser.connection_state(), ConnectionState::Error);
    }

    #[test]
    fn test_unknown_opcode_rejected() {
        let mut wire = masked_frame(Opcode::Binary, b"x", [1, 2, 3, 4]);
        wire[0] = 0x8F;
        let mut parser = FrameParser::new();
        assert!(matches!(parser.feed(chunk(&wire)), ConsumeResult::Halted));
        assert_eq!(parser.connection_state(), ConnectionState::Error);

        // A rejected stream stays rejected.
        let valid = masked_frame(Opcode::Binary, b"y", [1, 2, 3, 4]);
        assert!(matches!(parser.feed(chunk(&valid)), ConsumeResult::Halted));
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let wire = masked_frame(Opcode::Binary, &[0u8; 64], [1, 2, 3, 4]);
        let mut parser = FrameParser::with_max_payload(63);
        assert!(matches!(parser.feed(chunk(&wire)), ConsumeResult::Halted));
        assert_eq!(parser.connection_state(), ConnectionState::Error);

        // 64-bit length with the top bit set
        let mut wire = vec![0x82, 0xFF];
        wire.extend_from_slice(&u64::MAX.to_be_bytes());
        wire.extend_from_slice(&[0, 0, 0, 0]);
        let mut parser = FrameParser::new();
        assert!(matches!(parser.feed(chunk(&wire)), ConsumeResult::Halted));
        assert_eq!(parser.connection_state(), ConnectionState::Error);
    }

    #[test]
    fn test_empty_chunk_is_eof() {
        let mut parser = FrameParser::new();
        assert!(matches!(parser.feed(BytesMut::new()), ConsumeResult::Halted));
        assert_eq!(parser.connection_state(), ConnectionState::Closed);
        assert!(!parser.is_valid());
    }

    #[test]
    fn test_eof_mid_frame() {
        let wire = masked_frame(Opcode::Binary, b"partial", [1, 2, 3, 4]);
        let mut parser = FrameParser::new();
        assert!(matches!(parser.feed(chunk(&wire[..8])), ConsumeResult::NeedMore));
        assert_eq!(parser.state(), ParserState::AwaitingPayload);
        assert!(matches!(parser.feed(BytesMut::new()), ConsumeResult::Halted));
        assert_eq!(parser.connection_state(), ConnectionState::Closed);
    }
}
