//! WebSocket frame codec (RFC 6455 section 5).
//!
//! The codec does no I/O. The read side feeds raw socket chunks into a
//! [`FrameParser`] and gets back complete, unmasked frames; the write side
//! asks [`encode_header`] for the header bytes of an outbound frame.
//!
//! ## Frame Format
//!
//! ```text
//! byte 0:   FIN(1) RSV1(1) RSV2(1) RSV3(1) opcode(4)
//! byte 1:   MASK(1) length(7)
//! 0/2/8:    extended payload length, big-endian (length 126 / 127)
//! 0/4:      masking key (client frames only)
//! payload
//! ```

pub mod encoder;
pub mod frame;
pub mod parser;

pub use encoder::{apply_mask, encode_header, MAX_HEADER_LEN};
pub use frame::{Frame, FrameHeader, Opcode};
pub use parser::{ConnectionState, ConsumeResult, FrameParser, ParserState};
