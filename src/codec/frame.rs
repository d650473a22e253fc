//! Frame header and opcode types.

use bytes::BytesMut;

pub const FIN_MASK: u8 = 0b1000_0000;
pub const RSV1_MASK: u8 = 0b0100_0000;
pub const RSV2_MASK: u8 = 0b0010_0000;
pub const RSV3_MASK: u8 = 0b0001_0000;
pub const OPCODE_MASK: u8 = 0b0000_1111;
pub const MASKED_MASK: u8 = 0b1000_0000;
pub const LENGTH_MASK: u8 = 0b0111_1111;

/// Length code announcing a 16-bit extended length.
pub const LENGTH_U16: u8 = 126;
/// Length code announcing a 64-bit extended length.
pub const LENGTH_U64: u8 = 127;

/// Size of the client masking key.
pub const MASK_KEY_LEN: usize = 4;

/// Frame type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
    /// Any reserved or unassigned opcode nibble.
    Invalid,
}

impl Opcode {
    /// Decode the low four bits of the first header byte.
    pub fn from_u8(byte: u8) -> Self {
        match byte & OPCODE_MASK {
            0x0 => Opcode::Continuation,
            0x1 => Opcode::Text,
            0x2 => Opcode::Binary,
            0x8 => Opcode::Close,
            0x9 => Opcode::Ping,
            0xA => Opcode::Pong,
            _ => Opcode::Invalid,
        }
    }

    /// Wire value of the opcode. `Invalid` has no wire value and maps to 0xF.
    pub fn as_u8(self) -> u8 {
        match self {
            Opcode::Continuation => 0x0,
            Opcode::Text => 0x1,
            Opcode::Binary => 0x2,
            Opcode::Close => 0x8,
            Opcode::Ping => 0x9,
            Opcode::Pong => 0xA,
            Opcode::Invalid => 0xF,
        }
    }

    pub fn is_known(self) -> bool {
        self != Opcode::Invalid
    }
}

/// Fixed two-byte frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub fin: bool,
    pub rsv1: bool,
    pub rsv2: bool,
    pub rsv3: bool,
    pub opcode: Opcode,
    pub masked: bool,
    /// Raw 7-bit length field.
    pub length_code: u8,
}

impl FrameHeader {
    /// Parse the first two bytes of a frame.
    pub fn parse(bytes: [u8; 2]) -> Self {
        FrameHeader {
            fin: bytes[0] & FIN_MASK != 0,
            rsv1: bytes[0] & RSV1_MASK != 0,
            rsv2: bytes[0] & RSV2_MASK != 0,
            rsv3: bytes[0] & RSV3_MASK != 0,
            opcode: Opcode::from_u8(bytes[0]),
            masked: bytes[1] & MASKED_MASK != 0,
            length_code: bytes[1] & LENGTH_MASK,
        }
    }

    pub fn has_reserved_bits(&self) -> bool {
        self.rsv1 || self.rsv2 || self.rsv3
    }

    /// Bytes between the fixed header and the payload: extended length
    /// plus the masking key when present.
    pub fn rest_of_header_len(&self) -> usize {
        let extended = match self.length_code {
            LENGTH_U16 => 2,
            LENGTH_U64 => 8,
            _ => 0,
        };
        if self.masked {
            extended + MASK_KEY_LEN
        } else {
            extended
        }
    }
}

/// A decoded frame with its payload already unmasked.
#[derive(Debug)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: BytesMut,
}

impl Frame {
    pub fn opcode(&self) -> Opcode {
        self.header.opcode
    }
}
