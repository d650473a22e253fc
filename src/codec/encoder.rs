//! Outbound frame encoding and the masking transform.

use super::frame::{Opcode, FIN_MASK, LENGTH_U16, LENGTH_U64};

/// Largest server frame header: 2 fixed bytes plus a 64-bit length.
pub const MAX_HEADER_LEN: usize = 10;

/// Write the header of a final, unmasked frame into `out`.
///
/// Returns the number of header bytes written.
pub fn encode_header(opcode: Opcode, payload_len: usize, out: &mut [u8; MAX_HEADER_LEN]) -> usize {
    out[0] = FIN_MASK | opcode.as_u8();
    if payload_len < LENGTH_U16 as usize {
        out[1] = payload_len as u8;
        2
    } else if payload_len <= u16::MAX as usize {
        out[1] = LENGTH_U16;
        out[2..4].copy_from_slice(&(payload_len as u16).to_be_bytes());
        4
    } else {
        out[1] = LENGTH_U64;
        out[2..10].copy_from_slice(&(payload_len as u64).to_be_bytes());
        10
    }
}

/// XOR each byte with the key byte at the same position modulo 4.
///
/// Masking and unmasking are the same operation.
pub fn apply_mask(data: &mut [u8], key: [u8; 4]) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= key[i % 4];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(len: usize) -> Vec<u8> {
        let mut out = [0u8; MAX_HEADER_LEN];
        let n = encode_header(Opcode::Binary, len, &mut out);
        out[..n].to_vec()
    }

    #[test]
    fn test_length_encoding_boundaries() {
        assert_eq!(header(0), vec![0x82, 0]);
        assert_eq!(header(1), vec![0x82, 1]);
        assert_eq!(header(125), vec![0x82, 125]);
        assert_eq!(header(126), vec![0x82, 126, 0, 126]);
        assert_eq!(header(65535), vec![0x82, 126, 0xFF, 0xFF]);
        assert_eq!(header(65536), vec![0x82, 127, 0, 0, 0, 0, 0, 1, 0, 0]);
    }

    #[test]
    fn test_close_header() {
        let mut out = [0u8; MAX_HEADER_LEN];
        let n = encode_header(Opcode::Close, 0, &mut out);
        assert_eq!(&out[..n], &[0x88, 0x00]);
    }

    #[test]
    fn test_mask_rfc_example() {
        // RFC 6455 section 5.7, masked "Hello"
        let key = [0x37, 0xfa, 0x21, 0x3d];
        let mut data = [0x7f, 0x9f, 0x4d, 0x51, 0x58];
        apply_mask(&mut data, key);
        assert_eq!(&data, b"Hello");

        apply_mask(&mut data, key);
        assert_eq!(data, [0x7f, 0x9f, 0x4d, 0x51, 0x58]);
    }
}
