//! Minimal client side of the protocol for tests.

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::codec::frame::{FIN_MASK, LENGTH_U16, LENGTH_U64, MASKED_MASK};
use crate::codec::{apply_mask, Opcode};

/// Encode a final frame the way a client must: masked with `key`.
pub(crate) fn masked_frame(opcode: Opcode, payload: &[u8], key: [u8; 4]) -> Vec<u8> {
    let mut wire = vec![FIN_MASK | opcode.as_u8()];
    let len = payload.len();
    if len < LENGTH_U16 as usize {
        wire.push(MASKED_MASK | len as u8);
    } else if len <= u16::MAX as usize {
        wire.push(MASKED_MASK | LENGTH_U16);
        wire.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        wire.push(MASKED_MASK | LENGTH_U64);
        wire.extend_from_slice(&(len as u64).to_be_bytes());
    }
    wire.extend_from_slice(&key);

    let start = wire.len();
    wire.extend_from_slice(payload);
    apply_mask(&mut wire[start..], key);
    wire
}

/// Upgrade request using the RFC 6455 sample key.
pub(crate) fn upgrade_request(subprotocol: Option<&str>) -> String {
    let mut req = String::from(
        "GET /ws HTTP/1.1\r\n\
         Host: localhost\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
         Sec-WebSocket-Version: 13\r\n",
    );
    if let Some(name) = subprotocol {
        req.push_str("Sec-WebSocket-Protocol: ");
        req.push_str(name);
        req.push_str("\r\n");
    }
    req.push_str("\r\n");
    req
}

/// Read the HTTP response head, byte by byte so no frame bytes are eaten.
pub(crate) async fn read_response<R: AsyncRead + Unpin>(reader: &mut R) -> String {
    let mut head = Vec::new();
    while !head.ends_with(b"\r\n\r\n") {
        let byte = reader.read_u8().await.expect("response head");
        head.push(byte);
    }
    String::from_utf8(head).expect("utf-8 response head")
}

/// Read one unmasked server frame. `None` on end of stream.
pub(crate) async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Option<(Opcode, Vec<u8>)> {
    let mut head = [0u8; 2];
    reader.read_exact(&mut head).await.ok()?;
    assert_eq!(head[1] & MASKED_MASK, 0, "server frames are never masked");

    let len = match head[1] & !MASKED_MASK {
        LENGTH_U16 => reader.read_u16().await.ok()? as usize,
        LENGTH_U64 => reader.read_u64().await.ok()? as usize,
        n => n as usize,
    };
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await.ok()?;
    Some((Opcode::from_u8(head[0]), payload))
}
