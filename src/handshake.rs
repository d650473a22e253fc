//! HTTP Upgrade handshake (RFC 6455 section 4.2).
//!
//! Request parsing is delegated to `httparse`; this module only pulls out
//! the handful of headers the upgrade needs and renders the 101 response.

use base64::{engine::general_purpose::STANDARD, Engine};
use bytes::{Buf, BytesMut};
use sha1::{Digest, Sha1};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{Error, Result};

/// GUID appended to the client key before hashing.
pub const MAGIC_KEY_SUFFIX: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Largest upgrade request accepted before giving up.
pub const MAX_REQUEST_SIZE: usize = 8 * 1024;

const MAX_HEADERS: usize = 64;

const UPGRADE_REPLY_TEMPLATE: &str = "HTTP/1.1 101 Switching Protocols\r\n\
     Upgrade: websocket\r\n\
     Connection: Upgrade\r\n\
     Sec-WebSocket-Version: 13\r\n\
     Sec-WebSocket-Accept: ";

/// Header values the upgrade cares about. Absent headers are empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpgradeRequest {
    pub upgrade: String,
    pub key: String,
    pub version: String,
    pub subprotocol: String,
}

/// Outcome of scanning the buffered bytes for a request.
#[derive(Debug, PartialEq, Eq)]
pub enum ParseStatus {
    /// Request complete; `consumed` bytes belong to it.
    Complete {
        request: UpgradeRequest,
        consumed: usize,
    },
    Incomplete,
}

/// Compute `Sec-WebSocket-Accept` for a client key.
pub fn accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(MAGIC_KEY_SUFFIX.as_bytes());
    STANDARD.encode(hasher.finalize())
}

/// Parse an upgrade request out of `buf`.
pub fn parse_request(buf: &[u8]) -> Result<ParseStatus> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut headers);
    let consumed = match req.parse(buf) {
        Ok(httparse::Status::Complete(n)) => n,
        Ok(httparse::Status::Partial) => return Ok(ParseStatus::Incomplete),
        Err(_) => return Err(Error::protocol("incorrect upgrade request")),
    };

    let header = |name: &str| -> String {
        req.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| String::from_utf8_lossy(h.value).trim().to_string())
            .unwrap_or_default()
    };

    Ok(ParseStatus::Complete {
        request: UpgradeRequest {
            upgrade: header("Upgrade"),
            key: header("Sec-WebSocket-Key"),
            version: header("Sec-WebSocket-Version"),
            subprotocol: header("Sec-WebSocket-Protocol"),
        },
        consumed,
    })
}

/// Read from `reader` until a full request is buffered.
///
/// Returns `None` on end of stream before any request arrived. Bytes
/// following the request stay in `buf`.
pub async fn read_request<R>(reader: &mut R, buf: &mut BytesMut) -> Result<Option<UpgradeRequest>>
where
    R: AsyncRead + Unpin,
{
    loop {
        if !buf.is_empty() {
            if let ParseStatus::Complete { request, consumed } = parse_request(buf)? {
                buf.advance(consumed);
                return Ok(Some(request));
            }
            if buf.len() >= MAX_REQUEST_SIZE {
                return Err(Error::protocol("incorrect upgrade request"));
            }
        }

        let n = reader.read_buf(buf).await?;
        if n == 0 {
            if buf.is_empty() {
                return Ok(None);
            }
            return Err(Error::protocol("incorrect upgrade request"));
        }
    }
}

/// Render the 101 response.
pub fn response(accept: &str, subprotocol: &str) -> String {
    let mut reply = String::with_capacity(UPGRADE_REPLY_TEMPLATE.len() + 64);
    reply.push_str(UPGRADE_REPLY_TEMPLATE);
    reply.push_str(accept);
    if !subprotocol.is_empty() {
        reply.push_str("\r\nSec-WebSocket-Protocol: ");
        reply.push_str(subprotocol);
    }
    reply.push_str("\r\n\r\n");
    reply
}
