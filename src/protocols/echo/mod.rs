//! Echo protocol implementation.
//!
//! Every payload the client sends, whatever its frame type, comes back
//! unchanged as a single binary frame, in order.
//!
//! ## Use Cases
//!
//! 1. **Interoperability checks**: verify a client's masking, framing and
//!    handshake against a server that adds no semantics of its own.
//!
//! 2. **Throughput testing**: move bytes through the full decode, queue and
//!    encode path without application overhead.
//!
//! ## Example
//!
//! ```text
//! client -> TEXT   "hello"  (masked)
//! server -> BINARY "hello"
//! ```

pub mod handler;

pub use handler::handle_session;
