//! wsgate: a WebSocket (RFC 6455) server.
//!
//! The server performs the HTTP Upgrade handshake, decodes frames
//! incrementally, hands payloads to a handler chosen by the negotiated
//! subprotocol, and sends whatever the handler queues back as binary
//! frames.
//!
//! ```no_run
//! use wsgate::{BoxError, Inbound, Outbound, Server};
//!
//! async fn echo(mut inbound: Inbound, outbound: Outbound) -> Result<(), BoxError> {
//!     while let Some(msg) = inbound.recv().await {
//!         outbound.send(msg).await?;
//!     }
//!     Ok(())
//! }
//!
//! # async fn run() -> wsgate::Result<()> {
//! let mut server = Server::default();
//! server.register_handler("echo", echo);
//! server.listen("127.0.0.1:8080".parse().unwrap())?;
//! // ...
//! server.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod handler;
pub mod handshake;
pub mod protocols;
pub mod server;

#[cfg(test)]
mod test_util;

pub use channel::{ChannelClosed, Inbound, Outbound};
pub use connection::ConnectionSettings;
pub use error::{BoxError, Error, Result};
pub use handler::{Handler, HandlerRegistry};
pub use server::{ListenOptions, Server, ServerSettings};
