//! Subprotocol handler implementations.
//!
//! Each protocol exposes a session handler that can be registered with
//! [`Server::register_handler`](crate::Server::register_handler).
//!
//! - `echo`: sends every inbound payload straight back
pub mod echo;
