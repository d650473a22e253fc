//! Listening socket construction.

use std::io;
use std::net::SocketAddr;

use serde::Deserialize;
use tokio::net::TcpListener;

/// Socket options applied before `listen`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ListenOptions {
    #[serde(default = "default_reuse_address")]
    pub reuse_address: bool,
    #[serde(default)]
    pub reuse_port: bool,
    #[serde(default = "default_backlog")]
    pub backlog: u32,
}

impl Default for ListenOptions {
    fn default() -> Self {
        Self {
            reuse_address: default_reuse_address(),
            reuse_port: false,
            backlog: default_backlog(),
        }
    }
}

fn default_reuse_address() -> bool {
    true
}

fn default_backlog() -> u32 {
    1024
}

/// Bind a non-blocking listener. Must be called inside a Tokio runtime.
pub fn bind(addr: SocketAddr, options: &ListenOptions) -> io::Result<TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    if options.reuse_port {
        socket.set_reuse_port(true)?;
    }
    socket.set_reuse_address(options.reuse_address)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(options.backlog.min(i32::MAX as u32) as i32)?;

    TcpListener::from_std(socket.into())
}
