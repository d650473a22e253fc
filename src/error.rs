//! Error types shared by the handshake, the connection loops and the server.

use std::fmt;
use std::io;

/// Error type returned by subprotocol handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while serving a WebSocket connection.
#[derive(Debug)]
pub enum Error {
    /// Socket or listener failure.
    Io(io::Error),
    /// Malformed handshake or frame. Fatal to the connection only.
    Protocol(String),
    /// The subprotocol handler failed.
    Handler(BoxError),
    /// The server is shutting down and refuses new tasks.
    GateClosed,
}

impl Error {
    pub fn protocol(msg: impl Into<String>) -> Self {
        Error::Protocol(msg.into())
    }

    /// True for the accept failure expected while the server is stopping.
    pub fn is_connection_aborted(&self) -> bool {
        match self {
            Error::Io(e) => {
                e.kind() == io::ErrorKind::ConnectionAborted
                    || e.raw_os_error() == Some(libc::ECONNABORTED)
            }
            _ => false,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Protocol(msg) => write!(f, "protocol error: {}", msg),
            Error::Handler(e) => write!(f, "handler failed: {}", e),
            Error::GateClosed => write!(f, "server is shutting down"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Handler(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}
