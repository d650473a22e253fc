//! WebSocket server: listeners, accept loops and graceful shutdown.
//!
//! Every accept loop and every connection task runs under one [`Gate`].
//! `stop` aborts pending accepts, shuts down the read side of every live
//! socket so blocked read loops wake up, closes the gate (waiting for all
//! tracked tasks), and finally force-closes anything still registered.

pub mod gate;
pub mod listener;
pub mod registry;

use std::future::Future;
use std::net::SocketAddr;
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex};

use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::channel::{Inbound, Outbound};
use crate::connection::{Connection, ConnectionSettings};
use crate::error::{BoxError, Error, Result};
use crate::handler::HandlerRegistry;

pub use gate::Gate;
pub use listener::ListenOptions;
pub use registry::{ConnectionHandle, ConnectionRegistry, Registration};

use registry::{lock, SharedRegistry};

/// Maximum number of concurrent connections
pub const MAX_CONNECTIONS: usize = 10000;

/// Server-wide settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerSettings {
    pub max_connections: usize,
    pub connection: ConnectionSettings,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            max_connections: MAX_CONNECTIONS,
            connection: ConnectionSettings::default(),
        }
    }
}

/// Server instance
pub struct Server {
    handlers: Arc<HandlerRegistry>,
    settings: ConnectionSettings,
    connections: SharedRegistry,
    gate: Gate,
    abort_accept: CancellationToken,
    local_addrs: Vec<SocketAddr>,
}

impl Default for Server {
    fn default() -> Self {
        Self::new(ServerSettings::default())
    }
}

impl Server {
    /// Create a new server instance
    pub fn new(settings: ServerSettings) -> Self {
        Server {
            handlers: Arc::new(HandlerRegistry::new()),
            settings: settings.connection,
            connections: Arc::new(Mutex::new(ConnectionRegistry::new(settings.max_connections))),
            gate: Gate::new(),
            abort_accept: CancellationToken::new(),
            local_addrs: Vec::new(),
        }
    }

    /// Serve connections negotiating subprotocol `name` with `handler`.
    ///
    /// Register handlers before calling `listen`; listeners already
    /// running keep the registry they started with.
    pub fn register_handler<F, Fut>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(Inbound, Outbound) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), BoxError>> + Send + 'static,
    {
        Arc::make_mut(&mut self.handlers).register(name, handler);
    }

    pub fn is_handler_registered(&self, name: &str) -> bool {
        self.handlers.is_registered(name)
    }

    /// Listen on `addr` with address reuse enabled.
    pub fn listen(&mut self, addr: SocketAddr) -> Result<SocketAddr> {
        self.listen_with(addr, ListenOptions::default())
    }

    /// Listen on `addr` and start accepting. Returns the bound address.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn listen_with(&mut self, addr: SocketAddr, options: ListenOptions) -> Result<SocketAddr> {
        let listener = listener::bind(addr, &options)?;
        let local = listener.local_addr()?;
        info!(addr = %local, "Server listening");

        let acceptor = Acceptor {
            handlers: Arc::clone(&self.handlers),
            settings: self.settings,
            connections: Arc::clone(&self.connections),
            gate: self.gate.clone(),
            abort: self.abort_accept.clone(),
        };
        self.gate.spawn(acceptor.run(listener))?;
        self.local_addrs.push(local);
        Ok(local)
    }

    /// Addresses of every listener started so far.
    pub fn local_addrs(&self) -> &[SocketAddr] {
        &self.local_addrs
    }

    /// Number of registered (live) connections.
    pub fn connection_count(&self) -> usize {
        lock(&self.connections).len()
    }

    /// Stop accepting and drain every connection.
    pub async fn stop(&self) {
        info!(connections = self.connection_count(), "Stopping server");
        self.abort_accept.cancel();

        for (id, conn) in lock(&self.connections).iter() {
            if let Err(e) = conn.shutdown_input() {
                debug!(conn = id, error = %e, "Input shutdown failed");
            }
        }

        self.gate.close().await;

        for (id, conn) in lock(&self.connections).iter() {
            if let Err(e) = conn.force_close() {
                debug!(conn = id, error = %e, "Force close failed");
            }
        }
        info!("Server stopped");
    }
}

/// Everything one accept loop needs, detached from the `Server`.
struct Acceptor {
    handlers: Arc<HandlerRegistry>,
    settings: ConnectionSettings,
    connections: SharedRegistry,
    gate: Gate,
    abort: CancellationToken,
}

impl Acceptor {
    async fn run(self, listener: TcpListener) {
        loop {
            let accepted = tokio::select! {
                biased;
                _ = self.abort.cancelled() => break,
                accepted = listener.accept() => accepted,
            };
            if self.accept_one(accepted).is_break() {
                break;
            }
        }
        debug!("Accept loop finished");
    }

    fn accept_one(&self, accepted: std::io::Result<(TcpStream, SocketAddr)>) -> ControlFlow<()> {
        let result = accepted
            .map_err(Error::from)
            .and_then(|(stream, peer)| self.spawn_connection(stream, peer));

        match result {
            Ok(()) => ControlFlow::Continue(()),
            // Expected while the server is stopping.
            Err(e) if e.is_connection_aborted() => ControlFlow::Break(()),
            Err(Error::Io(e)) => {
                error!(error = %e, "Accept failed");
                ControlFlow::Break(())
            }
            Err(e) => {
                info!(error = %e, "Accept failed");
                ControlFlow::Break(())
            }
        }
    }

    fn spawn_connection(&self, stream: TcpStream, peer: SocketAddr) -> Result<()> {
        let conn = Connection::new(
            stream,
            peer,
            &self.connections,
            Arc::clone(&self.handlers),
            self.settings,
        )?;
        let Some(conn) = conn else {
            warn!(peer = %peer, "Connection limit reached, dropping connection");
            return Ok(());
        };

        let id = conn.id();
        let task = async move {
            conn.process().await;
            debug!(conn = id, "Connection is finished");
        };
        match self.gate.spawn(task) {
            Ok(_) | Err(Error::GateClosed) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
