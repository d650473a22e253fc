//! Registry of live connections using slab allocation.
//!
//! The server keeps one entry per accepted socket so `stop` can reach
//! sockets owned by running connection tasks. Entries hold a duplicate of
//! the socket descriptor, which is enough to shut either direction down.
//! A connection removes its own entry when its [`Registration`] drops.

use std::io::{self, Write};
use std::net::{Shutdown, SocketAddr};
use std::os::fd::AsFd;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use slab::Slab;
use socket2::{SockRef, Socket};

/// Zero-length CLOSE frame sent when force-closing.
const CLOSE_FRAME: [u8; 2] = [0x88, 0x00];

pub(crate) type SharedRegistry = Arc<Mutex<ConnectionRegistry>>;

/// Server-side view of one accepted socket.
#[derive(Debug)]
pub struct ConnectionHandle {
    peer: SocketAddr,
    socket: Socket,
}

impl ConnectionHandle {
    pub fn new<S: AsFd>(stream: &S, peer: SocketAddr) -> io::Result<Self> {
        let socket = SockRef::from(stream).try_clone()?;
        Ok(Self { peer, socket })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Unblock any pending read on the socket.
    pub fn shutdown_input(&self) -> io::Result<()> {
        self.socket.shutdown(Shutdown::Read)
    }

    /// Best-effort CLOSE frame, then shut both directions down.
    pub fn force_close(&self) -> io::Result<()> {
        let sent = (&self.socket).write_all(&CLOSE_FRAME);
        let shutdown = self.socket.shutdown(Shutdown::Both);
        sent.and(shutdown)
    }
}

/// Registry of active connections.
///
/// Provides O(1) insert, lookup, and remove operations.
#[derive(Debug)]
pub struct ConnectionRegistry {
    connections: Slab<ConnectionHandle>,
    max_connections: usize,
}

impl ConnectionRegistry {
    /// Create a new registry with specified maximum capacity.
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: Slab::new(),
            max_connections,
        }
    }

    /// Insert a new connection into the registry.
    ///
    /// Returns `None` if the registry is at capacity.
    pub fn insert(&mut self, conn: ConnectionHandle) -> Option<usize> {
        if self.connections.len() >= self.max_connections {
            return None;
        }
        Some(self.connections.insert(conn))
    }

    pub fn get(&self, id: usize) -> Option<&ConnectionHandle> {
        self.connections.get(id)
    }

    /// Remove a connection from the registry.
    pub fn remove(&mut self, id: usize) -> Option<ConnectionHandle> {
        self.connections.try_remove(id)
    }

    pub fn contains(&self, id: usize) -> bool {
        self.connections.contains(id)
    }

    /// Number of active connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Maximum number of connections allowed.
    pub fn capacity(&self) -> usize {
        self.max_connections
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &ConnectionHandle)> {
        self.connections.iter()
    }
}

/// Lock the registry. Entries stay consistent even if a holder panicked,
/// so a poisoned lock is recovered.
pub(crate) fn lock(registry: &Mutex<ConnectionRegistry>) -> MutexGuard<'_, ConnectionRegistry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A connection's slot in the registry, released on drop.
#[derive(Debug)]
pub struct Registration {
    registry: SharedRegistry,
    id: usize,
}

impl Registration {
    /// Insert `handle`. Returns `None` when the registry is full.
    pub(crate) fn register(registry: &SharedRegistry, handle: ConnectionHandle) -> Option<Self> {
        let id = lock(registry).insert(handle)?;
        Some(Self {
            registry: Arc::clone(registry),
            id,
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        lock(&self.registry).remove(self.id);
    }
}
