//! Bounded message queues between a connection and its handler.
//!
//! Each connection owns one inbound and one outbound queue. The handler
//! gets the receiving end of the inbound queue and the sending end of the
//! outbound queue; the connection keeps the other two ends. Both queues
//! preserve order and suspend the producer when full.

use bytes::Bytes;
use tokio::sync::mpsc;

/// Decoded payloads waiting for the handler.
#[derive(Debug)]
pub struct Inbound {
    rx: mpsc::Receiver<Bytes>,
}

impl Inbound {
    /// Next payload, or `None` once the connection has closed.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }
}

/// Payloads the handler wants sent, each as one binary frame.
#[derive(Debug, Clone)]
pub struct Outbound {
    tx: mpsc::Sender<Bytes>,
}

impl Outbound {
    /// Queue a payload. Fails once the connection has closed.
    pub async fn send(&self, payload: impl Into<Bytes>) -> Result<(), ChannelClosed> {
        self.tx.send(payload.into()).await.map_err(|_| ChannelClosed)
    }
}

/// The other side of a queue has gone away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelClosed;

impl std::fmt::Display for ChannelClosed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "connection closed")
    }
}

impl std::error::Error for ChannelClosed {}

/// Connection-side ends of both queues.
#[derive(Debug)]
pub(crate) struct ConnectionEnds {
    pub inbound: mpsc::Sender<Bytes>,
    pub outbound: mpsc::Receiver<Bytes>,
}

/// Create the queue pair for one connection.
pub(crate) fn pair(capacity: usize) -> (ConnectionEnds, Inbound, Outbound) {
    let capacity = capacity.max(1);
    let (in_tx, in_rx) = mpsc::channel(capacity);
    let (out_tx, out_rx) = mpsc::channel(capacity);
    (
        ConnectionEnds {
            inbound: in_tx,
            outbound: out_rx,
        },
        Inbound { rx: in_rx },
        Outbound { tx: out_tx },
    )
}
