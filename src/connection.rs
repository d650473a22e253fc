//! One accepted WebSocket connection.
//!
//! After the upgrade handshake a connection runs three things at once:
//!
//! - the **read loop**, feeding socket chunks to the frame parser and
//!   pushing data payloads onto the inbound queue;
//! - the **handler**, consuming inbound payloads and queueing outbound ones;
//! - the **response loop**, framing queued payloads as BINARY frames.
//!
//! The read loop and handler are joined so that either failing ends both:
//! a handler error drops the read loop mid-read. That pair is joined again
//! with the response loop. `close` sets the shared done signal, which stops
//! both loops; the loops drop their queue ends on the way out, which is how
//! the handler learns the session is over.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::channel::{self, ConnectionEnds, Inbound, Outbound};
use crate::codec::{
    encode_header, ConnectionState, ConsumeResult, Frame, FrameParser, Opcode, MAX_HEADER_LEN,
};
use crate::error::{Error, Result};
use crate::handler::{Handler, HandlerRegistry};
use crate::handshake;
use crate::server::registry::{ConnectionHandle, Registration, SharedRegistry};

/// Read buffer size
const BUFFER_SIZE: usize = 16 * 1024;

/// Per-connection limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// Largest accepted frame payload.
    pub max_payload_size: usize,
    /// Capacity of the inbound and outbound queues.
    pub channel_capacity: usize,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            max_payload_size: crate::codec::parser::DEFAULT_MAX_PAYLOAD,
            channel_capacity: 64,
        }
    }
}

/// An accepted socket, registered with the server, not yet upgraded.
pub struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    registration: Registration,
    handlers: Arc<HandlerRegistry>,
    settings: ConnectionSettings,
}

impl Connection {
    /// Register `stream` with the server. Returns `None` when the
    /// registry is full.
    pub(crate) fn new(
        stream: TcpStream,
        peer: SocketAddr,
        registry: &SharedRegistry,
        handlers: Arc<HandlerRegistry>,
        settings: ConnectionSettings,
    ) -> std::io::Result<Option<Self>> {
        let handle = ConnectionHandle::new(&stream, peer)?;
        let Some(registration) = Registration::register(registry, handle) else {
            return Ok(None);
        };
        debug!(conn = registration.id(), peer = %peer, "New connection");
        Ok(Some(Self {
            stream,
            peer,
            registration,
            handlers,
            settings,
        }))
    }

    pub fn id(&self) -> usize {
        self.registration.id()
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Serve the connection to completion. Failures are logged, never
    /// returned: they concern this connection only.
    pub async fn process(self) {
        let Connection {
            stream,
            peer,
            registration,
            handlers,
            settings,
        } = self;
        let id = registration.id();

        let (reader, writer) = stream.into_split();
        if let Err(e) = serve(reader, writer, &handlers, settings, id).await {
            debug!(conn = id, peer = %peer, error = %e, "Processing failed");
        }
        drop(registration);
    }
}

/// Run the handshake and both loops over an arbitrary byte stream.
pub(crate) async fn serve<R, W>(
    reader: R,
    writer: W,
    handlers: &HandlerRegistry,
    settings: ConnectionSettings,
    id: usize,
) -> Result<()>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    let session = Session::new(writer, id);
    let (ends, inbound, outbound) = channel::pair(settings.channel_capacity);
    let ConnectionEnds {
        inbound: inbound_tx,
        outbound: outbound_rx,
    } = ends;

    let read_side = session.read_side(
        reader,
        handlers,
        inbound_tx,
        inbound,
        outbound,
        settings.max_payload_size,
    );
    tokio::try_join!(read_side, session.response_loop(outbound_rx))?;
    Ok(())
}

/// State shared by the loops of one connection.
struct Session<W> {
    id: usize,
    writer: Mutex<BufWriter<W>>,
    /// Set by `close`; both loops stop once it fires.
    done: CancellationToken,
    closing: AtomicBool,
}

impl<W> Session<W>
where
    W: AsyncWrite + Unpin + Send,
{
    fn new(writer: W, id: usize) -> Self {
        Self {
            id,
            writer: Mutex::new(BufWriter::new(writer)),
            done: CancellationToken::new(),
            closing: AtomicBool::new(false),
        }
    }

    /// Handshake, then the handler joined with the read loop.
    async fn read_side<R>(
        &self,
        mut reader: R,
        handlers: &HandlerRegistry,
        inbound_tx: mpsc::Sender<Bytes>,
        inbound: Inbound,
        outbound: Outbound,
        max_payload: usize,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut pending = BytesMut::with_capacity(BUFFER_SIZE);
        let handler = match self.negotiate(&mut reader, &mut pending, handlers).await {
            Ok(Some(handler)) => handler,
            Ok(None) => {
                trace!(conn = self.id, "Closed before upgrade request");
                self.done.cancel();
                return Ok(());
            }
            Err(e) => {
                self.done.cancel();
                return Err(e);
            }
        };

        let handler_task = async { handler(inbound, outbound).await.map_err(Error::Handler) };
        let read_loop = self.read_loop(&mut reader, pending, inbound_tx, max_payload);
        tokio::try_join!(handler_task, read_loop)?;
        Ok(())
    }

    /// Read the upgrade request, pick the handler, send the 101 response.
    ///
    /// Returns `None` if the peer closed before sending a request. Bytes
    /// received after the request are left in `pending`.
    async fn negotiate<R>(
        &self,
        reader: &mut R,
        pending: &mut BytesMut,
        handlers: &HandlerRegistry,
    ) -> Result<Option<Handler>>
    where
        R: AsyncRead + Unpin,
    {
        let Some(request) = handshake::read_request(reader, pending).await? else {
            return Ok(None);
        };

        if request.upgrade != "websocket" {
            return Err(Error::protocol("missing upgrade header"));
        }
        let Some(handler) = handlers.get(&request.subprotocol) else {
            return Err(Error::protocol("subprotocol not supported"));
        };
        debug!(conn = self.id, subprotocol = %request.subprotocol, "Sec-WebSocket-Protocol");

        let accept = handshake::accept_key(&request.key);
        debug!(
            conn = self.id,
            key = %request.key,
            version = %request.version,
            accept = %accept,
            "Upgrading connection"
        );

        let reply = handshake::response(&accept, &request.subprotocol);
        let mut writer = self.writer.lock().await;
        writer.write_all(reply.as_bytes()).await?;
        writer.flush().await?;
        Ok(Some(handler))
    }

    async fn read_loop<R>(
        &self,
        reader: &mut R,
        mut pending: BytesMut,
        inbound: mpsc::Sender<Bytes>,
        max_payload: usize,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        let mut parser = FrameParser::with_max_payload(max_payload);

        while !self.done.is_cancelled() {
            let chunk = if pending.is_empty() {
                let mut buf = BytesMut::with_capacity(BUFFER_SIZE);
                tokio::select! {
                    biased;
                    _ = self.done.cancelled() => break,
                    n = reader.read_buf(&mut buf) => n?,
                };
                buf
            } else {
                std::mem::take(&mut pending)
            };

            match parser.feed(chunk) {
                ConsumeResult::NeedMore => {}
                ConsumeResult::Complete { frame, leftover } => {
                    pending = leftover;
                    self.dispatch(frame, &inbound).await?;
                }
                ConsumeResult::Halted => {
                    if parser.connection_state() == ConnectionState::Closed {
                        trace!(conn = self.id, "Peer closed the stream");
                        self.close(false).await?;
                    } else {
                        debug!(conn = self.id, "Reading from socket has failed");
                        self.close(true).await?;
                    }
                    // Parser is terminal. Do not wait for another close.
                    break;
                }
            }
        }
        Ok(())
    }

    async fn dispatch(&self, frame: Frame, inbound: &mpsc::Sender<Bytes>) -> Result<()> {
        match frame.opcode() {
            // Data frames are not distinguished; fragments are passed on as-is.
            Opcode::Continuation | Opcode::Text | Opcode::Binary => {
                let payload = frame.payload.freeze();
                tokio::select! {
                    biased;
                    _ = self.done.cancelled() => {}
                    sent = inbound.send(payload) => {
                        if sent.is_err() {
                            debug!(conn = self.id, "Handler stopped consuming");
                            self.close(true).await?;
                        }
                    }
                }
            }
            Opcode::Close => {
                debug!(conn = self.id, "Received close frame");
                // RFC 6455 5.5.1: echo a close frame
                self.close(true).await?;
            }
            Opcode::Ping => {
                debug!(conn = self.id, "Received ping frame");
                self.handle_ping(&frame.payload);
            }
            Opcode::Pong => {
                debug!(conn = self.id, "Received pong frame");
                self.handle_pong(&frame.payload);
            }
            Opcode::Invalid => {}
        }
        Ok(())
    }

    /// No PONG is sent back; see DESIGN.md.
    fn handle_ping(&self, _payload: &[u8]) {}

    fn handle_pong(&self, _payload: &[u8]) {}

    async fn response_loop(&self, mut outbound: mpsc::Receiver<Bytes>) -> Result<()> {
        let result: Result<()> = async {
            while !self.done.is_cancelled() {
                let next = tokio::select! {
                    biased;
                    _ = self.done.cancelled() => break,
                    next = outbound.recv() => next,
                };
                match next {
                    Some(payload) => self.send_frame(Opcode::Binary, payload).await?,
                    None => {
                        // Handler is gone and everything it queued is sent.
                        self.close(true).await?;
                        break;
                    }
                }
            }
            Ok(())
        }
        .await;

        outbound.close();
        let _ = self.writer.lock().await.shutdown().await;
        result
    }

    /// Write one final, unmasked frame and flush it.
    async fn send_frame(&self, opcode: Opcode, payload: Bytes) -> Result<()> {
        let mut header = [0u8; MAX_HEADER_LEN];
        let header_len = encode_header(opcode, payload.len(), &mut header);
        let mut frame = Buf::chain(&header[..header_len], payload);

        let mut writer = self.writer.lock().await;
        writer.write_all_buf(&mut frame).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Stop both loops and shut the write direction down, optionally
    /// sending a CLOSE frame first. Only the first call has any effect.
    async fn close(&self, send_close: bool) -> Result<()> {
        if self.closing.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let sent = if send_close {
            self.send_frame(Opcode::Close, Bytes::new()).await
        } else {
            Ok(())
        };

        self.done.cancel();
        let _ = self.writer.lock().await.shutdown().await;
        sent
    }
}
