//! Connection Driver
//!
//! One tokio task owns each socket. It reads into an accumulating buffer,
//! hands every complete frame to a [`ConnectionHandler`], and writes frames
//! queued through the cloneable [`ConnectionHandle`]. The handler sees
//! exactly one `on_disconnect` per connection, after the socket is gone.

use crate::framing::{Frame, FrameCodec};
use crate::{Result, TransportError};
use bytes::{Bytes, BytesMut};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Initial read buffer capacity
pub const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024; // 64KB

/// Any bidirectional byte stream a connection can run over
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> AsyncStream for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

/// Type-erased stream
pub type BoxedStream = Box<dyn AsyncStream>;

/// Callbacks from a connection task.
///
/// Returning an error from `on_message` closes the connection; frames
/// already queued for writing are flushed first.
pub trait ConnectionHandler: Send + Sync + 'static {
    fn on_connect(&self, _connection: &ConnectionHandle) {}

    fn on_message(&self, connection: &ConnectionHandle, frame: Frame) -> Result<()>;

    fn on_disconnect(&self, connection: &ConnectionHandle);
}

enum Outbound {
    Frame(Bytes),
    Close,
}

struct Shared {
    peer_addr: Option<SocketAddr>,
    codec: FrameCodec,
    outbound: mpsc::UnboundedSender<Outbound>,
}

/// Cloneable sending side of a connection
#[derive(Clone)]
pub struct ConnectionHandle {
    shared: Arc<Shared>,
}

impl ConnectionHandle {
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.shared.peer_addr
    }

    /// Queue one frame for writing.
    ///
    /// Fails once the connection task has stopped.
    pub fn send(&self, message_type: u8, payload: &[u8]) -> Result<()> {
        let bytes = self.shared.codec.encode_to_bytes(message_type, payload)?;
        self.shared
            .outbound
            .send(Outbound::Frame(bytes))
            .map_err(|_| TransportError::closed(self.shared.peer_addr))
    }

    /// Ask the connection task to flush queued frames and shut down
    pub fn close(&self) {
        let _ = self.shared.outbound.send(Outbound::Close);
    }

    pub fn is_closed(&self) -> bool {
        self.shared.outbound.is_closed()
    }

    /// Whether both handles drive the same socket
    pub fn same_connection(&self, other: &ConnectionHandle) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("peer_addr", &self.shared.peer_addr)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// The receiving half of a connection, not yet running.
///
/// Splitting construction from spawning lets callers register the handle
/// (for example in a session table) before any frame can arrive.
pub struct ConnectionDriver {
    stream: BoxedStream,
    handle: ConnectionHandle,
    outbound: mpsc::UnboundedReceiver<Outbound>,
}

/// Wrap a stream into a handle and a driver
pub fn open<S: AsyncStream>(
    stream: S,
    peer_addr: Option<SocketAddr>,
    codec: FrameCodec,
) -> (ConnectionHandle, ConnectionDriver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = ConnectionHandle {
        shared: Arc::new(Shared {
            peer_addr,
            codec,
            outbound: tx,
        }),
    };
    let driver = ConnectionDriver {
        stream: Box::new(stream),
        handle: handle.clone(),
        outbound: rx,
    };
    (handle, driver)
}

impl ConnectionDriver {
    /// Start the connection task
    pub fn spawn(self, handler: Arc<dyn ConnectionHandler>) -> JoinHandle<()> {
        tokio::spawn(self.run(handler))
    }

    async fn run(self, handler: Arc<dyn ConnectionHandler>) {
        let ConnectionDriver {
            mut stream,
            handle,
            mut outbound,
        } = self;
        let peer = handle.peer_addr();
        let codec = handle.shared.codec;
        let mut read_buf = BytesMut::with_capacity(DEFAULT_READ_BUFFER_SIZE);

        handler.on_connect(&handle);

        let outcome: Result<()> = loop {
            tokio::select! {
                read = stream.read_buf(&mut read_buf) => {
                    match read {
                        Ok(0) => break Ok(()),
                        Ok(_) => {
                            if let Err(e) = dispatch_frames(&codec, &mut read_buf, &handle, handler.as_ref()) {
                                break Err(e);
                            }
                        }
                        Err(e) => break Err(TransportError::connection_with_source("read failed", peer, e)),
                    }
                }
                command = outbound.recv() => {
                    match command {
                        Some(Outbound::Frame(bytes)) => {
                            if let Err(e) = write_frame(&mut stream, &bytes).await {
                                break Err(TransportError::connection_with_source("write failed", peer, e));
                            }
                        }
                        Some(Outbound::Close) | None => break Ok(()),
                    }
                }
            }
        };

        match &outcome {
            Ok(()) => debug!(peer = ?peer, "Connection finished"),
            Err(e) => warn!(peer = ?peer, error = %e, category = e.category(), "Connection closed on error"),
        }

        // Refuse new frames, then flush whatever was queued before the close
        outbound.close();
        while let Ok(command) = outbound.try_recv() {
            if let Outbound::Frame(bytes) = command {
                if write_frame(&mut stream, &bytes).await.is_err() {
                    break;
                }
            }
        }
        if let Err(e) = stream.shutdown().await {
            debug!(peer = ?peer, error = %e, "Error shutting down stream");
        }

        handler.on_disconnect(&handle);
    }
}

fn dispatch_frames(
    codec: &FrameCodec,
    buf: &mut BytesMut,
    handle: &ConnectionHandle,
    handler: &dyn ConnectionHandler,
) -> Result<()> {
    while let Some(frame) = codec.decode(buf)? {
        debug!(
            peer = ?handle.peer_addr(),
            message_type = frame.message_type,
            bytes = frame.payload.len(),
            "Received frame"
        );
        handler.on_message(handle, frame)?;
    }
    Ok(())
}

async fn write_frame(stream: &mut BoxedStream, bytes: &[u8]) -> std::io::Result<()> {
    stream.write_all(bytes).await?;
    stream.flush().await
}
