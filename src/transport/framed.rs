//! Framed WebSocket connection.
//!
//! A WebSocket supports one concurrent reader and one concurrent writer;
//! nothing more. The proxy, however, writes to the same socket from two
//! places: the relay loop forwarding the opposite direction, and the
//! interception handler injecting synthetic commands. [`FramedConnection`]
//! resolves this by funnelling all traffic through a pair of channels, each
//! serviced by exactly one dedicated task, so callers can read and write
//! from independent tasks without touching the socket.
//!
//! # Task Structure
//!
//! ```text
//! write() ──► outbound channel ──► writer task ──► socket
//! read()  ◄── inbound channel  ◄── reader task ◄── socket
//! ```
//!
//! Both tasks are spawned by [`FramedConnection::start`] and run until the
//! socket fails, the peer disconnects, or [`FramedConnection::close`] is
//! called; any of these tears down the whole connection.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::{Mutex as AsyncMutex, mpsc, watch};
use tokio_tungstenite::tungstenite::{Message, Utf8Bytes};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, warn};

use crate::error::{Error, Result};

// ============================================================================
// Types
// ============================================================================

/// The WebSocket stream type used on both sides of a session.
///
/// Accepted sockets are wrapped in [`MaybeTlsStream::Plain`] so that inbound
/// (DevTools) and dialed (browser) connections share one concrete type.
pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ============================================================================
// Constants
// ============================================================================

/// Outbound/inbound channel capacity in frame slots.
///
/// When the outbound channel is full, `write` blocks its caller; since the
/// caller is the opposite direction's relay loop, backpressure propagates to
/// the slow side's socket via TCP flow control.
const FRAME_BUFFER_SLOTS: usize = 1 << 20;

// ============================================================================
// Side
// ============================================================================

/// Which end of a session a connection belongs to.
///
/// Used only for diagnostics; both sides behave identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// The DevTools frontend that connected to the proxy.
    Devtools,
    /// The browser debug target the proxy dialed.
    Web,
}

impl Side {
    /// Returns the side's diagnostic name.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Devtools => "devtools",
            Self::Web => "web",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// CloseState
// ============================================================================

/// Close bookkeeping shared between the connection handle and its tasks.
struct CloseState {
    /// Diagnostic name of this end.
    side: Side,

    /// Closed flag; the mutex also serializes the close sequence.
    closed: Mutex<bool>,

    /// Shutdown signal observed by the reader and writer tasks.
    shutdown_tx: watch::Sender<bool>,
}

impl CloseState {
    /// Returns `true` once the connection has been closed.
    fn is_closed(&self) -> bool {
        *self.closed.lock()
    }

    /// Marks the connection closed and signals both tasks to exit.
    ///
    /// Idempotent; the flag never reverts to `false`.
    fn close(&self) {
        {
            let mut closed = self.closed.lock();
            if *closed {
                return;
            }
            *closed = true;
        }

        warn!(side = %self.side, "connection closing");

        // Wakes both tasks; each drops its channel end on exit.
        let _ = self.shutdown_tx.send(true);
    }
}

// ============================================================================
// FramedConnection
// ============================================================================

/// A single-producer single-consumer façade over one WebSocket.
///
/// # Contract
///
/// - [`write`](Self::write) enqueues a frame; it may block when the outbound
///   channel is saturated and fails once the connection is closed.
/// - [`read`](Self::read) delivers the next received frame; it blocks until
///   one arrives and fails when the connection closes first.
/// - [`close`](Self::close) is idempotent and safe from any task.
///
/// Socket errors are terminal: they close the connection and are never
/// retried.
pub struct FramedConnection {
    /// Close bookkeeping, shared with the reader and writer tasks.
    state: Arc<CloseState>,

    /// Producer half of the outbound channel, drained by the writer task.
    outbound_tx: mpsc::Sender<Utf8Bytes>,

    /// Consumer half of the inbound channel, fed by the reader task.
    inbound_rx: AsyncMutex<mpsc::Receiver<Utf8Bytes>>,

    /// Socket and task-side channel ends, taken by `start`.
    parked: Mutex<Option<Parked>>,
}

/// Resources held between construction and `start`.
struct Parked {
    socket: WsStream,
    outbound_rx: mpsc::Receiver<Utf8Bytes>,
    inbound_tx: mpsc::Sender<Utf8Bytes>,
}

// ============================================================================
// FramedConnection - Construction
// ============================================================================

impl FramedConnection {
    /// Wraps a WebSocket stream.
    ///
    /// No I/O happens until [`start`](Self::start) spawns the reader and
    /// writer tasks.
    #[must_use]
    pub fn new(side: Side, socket: WsStream) -> Arc<Self> {
        let (outbound_tx, outbound_rx) = mpsc::channel(FRAME_BUFFER_SLOTS);
        let (inbound_tx, inbound_rx) = mpsc::channel(FRAME_BUFFER_SLOTS);
        let (shutdown_tx, _) = watch::channel(false);

        Arc::new(Self {
            state: Arc::new(CloseState {
                side,
                closed: Mutex::new(false),
                shutdown_tx,
            }),
            outbound_tx,
            inbound_rx: AsyncMutex::new(inbound_rx),
            parked: Mutex::new(Some(Parked {
                socket,
                outbound_rx,
                inbound_tx,
            })),
        })
    }

    /// Spawns the reader and writer tasks.
    ///
    /// Called once after construction; subsequent calls (or a call after
    /// [`close`](Self::close)) do nothing.
    pub fn start(&self) {
        let Some(parked) = self.parked.lock().take() else {
            return;
        };

        let (ws_write, ws_read) = parked.socket.split();

        tokio::spawn(reader_task(
            Arc::clone(&self.state),
            ws_read,
            parked.inbound_tx,
            self.state.shutdown_tx.subscribe(),
        ));
        tokio::spawn(writer_task(
            Arc::clone(&self.state),
            ws_write,
            parked.outbound_rx,
            self.state.shutdown_tx.subscribe(),
        ));
    }
}

// ============================================================================
// FramedConnection - Public API
// ============================================================================

impl FramedConnection {
    /// Returns this connection's side.
    #[inline]
    #[must_use]
    pub fn side(&self) -> Side {
        self.state.side
    }

    /// Returns `true` once the connection has been closed.
    ///
    /// The flag never reverts to `false`.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.is_closed()
    }

    /// Enqueues a frame for transmission.
    ///
    /// Blocks while the outbound channel is saturated. Best-effort only:
    /// success means the frame was queued, not that the peer received it.
    ///
    /// # Errors
    ///
    /// [`Error::ConnectionClosed`] if the connection is closed, or closes
    /// before the frame can be queued.
    pub async fn write(&self, frame: Utf8Bytes) -> Result<()> {
        if self.is_closed() {
            return Err(Error::closed(self.side()));
        }
        self.outbound_tx
            .send(frame)
            .await
            .map_err(|_| Error::closed(self.side()))
    }

    /// Delivers the next received frame.
    ///
    /// Blocks until a frame is available. Frames already buffered when the
    /// connection closes are still delivered, in order.
    ///
    /// # Errors
    ///
    /// [`Error::ConnectionClosed`] if the connection is closed, or closes
    /// while waiting.
    pub async fn read(&self) -> Result<Utf8Bytes> {
        if self.is_closed() {
            return Err(Error::closed(self.side()));
        }
        let mut inbound = self.inbound_rx.lock().await;
        inbound.recv().await.ok_or(Error::closed(self.side()))
    }

    /// Closes the connection.
    ///
    /// Idempotent and safe to call from any task. Marks the connection
    /// closed and signals the reader and writer tasks to exit, which closes
    /// the channels and the underlying socket.
    pub fn close(&self) {
        self.state.close();

        // Never started: drop the parked socket so the peer sees EOF.
        self.parked.lock().take();
    }
}

// ============================================================================
// Reader / Writer Tasks
// ============================================================================

/// Reads frames from the socket into the inbound channel.
///
/// Terminates on read error, peer close, stream end, or shutdown; any exit
/// closes the whole connection.
async fn reader_task(
    state: Arc<CloseState>,
    mut ws_read: SplitStream<WsStream>,
    inbound_tx: mpsc::Sender<Utf8Bytes>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,

            message = ws_read.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    if state.is_closed() {
                        break;
                    }
                    if inbound_tx.send(text).await.is_err() {
                        break;
                    }
                }

                Some(Ok(Message::Close(_))) => {
                    debug!(side = %state.side, "close frame received");
                    break;
                }

                Some(Err(e)) => {
                    error!(side = %state.side, error = %e, "read failed");
                    break;
                }

                None => {
                    debug!(side = %state.side, "stream ended");
                    break;
                }

                // Ignore Binary, Ping, Pong: CDP traffic is text frames.
                _ => {}
            },
        }
    }

    state.close();
    debug!(side = %state.side, "reader task terminated");
}

/// Drains the outbound channel into the socket.
///
/// Terminates on write error or shutdown; any exit closes the whole
/// connection and the underlying socket.
async fn writer_task(
    state: Arc<CloseState>,
    mut ws_write: SplitSink<WsStream, Message>,
    mut outbound_rx: mpsc::Receiver<Utf8Bytes>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,

            frame = outbound_rx.recv() => match frame {
                Some(frame) => {
                    if state.is_closed() {
                        break;
                    }
                    if let Err(e) = ws_write.send(Message::Text(frame)).await {
                        error!(side = %state.side, error = %e, "write failed");
                        break;
                    }
                }
                None => break,
            },
        }
    }

    let _ = ws_write.close().await;
    state.close();
    debug!(side = %state.side, "writer task terminated");
}

// ============================================================================
// Tests
// ============================================================================
