use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::codec::{encode_message, FrameDecoder, Framing};
use crate::network::ConnectionSink;
use crate::{AppError, AppResult, NetworkConfig};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
struct WriteQueue {
    buffers: Mutex<VecDeque<Bytes>>,
    ready: Notify,
}

/// One framed, bidirectional connection.
///
/// A connection is created around nothing but its framing and limits, then
/// activated with [`start`](Connection::start), which takes the stream and
/// spawns one read task and one write task. The `Arc` handed out by the
/// listener or dialer is the connection's handle: cloning it shares the
/// connection, dropping the last clone cancels both tasks and closes the
/// socket. The stream type is generic, so a TLS stream with plain
/// read/write semantics drops in unchanged.
///
/// Exactly one terminal event reaches the sink per connection; after that
/// the connection delivers nothing further and should be dropped.
#[derive(Debug)]
pub struct Connection {
    id: u64,
    peer_addr: Option<SocketAddr>,
    framing: Framing,
    config: NetworkConfig,
    queue: Arc<WriteQueue>,
    liveness: CancellationToken,
    started: AtomicBool,
    failed: AtomicBool,
}

impl Connection {
    pub fn new(
        framing: Framing,
        config: &NetworkConfig,
        peer_addr: Option<SocketAddr>,
    ) -> AppResult<Arc<Connection>> {
        framing.validate()?;
        Ok(Arc::new(Connection {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            peer_addr,
            framing,
            config: config.clone(),
            queue: Arc::new(WriteQueue {
                buffers: Mutex::new(VecDeque::new()),
                ready: Notify::new(),
            }),
            liveness: CancellationToken::new(),
            started: AtomicBool::new(false),
            failed: AtomicBool::new(false),
        }))
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Activates the connection on `stream`: spawns the read loop and the
    /// write loop. Called once; later calls are ignored.
    pub fn start<S>(self: &Arc<Self>, stream: S, sink: Arc<dyn ConnectionSink>)
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let (reader, writer) = tokio::io::split(stream);
        let decoder = FrameDecoder::new(&self.framing, &self.config);

        let connection = Arc::downgrade(self);
        let cancelled = self.liveness.clone();
        let read_sink = sink.clone();
        let id = self.id;
        tokio::spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {}
                _ = read_loop(reader, decoder, connection, read_sink) => {}
            }
            debug!(id, "connection read loop exited");
        });

        let connection = Arc::downgrade(self);
        let cancelled = self.liveness.clone();
        let queue = self.queue.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {}
                _ = write_loop(writer, queue, connection, sink) => {}
            }
            debug!(id, "connection write loop exited");
        });

        debug!(id = self.id, peer = ?self.peer_addr, "connection started");
    }

    /// Frames `payload` and queues it for sending.
    ///
    /// Oversize payloads are refused here, before anything is queued.
    /// Messages queued by one task reach the peer in queue order; the
    /// write task sends one buffer at a time, so bytes of different
    /// messages never interleave.
    pub fn send(&self, payload: &[u8]) -> AppResult<()> {
        let framed = encode_message(&self.framing, payload, self.config.max_message_size)?;
        let was_empty = {
            let mut buffers = self.queue.buffers.lock();
            let was_empty = buffers.is_empty();
            buffers.push_back(framed);
            was_empty
        };
        // only the empty-to-non-empty transition wakes the write task;
        // otherwise a send is already in flight and its completion picks
        // this buffer up
        if was_empty {
            self.queue.ready.notify_one();
        }
        Ok(())
    }

    /// Cancels both I/O tasks and closes the socket. Queued but unsent
    /// buffers are released with the connection.
    pub fn close(&self) {
        self.liveness.cancel();
    }

    /// Claims the single terminal event; only the claimant may call the
    /// sink, so the sink sees at most one.
    fn mark_failed(&self) -> bool {
        !self.failed.swap(true, Ordering::SeqCst)
    }

    fn has_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.liveness.cancel();
        debug!(id = self.id, "connection dropped");
    }
}

/// Delivers a terminal error unless the connection is already gone or has
/// already delivered one.
fn report_terminal(
    connection: &Weak<Connection>,
    sink: &Arc<dyn ConnectionSink>,
    error: AppError,
) {
    if let Some(connection) = connection.upgrade() {
        if connection.mark_failed() {
            sink.connection_error(&connection, error);
        }
    }
}

async fn read_loop<R>(
    mut reader: R,
    mut decoder: FrameDecoder,
    connection: Weak<Connection>,
    sink: Arc<dyn ConnectionSink>,
) where
    R: AsyncRead + Unpin,
{
    loop {
        match decoder.read_message(&mut reader).await {
            Ok(Some(message)) => {
                // the weak upgrade guards against completions that fire
                // after the owner dropped the connection
                let Some(connection) = connection.upgrade() else {
                    return;
                };
                if connection.has_failed() {
                    return;
                }
                sink.received(&connection, message);
            }
            Ok(None) => {
                report_terminal(&connection, &sink, AppError::ConnectionClosed);
                return;
            }
            Err(error) => {
                report_terminal(&connection, &sink, error);
                return;
            }
        }
    }
}

async fn write_loop<W>(
    mut writer: W,
    queue: Arc<WriteQueue>,
    connection: Weak<Connection>,
    sink: Arc<dyn ConnectionSink>,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        // the head stays queued while it is in flight; it is the marker
        // that a send is active
        let head = loop {
            let head = queue.buffers.lock().front().cloned();
            match head {
                Some(head) => break head,
                None => queue.ready.notified().await,
            }
        };

        let result = async {
            writer.write_all(&head).await?;
            writer.flush().await
        }
        .await;

        if let Err(error) = result {
            report_terminal(&connection, &sink, error.into());
            return;
        }

        queue.buffers.lock().pop_front();

        let Some(connection) = connection.upgrade() else {
            return;
        };
        sink.write_completed(&connection);
    }
}
