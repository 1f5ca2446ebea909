//! The link IO task.
//!
//! One tokio task owns the opened transport exclusively. Writes arrive over
//! an mpsc channel with a oneshot reply, so at most one write is ever in
//! flight. While no write is pending the task waits on `receive()`; every
//! non-empty read is appended to the log ring and broadcast.
//!
//! Reading stops at end-of-stream or on a read error, and the task then
//! keeps serving writes until it is cancelled or the session drops its
//! sender. On exit the task hands the transport back through its
//! `JoinHandle` so the session can close it exactly once.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use serlink_core::error::{Error, Result};
use serlink_core::events::{LinkEvent, ReadLoopEnd};
use serlink_core::log::{Direction, LogEntry, LogRing};
use serlink_core::transport::Transport;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Tuning for the link IO task.
#[derive(Debug, Clone)]
pub struct IoConfig {
    /// How long one idle `receive()` may wait before the loop re-checks for
    /// writes and cancellation (default 100ms).
    pub read_timeout: Duration,
    /// Size of the read buffer; one read never yields more than this.
    pub read_buffer_size: usize,
    /// Capacity of the write request queue.
    pub write_queue: usize,
}

impl Default for IoConfig {
    fn default() -> Self {
        IoConfig {
            read_timeout: Duration::from_millis(100),
            read_buffer_size: 4096,
            write_queue: 32,
        }
    }
}

/// A request sent from the session to the IO task.
pub enum Request {
    /// Write `data` and reply with the log entry recorded for it.
    Write {
        data: Bytes,
        reply: oneshot::Sender<Result<LogEntry>>,
    },
}

/// Handle to a running IO task. Owned by the session while connected.
pub struct LinkIo {
    /// Write request channel.
    pub tx: mpsc::Sender<Request>,
    /// Cancels the read loop.
    pub cancel: CancellationToken,
    /// Resolves to the transport once the loop has exited.
    pub task: JoinHandle<Box<dyn Transport>>,
}

impl LinkIo {
    /// Queue a write and wait until the device has accepted it.
    pub async fn write(&self, data: Bytes) -> Result<LogEntry> {
        write_via(&self.tx, data).await
    }

    /// Stop the loop and recover the transport.
    ///
    /// Returns [`Error::ConnectionLost`] if the task panicked, in which case
    /// the transport is gone.
    pub async fn shutdown(self) -> Result<Box<dyn Transport>> {
        self.cancel.cancel();
        self.task.await.map_err(|e| {
            warn!(error = %e, "link IO task did not exit cleanly");
            Error::ConnectionLost
        })
    }
}

/// Send a write request on `tx` and await its reply.
///
/// A closed channel or a dropped reply means the IO task is gone, which
/// callers observe as [`Error::NotConnected`].
pub async fn write_via(tx: &mpsc::Sender<Request>, data: Bytes) -> Result<LogEntry> {
    let (reply_tx, reply_rx) = oneshot::channel();
    tx.send(Request::Write {
        data,
        reply: reply_tx,
    })
    .await
    .map_err(|_| Error::NotConnected)?;

    match reply_rx.await {
        Ok(result) => result,
        Err(_) => Err(Error::NotConnected),
    }
}

// ---------------------------------------------------------------------------
// Spawn
// ---------------------------------------------------------------------------

/// Spawn the IO task for an opened transport.
pub fn spawn_link_io(
    transport: Box<dyn Transport>,
    config: IoConfig,
    log: Arc<LogRing>,
    event_tx: broadcast::Sender<LinkEvent>,
) -> LinkIo {
    let (tx, rx) = mpsc::channel::<Request>(config.write_queue.max(1));
    let cancel = CancellationToken::new();

    let task = tokio::spawn(io_loop(
        transport,
        config,
        log,
        event_tx,
        rx,
        cancel.clone(),
    ));

    LinkIo { tx, cancel, task }
}

// ---------------------------------------------------------------------------
// IO Loop
// ---------------------------------------------------------------------------

/// The main IO loop.
///
/// Uses `tokio::select! { biased; }` to prioritize:
/// 1. Cancellation
/// 2. Write requests
/// 3. Idle reads, until the read side has ended
///
/// Dropping the pending `receive()` future when another arm wins is what
/// releases the read side on disconnect; transports must make `receive`
/// cancel-safe.
async fn io_loop(
    mut transport: Box<dyn Transport>,
    config: IoConfig,
    log: Arc<LogRing>,
    event_tx: broadcast::Sender<LinkEvent>,
    mut rx: mpsc::Receiver<Request>,
    cancel: CancellationToken,
) -> Box<dyn Transport> {
    let mut buf = vec![0u8; config.read_buffer_size.max(1)];
    let mut reading = true;

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("link IO task cancelled");
                break;
            }

            req = rx.recv() => match req {
                Some(Request::Write { data, reply }) => {
                    let result = write(&mut *transport, data, &log, &event_tx).await;
                    let _ = reply.send(result);
                }
                None => {
                    debug!("write channel closed, exiting link IO task");
                    break;
                }
            },

            result = transport.receive(&mut buf, config.read_timeout), if reading => match result {
                Ok(0) => {
                    debug!("device signalled end of stream");
                    reading = false;
                    let _ = event_tx.send(LinkEvent::ReadLoopEnded {
                        reason: ReadLoopEnd::EndOfStream,
                    });
                }
                Ok(n) => {
                    trace!(bytes = n, "received");
                    let entry = log.append(Direction::Received, Bytes::copy_from_slice(&buf[..n]));
                    let _ = event_tx.send(LinkEvent::Received(entry));
                }
                Err(Error::Timeout) => {}
                Err(e) => {
                    warn!(error = %e, "read loop terminated");
                    reading = false;
                    let _ = event_tx.send(LinkEvent::ReadLoopEnded {
                        reason: ReadLoopEnd::Failed(e.to_string()),
                    });
                }
            },
        }
    }

    if reading {
        let _ = event_tx.send(LinkEvent::ReadLoopEnded {
            reason: ReadLoopEnd::Cancelled,
        });
    }
    transport
}

/// Perform one write and record it.
async fn write(
    transport: &mut dyn Transport,
    data: Bytes,
    log: &LogRing,
    event_tx: &broadcast::Sender<LinkEvent>,
) -> Result<LogEntry> {
    if let Err(e) = transport.send(&data).await {
        warn!(error = %e, bytes = data.len(), "write failed");
        return Err(e);
    }
    trace!(bytes = data.len(), "sent");
    let entry = log.append(Direction::Sent, data);
    let _ = event_tx.send(LinkEvent::Sent(entry.clone()));
    Ok(entry)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
