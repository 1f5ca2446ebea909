//! Asynchronous link event types.
//!
//! Events are emitted by the transport session through a
//! `tokio::sync::broadcast` channel. Log viewers and CLI monitors subscribe
//! to them instead of polling the log ring.

use crate::log::LogEntry;

/// Why a session's read loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadLoopEnd {
    /// The session's cancellation token fired (normal disconnect).
    Cancelled,
    /// The device stream signalled end-of-data.
    EndOfStream,
    /// A read failed with something other than the cancellation signal.
    Failed(String),
}

/// An event emitted by a transport session.
///
/// Subscribe via `TransportSession::subscribe()`. Delivery is best-effort
/// through a bounded broadcast channel; slow consumers may miss events
/// under heavy traffic, but the log ring always holds the full record.
#[derive(Debug, Clone)]
pub enum LinkEvent {
    /// The device was opened and the read loop started.
    Connected {
        /// Device name as reported by the provider.
        device: String,
    },

    /// Bytes were written to the device.
    Sent(LogEntry),

    /// Bytes were read from the device.
    Received(LogEntry),

    /// The read loop terminated.
    ReadLoopEnded {
        reason: ReadLoopEnd,
    },

    /// The session returned to `Disconnected`.
    Disconnected,
}
