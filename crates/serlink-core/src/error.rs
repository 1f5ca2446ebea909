//! Error types for serlink.
//!
//! All fallible link operations return [`Result<T>`], which uses [`Error`] as
//! the error type. Device-level, session-level, and codec errors are all
//! captured here. Script parsing and execution have their own error type in
//! `serlink-script`, which wraps this one when a send fails.

/// The error type for all serlink link and codec operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level error reported by the device or its driver.
    #[error("transport error: {0}")]
    Transport(String),

    /// The session is not in the `Connected` state.
    #[error("not connected")]
    NotConnected,

    /// The session already holds a device (or is in the middle of a
    /// connect/disconnect transition).
    #[error("already connected")]
    AlreadyConnected,

    /// A send was attempted with zero bytes.
    #[error("empty payload")]
    EmptyPayload,

    /// No device was selected, or none is available.
    #[error("no serial device available")]
    DeviceUnavailable,

    /// The platform rejected the device or its configuration.
    #[error("failed to open device: {0}")]
    OpenFailed(String),

    /// The connection to the device was lost unexpectedly.
    #[error("connection lost")]
    ConnectionLost,

    /// Timed out waiting for the device.
    ///
    /// Transports return this from `receive` when no bytes arrive within the
    /// poll interval. It is a normal condition for an idle line.
    #[error("timeout waiting for data")]
    Timeout,

    /// Malformed text or hex input handed to the byte codec.
    #[error("format error: {0}")]
    Format(String),

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;
