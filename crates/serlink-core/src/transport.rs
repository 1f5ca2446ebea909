//! Transport and device-provider traits.
//!
//! The [`Transport`] trait abstracts over the byte stream to an opened
//! device. The [`DeviceProvider`] trait abstracts over the platform that
//! selects and opens devices. Implementations exist for serial ports
//! (`serlink-transport`) and for deterministic testing (`MockTransport` and
//! `MockDeviceProvider` in `serlink-test-harness`).
//!
//! The session layer in `serlink-session` operates on these traits rather
//! than on a serial port directly, so the connect/read/write/disconnect
//! state machine can be tested without hardware.

use async_trait::async_trait;
use std::time::Duration;

use crate::config::SerialConfig;
use crate::error::Result;

/// Asynchronous byte-level transport to an opened device.
///
/// A transport is owned by exactly one task at a time. The session's IO task
/// holds it for the lifetime of a connection and is the only caller of
/// `send` and `receive`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Write all of `data` to the device.
    ///
    /// Implementations should not return until every byte has been handed to
    /// the underlying driver (serial TX buffer, etc.).
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive the next chunk of inbound bytes into `buf`.
    ///
    /// Waits up to `timeout` for data. Returns `Ok(0)` when the stream has
    /// signalled end-of-data, and [`Error::Timeout`](crate::error::Error::Timeout)
    /// when nothing arrived within the deadline.
    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Close the device.
    ///
    /// After calling `close()`, subsequent `send()` and `receive()` calls
    /// should return [`Error::NotConnected`](crate::error::Error::NotConnected).
    async fn close(&mut self) -> Result<()>;

    /// Check whether the transport still holds an open device.
    fn is_connected(&self) -> bool;
}

/// Platform facility that selects and opens devices.
///
/// This is the core's whole dependency on the platform: pick a device, open
/// it with a configuration, and hand back a [`Transport`] whose readable and
/// writable halves the session then owns exclusively.
#[async_trait]
pub trait DeviceProvider: Send + Sync {
    /// Select a device to open.
    ///
    /// Returns `Ok(None)` when no device is selected or available.
    async fn request_device(&self) -> Result<Option<String>>;

    /// Open `device` and apply `config`.
    async fn open(&self, device: &str, config: &SerialConfig) -> Result<Box<dyn Transport>>;
}
