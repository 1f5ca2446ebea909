//! Mock serial device for deterministic testing.
//!
//! [`MockTransport::pair`] returns the transport (moved into the code under
//! test) and a [`MockDevice`] handle the test keeps. The handle feeds
//! inbound chunks, ends the stream, injects failures, and reports what was
//! written and how many times the transport was closed.
//!
//! # Example
//!
//! ```
//! use serlink_test_harness::MockTransport;
//!
//! let (transport, device) = MockTransport::pair();
//! device.push(b"OK\r\n");
//! device.end_stream();
//! assert_eq!(device.close_count(), 0);
//! # drop(transport);
//! ```

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use serlink_core::config::SerialConfig;
use serlink_core::error::{Error, Result};
use serlink_core::transport::{DeviceProvider, Transport};

/// One scripted inbound event.
#[derive(Debug)]
enum Inbound {
    Data(Vec<u8>),
    Error(String),
    EndOfStream,
}

/// State shared between a [`MockTransport`] and its [`MockDevice`].
#[derive(Debug, Default)]
struct Shared {
    sent_log: Mutex<Vec<Vec<u8>>>,
    close_count: AtomicUsize,
    fail_writes: AtomicBool,
    fail_close: AtomicBool,
}

/// A mock [`Transport`] driven by a [`MockDevice`] handle.
///
/// `receive` waits for the next pushed chunk (up to the timeout). A chunk
/// larger than the caller's buffer is delivered across several reads.
#[derive(Debug)]
pub struct MockTransport {
    inbound: mpsc::UnboundedReceiver<Inbound>,
    /// Remainder of a chunk that did not fit the last read buffer.
    pending: Vec<u8>,
    connected: bool,
    shared: Arc<Shared>,
}

/// Test-side handle to a [`MockTransport`].
#[derive(Debug, Clone)]
pub struct MockDevice {
    inbound: mpsc::UnboundedSender<Inbound>,
    shared: Arc<Shared>,
}

impl MockTransport {
    /// Create a connected transport and its controlling handle.
    pub fn pair() -> (MockTransport, MockDevice) {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared::default());
        let transport = MockTransport {
            inbound: rx,
            pending: Vec::new(),
            connected: true,
            shared: shared.clone(),
        };
        let device = MockDevice {
            inbound: tx,
            shared,
        };
        (transport, device)
    }

    /// Set the connected state of the mock transport.
    ///
    /// When set to `false`, subsequent `send()` and `receive()` calls will
    /// return [`Error::NotConnected`].
    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    fn drain_pending(&mut self, buf: &mut [u8]) -> usize {
        let n = self.pending.len().min(buf.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        n
    }
}

impl MockDevice {
    /// Queue a chunk of inbound bytes.
    pub fn push(&self, data: &[u8]) {
        let _ = self.inbound.send(Inbound::Data(data.to_vec()));
    }

    /// Make the next read (after queued chunks) fail with a transport error.
    pub fn fail_read(&self, message: &str) {
        let _ = self.inbound.send(Inbound::Error(message.to_string()));
    }

    /// Signal end-of-data after any queued chunks.
    pub fn end_stream(&self) {
        let _ = self.inbound.send(Inbound::EndOfStream);
    }

    /// Make every subsequent `send()` fail with [`Error::ConnectionLost`].
    pub fn fail_writes(&self, fail: bool) {
        self.shared.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make `close()` return an error (it still counts as a close).
    pub fn fail_close(&self, fail: bool) {
        self.shared.fail_close.store(fail, Ordering::SeqCst);
    }

    /// Every successful `send()` payload, in order.
    pub fn sent_data(&self) -> Vec<Vec<u8>> {
        self.shared
            .sent_log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// How many times `close()` has been called.
    pub fn close_count(&self) -> usize {
        self.shared.close_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        if !self.connected {
            return Err(Error::NotConnected);
        }
        if self.shared.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::ConnectionLost);
        }
        self.shared
            .sent_log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(data.to_vec());
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        if !self.connected {
            return Err(Error::NotConnected);
        }
        if !self.pending.is_empty() {
            return Ok(self.drain_pending(buf));
        }

        match tokio::time::timeout(timeout, self.inbound.recv()).await {
            Ok(Some(Inbound::Data(data))) => {
                self.pending = data;
                Ok(self.drain_pending(buf))
            }
            Ok(Some(Inbound::Error(message))) => Err(Error::Transport(message)),
            // All device handles dropped counts as end-of-data too.
            Ok(Some(Inbound::EndOfStream)) | Ok(None) => Ok(0),
            Err(_) => Err(Error::Timeout),
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.shared.close_count.fetch_add(1, Ordering::SeqCst);
        self.connected = false;
        self.pending.clear();
        if self.shared.fail_close.load(Ordering::SeqCst) {
            return Err(Error::Transport("mock close failure".into()));
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

/// A [`DeviceProvider`] that hands out one prepared [`MockTransport`].
///
/// `request_device` reports the configured device name (or `None`);
/// `open` yields the transport once and fails with
/// [`Error::OpenFailed`] afterwards, or always when constructed with
/// [`MockDeviceProvider::rejecting`].
#[derive(Debug)]
pub struct MockDeviceProvider {
    device: Option<String>,
    transport: Mutex<Option<MockTransport>>,
    reject: Option<String>,
    last_config: Mutex<Option<SerialConfig>>,
}

impl MockDeviceProvider {
    /// Provider offering `transport` under the name `device`.
    pub fn new(device: &str, transport: MockTransport) -> Self {
        MockDeviceProvider {
            device: Some(device.to_string()),
            transport: Mutex::new(Some(transport)),
            reject: None,
            last_config: Mutex::new(None),
        }
    }

    /// Provider with no device selected.
    pub fn empty() -> Self {
        MockDeviceProvider {
            device: None,
            transport: Mutex::new(None),
            reject: None,
            last_config: Mutex::new(None),
        }
    }

    /// Provider whose `open` always fails with `reason`.
    pub fn rejecting(device: &str, reason: &str) -> Self {
        MockDeviceProvider {
            device: Some(device.to_string()),
            transport: Mutex::new(None),
            reject: Some(reason.to_string()),
            last_config: Mutex::new(None),
        }
    }

    /// Offer another transport for the next `open`.
    pub fn replace_transport(&self, transport: MockTransport) {
        *self.transport.lock().unwrap_or_else(|e| e.into_inner()) = Some(transport);
    }

    /// The configuration passed to the most recent `open`.
    pub fn last_config(&self) -> Option<SerialConfig> {
        *self.last_config.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl DeviceProvider for MockDeviceProvider {
    async fn request_device(&self) -> Result<Option<String>> {
        Ok(self.device.clone())
    }

    async fn open(&self, device: &str, config: &SerialConfig) -> Result<Box<dyn Transport>> {
        *self.last_config.lock().unwrap_or_else(|e| e.into_inner()) = Some(*config);

        if let Some(reason) = &self.reject {
            return Err(Error::OpenFailed(reason.clone()));
        }
        let transport = self
            .transport
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .ok_or_else(|| Error::OpenFailed(format!("{device} is busy")))?;
        Ok(Box::new(transport))
    }
}
