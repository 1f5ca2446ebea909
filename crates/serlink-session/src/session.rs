//! Transport session: connect, send, disconnect.
//!
//! A session holds at most one open device. Connecting spawns the link IO
//! task (see [`crate::io`]); sending queues a write on it; disconnecting
//! cancels the read loop, waits for the task to hand the transport back,
//! and closes it.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use serlink_core::codec::{self, DataFormat, LineEnding};
use serlink_core::config::SerialConfig;
use serlink_core::error::{Error, Result};
use serlink_core::events::LinkEvent;
use serlink_core::log::{LogEntry, LogRing};
use serlink_core::transport::DeviceProvider;

use crate::builder::SessionBuilder;
use crate::io::{self, IoConfig, LinkIo};

/// Lifecycle of a [`TransportSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Closing => write!(f, "closing"),
        }
    }
}

/// The live link to one device.
struct Link {
    io: LinkIo,
    device: String,
    config: SerialConfig,
}

/// Owns one device connection at a time and logs all traffic through it.
///
/// All methods take `&self`; wrap the session in an `Arc` to share it
/// between a script runner, a monitor, and the caller.
pub struct TransportSession {
    provider: Arc<dyn DeviceProvider>,
    io_config: IoConfig,
    state: Mutex<ConnectionState>,
    /// Held across connect and disconnect so the two never interleave.
    link: tokio::sync::Mutex<Option<Link>>,
    log: Arc<LogRing>,
    event_tx: broadcast::Sender<LinkEvent>,
}

impl TransportSession {
    /// Create a session with default IO settings and a fresh log ring.
    pub fn new(provider: Arc<dyn DeviceProvider>) -> Self {
        SessionBuilder::new(provider).build()
    }

    /// Start a [`SessionBuilder`].
    pub fn builder(provider: Arc<dyn DeviceProvider>) -> SessionBuilder {
        SessionBuilder::new(provider)
    }

    pub(crate) fn from_parts(
        provider: Arc<dyn DeviceProvider>,
        io_config: IoConfig,
        log: Arc<LogRing>,
        event_capacity: usize,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(event_capacity.max(1));
        TransportSession {
            provider,
            io_config,
            state: Mutex::new(ConnectionState::Disconnected),
            link: tokio::sync::Mutex::new(None),
            log,
            event_tx,
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: ConnectionState) {
        *self.lock_state() = state;
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.lock_state()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// The traffic log shared with the IO task.
    pub fn log(&self) -> &Arc<LogRing> {
        &self.log
    }

    /// Subscribe to link events.
    pub fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.event_tx.subscribe()
    }

    /// Name of the open device, if connected.
    pub async fn device(&self) -> Option<String> {
        self.link.lock().await.as_ref().map(|l| l.device.clone())
    }

    /// Configuration the open device was opened with, if connected.
    pub async fn config(&self) -> Option<SerialConfig> {
        self.link.lock().await.as_ref().map(|l| l.config)
    }

    /// Select a device, open it with `config`, and start the read loop.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyConnected`] unless the session is `Disconnected`
    /// - [`Error::DeviceUnavailable`] when the provider selects no device
    /// - [`Error::OpenFailed`] when the device or configuration is rejected
    ///
    /// On any error the session is left `Disconnected`.
    pub async fn connect(&self, config: SerialConfig) -> Result<()> {
        let mut link = self.link.lock().await;
        {
            let mut state = self.lock_state();
            if *state != ConnectionState::Disconnected || link.is_some() {
                return Err(Error::AlreadyConnected);
            }
            *state = ConnectionState::Connecting;
        }

        match self.open(&config).await {
            Ok((device, transport)) => {
                let io = io::spawn_link_io(
                    transport,
                    self.io_config.clone(),
                    self.log.clone(),
                    self.event_tx.clone(),
                );
                info!(device = %device, config = %config, "connected");
                *link = Some(Link {
                    io,
                    device: device.clone(),
                    config,
                });
                self.set_state(ConnectionState::Connected);
                let _ = self.event_tx.send(LinkEvent::Connected { device });
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "connect failed");
                self.set_state(ConnectionState::Disconnected);
                Err(e)
            }
        }
    }

    async fn open(
        &self,
        config: &SerialConfig,
    ) -> Result<(String, Box<dyn serlink_core::transport::Transport>)> {
        if config.baud_rate == 0 {
            return Err(Error::OpenFailed("baud rate must be greater than zero".into()));
        }

        let device = match self.provider.request_device().await {
            Ok(Some(device)) => device,
            Ok(None) => return Err(Error::DeviceUnavailable),
            Err(e) => {
                debug!(error = %e, "device selection failed");
                return Err(Error::DeviceUnavailable);
            }
        };

        let transport = self
            .provider
            .open(&device, config)
            .await
            .map_err(|e| match e {
                Error::OpenFailed(_) => e,
                other => Error::OpenFailed(other.to_string()),
            })?;
        Ok((device, transport))
    }

    /// Write `data` to the device.
    ///
    /// Completes once the device has accepted every byte, returning the
    /// log entry recorded for the write. Concurrent callers are served one
    /// at a time in arrival order.
    pub async fn send(&self, data: &[u8]) -> Result<LogEntry> {
        if self.state() != ConnectionState::Connected {
            return Err(Error::NotConnected);
        }
        if data.is_empty() {
            return Err(Error::EmptyPayload);
        }

        // Clone the sender so the link lock is not held across the write.
        let tx = {
            let link = self.link.lock().await;
            match link.as_ref() {
                Some(link) => link.io.tx.clone(),
                None => return Err(Error::NotConnected),
            }
        };
        io::write_via(&tx, Bytes::copy_from_slice(data)).await
    }

    /// Encode `data` per `format` and send it. `line_ending` is appended to
    /// text payloads only.
    pub async fn send_formatted(
        &self,
        data: &str,
        format: DataFormat,
        line_ending: LineEnding,
    ) -> Result<LogEntry> {
        let bytes = codec::encode_payload(data, format, line_ending)?;
        self.send(&bytes).await
    }

    /// Stop the read loop, close the device, and return to `Disconnected`.
    ///
    /// Idempotent. Errors while closing are logged, never returned.
    pub async fn disconnect(&self) {
        let mut link = self.link.lock().await;
        let Some(Link { io, device, .. }) = link.take() else {
            self.set_state(ConnectionState::Disconnected);
            return;
        };
        self.set_state(ConnectionState::Closing);

        match io.shutdown().await {
            Ok(mut transport) => {
                if let Err(e) = transport.close().await {
                    warn!(device = %device, error = %e, "error while closing device");
                }
            }
            Err(e) => warn!(device = %device, error = %e, "transport lost during disconnect"),
        }

        self.set_state(ConnectionState::Disconnected);
        info!(device = %device, "disconnected");
        let _ = self.event_tx.send(LinkEvent::Disconnected);
    }
}

impl fmt::Debug for TransportSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportSession")
            .field("state", &self.state())
            .field("io_config", &self.io_config)
            .field("log_len", &self.log.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serlink_core::log::Direction;
    use serlink_test_harness::{MockDevice, MockDeviceProvider, MockTransport};

    fn connected_pair() -> (Arc<MockDeviceProvider>, MockDevice) {
        let (transport, device) = MockTransport::pair();
        (Arc::new(MockDeviceProvider::new("/dev/ttyMOCK0", transport)), device)
    }

    #[tokio::test]
    async fn new_session_is_disconnected() {
        let session = TransportSession::new(Arc::new(MockDeviceProvider::empty()));
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert!(session.log().is_empty());
    }

    #[tokio::test]
    async fn connect_then_disconnect() {
        let (provider, device) = connected_pair();
        let session = TransportSession::new(provider.clone());
        let mut events = session.subscribe();

        session.connect(SerialConfig::default()).await.unwrap();
        assert_eq!(session.state(), ConnectionState::Connected);
        assert_eq!(session.device().await.as_deref(), Some("/dev/ttyMOCK0"));
        assert_eq!(provider.last_config(), Some(SerialConfig::default()));
        assert!(matches!(
            events.recv().await.unwrap(),
            LinkEvent::Connected { device } if device == "/dev/ttyMOCK0"
        ));

        session.disconnect().await;
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert_eq!(device.close_count(), 1);
        assert!(session.device().await.is_none());
    }

    #[tokio::test]
    async fn connect_twice_is_rejected() {
        let (provider, _device) = connected_pair();
        let session = TransportSession::new(provider);
        session.connect(SerialConfig::default()).await.unwrap();

        let result = session.connect(SerialConfig::default()).await;
        assert!(matches!(result, Err(Error::AlreadyConnected)));
        assert_eq!(session.state(), ConnectionState::Connected);
        session.disconnect().await;
    }

    #[tokio::test]
    async fn connect_without_device() {
        let session = TransportSession::new(Arc::new(MockDeviceProvider::empty()));
        let result = session.connect(SerialConfig::default()).await;
        assert!(matches!(result, Err(Error::DeviceUnavailable)));
        assert_eq!(session.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn connect_rejected_by_provider() {
        let provider = MockDeviceProvider::rejecting("/dev/ttyMOCK0", "permission denied");
        let session = TransportSession::new(Arc::new(provider));
        let result = session.connect(SerialConfig::default()).await;
        assert!(matches!(result, Err(Error::OpenFailed(m)) if m == "permission denied"));
        assert_eq!(session.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn zero_baud_rate_fails_open() {
        let (provider, _device) = connected_pair();
        let session = TransportSession::new(provider.clone());
        let config = SerialConfig {
            baud_rate: 0,
            ..SerialConfig::default()
        };
        let result = session.connect(config).await;
        assert!(matches!(result, Err(Error::OpenFailed(_))));
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert!(provider.last_config().is_none());
    }

    #[tokio::test]
    async fn send_requires_connection() {
        let (provider, _device) = connected_pair();
        let session = TransportSession::new(provider);
        let result = session.send(b"AT").await;
        assert!(matches!(result, Err(Error::NotConnected)));
        assert!(session.log().is_empty());
    }

    #[tokio::test]
    async fn send_rejects_empty_payload() {
        let (provider, device) = connected_pair();
        let session = TransportSession::new(provider);
        session.connect(SerialConfig::default()).await.unwrap();

        let result = session.send(&[]).await;
        assert!(matches!(result, Err(Error::EmptyPayload)));
        assert!(device.sent_data().is_empty());
        assert!(session.log().is_empty());
        session.disconnect().await;
    }

    #[tokio::test]
    async fn send_writes_and_logs() {
        let (provider, device) = connected_pair();
        let session = TransportSession::new(provider);
        session.connect(SerialConfig::default()).await.unwrap();

        let entry = session.send(b"AT\r\n").await.unwrap();
        assert_eq!(entry.direction, Direction::Sent);
        assert_eq!(device.sent_data(), vec![b"AT\r\n".to_vec()]);

        let logged = session.log().snapshot();
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0].id, entry.id);
        session.disconnect().await;
    }

    #[tokio::test]
    async fn send_formatted_hex_with_line_ending() {
        let (provider, device) = connected_pair();
        let session = TransportSession::new(provider);
        session.connect(SerialConfig::default()).await.unwrap();

        session
            .send_formatted("01 02", DataFormat::Hex, LineEnding::CrLf)
            .await
            .unwrap();
        session
            .send_formatted("AT", DataFormat::Text, LineEnding::CrLf)
            .await
            .unwrap();
        // Line endings only apply to text payloads.
        assert_eq!(device.sent_data(), vec![vec![0x01, 0x02], b"AT\r\n".to_vec()]);

        let result = session
            .send_formatted("ABC", DataFormat::Hex, LineEnding::None)
            .await;
        assert!(matches!(result, Err(Error::Format(_))));
        session.disconnect().await;
    }

    #[tokio::test]
    async fn failed_write_surfaces_error() {
        let (provider, device) = connected_pair();
        device.fail_writes(true);
        let session = TransportSession::new(provider);
        session.connect(SerialConfig::default()).await.unwrap();

        assert!(matches!(
            session.send(b"x").await,
            Err(Error::ConnectionLost)
        ));
        assert!(session.log().is_empty());
        session.disconnect().await;
    }

    #[tokio::test]
    async fn concurrent_sends_are_serialized() {
        let (provider, device) = connected_pair();
        let session = Arc::new(TransportSession::new(provider));
        session.connect(SerialConfig::default()).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..8u8 {
            let session = session.clone();
            handles.push(tokio::spawn(async move {
                session.send(&[i; 4]).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // Every write arrived whole; none were interleaved.
        let sent = device.sent_data();
        assert_eq!(sent.len(), 8);
        for chunk in &sent {
            assert_eq!(chunk.len(), 4);
            assert!(chunk.iter().all(|b| *b == chunk[0]));
        }
        assert_eq!(session.log().len(), 8);
        session.disconnect().await;
    }

    #[tokio::test]
    async fn received_data_lands_in_log() {
        let (provider, device) = connected_pair();
        let session = TransportSession::new(provider);
        let mut events = session.subscribe();
        session.connect(SerialConfig::default()).await.unwrap();

        device.push(b"OK\r\n");
        loop {
            if let LinkEvent::Received(entry) = events.recv().await.unwrap() {
                assert_eq!(&entry.data[..], b"OK\r\n");
                break;
            }
        }
        assert_eq!(session.log().len(), 1);
        session.disconnect().await;
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let (provider, device) = connected_pair();
        let session = TransportSession::new(provider);

        session.disconnect().await;
        assert_eq!(session.state(), ConnectionState::Disconnected);

        session.connect(SerialConfig::default()).await.unwrap();
        session.disconnect().await;
        session.disconnect().await;
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert_eq!(device.close_count(), 1);
    }

    #[tokio::test]
    async fn close_error_is_swallowed() {
        let (provider, device) = connected_pair();
        device.fail_close(true);
        let session = TransportSession::new(provider);
        session.connect(SerialConfig::default()).await.unwrap();

        session.disconnect().await;
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert_eq!(device.close_count(), 1);
    }

    #[tokio::test]
    async fn writes_survive_end_of_stream_until_disconnect() {
        let (provider, device) = connected_pair();
        let session = TransportSession::new(provider);
        let mut events = session.subscribe();
        session.connect(SerialConfig::default()).await.unwrap();

        device.end_stream();
        loop {
            if let LinkEvent::ReadLoopEnded { .. } = events.recv().await.unwrap() {
                break;
            }
        }
        assert_eq!(session.state(), ConnectionState::Connected);
        session.send(b"x").await.unwrap();
        assert_eq!(device.sent_data(), vec![b"x".to_vec()]);

        session.disconnect().await;
        assert_eq!(device.close_count(), 1);
        assert!(matches!(session.send(b"y").await, Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn reconnect_after_disconnect() {
        let (provider, first) = connected_pair();
        let session = TransportSession::new(provider.clone());
        session.connect(SerialConfig::default()).await.unwrap();
        session.disconnect().await;

        let (transport, second) = MockTransport::pair();
        provider.replace_transport(transport);
        session.connect(SerialConfig::default()).await.unwrap();
        session.send(b"again").await.unwrap();
        session.disconnect().await;

        assert!(first.sent_data().is_empty());
        assert_eq!(second.sent_data(), vec![b"again".to_vec()]);
        assert_eq!(first.close_count(), 1);
        assert_eq!(second.close_count(), 1);
    }

    #[test]
    fn state_display() {
        assert_eq!(ConnectionState::Connected.to_string(), "connected");
        assert_eq!(ConnectionState::Closing.to_string(), "closing");
    }
}
