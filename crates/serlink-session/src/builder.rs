//! SessionBuilder -- fluent builder for [`TransportSession`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use serlink_session::SessionBuilder;
//! # fn provider() -> Arc<dyn serlink_core::DeviceProvider> { todo!() }
//!
//! let session = SessionBuilder::new(provider())
//!     .read_timeout(Duration::from_millis(50))
//!     .log_capacity(5000)
//!     .build();
//! ```

use std::sync::Arc;
use std::time::Duration;

use serlink_core::log::{DEFAULT_LOG_CAPACITY, LogRing};
use serlink_core::transport::DeviceProvider;

use crate::io::IoConfig;
use crate::session::TransportSession;

/// Fluent builder for [`TransportSession`].
pub struct SessionBuilder {
    provider: Arc<dyn DeviceProvider>,
    io: IoConfig,
    log: Option<Arc<LogRing>>,
    log_capacity: usize,
    event_capacity: usize,
}

impl SessionBuilder {
    pub fn new(provider: Arc<dyn DeviceProvider>) -> Self {
        SessionBuilder {
            provider,
            io: IoConfig::default(),
            log: None,
            log_capacity: DEFAULT_LOG_CAPACITY,
            event_capacity: 256,
        }
    }

    /// Poll interval for idle reads (default: 100ms).
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.io.read_timeout = timeout;
        self
    }

    /// Largest chunk a single read may return (default: 4096 bytes).
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.io.read_buffer_size = size;
        self
    }

    /// Number of writes that may queue behind the one in flight.
    pub fn write_queue(mut self, depth: usize) -> Self {
        self.io.write_queue = depth;
        self
    }

    /// Entries kept by the session's own log ring. Ignored when
    /// [`log_ring`](Self::log_ring) supplies one.
    pub fn log_capacity(mut self, capacity: usize) -> Self {
        self.log_capacity = capacity;
        self
    }

    /// Share an existing log ring instead of creating one.
    pub fn log_ring(mut self, log: Arc<LogRing>) -> Self {
        self.log = Some(log);
        self
    }

    /// Buffer size of the event broadcast channel (default: 256).
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn build(self) -> TransportSession {
        let log = self
            .log
            .unwrap_or_else(|| Arc::new(LogRing::with_capacity(self.log_capacity)));
        TransportSession::from_parts(self.provider, self.io, log, self.event_capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serlink_test_harness::MockDeviceProvider;

    #[test]
    fn builder_applies_log_capacity() {
        let session = SessionBuilder::new(Arc::new(MockDeviceProvider::empty()))
            .log_capacity(10)
            .build();
        assert_eq!(session.log().capacity(), 10);
    }

    #[test]
    fn builder_shares_log_ring() {
        let ring = Arc::new(LogRing::with_capacity(3));
        let session = SessionBuilder::new(Arc::new(MockDeviceProvider::empty()))
            .log_ring(ring.clone())
            .log_capacity(99)
            .build();
        assert!(Arc::ptr_eq(session.log(), &ring));
    }
}
