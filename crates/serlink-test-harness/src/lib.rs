//! serlink-test-harness: mock devices for deterministic tests.
//!
//! [`MockTransport`] stands in for an opened serial port: tests push inbound
//! chunks through its paired [`MockDevice`] handle and inspect what was
//! written. [`MockDeviceProvider`] hands a prepared transport to a session's
//! `connect` call.

pub mod mock_serial;

pub use mock_serial::{MockDevice, MockDeviceProvider, MockTransport};
