//! serlink-core: Core traits, types, codecs, and error definitions for serlink.
//!
//! This crate defines the device-agnostic abstractions the rest of the
//! workspace builds on. Operator tools depend on these types without pulling
//! in a specific transport.
//!
//! # Key types
//!
//! - [`Transport`] / [`DeviceProvider`] -- byte-level device access
//! - [`SerialConfig`] -- link parameters
//! - [`LogRing`] / [`LogEntry`] -- bounded traffic log
//! - [`LinkEvent`] -- asynchronous session notifications
//! - [`codec`] -- text/hex conversions and display formatting
//! - [`Error`] / [`Result`] -- error handling

pub mod codec;
pub mod config;
pub mod error;
pub mod events;
pub mod log;
pub mod transport;

// Re-export key types at crate root for ergonomic `use serlink_core::*`.
pub use codec::{
    DataFormat, LineEnding, bytes_to_hex, bytes_to_text, encode_payload, format_bytes,
    format_timestamp, hex_to_bytes, is_valid_hex, text_to_bytes,
};
pub use config::{
    DataBits, FlowControl, Parity, STANDARD_BAUD_RATES, SavedCommand, SerialConfig, StopBits,
};
pub use error::{Error, Result};
pub use events::{LinkEvent, ReadLoopEnd};
pub use log::{DEFAULT_LOG_CAPACITY, Direction, LogEntry, LogRing};
pub use transport::{DeviceProvider, Transport};
