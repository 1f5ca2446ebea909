//! Serial port support for serlink.
//!
//! - [`SerialTransport`]: a [`Transport`](serlink_core::Transport) over a
//!   USB virtual COM port or RS-232 line
//! - [`SerialPortProvider`]: a [`DeviceProvider`](serlink_core::DeviceProvider)
//!   that picks a port and opens it with a [`SerialConfig`](serlink_core::SerialConfig)
//!
//! # Example
//!
//! ```no_run
//! use serlink_core::{SerialConfig, Transport};
//! use serlink_transport::SerialTransport;
//! use std::time::Duration;
//!
//! # async fn example() -> serlink_core::Result<()> {
//! let mut transport =
//!     SerialTransport::open_with_config("/dev/ttyUSB0", &SerialConfig::default()).await?;
//! transport.send(b"AT\r\n").await?;
//!
//! let mut buf = [0u8; 256];
//! let n = transport.receive(&mut buf, Duration::from_secs(1)).await?;
//! # Ok(())
//! # }
//! ```

pub mod provider;
pub mod serial;

pub use provider::{PortInfo, SerialPortProvider, UsbIds, available_ports};
pub use serial::SerialTransport;
