//! Serial port discovery and the serial [`DeviceProvider`].

use async_trait::async_trait;
use std::fmt;

use serlink_core::config::SerialConfig;
use serlink_core::error::{Error, Result};
use serlink_core::transport::{DeviceProvider, Transport};

use crate::serial::SerialTransport;

/// USB identification of a port, when the OS reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbIds {
    pub vid: u16,
    pub pid: u16,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
}

/// A serial port found on this system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// Path or name to pass to `open` (e.g. `/dev/ttyUSB0`, `COM3`).
    pub name: String,
    pub usb: Option<UsbIds>,
}

impl fmt::Display for PortInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(usb) = &self.usb {
            write!(f, " (USB {:04x}:{:04x}", usb.vid, usb.pid)?;
            if let Some(product) = &usb.product {
                write!(f, " {product}")?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

impl From<tokio_serial::SerialPortInfo> for PortInfo {
    fn from(info: tokio_serial::SerialPortInfo) -> Self {
        let usb = match info.port_type {
            tokio_serial::SerialPortType::UsbPort(usb) => Some(UsbIds {
                vid: usb.vid,
                pid: usb.pid,
                manufacturer: usb.manufacturer,
                product: usb.product,
                serial_number: usb.serial_number,
            }),
            _ => None,
        };
        PortInfo {
            name: info.port_name,
            usb,
        }
    }
}

/// List the serial ports present on this system.
pub fn available_ports() -> Result<Vec<PortInfo>> {
    let ports = tokio_serial::available_ports()
        .map_err(|e| Error::Transport(format!("failed to enumerate serial ports: {e}")))?;
    Ok(ports.into_iter().map(PortInfo::from).collect())
}

/// Opens serial ports for a session.
///
/// With a configured port, `request_device` always selects it. Without
/// one, it selects the only port on the system, and nothing when there
/// are zero or several to choose from.
#[derive(Debug, Clone, Default)]
pub struct SerialPortProvider {
    port: Option<String>,
}

impl SerialPortProvider {
    /// Provider that selects whatever single port is present.
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider that always selects `port`.
    pub fn with_port(port: &str) -> Self {
        SerialPortProvider {
            port: Some(port.to_string()),
        }
    }

    pub fn port(&self) -> Option<&str> {
        self.port.as_deref()
    }
}

/// Pick the single candidate, if there is exactly one.
fn select_single(ports: &[PortInfo]) -> Option<String> {
    match ports {
        [only] => Some(only.name.clone()),
        _ => None,
    }
}

#[async_trait]
impl DeviceProvider for SerialPortProvider {
    async fn request_device(&self) -> Result<Option<String>> {
        if let Some(port) = &self.port {
            return Ok(Some(port.clone()));
        }
        let ports = available_ports()?;
        let selected = select_single(&ports);
        if selected.is_none() {
            tracing::debug!(found = ports.len(), "no single serial port to select");
        }
        Ok(selected)
    }

    async fn open(&self, device: &str, config: &SerialConfig) -> Result<Box<dyn Transport>> {
        let transport = SerialTransport::open_with_config(device, config).await?;
        Ok(Box::new(transport))
    }
}
