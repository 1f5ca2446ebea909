//! Serial port transport.
//!
//! [`SerialTransport`] implements [`Transport`] over a `tokio-serial`
//! stream. Reads are cancel-safe: dropping a pending `receive()` loses no
//! data, which the session's IO task relies on when a write or a
//! disconnect preempts an idle read.

use async_trait::async_trait;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{SerialPortBuilderExt, SerialStream};

use serlink_core::config::{DataBits, FlowControl, Parity, SerialConfig, StopBits};
use serlink_core::error::{Error, Result};
use serlink_core::transport::Transport;

fn data_bits(bits: DataBits) -> tokio_serial::DataBits {
    match bits {
        DataBits::Seven => tokio_serial::DataBits::Seven,
        DataBits::Eight => tokio_serial::DataBits::Eight,
    }
}

fn stop_bits(bits: StopBits) -> tokio_serial::StopBits {
    match bits {
        StopBits::One => tokio_serial::StopBits::One,
        StopBits::Two => tokio_serial::StopBits::Two,
    }
}

fn parity(parity: Parity) -> tokio_serial::Parity {
    match parity {
        Parity::None => tokio_serial::Parity::None,
        Parity::Even => tokio_serial::Parity::Even,
        Parity::Odd => tokio_serial::Parity::Odd,
    }
}

fn flow_control(flow: FlowControl) -> tokio_serial::FlowControl {
    match flow {
        FlowControl::None => tokio_serial::FlowControl::None,
        FlowControl::Hardware => tokio_serial::FlowControl::Hardware,
    }
}

/// Map an I/O failure on an open port to the link error it represents.
fn link_error(e: io::Error) -> Error {
    match e.kind() {
        io::ErrorKind::BrokenPipe
        | io::ErrorKind::NotConnected
        | io::ErrorKind::UnexpectedEof => Error::ConnectionLost,
        _ => Error::Io(e),
    }
}

/// An open serial port.
pub struct SerialTransport {
    port: Option<SerialStream>,
    port_name: String,
}

impl SerialTransport {
    /// Open `port` and apply `config`.
    ///
    /// # Errors
    ///
    /// [`Error::OpenFailed`] when the port does not exist, is busy, or
    /// rejects the configuration.
    pub async fn open_with_config(port: &str, config: &SerialConfig) -> Result<Self> {
        tracing::debug!(port = %port, config = %config, "opening serial port");

        if config.baud_rate == 0 {
            return Err(Error::OpenFailed("baud rate must be greater than zero".into()));
        }

        let stream = tokio_serial::new(port, config.baud_rate)
            .data_bits(data_bits(config.data_bits))
            .stop_bits(stop_bits(config.stop_bits))
            .parity(parity(config.parity))
            .flow_control(flow_control(config.flow_control))
            .open_native_async()
            .map_err(|e| {
                tracing::error!(port = %port, error = %e, "failed to open serial port");
                Error::OpenFailed(format!("{port}: {e}"))
            })?;

        tracing::info!(port = %port, config = %config, "serial port opened");

        Ok(Self {
            port: Some(stream),
            port_name: port.to_string(),
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let port = self.port.as_mut().ok_or(Error::NotConnected)?;

        tracing::trace!(port = %self.port_name, bytes = data.len(), "writing");

        port.write_all(data).await.map_err(|e| {
            tracing::error!(port = %self.port_name, error = %e, "write failed");
            link_error(e)
        })?;
        // The write is only complete once the driver has the bytes.
        port.flush().await.map_err(link_error)?;
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let port = self.port.as_mut().ok_or(Error::NotConnected)?;

        match tokio::time::timeout(timeout, port.read(buf)).await {
            Ok(Ok(n)) => {
                if n == 0 {
                    tracing::debug!(port = %self.port_name, "serial stream ended");
                } else {
                    tracing::trace!(port = %self.port_name, bytes = n, "read");
                }
                Ok(n)
            }
            Ok(Err(e)) if e.kind() == io::ErrorKind::TimedOut => Err(Error::Timeout),
            Ok(Err(e)) => {
                tracing::error!(port = %self.port_name, error = %e, "read failed");
                Err(link_error(e))
            }
            Err(_) => Err(Error::Timeout),
        }
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut port) = self.port.take() {
            if let Err(e) = port.flush().await {
                tracing::warn!(port = %self.port_name, error = %e, "flush before close failed");
            }
            tracing::info!(port = %self.port_name, "serial port closed");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        if self.port.is_some() {
            tracing::debug!(port = %self.port_name, "serial port dropped without close");
        }
    }
}
