//! Serial transport for the device link
//!
//! The port is opened once and split into a read half (owned by the
//! ingestion thread) and a write half (shared by command handlers), so the
//! network side never holds the reader.

use crate::error::{Error, Result};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{Read, Write};
use std::time::Duration;

/// Read half of a device transport
pub type TransportReader = Box<dyn Read + Send>;

/// Write half of a device transport
pub type TransportWriter = Box<dyn Write + Send>;

/// How long a single read may block before the line reader retries.
/// Reads block "indefinitely" from the caller's point of view.
const READ_POLL_TIMEOUT: Duration = Duration::from_secs(60);

/// Serial port wrapper for UART communication
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    path: String,
}

impl SerialTransport {
    /// Open a serial port
    ///
    /// # Arguments
    /// * `path` - Serial port path (e.g., "/dev/ttyUSB0" or "COM6")
    /// * `baud_rate` - Baud rate (e.g., 115200)
    pub fn open(path: &str, baud_rate: u32) -> Result<Self> {
        let port = serialport::new(path, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(READ_POLL_TIMEOUT)
            .open()
            .map_err(|source| Error::TransportUnavailable { path: path.to_string(), source })?;

        tracing::info!("Opened serial port: {} at {} baud", path, baud_rate);

        Ok(SerialTransport { port, path: path.to_string() })
    }

    /// Split into independent read and write handles on the same device
    pub fn split(self) -> Result<(TransportReader, TransportWriter)> {
        let writer = self
            .port
            .try_clone()
            .map_err(|source| Error::TransportUnavailable { path: self.path.clone(), source })?;
        Ok((Box::new(self.port), Box::new(writer)))
    }
}

// ==============================================================================
// mock transport
// ==============================================================================

#[cfg(test)]
pub use mock::MockTransport;
