// rigbridge - Free and Open Source Software Statement
//
// This project, rigbridge, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/device/port.rs
// Version: 0.2.1
//
// This file abstracts the physical link under a device, located in the device
// subdirectory. A LinkOpener enumerates and opens ports; the serial opener is
// backed by tokio-serial.
//
// Tree Location:
// - src/device/port.rs (link opener trait and serial implementation)
// - Depends on: tokio, tokio-serial

use super::error::LinkError;
use log::debug;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_serial::SerialPortBuilderExt;

const LOG_TARGET: &str = "rigbridge::device::port";

/// Byte stream to a device
pub trait LinkPort: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> LinkPort for T {}

pub type BoxedPort = Box<dyn LinkPort>;

/// Enumerates and opens device links.
///
/// Both calls may block on the operating system. Callers run them on the
/// blocking thread pool, never on a runtime worker.
pub trait LinkOpener: Send + Sync {
    /// Names of the ports currently present on the system
    fn available_ports(&self) -> Result<Vec<String>, LinkError>;

    /// Open `port` at `baud_rate`
    fn open(&self, port: &str, baud_rate: u32) -> Result<BoxedPort, LinkError>;
}

/// Opens real serial ports (/dev/tty*, COM*)
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialOpener;

impl LinkOpener for SerialOpener {
    fn available_ports(&self) -> Result<Vec<String>, LinkError> {
        let ports = tokio_serial::available_ports()
            .map_err(|e| LinkError::Enumerate(e.to_string()))?;
        Ok(ports.into_iter().map(|p| p.port_name).collect())
    }

    fn open(&self, port: &str, baud_rate: u32) -> Result<BoxedPort, LinkError> {
        debug!(target: LOG_TARGET, "Opening {} at {} baud", port, baud_rate);
        let stream = tokio_serial::new(port, baud_rate)
            .open_native_async()
            .map_err(|e| LinkError::Open {
                port: port.to_string(),
                source: e.into(),
            })?;
        Ok(Box::new(stream))
    }
}

// Changelog:
// - v0.2.1 (2026-10-18): Documented that enumeration and open may block.
// - v0.2.0 (2026-10-10): LinkOpener trait so links can be swapped in tests.
// - v0.1.0 (2026-10-02): Serial port enumeration and open.
