//! Port abstraction for serial communication with the adapter.
//!
//! The engine never talks to the `serialport` crate directly. It drives a
//! [`Port`], which lets the same handshake and negotiation code run against
//! a real adapter or a scripted one.
//!
//! ```text
//! +------------------+
//! |   Elm327 engine  |
//! +--------+---------+
//!          |
//!          v
//! +--------+---------+
//! |    Transport     |   fault handling, CR framing
//! +--------+---------+
//!          |
//!          v
//! +--------+---------+
//! |    Port trait    |
//! +--------+---------+
//!          |
//!          v
//! +--------+---------+
//! | Native SerialPort|
//! |   (serialport)   |
//! +------------------+
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use elmlink::port::Port;
//!
//! fn example<P: Port>(port: &mut P) -> elmlink::Result<()> {
//!     port.write_all_bytes(b"ATI\r")?;
//!
//!     let mut buf = [0u8; 64];
//!     let n = port.read(&mut buf)?;
//!     println!("Received: {:?}", &buf[..n]);
//!
//!     Ok(())
//! }
//! ```

#[cfg(feature = "native")]
pub mod native;

use std::io::{Read, Write};
use std::time::Duration;

use crate::error::Result;

/// Baud rate most ELM327 clones boot at.
pub const DEFAULT_BAUD: u32 = 38_400;

/// Read timeout used for normal command/response traffic.
///
/// Some adapters take several seconds to answer the first vehicle query
/// while they search for a protocol.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(20);

/// Serial port configuration.
///
/// Adapters are always driven 8N1 without flow control, so only the
/// parameters that actually vary are configurable.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Port name/path (e.g., "/dev/ttyUSB0", "COM3").
    pub port_name: String,
    /// Baud rate the port is opened at.
    pub baud_rate: u32,
    /// Read/write timeout.
    pub timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: DEFAULT_BAUD,
            timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

impl SerialConfig {
    /// Create a new configuration with port name and baud rate.
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            ..Default::default()
        }
    }

    /// Set the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Serial device the engine can drive.
///
/// `read` follows the `serialport` convention: it blocks for at most
/// [`timeout`](Port::timeout) and reports an empty line with
/// `io::ErrorKind::TimedOut`.
pub trait Port: Read + Write + Send {
    /// Set the read/write timeout.
    fn set_timeout(&mut self, timeout: Duration) -> Result<()>;

    /// Get the current timeout.
    fn timeout(&self) -> Duration;

    /// Set the baud rate.
    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()>;

    /// Get the current baud rate.
    fn baud_rate(&self) -> u32;

    /// Discard bytes received but not yet read.
    fn clear_input(&mut self) -> Result<()>;

    /// Discard both pending input and unsent output.
    fn clear_buffers(&mut self) -> Result<()>;

    /// Get the port name/path.
    fn name(&self) -> &str;

    /// Close the port and release resources.
    ///
    /// After calling this method, the port cannot be used for further I/O.
    fn close(&mut self) -> Result<()>;

    /// Write all bytes, blocking until complete.
    fn write_all_bytes(&mut self, buf: &[u8]) -> Result<()> {
        std::io::Write::write_all(self, buf)?;
        std::io::Write::flush(self)?;
        Ok(())
    }
}

/// Whether the port is a pseudo-terminal.
///
/// Pseudo-terminals (simulators such as `obdsim`) have no clocked link, so
/// baud detection is pointless there.
pub fn is_pseudo_terminal(name: &str) -> bool {
    name.starts_with("/dev/pts")
}

#[cfg(feature = "native")]
pub use native::NativePort;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_config_default() {
        let config = SerialConfig::default();
        assert_eq!(config.baud_rate, 38_400);
        assert_eq!(config.timeout, Duration::from_secs(20));
        assert!(config.port_name.is_empty());
    }

    #[test]
    fn test_serial_config_builder() {
        let config = SerialConfig::new("/dev/ttyUSB0", 115_200).with_timeout(Duration::from_secs(5));

        assert_eq!(config.port_name, "/dev/ttyUSB0");
        assert_eq!(config.baud_rate, 115_200);
        assert_eq!(config.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_pseudo_terminal_detection() {
        assert!(is_pseudo_terminal("/dev/pts/3"));
        assert!(!is_pseudo_terminal("/dev/ttyUSB0"));
        assert!(!is_pseudo_terminal("COM3"));
    }
}
