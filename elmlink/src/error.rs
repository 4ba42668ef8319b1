//! Error types for elmlink.

use std::io;
use thiserror::Error;

/// Result type for elmlink operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for elmlink operations.
///
/// Only [`Error::PortOpen`] and [`Error::Disconnected`] ever escape from the
/// engine's public operations. The negotiation variants are recorded as the
/// engine's [`last_error`](crate::Elm327::last_error) and reflected in its
/// [`ConnectionStatus`](crate::ConnectionStatus).
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (serial port, file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// The serial port could not be opened (missing or busy).
    #[error("Failed to open port {port}: {reason}")]
    PortOpen {
        /// Port name/path that was requested.
        port: String,
        /// Reason reported by the operating system.
        reason: String,
    },

    /// The adapter went away in the middle of an exchange.
    #[error("Device disconnected while {0}")]
    Disconnected(&'static str),

    /// No candidate baud rate produced a prompt.
    #[error("Failed to detect adapter baud rate")]
    BaudNotDetected,

    /// An initialization command was not acknowledged.
    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    /// `AT RV` did not return a readable voltage.
    #[error("Unreadable voltage response: {0:?}")]
    VoltageUnreadable(Vec<String>),

    /// Supply voltage is too low for the OBD socket to be powered.
    #[error("Voltage too low ({0:.1} V), OBD socket not connected")]
    VoltageTooLow(f32),

    /// A protocol code outside the supported set was requested.
    #[error("{0:?} is not a valid protocol, use \"1\" through \"A\"")]
    UnsupportedProtocol(String),

    /// Neither manual nor automatic negotiation reached the vehicle.
    #[error("Failed to determine vehicle protocol")]
    ProtocolNotFound,

    /// No suitable serial device was found.
    #[error("No serial adapter found")]
    DeviceNotFound,

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether this error means the port has been released.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Disconnected(_) | Self::PortOpen { .. })
    }
}
