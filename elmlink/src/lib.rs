//! # elmlink
//!
//! A library for talking to ELM327-family OBD-II adapters.
//!
//! This crate drives the adapter's AT command dialect over a serial link:
//!
//! - Response framing on the `>` prompt
//! - Adapter initialization (reset, echo off, headers on, linefeeds off)
//! - Baud rate auto-detection
//! - Vehicle protocol negotiation with ordered fallback
//! - Low-power mode
//! - Splitting response lines into header and data bytes
//!
//! What the data bytes mean (RPM, temperatures, trouble codes) is up to the
//! caller.
//!
//! ## Supported Adapters
//!
//! - ELM327 v1.x and compatible clones (USB and Bluetooth SPP)
//! - STN11xx/STN22xx based adapters in ELM327 mode
//!
//! ## Features
//!
//! - `native` (default): Native serial port support
//! - `serde`: Serialization support for data types
//!
//! ## Example
//!
//! ```rust,no_run
//! use elmlink::{ConnectOptions, ConnectionStatus, Elm327};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     #[cfg(feature = "native")]
//!     {
//!         let options = ConnectOptions::new("/dev/ttyUSB0").with_protocol(Some("6".into()));
//!         let mut elm = Elm327::connect(&options);
//!
//!         match elm.status() {
//!             ConnectionStatus::CarConnected => {
//!                 if let Some(messages) = elm.send_and_parse("010C")? {
//!                     for message in messages {
//!                         println!("{:X?}: {:02X?}", message.tx_id, message.data);
//!                     }
//!                 }
//!             },
//!             status => println!("Stopped at {status}: {:?}", elm.last_error()),
//!         }
//!
//!         elm.close();
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod device;
pub mod elm327;
pub mod error;
pub mod frame;
pub mod host;
pub mod port;
pub mod protocol;
pub mod status;
pub mod transport;

#[cfg(test)]
mod test_support;

// Re-exports for convenience
#[cfg(feature = "native")]
pub use port::NativePort;
pub use {
    device::{DetectedPort, DeviceKind, TransportKind, format_port_list},
    elm327::{BAUD_CANDIDATES, ConnectOptions, Elm327, Negotiation, Timing},
    error::{Error, Result},
    host::{auto_detect_port, discover_adapter_ports, discover_ports},
    port::{Port, SerialConfig},
    protocol::{
        Decoder, DecoderFactory, Ecu, EcuDescriptor, FALLBACK_ORDER, HeaderDecoder, Message,
        ProtocolCode, ProtocolDescriptor, StandardDecoders,
    },
    status::{ConnectionStatus, PowerState},
    transport::Transport,
};
