//! The ELM327 connection engine.
//!
//! [`Elm327`] owns the transport and drives the adapter through its
//! connection stages:
//!
//! ```text
//! open port -> (wake) -> baud -> ATZ/ATE0/ATH1/ATL0 -> (AT RV) -> protocol
//!   NotConnected ............... ElmConnected ... ObdConnected  CarConnected
//! ```
//!
//! A failed stage stops the sequence at the status reached so far. The
//! handle is returned either way; [`Elm327::status`] tells the caller how
//! far it got and [`Elm327::last_error`] why it stopped.
//!
//! ## Example
//!
//! ```rust,no_run
//! use elmlink::{ConnectOptions, ConnectionStatus, Elm327};
//!
//! let mut elm = Elm327::connect(&ConnectOptions::new("/dev/ttyUSB0"));
//! if elm.status() == ConnectionStatus::CarConnected {
//!     if let Ok(Some(messages)) = elm.send_and_parse("0100") {
//!         for message in messages {
//!             println!("{:?}: {:02X?}", message.ecu, message.data);
//!         }
//!     }
//! }
//! elm.close();
//! ```

mod baud;
mod handshake;
mod negotiate;
mod power;

pub use baud::{BAUD_CANDIDATES, detect_baud_rate, negotiate_baud};
pub use handshake::{MIN_VOLTAGE, parse_voltage};
pub use negotiate::Negotiation;

use crate::error::{Error, Result};
use crate::frame::read_frame;
use crate::port::Port;
use crate::protocol::{
    Decoder, DecoderFactory, EcuDescriptor, HeaderDecoder, Message, ProtocolCode,
    ProtocolDescriptor, StandardDecoders,
};
use crate::status::{ConnectionStatus, PowerState};
use crate::transport::Transport;
use log::{debug, error, info};
use std::thread;
use std::time::{Duration, Instant};

/// Delays used when talking to the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Timing {
    /// Settle time after each initialization command.
    pub command_delay: Duration,
    /// Longest time to wait for a non-empty response, counted from the write.
    pub response_ceiling: Duration,
    /// Pause between reads while the response is still empty.
    pub poll_interval: Duration,
    /// Time the adapter needs to wake from low power at connect.
    pub wake_delay: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            command_delay: Duration::from_secs(1),
            response_ceiling: Duration::from_secs(1),
            poll_interval: Duration::from_millis(100),
            wake_delay: Duration::from_secs(1),
        }
    }
}

/// Default timeout for a single baud probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(100);

/// Everything [`Elm327::connect`] needs.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Port name/path.
    pub port: String,
    /// Fixed baud rate, `None` to detect it.
    pub baud: Option<u32>,
    /// Protocol code (`"1"`..`"9"`, `"A"`), `None` for automatic.
    pub protocol: Option<String>,
    /// Read timeout for each baud probe.
    pub probe_timeout: Duration,
    /// Read timeout for normal traffic.
    pub read_timeout: Duration,
    /// Check the OBD socket voltage before negotiating a protocol.
    pub check_voltage: bool,
    /// Wake the adapter before anything else.
    pub start_low_power: bool,
    /// Engine delays.
    pub timing: Timing,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud: None,
            protocol: None,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            read_timeout: crate::port::DEFAULT_READ_TIMEOUT,
            check_voltage: true,
            start_low_power: false,
            timing: Timing::default(),
        }
    }
}

impl ConnectOptions {
    /// Options for `port` with automatic baud and protocol.
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            ..Default::default()
        }
    }

    /// Use a fixed baud rate.
    #[must_use]
    pub fn with_baud(mut self, baud: Option<u32>) -> Self {
        self.baud = baud;
        self
    }

    /// Use a fixed protocol code.
    #[must_use]
    pub fn with_protocol(mut self, protocol: Option<String>) -> Self {
        self.protocol = protocol;
        self
    }

    /// Set the baud probe timeout.
    #[must_use]
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Set the normal read timeout.
    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Enable or disable the voltage check.
    #[must_use]
    pub fn with_voltage_check(mut self, check: bool) -> Self {
        self.check_voltage = check;
        self
    }

    /// Wake the adapter from low power when connecting.
    #[must_use]
    pub fn with_start_low_power(mut self, start_low_power: bool) -> Self {
        self.start_low_power = start_low_power;
        self
    }

    /// Replace the engine delays.
    #[must_use]
    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }
}

/// Connection to an ELM327 adapter.
///
/// Every exchange takes `&mut self`, so only one command is ever in flight.
pub struct Elm327<P: Port> {
    transport: Transport<P>,
    status: ConnectionStatus,
    /// Highest status reached before protocol negotiation.
    adapter_status: ConnectionStatus,
    protocol: Option<ProtocolDescriptor>,
    unknown: HeaderDecoder,
    decoders: Box<dyn DecoderFactory>,
    power: PowerState,
    timing: Timing,
    last_error: Option<Error>,
}

#[cfg(feature = "native")]
impl Elm327<crate::port::NativePort> {
    /// Open `options.port` and run the full connection sequence.
    ///
    /// Always returns a handle; check [`status`](Self::status).
    pub fn connect(options: &ConnectOptions) -> Self {
        let config = crate::port::SerialConfig::new(
            &options.port,
            options
                .baud
                .unwrap_or(crate::port::DEFAULT_BAUD),
        )
        .with_timeout(options.read_timeout);

        log_start(options);
        match Transport::open(&config) {
            Ok(transport) => {
                let mut elm = Self::from_transport(transport, options, Box::new(StandardDecoders));
                elm.establish(options);
                elm
            },
            Err(e) => {
                error!("{e}");
                let mut elm = Self::from_transport(
                    Transport::closed(&options.port),
                    options,
                    Box::new(StandardDecoders),
                );
                elm.last_error = Some(e);
                elm
            },
        }
    }
}

impl<P: Port> Elm327<P> {
    /// Run the connection sequence over an already opened port.
    pub fn connect_with_port(port: P, options: &ConnectOptions) -> Self {
        Self::connect_with_decoders(port, options, Box::new(StandardDecoders))
    }

    /// Like [`connect_with_port`](Self::connect_with_port), with custom
    /// message decoders.
    pub fn connect_with_decoders(
        port: P,
        options: &ConnectOptions,
        decoders: Box<dyn DecoderFactory>,
    ) -> Self {
        log_start(options);
        let mut elm = Self::from_transport(Transport::new(port), options, decoders);
        elm.establish(options);
        elm
    }

    fn from_transport(
        transport: Transport<P>,
        options: &ConnectOptions,
        decoders: Box<dyn DecoderFactory>,
    ) -> Self {
        Self {
            transport,
            status: ConnectionStatus::NotConnected,
            adapter_status: ConnectionStatus::NotConnected,
            protocol: None,
            unknown: HeaderDecoder::unknown(),
            decoders,
            power: PowerState::Active,
            timing: options.timing,
            last_error: None,
        }
    }

    fn establish(&mut self, options: &ConnectOptions) {
        if let Err(e) = self.initialize(options) {
            self.abort(e);
            return;
        }

        if options.check_voltage {
            match self.check_voltage() {
                Ok(volts) => debug!("Adapter reports {volts:.1} V"),
                Err(e) if e.is_fatal() => {
                    self.abort(e);
                    return;
                },
                Err(e) => {
                    error!("{e}");
                    self.last_error = Some(e);
                    return;
                },
            }
        }

        if self.set_protocol(
            options
                .protocol
                .as_deref(),
        ) {
            info!(
                "Connected Successfully: PORT={} BAUD={} PROTOCOL={}",
                self.port_name(),
                self.baud_rate()
                    .unwrap_or_default(),
                self.protocol_id()
                    .map_or("?", ProtocolCode::as_str)
            );
        } else if self.status == ConnectionStatus::ObdConnected {
            error!("Adapter connected, but the ignition is off");
        } else if self.status == ConnectionStatus::ElmConnected {
            error!("Connected to the adapter, but failed to connect to the vehicle");
        }
    }

    /// Wake, baud and handshake. Any failure here leaves nothing usable.
    fn initialize(&mut self, options: &ConnectOptions) -> Result<()> {
        if options.start_low_power {
            self.transport
                .write_command(b" ")?;
            thread::sleep(
                self.timing
                    .wake_delay,
            );
        }

        if !negotiate_baud(&mut self.transport, options.baud, options.probe_timeout)? {
            return Err(Error::BaudNotDetected);
        }

        self.handshake()
    }

    /// Record a fatal connection failure and release the port.
    fn abort(&mut self, e: Error) {
        self.close();
        error!("{e}");
        self.last_error = Some(e);
    }

    /// Send a command and decode the response with the active protocol.
    ///
    /// Returns `Ok(None)` when not connected. An I/O fault drops the
    /// connection and is returned as [`Error::Disconnected`].
    pub fn send_and_parse(&mut self, command: &str) -> Result<Option<Vec<Message>>> {
        if self.status == ConnectionStatus::NotConnected {
            info!("cannot send_and_parse() when unconnected");
            return Ok(None);
        }

        if self.power == PowerState::LowPower {
            self.exit_low_power()?;
        }

        let lines = self.send(command.as_bytes(), None)?;
        Ok(Some(
            self.decoder()
                .decode(&lines),
        ))
    }

    /// Write `cmd` and wait for its response frame.
    ///
    /// After the optional `delay`, reads are repeated every poll interval
    /// while the frame is empty, until the response ceiling (measured from
    /// the write) runs out.
    fn send(&mut self, cmd: &[u8], delay: Option<Duration>) -> Result<Vec<String>> {
        let result = self.exchange(cmd, delay);
        if matches!(&result, Err(e) if e.is_fatal()) {
            self.status = ConnectionStatus::NotConnected;
            self.adapter_status = ConnectionStatus::NotConnected;
            self.protocol = None;
            self.power = PowerState::Active;
        }
        result
    }

    fn exchange(&mut self, cmd: &[u8], delay: Option<Duration>) -> Result<Vec<String>> {
        debug!("write: {:?}", String::from_utf8_lossy(cmd));
        self.transport
            .write_command(cmd)?;
        let deadline = Instant::now()
            + self
                .timing
                .response_ceiling;

        if let Some(delay) = delay {
            debug!("wait: {delay:?}");
            thread::sleep(delay);
        }

        let mut lines = read_frame(&mut self.transport)?;
        while lines.is_empty() && Instant::now() < deadline {
            debug!("no response; wait: {:?}", self.timing.poll_interval);
            thread::sleep(
                self.timing
                    .poll_interval,
            );
            lines = read_frame(&mut self.transport)?;
        }
        Ok(lines)
    }

    fn decoder(&self) -> &dyn Decoder {
        self.protocol
            .as_ref()
            .map_or(&self.unknown as &dyn Decoder, ProtocolDescriptor::decoder)
    }

    /// Reset the adapter and release the port.
    ///
    /// The reset is best effort; the port is released even if it fails.
    pub fn close(&mut self) {
        self.status = ConnectionStatus::NotConnected;
        self.adapter_status = ConnectionStatus::NotConnected;
        self.protocol = None;
        self.power = PowerState::Active;

        if self
            .transport
            .is_open()
        {
            info!("closing port");
            if let Err(e) = self
                .transport
                .write_command(b"ATZ")
            {
                debug!("reset on close failed: {e}");
            }
            self.transport
                .close();
        }
    }

    /// Current connection status.
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Port name/path, empty once the port has been released.
    pub fn port_name(&self) -> &str {
        self.transport
            .name()
    }

    /// Current link baud rate, if the port is open.
    pub fn baud_rate(&self) -> Option<u32> {
        self.transport
            .baud_rate()
    }

    /// Name of the negotiated protocol, `"Unknown"` before negotiation.
    pub fn protocol_name(&self) -> &'static str {
        self.protocol
            .as_ref()
            .map_or("Unknown", ProtocolDescriptor::name)
    }

    /// Code of the negotiated protocol.
    pub fn protocol_id(&self) -> Option<ProtocolCode> {
        self.protocol
            .as_ref()
            .map(ProtocolDescriptor::code)
    }

    /// Negotiated protocol, if any.
    pub fn protocol(&self) -> Option<&ProtocolDescriptor> {
        self.protocol
            .as_ref()
    }

    /// ECUs that answered the protocol probe.
    pub fn ecus(&self) -> Vec<EcuDescriptor> {
        self.protocol
            .as_ref()
            .map(ProtocolDescriptor::ecus)
            .unwrap_or_default()
    }

    /// Tracked adapter power state.
    pub fn power_state(&self) -> PowerState {
        self.power
    }

    /// Why the last connection step or negotiation failed.
    pub fn last_error(&self) -> Option<&Error> {
        self.last_error
            .as_ref()
    }

    /// Delays in use.
    pub fn timing(&self) -> Timing {
        self.timing
    }

    /// Borrow the underlying port, `None` once released.
    pub fn port(&self) -> Option<&P> {
        self.transport
            .port()
    }
}

impl<P: Port> std::fmt::Debug for Elm327<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Elm327")
            .field("port", &self.port_name())
            .field("status", &self.status)
            .field("protocol", &self.protocol)
            .field("power", &self.power)
            .finish_non_exhaustive()
    }
}

fn log_start(options: &ConnectOptions) {
    info!(
        "Initializing ELM327: PORT={} BAUD={} PROTOCOL={}",
        options.port,
        options
            .baud
            .map_or_else(|| "auto".to_string(), |b| b.to_string()),
        options
            .protocol
            .as_deref()
            .unwrap_or("auto")
    );
}

/// Whether any line contains `text`.
fn has_message(lines: &[String], text: &str) -> bool {
    lines
        .iter()
        .any(|line| line.contains(text))
}
