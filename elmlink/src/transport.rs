//! Byte transport between the host and the adapter.
//!
//! [`Transport`] wraps a [`Port`] and enforces the fault policy: any I/O
//! error during a write or a read (other than a timeout) is fatal. The port
//! is released and the caller receives [`Error::Disconnected`]. A timed-out
//! read is not a fault, it simply yields no bytes.

use crate::error::{Error, Result};
use crate::port::Port;
use log::{error, info, trace};
use std::io::ErrorKind;
use std::time::Duration;

/// Terminator appended to every command.
pub const COMMAND_TERMINATOR: u8 = b'\r';

/// Owned connection to the adapter.
pub struct Transport<P: Port> {
    port: Option<P>,
    name: String,
}

impl<P: Port> Transport<P> {
    /// Wrap an already opened port.
    pub fn new(port: P) -> Self {
        let name = port
            .name()
            .to_string();
        Self {
            port: Some(port),
            name,
        }
    }

    /// A transport whose port could not be opened.
    pub fn closed(name: impl Into<String>) -> Self {
        Self {
            port: None,
            name: name.into(),
        }
    }

    /// Whether the port is still held.
    pub fn is_open(&self) -> bool {
        self.port
            .is_some()
    }

    /// Port name/path, empty once the port has been released.
    pub fn name(&self) -> &str {
        if self.is_open() { &self.name } else { "" }
    }

    /// Borrow the underlying port.
    pub fn port(&self) -> Option<&P> {
        self.port
            .as_ref()
    }

    /// Write a command, appending the carriage-return terminator.
    pub fn write_command(&mut self, cmd: &[u8]) -> Result<()> {
        let mut data = Vec::with_capacity(cmd.len() + 1);
        data.extend_from_slice(cmd);
        data.push(COMMAND_TERMINATOR);
        self.write(&data)
    }

    /// Discard pending input, then write and flush `data`.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        let Some(port) = self
            .port
            .as_mut()
        else {
            info!("cannot write when unconnected");
            return Err(Error::Disconnected("writing"));
        };

        trace!("write: {:?}", String::from_utf8_lossy(data));

        let result = port
            .clear_input()
            .and_then(|()| port.write_all_bytes(data));

        if let Err(e) = result {
            error!("Device disconnected while writing: {e}");
            self.release();
            return Err(Error::Disconnected("writing"));
        }
        Ok(())
    }

    /// Read whatever arrives within the port timeout.
    ///
    /// Returns `Ok(0)` on timeout.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let Some(port) = self
            .port
            .as_mut()
        else {
            info!("cannot read when unconnected");
            return Err(Error::Disconnected("reading"));
        };

        match port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => Ok(0),
            Err(e) if e.kind() == ErrorKind::Interrupted => Ok(0),
            Err(e) => {
                error!("Device disconnected while reading: {e}");
                self.release();
                Err(Error::Disconnected("reading"))
            },
        }
    }

    /// Change the link baud rate.
    pub fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()> {
        self.with_port("configuring", |p| p.set_baud_rate(baud_rate))
    }

    /// Current link baud rate, if the port is open.
    pub fn baud_rate(&self) -> Option<u32> {
        self.port
            .as_ref()
            .map(Port::baud_rate)
    }

    /// Change the read timeout.
    pub fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.with_port("configuring", |p| p.set_timeout(timeout))
    }

    /// Current read timeout, if the port is open.
    pub fn timeout(&self) -> Option<Duration> {
        self.port
            .as_ref()
            .map(Port::timeout)
    }

    /// Discard pending input and unsent output.
    pub fn clear_buffers(&mut self) -> Result<()> {
        self.with_port("flushing", Port::clear_buffers)
    }

    /// Release the port.
    pub fn close(&mut self) {
        if self.is_open() {
            info!("closing port {}", self.name);
            self.release();
        }
    }

    fn with_port<F>(&mut self, action: &'static str, f: F) -> Result<()>
    where
        F: FnOnce(&mut P) -> Result<()>,
    {
        let Some(port) = self
            .port
            .as_mut()
        else {
            return Err(Error::Disconnected(action));
        };
        if let Err(e) = f(port) {
            error!("Device disconnected while {action}: {e}");
            self.release();
            return Err(Error::Disconnected(action));
        }
        Ok(())
    }

    fn release(&mut self) {
        if let Some(mut port) = self
            .port
            .take()
        {
            let _ = port.close();
        }
    }
}

#[cfg(feature = "native")]
impl Transport<crate::port::NativePort> {
    /// Open a native serial port.
    pub fn open(config: &crate::port::SerialConfig) -> Result<Self> {
        crate::port::NativePort::open(config).map(Self::new)
    }
}
