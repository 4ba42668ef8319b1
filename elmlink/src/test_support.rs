//! Scripted ELM327 used by the unit tests.
//!
//! [`SimulatedAdapter`] implements [`Port`] and answers the AT dialect the
//! way a v1.5 clone does: echo on after reset, `OK` acknowledgments, a `>`
//! prompt after every reply, a bare `OK` for `ATLP`, and silence at the
//! wrong baud rate. Individual replies can be overridden per command.

use crate::elm327::Timing;
use crate::error::Result;
use crate::port::Port;
use crate::protocol::ProtocolCode;
use std::collections::{HashMap, VecDeque};
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Probe reply from a single 11-bit CAN engine ECU.
pub(crate) const CAN_PROBE: &str = "7E8 06 41 00 BE 3F A8 13";

/// Route engine logs through the test harness. Run with `RUST_LOG=debug`
/// to see the command traffic of a failing test.
pub(crate) fn init_logging() {
    let _ = env_logger::builder()
        .is_test(true)
        .try_init();
}

/// Timing with no settle delays and a short response ceiling.
pub(crate) fn fast_timing() -> Timing {
    Timing {
        command_delay: Duration::ZERO,
        response_ceiling: Duration::from_millis(30),
        poll_interval: Duration::from_millis(1),
        wake_delay: Duration::ZERO,
    }
}

enum Reply {
    Text(String),
    LowPowerAck,
    Silent,
}

pub(crate) struct SimulatedAdapter {
    name: String,
    baud_rate: u32,
    adapter_baud: u32,
    timeout: Duration,
    echo: bool,
    low_power: bool,
    selected: Option<ProtocolCode>,
    vehicle: Option<ProtocolCode>,
    voltage: String,
    probe: String,
    manual_unreachable: bool,
    overrides: HashMap<String, String>,
    pending: VecDeque<u8>,
    line: Vec<u8>,
    written: Vec<u8>,
    commands: Arc<Mutex<Vec<String>>>,
    bauds: Vec<u32>,
    timeouts: Vec<Duration>,
    chunk: usize,
    stall_reads: usize,
    stalls_left: usize,
    writes_left: Option<usize>,
    fail_reads: bool,
}

impl SimulatedAdapter {
    /// Adapter at 38400 baud wired to an 11-bit/500k CAN vehicle.
    pub(crate) fn new() -> Self {
        Self {
            name: "/dev/ttySIM0".to_string(),
            baud_rate: 38_400,
            adapter_baud: 38_400,
            timeout: Duration::from_secs(20),
            echo: true,
            low_power: false,
            selected: None,
            vehicle: Some(ProtocolCode::Iso15765_11bit500k),
            voltage: "12.6V".to_string(),
            probe: CAN_PROBE.to_string(),
            manual_unreachable: false,
            overrides: HashMap::new(),
            pending: VecDeque::new(),
            line: Vec::new(),
            written: Vec::new(),
            commands: Arc::default(),
            bauds: Vec::new(),
            timeouts: Vec::new(),
            chunk: 8,
            stall_reads: 0,
            stalls_left: 0,
            writes_left: None,
            fail_reads: false,
        }
    }

    pub(crate) fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// The rate the adapter listens at; the host side starts at `host`.
    pub(crate) fn listening_at(mut self, adapter: u32, host: u32) -> Self {
        self.adapter_baud = adapter;
        self.baud_rate = host;
        self
    }

    /// Protocol the vehicle speaks, `None` for ignition off.
    pub(crate) fn vehicle(mut self, protocol: Option<ProtocolCode>) -> Self {
        self.vehicle = protocol;
        self
    }

    pub(crate) fn voltage(mut self, reply: &str) -> Self {
        self.voltage = reply.to_string();
        self
    }

    pub(crate) fn probe_reply(mut self, reply: &str) -> Self {
        self.probe = reply.to_string();
        self
    }

    /// The vehicle only answers while the adapter searches automatically.
    pub(crate) fn only_auto_search(mut self) -> Self {
        self.manual_unreachable = true;
        self
    }

    /// Fixed reply for `cmd`; `\n` separates lines.
    pub(crate) fn respond(mut self, cmd: &str, reply: &str) -> Self {
        self.overrides
            .insert(cmd.to_string(), reply.to_string());
        self
    }

    /// Time out this many reads before each reply becomes readable.
    pub(crate) fn stall_reads(mut self, reads: usize) -> Self {
        self.stall_reads = reads;
        self
    }

    pub(crate) fn fail_after_writes(mut self, writes: usize) -> Self {
        self.writes_left = Some(writes);
        self
    }

    pub(crate) fn fail_reads(mut self) -> Self {
        self.fail_reads = true;
        self
    }

    pub(crate) fn raw_written(&self) -> &[u8] {
        &self.written
    }

    /// Every CR-terminated command received, without the terminator.
    pub(crate) fn commands(&self) -> Vec<String> {
        self.commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Shared view of the command log that outlives the port.
    pub(crate) fn command_log(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.commands)
    }

    /// Every baud rate the host switched to, in order.
    pub(crate) fn baud_history(&self) -> &[u32] {
        &self.bauds
    }

    pub(crate) fn timeout_history(&self) -> &[Duration] {
        &self.timeouts
    }

    pub(crate) fn is_low_power(&self) -> bool {
        self.low_power
    }

    fn handle_command(&mut self) {
        let raw = String::from_utf8_lossy(&self.line).into_owned();
        self.line
            .clear();
        self.commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(raw.clone());

        if self.baud_rate != self.adapter_baud {
            // Framing errors at the wrong rate, never a prompt
            self.pending
                .extend([0xF0, 0x1C, 0x00, 0x8E]);
            return;
        }

        if self.low_power && !raw.starts_with(' ') {
            return;
        }
        self.low_power = false;

        if self.echo {
            self.pending
                .extend(raw.as_bytes());
            self.pending
                .push_back(b'\r');
        }

        let cmd = raw.trim();
        let reply = match self
            .overrides
            .get(cmd)
            .cloned()
        {
            // An overridden ATLP is an adapter that refuses to sleep
            Some(text) if cmd == "ATLP" => Reply::Text(text),
            Some(text) => {
                self.execute(cmd);
                Reply::Text(text)
            },
            None => self.execute(cmd),
        };

        match reply {
            Reply::Text(text) => {
                for line in text.split('\n') {
                    self.pending
                        .extend(line.as_bytes());
                    self.pending
                        .push_back(b'\r');
                }
                self.pending
                    .extend(b"\r>");
            },
            Reply::LowPowerAck => self
                .pending
                .extend(b"OK\r"),
            Reply::Silent => {},
        }
        self.stalls_left = self.stall_reads;
    }

    fn execute(&mut self, cmd: &str) -> Reply {
        let ok = || Reply::Text("OK".to_string());
        match cmd {
            "" => Reply::Text(String::new()),
            "\u{7f}\u{7f}" => Reply::Text("?".to_string()),
            "ATZ" => {
                self.echo = true;
                self.selected = None;
                Reply::Text("\nELM327 v1.5".to_string())
            },
            "ATE0" => {
                self.echo = false;
                ok()
            },
            "ATE1" => {
                self.echo = true;
                ok()
            },
            "ATH0" | "ATH1" | "ATL0" | "ATL1" => ok(),
            "AT RV" | "ATRV" => Reply::Text(self.voltage.clone()),
            "ATLP" => {
                self.low_power = true;
                Reply::LowPowerAck
            },
            "ATDPN" => Reply::Text(match (self.vehicle, self.selected) {
                (Some(vehicle), None) => format!("A{vehicle}"),
                (_, Some(selected)) => selected.to_string(),
                (None, None) => "0".to_string(),
            }),
            "ATSP0" => {
                self.selected = None;
                ok()
            },
            "0100" => {
                let reachable = self
                    .vehicle
                    .is_some_and(|v| match self.selected {
                        None => true,
                        Some(s) => s == v && !self.manual_unreachable,
                    });
                let reply = if reachable {
                    self.probe.clone()
                } else {
                    "UNABLE TO CONNECT".to_string()
                };
                if self.selected.is_none() {
                    Reply::Text(format!("SEARCHING...\n{reply}"))
                } else {
                    Reply::Text(reply)
                }
            },
            _ => {
                if let Some(code) = cmd
                    .strip_prefix("ATTP")
                    .or_else(|| cmd.strip_prefix("ATSP"))
                {
                    return match ProtocolCode::from_code(code) {
                        Some(code) => {
                            self.selected = Some(code);
                            ok()
                        },
                        None => Reply::Text("?".to_string()),
                    };
                }
                if cmd.starts_with("AT") {
                    Reply::Text("?".to_string())
                } else if self.vehicle.is_some() {
                    Reply::Text("NO DATA".to_string())
                } else {
                    Reply::Silent
                }
            },
        }
    }
}

impl Read for SimulatedAdapter {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.fail_reads {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "cable pulled"));
        }
        if self
            .pending
            .is_empty()
        {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
        }
        if self.stalls_left > 0 {
            self.stalls_left -= 1;
            return Err(io::Error::new(io::ErrorKind::TimedOut, "stalled"));
        }
        let n = buf
            .len()
            .min(self.chunk)
            .min(
                self.pending
                    .len(),
            );
        for (slot, byte) in buf
            .iter_mut()
            .zip(
                self.pending
                    .drain(..n),
            )
        {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for SimulatedAdapter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(left) = self.writes_left.as_mut() {
            if *left == 0 {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "cable pulled"));
            }
            *left -= 1;
        }
        self.written
            .extend_from_slice(buf);
        for &byte in buf {
            if byte == b'\r' {
                self.handle_command();
            } else {
                self.line
                    .push(byte);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Port for SimulatedAdapter {
    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.timeouts
            .push(timeout);
        self.timeout = timeout;
        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()> {
        self.bauds
            .push(baud_rate);
        self.baud_rate = baud_rate;
        Ok(())
    }

    fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    fn clear_input(&mut self) -> Result<()> {
        self.pending
            .clear();
        Ok(())
    }

    fn clear_buffers(&mut self) -> Result<()> {
        self.pending
            .clear();
        self.line
            .clear();
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
