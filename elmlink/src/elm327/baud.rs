//! Baud rate negotiation.
//!
//! Clones ship configured for anything from 9600 to 230400 baud. Each
//! candidate is tried by sending two DEL characters and a carriage return:
//! an adapter listening at that rate answers `?` followed by the prompt,
//! while at the wrong rate it produces line noise and never prints `>`.

use crate::error::Result;
use crate::frame::PROMPT;
use crate::port::{Port, is_pseudo_terminal};
use crate::transport::Transport;
use log::debug;
use std::time::Duration;

/// Rates tried during detection, most common first.
pub const BAUD_CANDIDATES: [u32; 6] = [38_400, 9_600, 230_400, 115_200, 57_600, 19_200];

const PROBE: &[u8] = b"\x7F\x7F\r";
const PROBE_READ_LIMIT: usize = 1024;

/// Apply `requested`, or detect the adapter's rate when it is `None`.
///
/// Returns `Ok(false)` when no candidate answered. Pseudo-terminals have no
/// real line rate, so detection is skipped there and reported as success.
pub fn negotiate_baud<P: Port>(
    transport: &mut Transport<P>,
    requested: Option<u32>,
    probe_timeout: Duration,
) -> Result<bool> {
    match requested {
        Some(rate) => {
            transport.set_baud_rate(rate)?;
            Ok(true)
        },
        None if is_pseudo_terminal(transport.name()) => {
            debug!("Detected pseudo terminal, skipping baudrate setup");
            Ok(true)
        },
        None => Ok(detect_baud_rate(transport, probe_timeout)?.is_some()),
    }
}

/// Scan [`BAUD_CANDIDATES`] and leave the port at the first rate that
/// produces a prompt.
///
/// The port timeout is lowered to `probe_timeout` for the scan and put
/// back afterwards, whether or not a rate was found.
pub fn detect_baud_rate<P: Port>(
    transport: &mut Transport<P>,
    probe_timeout: Duration,
) -> Result<Option<u32>> {
    let Some(timeout) = transport.timeout() else {
        return Err(crate::Error::Disconnected("configuring"));
    };
    transport.set_timeout(probe_timeout)?;

    let scan = scan(transport);

    if transport.is_open() {
        transport.set_timeout(timeout)?;
    }
    scan
}

fn scan<P: Port>(transport: &mut Transport<P>) -> Result<Option<u32>> {
    for baud in BAUD_CANDIDATES {
        transport.set_baud_rate(baud)?;
        transport.clear_buffers()?;
        transport.write(PROBE)?;

        let response = read_probe_response(transport)?;
        debug!(
            "Response from baud {baud}: {:?}",
            String::from_utf8_lossy(&response)
        );

        if response.last() == Some(&PROMPT) {
            debug!("Choosing baud {baud}");
            return Ok(Some(baud));
        }
    }

    debug!("Failed to choose baud");
    Ok(None)
}

fn read_probe_response<P: Port>(transport: &mut Transport<P>) -> Result<Vec<u8>> {
    let mut response = Vec::new();
    let mut buf = [0u8; PROBE_READ_LIMIT];

    while response.len() < PROBE_READ_LIMIT {
        let want = PROBE_READ_LIMIT - response.len();
        let n = transport.read(&mut buf[..want])?;
        if n == 0 {
            break;
        }
        response.extend_from_slice(&buf[..n]);
    }
    Ok(response)
}
