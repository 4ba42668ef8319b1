//! Response framing.
//!
//! The adapter has no length prefix. A response is everything up to the
//! `>` prompt, or up to `OK` when the adapter acknowledges `ATLP` without
//! printing a prompt. The raw bytes are then cleaned into text lines.

use crate::error::Result;
use crate::port::Port;
use crate::transport::Transport;
use log::{debug, warn};

/// Prompt printed when the adapter is ready for the next command.
pub const PROMPT: u8 = b'>';

/// Marker that also ends a frame (low-power acknowledgment).
pub const OK_MARKER: &[u8] = b"OK";

const READ_CHUNK: usize = 1024;

/// Whether `buffer` holds a complete frame.
pub fn is_complete(buffer: &[u8]) -> bool {
    buffer.contains(&PROMPT)
        || buffer
            .windows(OK_MARKER.len())
            .any(|w| w == OK_MARKER)
}

/// Read one response frame.
///
/// Stops at the prompt, at `OK`, or when a read yields nothing. The last
/// case is logged and returns whatever arrived so far, possibly nothing.
pub fn read_frame<P: Port>(transport: &mut Transport<P>) -> Result<Vec<String>> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        let n = transport.read(&mut chunk)?;
        if n == 0 {
            warn!("Failed to read port");
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);
        if is_complete(&buffer) {
            break;
        }
    }

    let lines = parse_lines(&buffer);
    debug!("read: {lines:?}");
    Ok(lines)
}

/// Turn raw frame bytes into trimmed, non-empty lines.
///
/// NUL bytes are dropped (some clones emit them on reset), the frame ends
/// at the first prompt and invalid UTF-8 is skipped.
pub fn parse_lines(raw: &[u8]) -> Vec<String> {
    let bytes: Vec<u8> = raw
        .iter()
        .copied()
        .take_while(|&b| b != PROMPT)
        .filter(|&b| b != 0)
        .collect();

    let text = String::from_utf8_lossy(&bytes).replace(char::REPLACEMENT_CHARACTER, "");
    text.split(['\r', '\n'])
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(ToString::to_string)
        .collect()
}
