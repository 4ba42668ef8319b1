//! Host-side utilities for serial port discovery.

use crate::device::DetectedPort;

/// Discover all available serial ports.
#[must_use]
pub fn discover_ports() -> Vec<DetectedPort> {
    crate::device::detect_ports()
}

/// Discover serial ports that are likely ELM327 adapters.
#[must_use]
pub fn discover_adapter_ports() -> Vec<DetectedPort> {
    crate::device::detect_adapter_ports()
}

/// Auto-detect a single best adapter port.
pub fn auto_detect_port() -> crate::Result<DetectedPort> {
    crate::device::auto_detect_port()
}
