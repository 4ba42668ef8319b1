//! Connection progress and adapter power state.

use std::fmt;

/// How far a connection attempt got.
///
/// The variants are ordered, so `status >= ConnectionStatus::ElmConnected`
/// reads as "at least the adapter answered".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConnectionStatus {
    /// No usable link to the adapter.
    #[default]
    NotConnected,
    /// The adapter completed its initialization sequence.
    ElmConnected,
    /// The adapter reports vehicle supply voltage on the OBD socket.
    ObdConnected,
    /// A vehicle-bus protocol was negotiated and the vehicle answered.
    CarConnected,
}

impl ConnectionStatus {
    /// Human-readable description.
    pub fn description(self) -> &'static str {
        match self {
            Self::NotConnected => "Not Connected",
            Self::ElmConnected => "ELM Connected",
            Self::ObdConnected => "OBD Connected",
            Self::CarConnected => "Car Connected",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Adapter power mode as tracked by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PowerState {
    /// Normal operation.
    #[default]
    Active,
    /// `ATLP` acknowledged; the next byte on the line wakes the adapter.
    LowPower,
}
