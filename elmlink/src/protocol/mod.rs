//! Vehicle-bus protocols known to the ELM327.
//!
//! ## Protocol codes
//!
//! ```text
//! +------+---------------------------+
//! | Code | Protocol                  |
//! +------+---------------------------+
//! |  1   | SAE J1850 PWM             |
//! |  2   | SAE J1850 VPW             |
//! |  3   | ISO 9141-2                |
//! |  4   | ISO 14230-4 (5-baud init) |
//! |  5   | ISO 14230-4 (fast init)   |
//! |  6   | ISO 15765-4 11-bit 500k   |
//! |  7   | ISO 15765-4 29-bit 500k   |
//! |  8   | ISO 15765-4 11-bit 250k   |
//! |  9   | ISO 15765-4 29-bit 250k   |
//! |  A   | SAE J1939                 |
//! +------+---------------------------+
//! ```
//!
//! Code `0` is the adapter's automatic mode and is not a protocol.

pub mod decoder;

use crate::error::Error;
use std::fmt;
use std::str::FromStr;

pub use decoder::{
    Decoder, DecoderFactory, Ecu, EcuDescriptor, HeaderDecoder, HeaderLayout, Message,
    StandardDecoders,
};

/// A vehicle-bus protocol selectable with `ATTP`/`ATSP`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ProtocolCode {
    /// SAE J1850 PWM (41.6 kbaud).
    SaeJ1850Pwm,
    /// SAE J1850 VPW (10.4 kbaud).
    SaeJ1850Vpw,
    /// ISO 9141-2 (5 baud init).
    Iso9141_2,
    /// ISO 14230-4 KWP (5 baud init).
    Iso14230_5baud,
    /// ISO 14230-4 KWP (fast init).
    Iso14230Fast,
    /// ISO 15765-4 CAN (11 bit ID, 500 kbaud).
    Iso15765_11bit500k,
    /// ISO 15765-4 CAN (29 bit ID, 500 kbaud).
    Iso15765_29bit500k,
    /// ISO 15765-4 CAN (11 bit ID, 250 kbaud).
    Iso15765_11bit250k,
    /// ISO 15765-4 CAN (29 bit ID, 250 kbaud).
    Iso15765_29bit250k,
    /// SAE J1939 (CAN 29 bit ID, 250 kbaud).
    SaeJ1939,
}

/// Order in which protocols are tried when automatic detection can't name one.
///
/// Most common buses first, to keep the expected number of probes low.
pub const FALLBACK_ORDER: [ProtocolCode; 10] = [
    ProtocolCode::Iso15765_11bit500k,
    ProtocolCode::Iso15765_11bit250k,
    ProtocolCode::SaeJ1850Pwm,
    ProtocolCode::Iso15765_29bit500k,
    ProtocolCode::Iso15765_29bit250k,
    ProtocolCode::SaeJ1850Vpw,
    ProtocolCode::Iso9141_2,
    ProtocolCode::Iso14230_5baud,
    ProtocolCode::Iso14230Fast,
    ProtocolCode::SaeJ1939,
];

impl ProtocolCode {
    /// All supported protocols in code order.
    pub const ALL: [Self; 10] = [
        Self::SaeJ1850Pwm,
        Self::SaeJ1850Vpw,
        Self::Iso9141_2,
        Self::Iso14230_5baud,
        Self::Iso14230Fast,
        Self::Iso15765_11bit500k,
        Self::Iso15765_29bit500k,
        Self::Iso15765_11bit250k,
        Self::Iso15765_29bit250k,
        Self::SaeJ1939,
    ];

    /// Single-character code used in `ATTP`/`ATDPN`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SaeJ1850Pwm => "1",
            Self::SaeJ1850Vpw => "2",
            Self::Iso9141_2 => "3",
            Self::Iso14230_5baud => "4",
            Self::Iso14230Fast => "5",
            Self::Iso15765_11bit500k => "6",
            Self::Iso15765_29bit500k => "7",
            Self::Iso15765_11bit250k => "8",
            Self::Iso15765_29bit250k => "9",
            Self::SaeJ1939 => "A",
        }
    }

    /// Display name as reported by the adapter's `ATDP`.
    pub fn name(self) -> &'static str {
        match self {
            Self::SaeJ1850Pwm => "SAE J1850 PWM",
            Self::SaeJ1850Vpw => "SAE J1850 VPW",
            Self::Iso9141_2 => "ISO 9141-2",
            Self::Iso14230_5baud => "ISO 14230-4 (KWP 5BAUD)",
            Self::Iso14230Fast => "ISO 14230-4 (KWP FAST)",
            Self::Iso15765_11bit500k => "ISO 15765-4 (CAN 11/500)",
            Self::Iso15765_29bit500k => "ISO 15765-4 (CAN 29/500)",
            Self::Iso15765_11bit250k => "ISO 15765-4 (CAN 11/250)",
            Self::Iso15765_29bit250k => "ISO 15765-4 (CAN 29/250)",
            Self::SaeJ1939 => "SAE J1939 (CAN 29/250)",
        }
    }

    /// Parse a protocol code.
    ///
    /// Only the exact codes `"1"`..`"9"` and `"A"` are accepted. The
    /// automatic-mode code `"0"` is not a protocol.
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == code)
    }

    /// Whether the protocol runs over CAN.
    pub fn is_can(self) -> bool {
        !matches!(
            self,
            Self::SaeJ1850Pwm
                | Self::SaeJ1850Vpw
                | Self::Iso9141_2
                | Self::Iso14230_5baud
                | Self::Iso14230Fast
        )
    }

    /// `ATTP<code>` command bytes.
    pub fn try_command(self) -> Vec<u8> {
        format!("ATTP{}", self.as_str()).into_bytes()
    }
}

impl fmt::Display for ProtocolCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProtocolCode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_code(s).ok_or_else(|| Error::UnsupportedProtocol(s.to_string()))
    }
}

/// The protocol settled on by a successful negotiation.
///
/// Built once per negotiation and not modified afterwards.
pub struct ProtocolDescriptor {
    code: ProtocolCode,
    decoder: Box<dyn Decoder>,
}

impl ProtocolDescriptor {
    /// Pair a negotiated protocol with its decoder.
    pub fn new(code: ProtocolCode, decoder: Box<dyn Decoder>) -> Self {
        Self { code, decoder }
    }

    /// Protocol code.
    pub fn code(&self) -> ProtocolCode {
        self.code
    }

    /// Protocol display name.
    pub fn name(&self) -> &'static str {
        self.code
            .name()
    }

    /// Decoder seeded with the first probe.
    pub fn decoder(&self) -> &dyn Decoder {
        self.decoder
            .as_ref()
    }

    /// ECUs found on the bus, ordered by transmitter id.
    pub fn ecus(&self) -> Vec<EcuDescriptor> {
        self.decoder
            .ecu_map()
            .iter()
            .map(|(&tx_id, &ecu)| EcuDescriptor { tx_id, ecu })
            .collect()
    }
}

impl fmt::Debug for ProtocolDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolDescriptor")
            .field("code", &self.code)
            .field("ecus", &self.ecus())
            .finish()
    }
}
