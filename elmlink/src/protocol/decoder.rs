//! Response-line decoders.
//!
//! With headers enabled (`ATH1`) every line the adapter returns starts with
//! the transmitter's address. A [`Decoder`] splits lines into header and
//! data bytes and knows which transmitter is which ECU. What the data bytes
//! *mean* is left to the caller.
//!
//! ## Header layouts
//!
//! ```text
//! CAN 11-bit:  7E8 06 41 00 BE 3F A8 13
//!              ^^^ ^^ ^^^^^^^^^^^^^^^^^
//!              id  PCI     data
//!
//! CAN 29-bit:  18 DA F1 10 06 41 00 BE 3F A8 13
//!              ^^^^^^^^^^^ ^^ ^^^^^^^^^^^^^^^^^
//!              header (tx = last byte)
//!
//! J1850/ISO:   48 6B 10 41 00 BE 3F A8 13 C4
//!              ^^^^^^^^ ^^^^^^^^^^^^^^^^^ ^^
//!              header (tx = 3rd byte)     checksum
//! ```

use crate::protocol::ProtocolCode;
use log::trace;
use std::collections::{BTreeMap, BTreeSet};

/// Logical role of an ECU on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Ecu {
    /// Engine control module.
    Engine,
    /// Transmission control module.
    Transmission,
    /// Any other responder.
    Unknown,
}

/// An ECU seen during protocol negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EcuDescriptor {
    /// Transmitter address from the response header.
    pub tx_id: u32,
    /// Role assigned to that address.
    pub ecu: Ecu,
}

/// One decoded response line.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Message {
    /// The line as received.
    pub raw: String,
    /// Transmitter address, if the header parsed.
    pub tx_id: Option<u32>,
    /// ECU the transmitter maps to.
    pub ecu: Ecu,
    /// Payload bytes with header, PCI and checksum removed.
    pub data: Vec<u8>,
}

impl Message {
    fn raw(line: &str) -> Self {
        Self {
            raw: line.to_string(),
            tx_id: None,
            ecu: Ecu::Unknown,
            data: Vec::new(),
        }
    }

    /// Whether the header could be parsed.
    pub fn is_parsed(&self) -> bool {
        self.tx_id
            .is_some()
    }
}

/// Turns response lines into messages for one protocol.
pub trait Decoder: Send {
    /// Decode the lines of one response frame.
    fn decode(&self, lines: &[String]) -> Vec<Message>;

    /// Transmitter address to ECU role.
    fn ecu_map(&self) -> &BTreeMap<u32, Ecu>;
}

/// Builds the decoder for a negotiated protocol.
///
/// `probe` holds the raw lines of the `0100` reply that confirmed the
/// protocol, which decoders use to seed their ECU map.
pub trait DecoderFactory: Send {
    /// Create the decoder for `protocol`.
    fn create(&self, protocol: ProtocolCode, probe: &[String]) -> Box<dyn Decoder>;
}

/// How a protocol family lays out response headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderLayout {
    /// 11-bit CAN identifier followed by a PCI byte.
    Can11,
    /// 29-bit CAN identifier (4 bytes) followed by a PCI byte.
    Can29,
    /// Three header bytes, trailing checksum.
    Legacy,
}

impl HeaderLayout {
    /// Layout used by a protocol.
    pub fn for_protocol(protocol: ProtocolCode) -> Self {
        match protocol {
            ProtocolCode::Iso15765_11bit500k | ProtocolCode::Iso15765_11bit250k => Self::Can11,
            ProtocolCode::Iso15765_29bit500k
            | ProtocolCode::Iso15765_29bit250k
            | ProtocolCode::SaeJ1939 => Self::Can29,
            ProtocolCode::SaeJ1850Pwm
            | ProtocolCode::SaeJ1850Vpw
            | ProtocolCode::Iso9141_2
            | ProtocolCode::Iso14230_5baud
            | ProtocolCode::Iso14230Fast => Self::Legacy,
        }
    }

    /// Transmitter address conventionally used by the engine ECU.
    pub fn engine_id(self) -> u32 {
        match self {
            Self::Can11 => 0x7E8,
            Self::Can29 | Self::Legacy => 0x10,
        }
    }

    /// Transmitter address conventionally used by the transmission ECU.
    pub fn transmission_id(self) -> u32 {
        match self {
            Self::Can11 => 0x7E9,
            Self::Can29 | Self::Legacy => 0x18,
        }
    }

    /// Number of hex digits in the header.
    fn header_digits(self) -> usize {
        match self {
            Self::Can11 => 3,
            Self::Can29 => 8,
            Self::Legacy => 6,
        }
    }

    /// Split a line into transmitter address and payload.
    ///
    /// Works with and without spaces between bytes (`ATS1`/`ATS0`).
    /// Returns `None` for anything that is not a well-formed frame, such as
    /// `NO DATA` or `SEARCHING...`.
    pub fn parse_line(self, line: &str) -> Option<(u32, Vec<u8>)> {
        let digits: String = line
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }

        let header_len = self.header_digits();
        if digits.len() <= header_len || (digits.len() - header_len) % 2 != 0 {
            return None;
        }
        let (header, body) = digits.split_at(header_len);
        let bytes = hex_bytes(body)?;

        match self {
            Self::Can11 => {
                let tx_id = u32::from_str_radix(header, 16).ok()?;
                Some((tx_id, strip_pci(&bytes)?))
            },
            Self::Can29 => {
                let tx_id = u32::from_str_radix(&header[6..], 16).ok()?;
                Some((tx_id, strip_pci(&bytes)?))
            },
            Self::Legacy => {
                let tx_id = u32::from_str_radix(&header[4..], 16).ok()?;
                let (_checksum, data) = bytes.split_last()?;
                if data.is_empty() {
                    return None;
                }
                Some((tx_id, data.to_vec()))
            },
        }
    }
}

fn hex_bytes(digits: &str) -> Option<Vec<u8>> {
    digits
        .as_bytes()
        .chunks(2)
        .map(|pair| {
            std::str::from_utf8(pair)
                .ok()
                .and_then(|s| u8::from_str_radix(s, 16).ok())
        })
        .collect()
}

/// Drop the ISO-TP PCI byte, honoring the length of single frames.
fn strip_pci(bytes: &[u8]) -> Option<Vec<u8>> {
    let (&pci, rest) = bytes.split_first()?;
    if pci >> 4 == 0 {
        let len = usize::from(pci & 0x0F).min(rest.len());
        Some(rest[..len].to_vec())
    } else {
        Some(rest.to_vec())
    }
}

/// Decoder for adapters running with headers on.
///
/// One message is produced per response line. Lines whose header doesn't
/// parse become raw messages.
#[derive(Debug, Clone)]
pub struct HeaderDecoder {
    layout: Option<HeaderLayout>,
    ecu_map: BTreeMap<u32, Ecu>,
}

impl HeaderDecoder {
    /// Build a decoder for `protocol`, seeding the ECU map from `probe`.
    pub fn new(protocol: ProtocolCode, probe: &[String]) -> Self {
        let layout = HeaderLayout::for_protocol(protocol);
        let mut decoder = Self {
            layout: Some(layout),
            ecu_map: BTreeMap::new(),
        };
        let messages = decoder.decode(probe);
        decoder.ecu_map = build_ecu_map(layout, &messages);
        decoder
    }

    /// Decoder used before a protocol has been negotiated.
    pub fn unknown() -> Self {
        Self {
            layout: None,
            ecu_map: BTreeMap::new(),
        }
    }

    /// Header layout, `None` for the unknown-protocol decoder.
    pub fn layout(&self) -> Option<HeaderLayout> {
        self.layout
    }
}

impl Decoder for HeaderDecoder {
    fn decode(&self, lines: &[String]) -> Vec<Message> {
        lines
            .iter()
            .map(|line| {
                let Some((tx_id, data)) = self
                    .layout
                    .and_then(|layout| layout.parse_line(line))
                else {
                    trace!("unparsed line: {line:?}");
                    return Message::raw(line);
                };
                Message {
                    raw: line.clone(),
                    tx_id: Some(tx_id),
                    ecu: self
                        .ecu_map
                        .get(&tx_id)
                        .copied()
                        .unwrap_or(Ecu::Unknown),
                    data,
                }
            })
            .collect()
    }

    fn ecu_map(&self) -> &BTreeMap<u32, Ecu> {
        &self.ecu_map
    }
}

/// Assign ECU roles to the transmitters that answered the probe.
fn build_ecu_map(layout: HeaderLayout, messages: &[Message]) -> BTreeMap<u32, Ecu> {
    let mut map = BTreeMap::new();
    let tx_ids: BTreeSet<u32> = messages
        .iter()
        .filter_map(|m| m.tx_id)
        .collect();

    match tx_ids.len() {
        0 => {},
        1 => {
            map.extend(
                tx_ids
                    .into_iter()
                    .map(|id| (id, Ecu::Engine)),
            );
        },
        _ => {
            if tx_ids.contains(&layout.engine_id()) {
                map.insert(layout.engine_id(), Ecu::Engine);
            } else {
                // Whoever reports the most supported PIDs is taken as the engine
                let busiest = messages
                    .iter()
                    .filter_map(|m| {
                        let bits: u32 = m
                            .data
                            .iter()
                            .map(|b| b.count_ones())
                            .sum();
                        m.tx_id
                            .map(|id| (bits, id))
                    })
                    .fold(None, |best: Option<(u32, u32)>, cand| match best {
                        Some(b) if b.0 >= cand.0 => Some(b),
                        _ => Some(cand),
                    });
                if let Some((_, id)) = busiest {
                    map.insert(id, Ecu::Engine);
                }
            }
            if tx_ids.contains(&layout.transmission_id()) {
                map.entry(layout.transmission_id())
                    .or_insert(Ecu::Transmission);
            }
            for id in tx_ids {
                map.entry(id)
                    .or_insert(Ecu::Unknown);
            }
        },
    }
    map
}

/// Factory mapping every protocol code to a [`HeaderDecoder`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardDecoders;

impl DecoderFactory for StandardDecoders {
    fn create(&self, protocol: ProtocolCode, probe: &[String]) -> Box<dyn Decoder> {
        Box::new(HeaderDecoder::new(protocol, probe))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter()
            .map(ToString::to_string)
            .collect()
    }

    #[test]
    fn test_layout_for_every_protocol() {
        assert_eq!(
            HeaderLayout::for_protocol(ProtocolCode::Iso15765_11bit250k),
            HeaderLayout::Can11
        );
        assert_eq!(
            HeaderLayout::for_protocol(ProtocolCode::SaeJ1939),
            HeaderLayout::Can29
        );
        assert_eq!(
            HeaderLayout::for_protocol(ProtocolCode::Iso14230Fast),
            HeaderLayout::Legacy
        );
    }

    #[test]
    fn test_parse_can11_with_and_without_spaces() {
        let spaced = HeaderLayout::Can11.parse_line("7E8 06 41 00 BE 3F A8 13");
        let packed = HeaderLayout::Can11.parse_line("7E806410 0BE3FA813");
        let expected = Some((0x7E8, vec![0x41, 0x00, 0xBE, 0x3F, 0xA8, 0x13]));
        assert_eq!(spaced, expected);
        assert_eq!(packed, expected);
    }

    #[test]
    fn test_parse_can11_honours_single_frame_length() {
        // Padding after the declared length is dropped
        let parsed = HeaderLayout::Can11.parse_line("7E8 03 41 0D 32 AA AA AA AA");
        assert_eq!(parsed, Some((0x7E8, vec![0x41, 0x0D, 0x32])));
    }

    #[test]
    fn test_parse_can29() {
        let parsed = HeaderLayout::Can29.parse_line("18 DA F1 10 03 41 0D 32");
        assert_eq!(parsed, Some((0x10, vec![0x41, 0x0D, 0x32])));
    }

    #[test]
    fn test_parse_legacy_drops_checksum() {
        let parsed = HeaderLayout::Legacy.parse_line("48 6B 10 41 0D 32 C4");
        assert_eq!(parsed, Some((0x10, vec![0x41, 0x0D, 0x32])));
    }

    #[test]
    fn test_parse_rejects_status_lines() {
        for line in ["NO DATA", "SEARCHING...", "UNABLE TO CONNECT", "", "41 00 BE 3F"] {
            assert_eq!(HeaderLayout::Can11.parse_line(line), None, "{line:?}");
        }
        assert_eq!(HeaderLayout::Legacy.parse_line("48 6B 10 C4"), None);
    }

    #[test]
    fn test_single_responder_is_engine() {
        let decoder = HeaderDecoder::new(
            ProtocolCode::Iso15765_11bit500k,
            &lines(&["SEARCHING...", "7EA 06 41 00 80 00 00 01"]),
        );
        assert_eq!(decoder.ecu_map().get(&0x7EA), Some(&Ecu::Engine));
        assert_eq!(
            decoder
                .ecu_map()
                .len(),
            1
        );
    }

    #[test]
    fn test_known_engine_and_transmission_ids() {
        let decoder = HeaderDecoder::new(
            ProtocolCode::Iso15765_11bit500k,
            &lines(&[
                "7E8 06 41 00 BE 3F A8 13",
                "7E9 06 41 00 98 18 80 01",
                "7EA 06 41 00 80 00 00 01",
            ]),
        );
        let map = decoder.ecu_map();
        assert_eq!(map.get(&0x7E8), Some(&Ecu::Engine));
        assert_eq!(map.get(&0x7E9), Some(&Ecu::Transmission));
        assert_eq!(map.get(&0x7EA), Some(&Ecu::Unknown));
    }

    #[test]
    fn test_busiest_responder_becomes_engine() {
        let decoder = HeaderDecoder::new(
            ProtocolCode::SaeJ1850Pwm,
            &lines(&["48 6B 11 41 00 80 00 00 01 C4", "48 6B 22 41 00 BE 3F A8 13 C4"]),
        );
        let map = decoder.ecu_map();
        assert_eq!(map.get(&0x22), Some(&Ecu::Engine));
        assert_eq!(map.get(&0x11), Some(&Ecu::Unknown));
    }

    #[test]
    fn test_decode_tags_messages_with_ecu() {
        let decoder = HeaderDecoder::new(
            ProtocolCode::Iso15765_11bit500k,
            &lines(&["7E8 06 41 00 BE 3F A8 13"]),
        );
        let messages = decoder.decode(&lines(&["7E8 03 41 0D 32", "NO DATA"]));

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].ecu, Ecu::Engine);
        assert_eq!(messages[0].data, vec![0x41, 0x0D, 0x32]);
        assert!(messages[0].is_parsed());
        assert!(!messages[1].is_parsed());
        assert_eq!(messages[1].raw, "NO DATA");
    }

    #[test]
    fn test_unknown_decoder_passes_lines_through() {
        let decoder = HeaderDecoder::unknown();
        let messages = decoder.decode(&lines(&["7E8 03 41 0D 32"]));
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].tx_id, None);
        assert!(
            decoder
                .ecu_map()
                .is_empty()
        );
    }

    #[test]
    fn test_headerless_probe_leaves_map_empty() {
        let decoder = StandardDecoders.create(
            ProtocolCode::Iso15765_11bit500k,
            &lines(&["41 00 BE 3F A8 13"]),
        );
        assert!(
            decoder
                .ecu_map()
                .is_empty()
        );
    }
}
