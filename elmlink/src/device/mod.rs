//! Serial port discovery and classification.
//!
//! ELM327 clones are almost always a PIC or STM32 behind a commodity
//! USB-UART bridge, or a Bluetooth SPP module that shows up as an
//! `rfcomm` device. Ports are classified by USB VID/PID and by name so the
//! likeliest adapter can be picked when no port is given.

use crate::error::{Error, Result};
use log::info;

#[cfg(feature = "native")]
use log::{debug, trace};

/// How the port is attached to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TransportKind {
    /// USB serial device.
    Usb,
    /// Bluetooth serial port profile.
    Bluetooth,
    /// On-board or PCI UART.
    Pci,
    /// Unknown or unclassified transport.
    Unknown,
}

/// USB-UART bridge chips found in adapter clones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DeviceKind {
    /// CH340/CH341 USB-to-Serial converter.
    Ch340,
    /// Silicon Labs CP210x USB-to-Serial converter.
    Cp210x,
    /// FTDI FT232/FT2232/FT4232 USB-to-Serial converter.
    Ftdi,
    /// Prolific PL2303 USB-to-Serial converter.
    Prolific,
    /// Unknown device.
    Unknown,
}

/// Known USB VID/PID pairs for common USB-to-UART bridges.
const KNOWN_USB_DEVICES: &[(u16, &[u16], DeviceKind)] = &[
    (
        0x1A86,
        &[0x7523, 0x7522, 0x5523, 0x5512, 0x55D4],
        DeviceKind::Ch340,
    ),
    (0x10C4, &[0xEA60, 0xEA70, 0xEA71, 0xEA63], DeviceKind::Cp210x),
    (
        0x0403,
        &[0x6001, 0x6010, 0x6011, 0x6014, 0x6015],
        DeviceKind::Ftdi,
    ),
    (0x067B, &[0x2303, 0x23A3, 0x23C3, 0x23D3], DeviceKind::Prolific),
];

/// Product-string fragments that identify an OBD adapter outright.
const ADAPTER_PRODUCT_HINTS: &[&str] = &["ELM327", "OBD", "OBDLINK", "VLINK", "STN11", "STN22"];

impl DeviceKind {
    /// Classify a USB VID/PID pair.
    #[must_use]
    pub fn from_vid_pid(vid: u16, pid: u16) -> Self {
        KNOWN_USB_DEVICES
            .iter()
            .find(|(known_vid, pids, _)| vid == *known_vid && pids.contains(&pid))
            .map_or(Self::Unknown, |(_, _, device)| *device)
    }

    /// Get a human-readable name for the device kind.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ch340 => "CH340/CH341",
            Self::Cp210x => "CP210x",
            Self::Ftdi => "FTDI",
            Self::Prolific => "PL2303",
            Self::Unknown => "Unknown",
        }
    }

    /// Check if this is a known bridge chip.
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

/// Discovered serial port.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DetectedPort {
    /// Port name/path (e.g., "/dev/ttyUSB0", "/dev/rfcomm0" or "COM3").
    pub name: String,
    /// How the port is attached.
    pub transport: TransportKind,
    /// Classified bridge chip.
    pub device: DeviceKind,
    /// USB Vendor ID (if available).
    pub vid: Option<u16>,
    /// USB Product ID (if available).
    pub pid: Option<u16>,
    /// Device manufacturer string (if available).
    pub manufacturer: Option<String>,
    /// Device product string (if available).
    pub product: Option<String>,
    /// Serial number (if available).
    pub serial: Option<String>,
}

impl DetectedPort {
    /// A port with nothing known about it but its name.
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        let transport = if name.contains("rfcomm") {
            TransportKind::Bluetooth
        } else {
            TransportKind::Unknown
        };
        Self {
            name,
            transport,
            device: DeviceKind::Unknown,
            vid: None,
            pid: None,
            manufacturer: None,
            product: None,
            serial: None,
        }
    }

    /// Whether the product string names an OBD adapter.
    pub fn is_named_adapter(&self) -> bool {
        self.product
            .as_deref()
            .is_some_and(|product| {
                let product = product.to_ascii_uppercase();
                ADAPTER_PRODUCT_HINTS
                    .iter()
                    .any(|hint| product.contains(hint))
            })
    }

    /// Check if this port is likely an ELM327 adapter.
    pub fn is_likely_adapter(&self) -> bool {
        self.is_named_adapter()
            || self
                .device
                .is_known()
            || self.transport == TransportKind::Bluetooth
    }

    /// Auto-selection rank, lower is better.
    fn rank(&self) -> u8 {
        if self.is_named_adapter() {
            0
        } else if self
            .device
            .is_known()
        {
            1
        } else if self.transport == TransportKind::Bluetooth {
            2
        } else if self.transport == TransportKind::Usb {
            3
        } else {
            4
        }
    }
}

#[cfg(feature = "native")]
fn classify(port_info: serialport::SerialPortInfo) -> DetectedPort {
    let mut detected = DetectedPort::named(port_info.port_name);

    match port_info.port_type {
        serialport::SerialPortType::UsbPort(usb_info) => {
            detected.transport = TransportKind::Usb;
            detected.vid = Some(usb_info.vid);
            detected.pid = Some(usb_info.pid);
            detected.manufacturer = usb_info.manufacturer;
            detected.product = usb_info.product;
            detected.serial = usb_info.serial_number;
            detected.device = DeviceKind::from_vid_pid(usb_info.vid, usb_info.pid);

            trace!(
                "Found USB port: {} (VID: {:04X}, PID: {:04X}, Device: {:?})",
                detected.name, usb_info.vid, usb_info.pid, detected.device
            );
        },
        serialport::SerialPortType::BluetoothPort => {
            detected.transport = TransportKind::Bluetooth;
            trace!("Found Bluetooth port: {}", detected.name);
        },
        serialport::SerialPortType::PciPort => {
            detected.transport = TransportKind::Pci;
        },
        serialport::SerialPortType::Unknown => {},
    }

    detected
}

/// Enumerate all serial ports with metadata.
#[cfg(feature = "native")]
pub fn detect_ports() -> Vec<DetectedPort> {
    match serialport::available_ports() {
        Ok(ports) => ports
            .into_iter()
            .map(classify)
            .collect(),
        Err(e) => {
            debug!("Failed to enumerate serial ports: {e}");
            Vec::new()
        },
    }
}

/// Enumerate all serial ports (no native backend: always empty).
#[cfg(not(feature = "native"))]
pub fn detect_ports() -> Vec<DetectedPort> {
    Vec::new()
}

/// Ports that are likely ELM327 adapters.
pub fn detect_adapter_ports() -> Vec<DetectedPort> {
    detect_ports()
        .into_iter()
        .filter(DetectedPort::is_likely_adapter)
        .collect()
}

/// Pick the best adapter candidate from `ports`.
///
/// Named adapters beat known bridge chips, which beat Bluetooth and other
/// USB ports. Ties keep enumeration order.
pub fn select_port(ports: &[DetectedPort]) -> Result<DetectedPort> {
    ports
        .iter()
        .min_by_key(|p| p.rank())
        .cloned()
        .ok_or(Error::DeviceNotFound)
}

/// Auto-detect a single adapter port.
pub fn auto_detect_port() -> Result<DetectedPort> {
    let port = select_port(&detect_ports())?;

    if port.device.is_known() {
        info!(
            "Auto-detected {} USB-UART bridge: {}",
            port.device.name(),
            port.name
        );
    } else {
        info!("Using serial port: {}", port.name);
    }

    Ok(port)
}

/// Format a list of detected ports for display.
pub fn format_port_list(ports: &[DetectedPort]) -> Vec<String> {
    ports
        .iter()
        .map(|port| {
            let device_info = if port.device.is_known() {
                format!(" [{}]", port.device.name())
            } else if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
                format!(" [VID:{vid:04X} PID:{pid:04X}]")
            } else if port.transport == TransportKind::Bluetooth {
                " [Bluetooth]".to_string()
            } else {
                String::new()
            };

            let product_info = port
                .product
                .as_ref()
                .map(|p| format!(" - {p}"))
                .unwrap_or_default();

            format!("{}{}{}", port.name, device_info, product_info)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usb(name: &str, vid: u16, pid: u16, product: Option<&str>) -> DetectedPort {
        DetectedPort {
            transport: TransportKind::Usb,
            device: DeviceKind::from_vid_pid(vid, pid),
            vid: Some(vid),
            pid: Some(pid),
            product: product.map(ToString::to_string),
            ..DetectedPort::named(name)
        }
    }

    #[test]
    fn test_device_kind_from_vid_pid() {
        assert_eq!(DeviceKind::from_vid_pid(0x1A86, 0x7523), DeviceKind::Ch340);
        assert_eq!(DeviceKind::from_vid_pid(0x10C4, 0xEA60), DeviceKind::Cp210x);
        assert_eq!(DeviceKind::from_vid_pid(0x0403, 0x6001), DeviceKind::Ftdi);
        assert_eq!(DeviceKind::from_vid_pid(0x067B, 0x2303), DeviceKind::Prolific);
        assert_eq!(DeviceKind::from_vid_pid(0x1A86, 0x0001), DeviceKind::Unknown);
        assert_eq!(DeviceKind::from_vid_pid(0x1234, 0x5678), DeviceKind::Unknown);
    }

    #[test]
    fn test_rfcomm_is_bluetooth() {
        let port = DetectedPort::named("/dev/rfcomm0");
        assert_eq!(port.transport, TransportKind::Bluetooth);
        assert!(port.is_likely_adapter());

        assert!(!DetectedPort::named("/dev/ttyS0").is_likely_adapter());
    }

    #[test]
    fn test_named_adapter_detection() {
        let port = usb("/dev/ttyACM0", 0x0483, 0x5740, Some("OBDLink SX"));
        assert!(port.is_named_adapter());
        assert!(port.is_likely_adapter());

        let port = usb("/dev/ttyACM1", 0x0483, 0x5740, Some("STM32 Virtual COM"));
        assert!(!port.is_likely_adapter());
    }

    #[test]
    fn test_select_port_prefers_named_adapter() {
        let ports = vec![
            DetectedPort::named("/dev/ttyS0"),
            DetectedPort::named("/dev/rfcomm0"),
            usb("/dev/ttyUSB0", 0x1A86, 0x7523, None),
            usb("/dev/ttyUSB1", 0x0403, 0x6001, Some("ELM327 USB")),
        ];
        assert_eq!(select_port(&ports).unwrap().name, "/dev/ttyUSB1");
        assert_eq!(select_port(&ports[..3]).unwrap().name, "/dev/ttyUSB0");
        assert_eq!(select_port(&ports[..2]).unwrap().name, "/dev/rfcomm0");
        assert_eq!(select_port(&ports[..1]).unwrap().name, "/dev/ttyS0");
    }

    #[test]
    fn test_select_port_empty() {
        assert!(matches!(select_port(&[]), Err(Error::DeviceNotFound)));
    }

    #[test]
    fn test_format_port_list() {
        let ports = vec![
            usb("/dev/ttyUSB0", 0x1A86, 0x7523, Some("USB-Serial")),
            usb("/dev/ttyACM0", 0x0483, 0x5740, None),
            DetectedPort::named("/dev/rfcomm0"),
            DetectedPort::named("/dev/ttyS0"),
        ];

        let formatted = format_port_list(&ports);
        assert_eq!(formatted[0], "/dev/ttyUSB0 [CH340/CH341] - USB-Serial");
        assert_eq!(formatted[1], "/dev/ttyACM0 [VID:0483 PID:5740]");
        assert_eq!(formatted[2], "/dev/rfcomm0 [Bluetooth]");
        assert_eq!(formatted[3], "/dev/ttyS0");
    }
}
