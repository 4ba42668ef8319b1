//! Port listing command.

use anyhow::Result;
use console::style;
use elmlink::device::select_port;
use elmlink::{DetectedPort, TransportKind, discover_ports};

/// JSON view of one detected port.
fn port_json(port: &DetectedPort) -> serde_json::Value {
    serde_json::json!({
        "name": port.name,
        "transport": port.transport,
        "device": port.device.name(),
        "known": port.device.is_known(),
        "likely_adapter": port.is_likely_adapter(),
        "vid": port.vid,
        "pid": port.pid,
        "manufacturer": port.manufacturer,
        "product": port.product,
        "serial": port.serial,
    })
}

/// List ports command implementation.
pub(crate) fn cmd_list_ports(json: bool) -> Result<()> {
    let detected = discover_ports();

    if json {
        let ports: Vec<serde_json::Value> = detected
            .iter()
            .map(port_json)
            .collect();
        let selected = select_port(&detected)
            .ok()
            .map(|port| port.name);
        let output = serde_json::json!({
            "ok": true,
            "data": {
                "ports": ports,
                "auto_selected": selected,
            }
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output)?
        );
        return Ok(());
    }

    eprintln!(
        "{}",
        style("Available serial ports:")
            .bold()
            .underlined()
    );

    if detected.is_empty() {
        eprintln!("  {}", style("No serial ports found").dim());
        return Ok(());
    }

    for port in &detected {
        let device_type = if port
            .device
            .is_known()
        {
            format!(
                " [{}]",
                style(
                    port.device
                        .name()
                )
                .yellow()
            )
        } else if port.transport == TransportKind::Bluetooth {
            format!(" [{}]", style("Bluetooth").yellow())
        } else {
            String::new()
        };

        let product = port
            .product
            .as_deref()
            .unwrap_or("");
        let vid_pid = if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
            format!(" ({vid:04X}:{pid:04X})")
        } else {
            String::new()
        };

        let bullet = if port.is_likely_adapter() {
            style("*").green()
        } else {
            style("-").dim()
        };

        eprintln!(
            "  {} {}{}{}{}",
            bullet,
            style(&port.name).cyan(),
            device_type,
            vid_pid,
            if !product.is_empty() {
                format!(" - {}", style(product).dim())
            } else {
                String::new()
            }
        );
    }

    if let Ok(port) = select_port(&detected) {
        eprintln!();
        eprintln!(
            "Auto-detect would use {}",
            style(&port.name)
                .cyan()
                .bold()
        );
    }

    Ok(())
}
