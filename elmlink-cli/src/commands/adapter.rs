//! Adapter commands: probe, send and sleep.

use crate::Cli;
use crate::config::Config;
use crate::error::CliError;
use anyhow::{Context, Result, anyhow, bail};
use console::style;
use elmlink::elm327::DEFAULT_PROBE_TIMEOUT;
use elmlink::{
    ConnectOptions, ConnectionStatus, Elm327, Message, NativePort, ProtocolCode, auto_detect_port,
};
use std::time::Duration;

/// Resolve a protocol setting. `"auto"` means automatic negotiation.
fn resolve_protocol(value: Option<&str>) -> Result<Option<String>> {
    let Some(value) = value else {
        return Ok(None);
    };
    if value.eq_ignore_ascii_case("auto") {
        return Ok(None);
    }
    let code = value.to_ascii_uppercase();
    match ProtocolCode::from_code(&code) {
        Some(code) => Ok(Some(
            code.as_str()
                .to_string(),
        )),
        None => Err(CliError::Usage(format!(
            "unsupported protocol '{value}' (expected auto, 1-9 or A)"
        ))
        .into()),
    }
}

/// Build connection options from the command line and configuration.
///
/// Command-line values win over configuration; the port falls back to
/// auto-detection.
pub(crate) fn connect_options(cli: &Cli, config: &Config) -> Result<ConnectOptions> {
    let conn = &config.connection;

    let port = match cli
        .port
        .clone()
        .or_else(|| {
            conn.port
                .clone()
        }) {
        Some(port) => port,
        None => {
            auto_detect_port()
                .context("No serial port given and no adapter detected")?
                .name
        },
    };

    let protocol = resolve_protocol(
        cli.protocol
            .as_deref()
            .or(conn
                .protocol
                .as_deref()),
    )?;

    let probe_timeout = cli
        .timeout_ms
        .or(conn.timeout_ms)
        .map_or(DEFAULT_PROBE_TIMEOUT, Duration::from_millis);

    let check_voltage = !cli.no_voltage_check
        && conn
            .check_voltage
            .unwrap_or(true);
    let start_low_power = cli.start_low_power
        || conn
            .start_low_power
            .unwrap_or(false);

    Ok(ConnectOptions::new(port)
        .with_baud(cli.baud.or(conn.baud))
        .with_protocol(protocol)
        .with_probe_timeout(probe_timeout)
        .with_voltage_check(check_voltage)
        .with_start_low_power(start_low_power)
        .with_timing(config.timing()))
}

/// Connect, failing unless at least `required` was reached.
///
/// Falling short of the adapter stage is a runtime failure; reaching the
/// adapter but not `required` is [`CliError::VehicleUnreachable`].
fn connect(cli: &Cli, config: &Config, required: ConnectionStatus) -> Result<Elm327<NativePort>> {
    let options = connect_options(cli, config)?;
    if !cli.quiet {
        eprintln!(
            "{} Connecting to {}",
            style("*").cyan(),
            style(&options.port).green()
        );
    }

    let mut elm = Elm327::connect(&options);
    let status = elm.status();
    if status >= required {
        return Ok(elm);
    }

    let reason = elm
        .last_error()
        .map(ToString::to_string);
    elm.close();
    Err(shortfall(status, reason, &options.port))
}

/// Error for a connection that stopped at `status`.
fn shortfall(status: ConnectionStatus, reason: Option<String>, port: &str) -> anyhow::Error {
    if status == ConnectionStatus::NotConnected {
        let reason = reason.unwrap_or_else(|| "adapter did not respond".to_string());
        return anyhow!(reason).context(format!("Failed to connect on {port}"));
    }
    let err = anyhow::Error::new(CliError::VehicleUnreachable(status));
    match reason {
        Some(reason) => err.context(reason),
        None => err,
    }
}

/// JSON view of a connection attempt on `port`.
fn report_json(elm: &Elm327<NativePort>, port: &str) -> serde_json::Value {
    serde_json::json!({
        "status": elm.status(),
        "port": port,
        "baud": elm.baud_rate(),
        "protocol": elm.protocol_id().map(ProtocolCode::as_str),
        "protocol_name": elm.protocol_name(),
        "ecus": elm.ecus(),
        "last_error": elm.last_error().map(ToString::to_string),
    })
}

/// Probe command implementation.
pub(crate) fn cmd_probe(cli: &Cli, config: &Config, json: bool) -> Result<()> {
    let options = connect_options(cli, config)?;
    let mut elm = Elm327::connect(&options);
    let status = elm.status();

    if json {
        let output = serde_json::json!({
            "ok": status == ConnectionStatus::CarConnected,
            "data": report_json(&elm, &options.port),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output)?
        );
    } else if status > ConnectionStatus::NotConnected {
        eprintln!("{}", style("Adapter:").bold().underlined());
        eprintln!("  Status:   {}", style(status).green());
        eprintln!("  Port:     {}", style(elm.port_name()).cyan());
        if let Some(baud) = elm.baud_rate() {
            eprintln!("  Baud:     {baud}");
        }
        eprintln!("  Protocol: {}", elm.protocol_name());
        for ecu in elm.ecus() {
            eprintln!(
                "  {} {:X} [{:?}]",
                style("*").green(),
                ecu.tx_id,
                ecu.ecu
            );
        }
    }

    let reason = elm
        .last_error()
        .map(ToString::to_string);
    elm.close();

    if status == ConnectionStatus::CarConnected {
        Ok(())
    } else {
        Err(shortfall(status, reason, &options.port))
    }
}

/// Render one message as `TX [ECU] DATA`, or the raw line if unparsed.
fn format_message(message: &Message) -> String {
    match message.tx_id {
        Some(tx_id) => {
            let data: Vec<String> = message
                .data
                .iter()
                .map(|b| format!("{b:02X}"))
                .collect();
            format!("{tx_id:X} [{:?}] {}", message.ecu, data.join(" "))
        },
        None => message
            .raw
            .clone(),
    }
}

/// Send command implementation.
pub(crate) fn cmd_send(cli: &Cli, config: &Config, commands: &[String], json: bool) -> Result<()> {
    let mut elm = connect(cli, config, ConnectionStatus::CarConnected)?;
    let result = send_all(&mut elm, commands);
    elm.close();
    let responses = result?;

    if json {
        let responses: Vec<serde_json::Value> = responses
            .iter()
            .map(|(command, messages)| {
                serde_json::json!({
                    "command": command,
                    "messages": messages,
                })
            })
            .collect();
        let output = serde_json::json!({
            "ok": true,
            "data": {
                "responses": responses,
            }
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output)?
        );
        return Ok(());
    }

    for (command, messages) in &responses {
        println!("> {command}");
        for message in messages {
            println!("{}", format_message(message));
        }
    }
    Ok(())
}

fn send_all<'a>(
    elm: &mut Elm327<NativePort>,
    commands: &'a [String],
) -> Result<Vec<(&'a str, Vec<Message>)>> {
    let mut responses = Vec::with_capacity(commands.len());
    for command in commands {
        let messages = elm
            .send_and_parse(command)
            .with_context(|| format!("Failed to send {command}"))?;
        let Some(messages) = messages else {
            bail!("Adapter disconnected before {command}");
        };
        responses.push((command.as_str(), messages));
    }
    Ok(responses)
}

/// Sleep command implementation.
pub(crate) fn cmd_sleep(cli: &Cli, config: &Config) -> Result<()> {
    let mut elm = connect(cli, config, ConnectionStatus::ElmConnected)?;
    let lines = elm
        .enter_low_power()
        .context("Failed to enter low-power mode")?;

    let entered = elm.power_state() == elmlink::PowerState::LowPower;
    // Release without close(): its reset would wake the adapter again.
    drop(elm);

    if !entered {
        bail!(
            "Adapter refused low-power mode: {}",
            lines
                .unwrap_or_default()
                .join(" | ")
        );
    }
    if !cli.quiet {
        eprintln!("{} Adapter is in low-power mode", style("*").green());
    }
    Ok(())
}
