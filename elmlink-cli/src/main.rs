//! elmlink CLI - Command-line tool for ELM327-family OBD-II adapters.
//!
//! ## Features
//!
//! - List serial ports and spot likely adapters
//! - Probe an adapter and report how far the connection got
//! - Send raw OBD/AT commands and print decoded responses
//! - Put the adapter into low-power mode
//! - Environment variable and config file support

use anyhow::Result;
use clap::{Parser, Subcommand};
use console::style;
use env_logger::Env;
use log::debug;
use std::env;
use std::path::PathBuf;

mod commands;
mod config;
mod error;

use commands::adapter::{cmd_probe, cmd_send, cmd_sleep};
use commands::ports::cmd_list_ports;
use config::Config;
use error::exit_code_for;

/// elmlink - Talk to ELM327-family OBD-II adapters.
///
/// Environment variables:
///   ELMLINK_PORT       - Default serial port
///   ELMLINK_BAUD       - Fixed baud rate (detected when unset)
///   ELMLINK_PROTOCOL   - Protocol code 1-9 or A (automatic when unset)
#[derive(Parser)]
#[command(name = "elmlink")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[allow(clippy::struct_excessive_bools)]
pub(crate) struct Cli {
    /// Serial port to use (auto-detected if not specified).
    #[arg(short, long, global = true, env = "ELMLINK_PORT")]
    pub(crate) port: Option<String>,

    /// Baud rate (auto-detected if not specified).
    #[arg(short, long, global = true, env = "ELMLINK_BAUD")]
    pub(crate) baud: Option<u32>,

    /// Vehicle protocol: "auto", or a code 1-9, A.
    #[arg(long, global = true, env = "ELMLINK_PROTOCOL", value_parser = parse_protocol)]
    pub(crate) protocol: Option<String>,

    /// Per-rate timeout for baud detection, in milliseconds.
    #[arg(long, global = true, value_name = "MS")]
    pub(crate) timeout_ms: Option<u64>,

    /// Skip the OBD socket voltage check.
    #[arg(long, global = true)]
    pub(crate) no_voltage_check: bool,

    /// Wake the adapter from low-power mode before connecting.
    #[arg(long, global = true)]
    pub(crate) start_low_power: bool,

    /// Verbose output level (-v, -vv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub(crate) verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    pub(crate) quiet: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    pub(crate) config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// List available serial ports.
    ListPorts {
        /// Output in JSON format.
        #[arg(long)]
        json: bool,
    },

    /// Connect to the adapter and report how far the connection got.
    Probe {
        /// Output in JSON format.
        #[arg(long)]
        json: bool,
    },

    /// Send commands to the vehicle and print the decoded responses.
    Send {
        /// Commands to send in order (e.g., 0100 010C).
        #[arg(required = true, value_name = "COMMAND")]
        commands: Vec<String>,

        /// Output in JSON format.
        #[arg(long)]
        json: bool,
    },

    /// Put the adapter into low-power mode.
    Sleep,
}

/// Validate a protocol argument. `"auto"` is kept as-is and resolved later.
fn parse_protocol(value: &str) -> std::result::Result<String, String> {
    if value.eq_ignore_ascii_case("auto") {
        return Ok("auto".to_string());
    }
    let code = value.to_ascii_uppercase();
    match elmlink::ProtocolCode::from_code(&code) {
        Some(code) => Ok(code
            .as_str()
            .to_string()),
        None => Err(format!(
            "unsupported protocol '{value}' (expected auto, 1-9 or A)"
        )),
    }
}

fn main() {
    // --- NO_COLOR and TTY detection ---
    let stderr_is_tty = console::Term::stderr().is_term();
    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();

    debug!(
        "elmlink v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    // Load configuration
    let config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };

    if let Err(err) = run(&cli, &config) {
        eprintln!("{} {err:#}", style("Error:").red().bold());
        std::process::exit(exit_code_for(&err));
    }
}

fn run(cli: &Cli, config: &Config) -> Result<()> {
    match &cli.command {
        Commands::ListPorts { json } => cmd_list_ports(*json),
        Commands::Probe { json } => cmd_probe(cli, config, *json),
        Commands::Send { commands, json } => cmd_send(cli, config, commands, *json),
        Commands::Sleep => cmd_sleep(cli, config),
    }
}
