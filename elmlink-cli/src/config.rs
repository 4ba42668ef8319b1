//! Configuration file support for elmlink.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (ELMLINK_*)
//! 3. Local config file (./elmlink.toml)
//! 4. Global config file (~/.config/elmlink/config.toml)
//!
//! ```toml
//! [connection]
//! port = "/dev/ttyUSB0"
//! baud = 38400
//! protocol = "6"
//! timeout_ms = 100
//! check_voltage = true
//! start_low_power = false
//!
//! [timing]
//! command_delay_ms = 1000
//! response_ceiling_ms = 1000
//! poll_interval_ms = 100
//! wake_delay_ms = 1000
//! ```

use directories::ProjectDirs;
use elmlink::Timing;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Local configuration file name.
pub const LOCAL_CONFIG_FILE: &str = "elmlink.toml";

/// Connection configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Preferred serial port (e.g., "/dev/ttyUSB0" or "COM3").
    pub port: Option<String>,
    /// Fixed baud rate; detected when absent.
    pub baud: Option<u32>,
    /// Protocol code ("1".."9", "A"); automatic when absent.
    pub protocol: Option<String>,
    /// Baud probe timeout in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Check the OBD socket voltage while connecting.
    pub check_voltage: Option<bool>,
    /// Wake the adapter from low power before connecting.
    pub start_low_power: Option<bool>,
}

/// Engine delay overrides, all in milliseconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Settle delay after initialization commands.
    pub command_delay_ms: Option<u64>,
    /// Ceiling for waiting on a non-empty response.
    pub response_ceiling_ms: Option<u64>,
    /// Pause between polls of an empty response.
    pub poll_interval_ms: Option<u64>,
    /// Wake-up delay for `start_low_power`.
    pub wake_delay_ms: Option<u64>,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Connection configuration.
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Timing configuration.
    #[serde(default)]
    pub timing: TimingConfig,
}

impl Config {
    /// Load configuration from all available sources.
    pub fn load() -> Self {
        let mut config = Self::default();

        // Load global config
        if let Some(global_path) = Self::global_config_path() {
            if let Some(global_config) = Self::load_from_file(&global_path) {
                debug!("Loaded global config from {}", global_path.display());
                config.merge(global_config);
            }
        }

        // Load local config (overrides global)
        if let Some(local_config) = Self::load_from_file(Path::new(LOCAL_CONFIG_FILE)) {
            debug!("Loaded local config from {LOCAL_CONFIG_FILE}");
            config.merge(local_config);
        }

        config
    }

    /// Load configuration from a specific file path (--config flag).
    pub fn load_from_path(path: &Path) -> Self {
        if let Some(config) = Self::load_from_file(path) {
            debug!("Loaded config from {}", path.display());
            config
        } else {
            warn!(
                "Could not load config from {}, using defaults",
                path.display()
            );
            Self::default()
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Failed to parse config file {}: {}", path.display(), e);
                    None
                },
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            },
        }
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "elmlink").map(|dirs| {
            dirs.config_dir()
                .to_path_buf()
        })
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Merge another config into this one; values set in `other` win.
    fn merge(&mut self, other: Self) {
        let conn = &mut self.connection;
        let theirs = other.connection;
        conn.port = theirs
            .port
            .or(conn.port.take());
        conn.baud = theirs
            .baud
            .or(conn.baud);
        conn.protocol = theirs
            .protocol
            .or(conn.protocol.take());
        conn.timeout_ms = theirs
            .timeout_ms
            .or(conn.timeout_ms);
        conn.check_voltage = theirs
            .check_voltage
            .or(conn.check_voltage);
        conn.start_low_power = theirs
            .start_low_power
            .or(conn.start_low_power);

        let timing = &mut self.timing;
        let theirs = other.timing;
        timing.command_delay_ms = theirs
            .command_delay_ms
            .or(timing.command_delay_ms);
        timing.response_ceiling_ms = theirs
            .response_ceiling_ms
            .or(timing.response_ceiling_ms);
        timing.poll_interval_ms = theirs
            .poll_interval_ms
            .or(timing.poll_interval_ms);
        timing.wake_delay_ms = theirs
            .wake_delay_ms
            .or(timing.wake_delay_ms);
    }

    /// Engine timing with configured overrides applied.
    pub fn timing(&self) -> Timing {
        let defaults = Timing::default();
        let ms = |value: Option<u64>, default: Duration| value.map_or(default, Duration::from_millis);
        Timing {
            command_delay: ms(
                self.timing
                    .command_delay_ms,
                defaults.command_delay,
            ),
            response_ceiling: ms(
                self.timing
                    .response_ceiling_ms,
                defaults.response_ceiling,
            ),
            poll_interval: ms(
                self.timing
                    .poll_interval_ms,
                defaults.poll_interval,
            ),
            wake_delay: ms(
                self.timing
                    .wake_delay_ms,
                defaults.wake_delay,
            ),
        }
    }
}
