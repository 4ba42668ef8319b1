//! Low-power mode.
//!
//! `ATLP` puts the adapter to sleep; it typically answers with a bare `OK`
//! and no prompt. Any byte on the serial line wakes it, so a single space is
//! used.

use super::Elm327;
use crate::error::Result;
use crate::port::Port;
use crate::status::{ConnectionStatus, PowerState};
use log::{debug, info};

impl<P: Port> Elm327<P> {
    /// Ask the adapter to enter low-power mode.
    ///
    /// Returns the adapter's response lines, or `None` when not connected.
    /// The tracked state only changes when the adapter answers `OK`.
    pub fn enter_low_power(&mut self) -> Result<Option<Vec<String>>> {
        if self.status == ConnectionStatus::NotConnected {
            info!("cannot enter low power when unconnected");
            return Ok(None);
        }

        let delay = Some(
            self.timing
                .command_delay,
        );
        let lines = self.send(b"ATLP", delay)?;

        if lines
            .iter()
            .any(|line| line == "OK")
        {
            debug!("Successfully entered low power mode");
            self.power = PowerState::LowPower;
        } else {
            debug!("Failed to enter low power mode");
        }
        Ok(Some(lines))
    }

    /// Wake the adapter.
    ///
    /// The wake byte is sent whatever the tracked state, since the adapter
    /// may have been put to sleep by something else.
    pub fn exit_low_power(&mut self) -> Result<Option<Vec<String>>> {
        if self.status == ConnectionStatus::NotConnected {
            info!("cannot exit low power when unconnected");
            return Ok(None);
        }

        let lines = self.send(b" ", None)?;
        self.power = PowerState::Active;
        Ok(Some(lines))
    }
}
