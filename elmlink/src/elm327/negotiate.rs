//! Vehicle protocol negotiation.
//!
//! Automatic negotiation lets the adapter search (`ATSP0`), confirms the
//! vehicle answers `0100`, then asks which protocol was found (`ATDPN`,
//! answered as `A6` while still in automatic mode). When the answer isn't
//! a usable code, each protocol in [`FALLBACK_ORDER`] is tried in turn.

use super::{Elm327, has_message};
use crate::error::{Error, Result};
use crate::port::Port;
use crate::protocol::{FALLBACK_ORDER, ProtocolCode, ProtocolDescriptor};
use crate::status::ConnectionStatus;
use log::{debug, error, info};

const UNABLE_TO_CONNECT: &str = "UNABLE TO CONNECT";

/// Outcome of one negotiation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Negotiation {
    /// Protocol the vehicle answered on, `None` if it never did.
    pub protocol: Option<ProtocolCode>,
    /// Lines of the `0100` probe that settled the outcome.
    pub probe: Vec<String>,
}

impl Negotiation {
    fn found(protocol: ProtocolCode, probe: Vec<String>) -> Self {
        Self {
            protocol: Some(protocol),
            probe,
        }
    }

    fn failed(probe: Vec<String>) -> Self {
        Self {
            protocol: None,
            probe,
        }
    }
}

impl<P: Port> Elm327<P> {
    /// Negotiate the vehicle protocol.
    ///
    /// `Some(code)` forces that protocol; `None` searches automatically.
    /// Codes outside `"1"`..`"9"`, `"A"` are rejected without touching the
    /// adapter. Success raises the status to `CarConnected`; failure leaves
    /// it at the adapter stage and records the reason in
    /// [`last_error`](Self::last_error).
    pub fn set_protocol(&mut self, protocol: Option<&str>) -> bool {
        if self.status == ConnectionStatus::NotConnected {
            info!("cannot set protocol when unconnected");
            return false;
        }

        let attempt = match protocol {
            Some(code) => match ProtocolCode::from_code(code) {
                Some(code) => {
                    self.reset_protocol();
                    self.manual_protocol(code)
                },
                None => Err(Error::UnsupportedProtocol(code.to_string())),
            },
            None => {
                self.reset_protocol();
                self.auto_protocol()
            },
        };

        match attempt {
            Ok(Negotiation {
                protocol: Some(code),
                probe,
            }) => {
                let decoder = self
                    .decoders
                    .create(code, &probe);
                self.protocol = Some(ProtocolDescriptor::new(code, decoder));
                self.status = ConnectionStatus::CarConnected;
                self.last_error = None;
                true
            },
            Ok(Negotiation { protocol: None, .. }) => {
                error!("Failed to determine protocol");
                self.last_error = Some(Error::ProtocolNotFound);
                false
            },
            Err(e) => {
                error!("{e}");
                self.last_error = Some(e);
                false
            },
        }
    }

    /// Forget the current protocol before the adapter is switched.
    fn reset_protocol(&mut self) {
        self.protocol = None;
        self.status = self.adapter_status;
    }

    /// Try one protocol: `ATTP<code>`, then probe with `0100`.
    fn manual_protocol(&mut self, code: ProtocolCode) -> Result<Negotiation> {
        self.send(&code.try_command(), None)?;
        let probe = self.send(b"0100", None)?;

        if has_message(&probe, UNABLE_TO_CONNECT) {
            debug!("Protocol {code} did not reach the vehicle");
            Ok(Negotiation::failed(probe))
        } else {
            Ok(Negotiation::found(code, probe))
        }
    }

    fn auto_protocol(&mut self) -> Result<Negotiation> {
        let delay = Some(
            self.timing
                .command_delay,
        );

        self.send(b"ATSP0", delay)?;
        let probe = self.send(b"0100", delay)?;
        if has_message(&probe, UNABLE_TO_CONNECT) {
            error!("Failed to query protocol 0100: unable to connect");
            return Ok(Negotiation::failed(probe));
        }

        let reply = self.send(b"ATDPN", None)?;
        let [line] = reply.as_slice() else {
            error!("Failed to retrieve current protocol");
            return Ok(Negotiation::failed(probe));
        };

        // "A6" means automatic mode settled on protocol 6
        let code = match line.strip_prefix('A') {
            Some(rest) if !rest.is_empty() => rest,
            _ => line.as_str(),
        };

        if let Some(code) = ProtocolCode::from_code(code) {
            return Ok(Negotiation::found(code, probe));
        }

        debug!("ELM responded with unknown protocol {line:?}. Trying them one-by-one");
        for code in FALLBACK_ORDER {
            let attempt = self.manual_protocol(code)?;
            if attempt
                .protocol
                .is_some()
            {
                return Ok(attempt);
            }
        }
        Ok(Negotiation::failed(Vec::new()))
    }
}
