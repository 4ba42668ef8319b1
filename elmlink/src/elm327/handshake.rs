//! Adapter initialization and the supply voltage check.

use super::{Elm327, has_message};
use crate::error::{Error, Result};
use crate::port::Port;
use crate::status::ConnectionStatus;
use log::debug;

/// Lowest `AT RV` reading that counts as a powered OBD socket.
pub const MIN_VOLTAGE: f32 = 6.0;

/// Exactly one line, and it is `OK`.
fn is_ok(lines: &[String]) -> bool {
    matches!(lines, [line] if line == "OK")
}

/// Parse an `AT RV` response such as `12.6V`.
pub fn parse_voltage(lines: &[String]) -> Result<f32> {
    let unreadable = || Error::VoltageUnreadable(lines.to_vec());
    let [line] = lines else {
        return Err(unreadable());
    };
    line.trim_end_matches(['V', 'v'])
        .trim()
        .parse::<f32>()
        .map_err(|_| unreadable())
}

impl<P: Port> Elm327<P> {
    /// Reset the adapter and configure its output format.
    ///
    /// `ATE0` may still be echoed, so any `OK` line accepts it. After that,
    /// echo must be off and `ATH1`/`ATL0` answer with a lone `OK`.
    pub(super) fn handshake(&mut self) -> Result<()> {
        let delay = Some(
            self.timing
                .command_delay,
        );

        self.send(b"ATZ", delay)?;

        let r = self.send(b"ATE0", delay)?;
        if !has_message(&r, "OK") {
            return Err(Error::HandshakeFailed(
                "ATE0 did not return 'OK'".to_string(),
            ));
        }

        let r = self.send(b"ATH1", delay)?;
        if !is_ok(&r) {
            return Err(Error::HandshakeFailed(
                "ATH1 did not return 'OK', or echoing is still ON".to_string(),
            ));
        }

        let r = self.send(b"ATL0", delay)?;
        if !is_ok(&r) {
            return Err(Error::HandshakeFailed(
                "ATL0 did not return 'OK'".to_string(),
            ));
        }

        debug!("Adapter initialized");
        self.status = ConnectionStatus::ElmConnected;
        self.adapter_status = ConnectionStatus::ElmConnected;
        Ok(())
    }

    /// Read the supply voltage and raise the status to `ObdConnected`.
    pub(super) fn check_voltage(&mut self) -> Result<f32> {
        let delay = Some(
            self.timing
                .command_delay,
        );
        let r = self.send(b"AT RV", delay)?;
        let volts = parse_voltage(&r)?;
        if volts < MIN_VOLTAGE {
            return Err(Error::VoltageTooLow(volts));
        }

        self.status = ConnectionStatus::ObdConnected;
        self.adapter_status = ConnectionStatus::ObdConnected;
        Ok(volts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elm327::tests::connected;
    use crate::test_support::SimulatedAdapter;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter()
            .map(ToString::to_string)
            .collect()
    }

    #[test]
    fn test_is_ok() {
        assert!(is_ok(&lines(&["OK"])));
        assert!(!is_ok(&lines(&["ATH1", "OK"])));
        assert!(!is_ok(&lines(&["OK", "OK"])));
        assert!(!is_ok(&lines(&[])));
        assert!(!is_ok(&lines(&["OK?"])));
    }

    #[test]
    fn test_parse_voltage() {
        assert!((parse_voltage(&lines(&["12.6V"])).unwrap() - 12.6).abs() < 1e-4);
        assert!((parse_voltage(&lines(&["13.8v"])).unwrap() - 13.8).abs() < 1e-4);
        assert!((parse_voltage(&lines(&["6.0V"])).unwrap() - 6.0).abs() < 1e-4);
        assert!((parse_voltage(&lines(&["11"])).unwrap() - 11.0).abs() < 1e-4);
    }

    #[test]
    fn test_parse_voltage_rejects_garbage() {
        let cases: [&[&str]; 5] = [&["?"], &[], &["12.6V", "12.6V"], &["V"], &["ATRV"]];
        for raw in cases {
            assert!(
                matches!(
                    parse_voltage(&lines(raw)),
                    Err(Error::VoltageUnreadable(_))
                ),
                "{raw:?}"
            );
        }
    }

    #[test]
    fn test_handshake_tolerates_echoed_ate0() {
        let elm = connected(SimulatedAdapter::new());
        assert_eq!(elm.status(), ConnectionStatus::CarConnected);
    }

    #[test]
    fn test_echo_still_on_fails_handshake() {
        let elm = connected(SimulatedAdapter::new().respond("ATH1", "ATH1\nOK"));

        assert_eq!(elm.status(), ConnectionStatus::NotConnected);
        assert!(matches!(
            elm.last_error(),
            Some(Error::HandshakeFailed(_))
        ));
        assert!(elm.port().is_none());
    }

    #[test]
    fn test_atl0_rejected() {
        let elm = connected(SimulatedAdapter::new().respond("ATL0", "?"));
        assert_eq!(elm.status(), ConnectionStatus::NotConnected);
        assert_eq!(elm.port_name(), "");
    }

    #[test]
    fn test_low_voltage_keeps_elm_connected() {
        let elm = connected(SimulatedAdapter::new().voltage("4.2V"));

        assert_eq!(elm.status(), ConnectionStatus::ElmConnected);
        assert!(matches!(elm.last_error(), Some(Error::VoltageTooLow(v)) if *v < 6.0));
        assert!(elm.port().is_some());

        let commands = elm
            .port()
            .unwrap()
            .commands();
        assert_eq!(
            commands
                .last()
                .map(String::as_str),
            Some("AT RV")
        );
    }

    #[test]
    fn test_unreadable_voltage_keeps_elm_connected() {
        let elm = connected(SimulatedAdapter::new().voltage("?"));

        assert_eq!(elm.status(), ConnectionStatus::ElmConnected);
        assert!(matches!(
            elm.last_error(),
            Some(Error::VoltageUnreadable(_))
        ));
    }

    #[test]
    fn test_voltage_at_threshold_is_accepted() {
        let elm = connected(SimulatedAdapter::new().voltage("6.0V"));
        assert_eq!(elm.status(), ConnectionStatus::CarConnected);
    }
}
