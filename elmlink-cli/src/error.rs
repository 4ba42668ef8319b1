//! CLI-level failures that map to specific exit codes.

use elmlink::ConnectionStatus;
use thiserror::Error;

/// Exit code for runtime failures.
pub const EXIT_FAILURE: i32 = 1;
/// Exit code for usage errors.
pub const EXIT_USAGE: i32 = 2;
/// Exit code when the adapter answered but the vehicle did not.
pub const EXIT_VEHICLE_UNREACHABLE: i32 = 3;

/// Errors that carry their own exit code.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid combination of arguments or configuration.
    #[error("{0}")]
    Usage(String),

    /// The adapter responded but no vehicle protocol was established.
    #[error("vehicle not reachable (stopped at: {0})")]
    VehicleUnreachable(ConnectionStatus),
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Usage(_) => EXIT_USAGE,
            Self::VehicleUnreachable(_) => EXIT_VEHICLE_UNREACHABLE,
        }
    }
}

/// Exit code for any error bubbling out of a command.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<CliError>()
        .map_or(EXIT_FAILURE, CliError::exit_code)
}
