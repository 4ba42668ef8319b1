//! Command implementations.
//!
//! Each subcommand is implemented in its own module for clean separation.

pub(crate) mod adapter;
pub(crate) mod ports;
