//! Closed-loop laptop fan control through embedded-controller registers.
//!
//! The daemon samples a temperature sensor, runs a two-mode PID controller
//! ([`thermal`]) and writes the resulting speed to the EC ([`ec`]). The
//! [`scheduler`] ties these together and hands the fan back to firmware
//! control on exit.

pub mod config;
pub mod ec;
pub mod error;
pub mod scheduler;
pub mod sensor;
pub mod thermal;
pub mod tracing;
