//! Error types shared by the controller, the hardware adapters and the
//! binaries.
//!
//! Every hardware failure is fatal to the daemon. The variants exist so the
//! operator sees which side failed (sensor, register read, register write)
//! before the process hands fan control back and exits.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read temperature from {}: {source}", path.display())]
    SensorRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to open register device {}: {source}", path.display())]
    DeviceOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read register {address:#04x}: {source}")]
    RegisterRead {
        address: u8,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {value} to register {address:#04x}: {source}")]
    RegisterWrite {
        address: u8,
        value: u8,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Rejected configuration. Detected before the control loop starts.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("poll interval must be greater than zero")]
    ZeroPollInterval,

    #[error("{name} range is degenerate: min {min} must be below max {max}")]
    DegenerateRange {
        name: &'static str,
        min: u8,
        max: u8,
    },

    #[error("thresholds out of order: {lower} ({lower_c}°C) must be below {upper} ({upper_c}°C)")]
    ThresholdOrder {
        lower: &'static str,
        lower_c: f32,
        upper: &'static str,
        upper_c: f32,
    },

    #[error("integral clamp is inverted: min {min} must be below max {max}")]
    IntegralBounds { min: f32, max: f32 },

    #[error("{name} must be within [0, 100], got {value}")]
    PercentOutOfRange { name: &'static str, value: f32 },

    #[error("{name} must be positive, got {value}")]
    NotPositive { name: &'static str, value: f32 },

    #[error("{name} must not be negative, got {value}")]
    Negative { name: &'static str, value: f32 },

    #[error("{name} must be non-zero")]
    ZeroTicks { name: &'static str },

    #[error("failed to load tuning file {path}: {reason}")]
    TuningFile { path: String, reason: String },
}
