use serde::Deserialize;
use strum::Display;

use super::config::ThermalConfig;

/// Whether the fan is under PID control.
///
/// Promotion looks at the instantaneous temperature so heating is caught
/// immediately; demotion looks at the running average so a brief dip does
/// not stop the fan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CoolingMode {
    /// Fan spun down, no tracking.
    Passive,
    /// Fan speed follows the PID output.
    Active,
}

impl CoolingMode {
    pub fn next(self, temperature_c: f32, average_c: f32, config: &ThermalConfig) -> Self {
        match self {
            CoolingMode::Passive => {
                if temperature_c > config.medium_temperature_c {
                    CoolingMode::Active
                } else {
                    CoolingMode::Passive
                }
            }
            CoolingMode::Active => {
                if average_c < config.low_temperature_c {
                    CoolingMode::Passive
                } else {
                    CoolingMode::Active
                }
            }
        }
    }
}

/// Coarse temperature band, for log output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum TemperatureBand {
    Cool,
    Warm,
    Medium,
    High,
    Throttle,
    Dangerous,
}

impl TemperatureBand {
    pub fn classify(temperature_c: f32, config: &ThermalConfig) -> Self {
        if temperature_c >= config.dangerous_temperature_c {
            TemperatureBand::Dangerous
        } else if temperature_c >= config.throttle_temperature_c {
            TemperatureBand::Throttle
        } else if temperature_c >= config.high_temperature_c {
            TemperatureBand::High
        } else if temperature_c >= config.medium_temperature_c {
            TemperatureBand::Medium
        } else if temperature_c >= config.low_temperature_c {
            TemperatureBand::Warm
        } else {
            TemperatureBand::Cool
        }
    }
}
