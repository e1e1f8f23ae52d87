use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use super::state::CoolingMode;
use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThermalConfig {
    /// Active cooling gives way to passive once the running average falls
    /// below this (°C).
    pub low_temperature_c: f32,

    /// Passive cooling is promoted to active above this (°C).
    pub medium_temperature_c: f32,

    /// Start of the "high" band. Reported in logs only.
    pub high_temperature_c: f32,

    /// PID setpoint (°C).
    pub setpoint_c: f32,

    /// At or above this every tick re-evaluates the PID, bypassing the
    /// hysteresis gate (°C).
    pub throttle_temperature_c: f32,

    /// Alert threshold (°C). The controller raises an alarm but does not
    /// act on the hardware beyond normal control.
    pub dangerous_temperature_c: f32,

    /// Rise above the last evaluated temperature that triggers a new
    /// evaluation (°C).
    pub temperature_rise_threshold_c: f32,

    /// Drop below the last evaluated temperature that triggers a new
    /// evaluation (°C).
    pub temperature_drop_threshold_c: f32,

    /// Lower PID outputs are ignored unless they undercut the current
    /// target by more than this (%).
    pub speed_drop_threshold_pct: f32,

    /// Floor for the speed target in active mode (%).
    pub min_active_speed_pct: f32,

    pub proportional_gain: f32,
    pub integral_gain: f32,
    pub derivative_gain: f32,

    /// Clamp for the accumulated error (°C·s).
    pub integral_min: f32,
    pub integral_max: f32,

    pub poll_interval_ms: u64,

    /// Time constant of the running temperature average (s).
    pub average_time_constant_s: f32,

    /// Starting value of the running average (°C). Seeded hot so a cold
    /// start stays under active control until a real average builds up.
    pub average_seed_c: f32,

    pub initial_mode: CoolingMode,

    /// Consecutive ticks at the dangerous temperature before alerting.
    pub overheat_alarm_ticks: u32,

    /// Re-check the manual-control register every this many ticks.
    pub manual_check_ticks: u32,

    /// Force a PID evaluation every this many ticks while active.
    pub safety_evaluation_ticks: u32,
}

impl Default for ThermalConfig {
    fn default() -> Self {
        Self {
            low_temperature_c: 45.0,
            medium_temperature_c: 62.0,
            high_temperature_c: 70.0,
            setpoint_c: 76.0,
            throttle_temperature_c: 84.0,
            dangerous_temperature_c: 94.0,
            temperature_rise_threshold_c: 2.0,
            temperature_drop_threshold_c: 12.0,
            speed_drop_threshold_pct: 8.0,
            min_active_speed_pct: 34.0,
            proportional_gain: 6.0,
            integral_gain: 0.17,
            derivative_gain: 2.4,
            integral_min: -100.0,
            integral_max: 500.0,
            poll_interval_ms: 400,
            average_time_constant_s: 15.0,
            average_seed_c: 100.0,
            initial_mode: CoolingMode::Active,
            overheat_alarm_ticks: 3,
            manual_check_ticks: 10,
            safety_evaluation_ticks: 30,
        }
    }
}

impl ThermalConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Load a JSON tuning file. Fields left out keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let fail = |reason: String| ConfigError::TuningFile {
            path: path.display().to_string(),
            reason,
        };
        let text = std::fs::read_to_string(path).map_err(|e| fail(e.to_string()))?;
        serde_json::from_str(&text).map_err(|e| fail(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::ZeroPollInterval);
        }

        let ladder = [
            ("low temperature", self.low_temperature_c),
            ("medium temperature", self.medium_temperature_c),
            ("high temperature", self.high_temperature_c),
            ("setpoint", self.setpoint_c),
            ("throttle temperature", self.throttle_temperature_c),
            ("dangerous temperature", self.dangerous_temperature_c),
        ];
        for pair in ladder.windows(2) {
            let (lower, lower_c) = pair[0];
            let (upper, upper_c) = pair[1];
            // also rejects NaN
            if !(lower_c < upper_c) {
                return Err(ConfigError::ThresholdOrder {
                    lower,
                    lower_c,
                    upper,
                    upper_c,
                });
            }
        }

        if !(self.integral_min < self.integral_max) {
            return Err(ConfigError::IntegralBounds {
                min: self.integral_min,
                max: self.integral_max,
            });
        }

        if !(0.0..=100.0).contains(&self.min_active_speed_pct) {
            return Err(ConfigError::PercentOutOfRange {
                name: "minimum active speed",
                value: self.min_active_speed_pct,
            });
        }

        for (name, value) in [
            ("temperature rise threshold", self.temperature_rise_threshold_c),
            ("temperature drop threshold", self.temperature_drop_threshold_c),
            ("speed drop threshold", self.speed_drop_threshold_pct),
        ] {
            if !(value >= 0.0) {
                return Err(ConfigError::Negative { name, value });
            }
        }

        if !(self.average_time_constant_s > 0.0) {
            return Err(ConfigError::NotPositive {
                name: "average time constant",
                value: self.average_time_constant_s,
            });
        }

        for (name, ticks) in [
            ("overheat alarm ticks", self.overheat_alarm_ticks),
            ("manual check ticks", self.manual_check_ticks),
            ("safety evaluation ticks", self.safety_evaluation_ticks),
        ] {
            if ticks == 0 {
                return Err(ConfigError::ZeroTicks { name });
            }
        }

        Ok(())
    }
}
