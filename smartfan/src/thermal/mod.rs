mod alarm;
mod config;
mod controller;
mod fan_pid;
mod ramp;
mod state;

pub use alarm::{AlarmStatus, OverheatAlarm};
pub use config::ThermalConfig;
pub use controller::{
    ControlLoop, ControllerState, Evaluation, EvaluationTrigger, FanSpeedCommand,
};
pub use fan_pid::{FanPIDController, PidOutput, PidTerms};
pub use ramp::{FanSpeed, SpeedRamper};
pub use state::{CoolingMode, TemperatureBand};
