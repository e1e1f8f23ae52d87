use std::time::Duration;

/// Accumulated PID terms carried between evaluations.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PidTerms {
    /// Integral of the error (°C·s), kept within the controller's clamp.
    pub error_accumulation: f32,

    /// Error seen at the previous evaluation. `None` until the first one.
    pub last_error: Option<f32>,
}

/// Breakdown of one evaluation, mostly for logging.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidOutput {
    pub error: f32,
    pub error_accumulation: f32,
    pub derivative: f32,
    /// Unclamped speed in percent.
    pub output: f32,
}

/// PID law for fan speed.
///
/// `output = P·e + I·∫e + D·max(de/dt, 0)`
///
/// Only a warming trend feeds the derivative term. A cooling trend is
/// floored at zero so it never pulls the speed below what P and I ask for,
/// which makes the fan spin up quickly and wind down slowly.
#[derive(Debug, Clone)]
pub struct FanPIDController {
    pub proportional_gain: f32,
    pub integral_gain: f32,
    pub derivative_gain: f32,
    pub integral_min: f32,
    pub integral_max: f32,
}

impl FanPIDController {
    pub fn new(
        proportional_gain: f32,
        integral_gain: f32,
        derivative_gain: f32,
        integral_min: f32,
        integral_max: f32,
    ) -> Self {
        Self {
            proportional_gain,
            integral_gain,
            derivative_gain,
            integral_min,
            integral_max,
        }
    }

    /// Evaluate for `error`, `time_since_last_update` after the previous
    /// evaluation. Updates `terms` in place.
    pub fn update(
        &self,
        terms: &mut PidTerms,
        error: f32,
        time_since_last_update: Duration,
    ) -> PidOutput {
        let dt_s = time_since_last_update.as_secs_f32();

        terms.error_accumulation = (terms.error_accumulation + error * dt_s)
            .clamp(self.integral_min, self.integral_max);

        let derivative = match terms.last_error {
            Some(last) if dt_s > 0.0 => ((error - last) / dt_s).max(0.0),
            _ => 0.0,
        };
        terms.last_error = Some(error);

        let output = self.proportional_gain * error
            + self.integral_gain * terms.error_accumulation
            + self.derivative_gain * derivative;

        PidOutput {
            error,
            error_accumulation: terms.error_accumulation,
            derivative,
            output,
        }
    }
}
