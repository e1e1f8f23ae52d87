use std::time::Duration;

use super::config::ThermalConfig;
use super::fan_pid::{FanPIDController, PidOutput, PidTerms};
use super::ramp::{FanSpeed, SpeedRamper};
use super::state::{CoolingMode, TemperatureBand};
use crate::ec::{RegisterMap, RegisterWrite};
use crate::tracing::prelude::*;

const FAN_SPEED_MAX: f32 = 100.0;

/// Speed to put on the hardware this tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FanSpeedCommand {
    pub speed_percent: f32,
    pub register_value: u8,
}

/// Everything the control loop mutates from tick to tick.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerState {
    pub mode: CoolingMode,
    pub current_temperature: f32,
    pub previous_temperature: f32,
    pub average_temperature: f32,

    /// Temperature at the last PID evaluation. `None` forces the next
    /// active tick to evaluate.
    pub last_evaluated_temperature: Option<f32>,

    /// Ticks observed since the last PID evaluation. Restarts at one on
    /// promotion, so passive time never reaches the integral.
    pub ticks_since_evaluation: u32,

    pub pid: PidTerms,
    pub speed: FanSpeed,

    /// Last register value handed out for writing. `None` until the first
    /// write, so that one always happens.
    pub last_written_register: Option<u8>,
}

/// Why a PID evaluation ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationTrigger {
    FirstEvaluation,
    Rise,
    Drop,
    Throttle,
    Promotion,
    SafetyNet,
}

/// Result of one PID evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub trigger: EvaluationTrigger,
    pub pid: PidOutput,
    /// PID output clamped to [minimum active speed, 100].
    pub candidate_percent: f32,
    /// Whether the candidate replaced the speed target.
    pub accepted: bool,
}

/// Two-mode fan controller.
///
/// Each tick takes one temperature sample, updates the cooling mode,
/// re-runs the PID when the hysteresis gate opens, ramps the commanded
/// speed one step toward its target and reports the register value to
/// write, if it changed. It does no I/O itself.
pub struct ControlLoop {
    config: ThermalConfig,
    registers: RegisterMap,
    fan_pid: FanPIDController,
    ramper: SpeedRamper,
    state: ControllerState,
}

impl ControlLoop {
    pub fn new(config: ThermalConfig, registers: RegisterMap) -> Self {
        let fan_pid = FanPIDController::new(
            config.proportional_gain,
            config.integral_gain,
            config.derivative_gain,
            config.integral_min,
            config.integral_max,
        );
        let state = ControllerState {
            mode: config.initial_mode,
            current_temperature: 0.0,
            previous_temperature: 0.0,
            average_temperature: config.average_seed_c,
            last_evaluated_temperature: None,
            ticks_since_evaluation: 0,
            pid: PidTerms::default(),
            speed: FanSpeed::at(0.0),
            last_written_register: None,
        };

        Self {
            config,
            registers,
            fan_pid,
            ramper: SpeedRamper::default(),
            state,
        }
    }

    /// Seed the commanded speed from what the hardware currently runs at.
    pub fn initialize(&mut self, initial_speed_percent: f32) {
        self.state.speed = FanSpeed::at(initial_speed_percent);
        self.state.last_written_register = None;
        debug!(
            speed_pct = %self.state.speed.current,
            mode = %self.state.mode,
            "Control loop initialized"
        );
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn config(&self) -> &ThermalConfig {
        &self.config
    }

    pub fn mode(&self) -> CoolingMode {
        self.state.mode
    }

    /// Run one control cycle for `temperature_c`.
    ///
    /// Returns the command to write, or `None` when the register value is
    /// unchanged since the last command.
    pub fn tick(&mut self, temperature_c: f32) -> Option<FanSpeedCommand> {
        self.observe(temperature_c);
        self.update_target();

        if !self.state.speed.satisfied {
            self.ramper.advance(&mut self.state.speed);
        }

        self.next_command()
    }

    /// Run a PID evaluation now if active, ignoring the hysteresis gate.
    pub fn evaluate_if_active(&mut self) -> Option<Evaluation> {
        match self.state.mode {
            CoolingMode::Active => Some(self.evaluate(EvaluationTrigger::SafetyNet)),
            CoolingMode::Passive => None,
        }
    }

    /// Forget the last written value and return the command for the
    /// current speed. Used after the hardware took control back and the
    /// register contents can no longer be trusted.
    pub fn resync(&mut self) -> FanSpeedCommand {
        self.state.last_written_register = None;
        let command = self.command();
        self.state.last_written_register = Some(command.register_value);
        command
    }

    /// Register writes that hand the fan back to the embedded controller.
    pub fn shutdown(&self) -> [RegisterWrite; 2] {
        self.registers.handback_sequence()
    }

    fn observe(&mut self, temperature_c: f32) {
        let state = &mut self.state;
        state.previous_temperature = state.current_temperature;
        state.current_temperature = temperature_c;
        state.ticks_since_evaluation = state.ticks_since_evaluation.saturating_add(1);

        let alpha = (self.config.poll_interval().as_secs_f32()
            / self.config.average_time_constant_s)
            .min(1.0);
        state.average_temperature += (temperature_c - state.average_temperature) * alpha;
    }

    fn update_target(&mut self) {
        let temperature = self.state.current_temperature;
        let previous_mode = self.state.mode;
        let mode = previous_mode.next(temperature, self.state.average_temperature, &self.config);
        self.state.mode = mode;

        match (previous_mode, mode) {
            (CoolingMode::Passive, CoolingMode::Active) => {
                info!(
                    temp_c = %temperature,
                    band = %TemperatureBand::classify(temperature, &self.config),
                    "Active cooling"
                );
                // a stale cold average would demote again on the next tick
                self.state.average_temperature = temperature;
                // nothing was tracked while passive: integrate one interval,
                // and take no trend from the error before the passive stretch
                self.state.ticks_since_evaluation = 1;
                self.state.pid.last_error = None;
                self.evaluate(EvaluationTrigger::Promotion);
            }
            (CoolingMode::Active, CoolingMode::Passive) => {
                info!(
                    temp_c = %temperature,
                    average_c = %self.state.average_temperature,
                    "Passive cooling"
                );
                self.state.speed.retarget(0.0);
            }
            (CoolingMode::Passive, CoolingMode::Passive) => {
                if self.state.speed.current > 0.0 {
                    self.state.speed.retarget(0.0);
                }
            }
            (CoolingMode::Active, CoolingMode::Active) => {
                if let Some(trigger) = self.gate(temperature) {
                    self.evaluate(trigger);
                }
            }
        }
    }

    /// Hysteresis gate. Returns why an evaluation is due, if it is.
    fn gate(&self, temperature: f32) -> Option<EvaluationTrigger> {
        if temperature >= self.config.throttle_temperature_c {
            return Some(EvaluationTrigger::Throttle);
        }

        let Some(reference) = self.state.last_evaluated_temperature else {
            return Some(EvaluationTrigger::FirstEvaluation);
        };

        if temperature > reference + self.config.temperature_rise_threshold_c {
            Some(EvaluationTrigger::Rise)
        } else if temperature < reference - self.config.temperature_drop_threshold_c {
            Some(EvaluationTrigger::Drop)
        } else {
            None
        }
    }

    fn evaluate(&mut self, trigger: EvaluationTrigger) -> Evaluation {
        let temperature = self.state.current_temperature;
        let elapsed = self.config.poll_interval() * self.state.ticks_since_evaluation.max(1);

        let pid = self.evaluate_pid(temperature, elapsed);
        let candidate_percent = pid.output.clamp(self.config.min_active_speed_pct, FAN_SPEED_MAX);

        let speed = &mut self.state.speed;
        let accepted = candidate_percent > speed.target
            || candidate_percent < speed.target - self.config.speed_drop_threshold_pct;
        if accepted {
            speed.retarget(candidate_percent);
        }

        self.state.last_evaluated_temperature = Some(temperature);
        self.state.ticks_since_evaluation = 0;

        debug!(
            trigger = ?trigger,
            temp_c = %temperature,
            error_c = %pid.error,
            accumulation = %pid.error_accumulation,
            derivative = %pid.derivative,
            pid_output = %pid.output,
            candidate_pct = %candidate_percent,
            accepted = accepted,
            target_pct = %self.state.speed.target,
            "PID evaluation"
        );

        Evaluation {
            trigger,
            pid,
            candidate_percent,
            accepted,
        }
    }

    fn evaluate_pid(&mut self, temperature: f32, elapsed: Duration) -> PidOutput {
        let error = temperature - self.config.setpoint_c;
        self.fan_pid.update(&mut self.state.pid, error, elapsed)
    }

    fn command(&self) -> FanSpeedCommand {
        let speed_percent = self.state.speed.current;
        FanSpeedCommand {
            speed_percent,
            register_value: self.registers.write_scale.percent_to_register(speed_percent),
        }
    }

    fn next_command(&mut self) -> Option<FanSpeedCommand> {
        let command = self.command();
        if self.state.last_written_register == Some(command.register_value) {
            return None;
        }
        self.state.last_written_register = Some(command.register_value);
        Some(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_loop() -> ControlLoop {
        ControlLoop::new(ThermalConfig::default(), RegisterMap::default())
    }

    /// Active loop that has already evaluated at `temperature`.
    fn settled_loop(temperature: f32, target: f32) -> ControlLoop {
        let mut control = create_loop();
        control.initialize(target);
        control.state.speed.satisfied = true;
        control.state.current_temperature = temperature;
        control.state.last_evaluated_temperature = Some(temperature);
        control.state.average_temperature = temperature;
        control.state.ticks_since_evaluation = 0;
        control
    }

    fn drain_ramp(control: &mut ControlLoop, temperature: f32) {
        for _ in 0..100 {
            control.tick(temperature);
            if control.state.speed.satisfied {
                return;
            }
        }
        panic!("ramp did not settle");
    }

    #[test]
    fn should_evaluate_worked_example_on_rise() {
        let mut control = settled_loop(76.0, 34.0);
        control.state.pid = PidTerms {
            error_accumulation: 0.0,
            last_error: Some(0.0),
        };

        control.tick(80.0);

        let state = control.state();
        assert_eq!(state.last_evaluated_temperature, Some(80.0));
        assert_eq!(state.pid.last_error, Some(4.0));
        assert!((state.pid.error_accumulation - 1.6).abs() < 1e-4);
        // 6·4 + 0.17·1.6 + 2.4·10
        assert!((state.speed.target - 48.272).abs() < 1e-3);
        assert!(state.speed.target >= 34.0 && state.speed.target <= 100.0);
    }

    #[test]
    fn should_not_reevaluate_within_hysteresis_band() {
        let mut control = settled_loop(70.0, 50.0);

        for temperature in [71.0, 69.0, 72.0, 60.0, 58.5, 71.9, 66.0] {
            control.tick(temperature);
            assert_eq!(control.state.speed.target, 50.0);
            assert_eq!(control.state.last_evaluated_temperature, Some(70.0));
        }

        control.tick(72.5);
        assert_eq!(control.state.last_evaluated_temperature, Some(72.5));
    }

    #[test]
    fn should_reevaluate_on_large_drop() {
        let mut control = settled_loop(80.0, 70.0);

        control.tick(67.5);

        assert_eq!(control.state.last_evaluated_temperature, Some(67.5));
        assert_eq!(control.state.speed.target, 34.0);
    }

    #[test]
    fn should_always_reevaluate_at_throttle_temperature() {
        let mut control = settled_loop(84.0, 40.0);

        control.state.pid.last_error = Some(8.0);
        control.tick(84.0);
        assert_eq!(control.state.ticks_since_evaluation, 0);
        assert!(control.state.speed.target > 40.0);

        control.tick(84.0);
        assert_eq!(control.state.ticks_since_evaluation, 0);
    }

    #[test]
    fn should_ignore_small_downward_adjustment() {
        let mut control = settled_loop(76.0, 40.0);
        control.state.pid = PidTerms::default();

        // error 0 -> output 0, clamped to 34: only 6 below target
        let evaluation = control.evaluate_if_active().unwrap();

        assert_eq!(evaluation.candidate_percent, 34.0);
        assert!(!evaluation.accepted);
        assert_eq!(control.state.speed.target, 40.0);
        assert!(control.state.speed.satisfied);
    }

    #[test]
    fn should_accept_large_downward_adjustment() {
        let mut control = settled_loop(76.0, 50.0);
        control.state.pid = PidTerms::default();

        let evaluation = control.evaluate_if_active().unwrap();

        assert!(evaluation.accepted);
        assert_eq!(control.state.speed.target, 34.0);
        assert!(!control.state.speed.satisfied);
    }

    #[test]
    fn should_accept_any_upward_adjustment() {
        let mut control = settled_loop(76.0, 34.0);
        control.state.current_temperature = 82.0;
        control.state.pid = PidTerms::default();

        let evaluation = control.evaluate_if_active().unwrap();

        assert!(evaluation.candidate_percent > 34.0);
        assert!(evaluation.accepted);
        assert_eq!(control.state.speed.target, evaluation.candidate_percent);
    }

    #[test]
    fn should_floor_active_target_at_minimum_speed() {
        let mut control = settled_loop(50.0, 0.0);
        control.state.pid = PidTerms::default();

        control.evaluate_if_active();

        assert_eq!(control.state.speed.target, 34.0);
    }

    #[test]
    fn should_saturate_error_accumulation_under_sustained_heat() {
        let mut control = create_loop();
        control.initialize(50.0);

        for _ in 0..2_000 {
            control.tick(90.0);
            let accumulation = control.state.pid.error_accumulation;
            assert!((-100.0..=500.0).contains(&accumulation));
        }

        assert_eq!(control.state.pid.error_accumulation, 500.0);
        control.tick(90.0);
        assert_eq!(control.state.pid.error_accumulation, 500.0);
        assert_eq!(control.state.speed.target, 100.0);
    }

    #[test]
    fn should_integrate_over_skipped_ticks() {
        let mut control = settled_loop(70.0, 50.0);
        control.state.pid = PidTerms::default();

        for _ in 0..9 {
            control.tick(71.0);
        }
        control.tick(72.5);

        // ten ticks of 400 ms at error -3.5
        assert!((control.state.pid.error_accumulation - (-14.0)).abs() < 1e-3);
    }

    #[test]
    fn should_integrate_first_evaluation_over_one_interval() {
        let mut control = create_loop();
        control.initialize(50.0);

        control.tick(70.0);

        assert_eq!(control.state.last_evaluated_temperature, Some(70.0));
        // error -6 for 400 ms
        assert!((control.state.pid.error_accumulation - (-2.4)).abs() < 1e-4);
    }

    #[test]
    fn should_not_integrate_passive_time_on_promotion() {
        let mut control = create_loop();
        control.initialize(60.0);
        while control.mode() == CoolingMode::Active {
            control.tick(30.0);
        }
        let accumulation_before = control.state.pid.error_accumulation;

        for _ in 0..600 {
            control.tick(30.0);
        }
        assert_eq!(control.mode(), CoolingMode::Passive);

        control.tick(80.0);

        assert_eq!(control.mode(), CoolingMode::Active);
        // one interval at error +4, no trend carried over from before
        let accumulation = control.state.pid.error_accumulation;
        assert!((accumulation - (accumulation_before + 1.6)).abs() < 1e-3);
        assert_eq!(control.state.pid.last_error, Some(4.0));
        assert_eq!(control.state.speed.target, 34.0);
    }

    #[test]
    fn should_demote_to_passive_when_average_cools() {
        let mut control = create_loop();
        control.initialize(60.0);
        assert_eq!(control.mode(), CoolingMode::Active);

        let mut ticks = 0;
        while control.mode() == CoolingMode::Active {
            control.tick(30.0);
            ticks += 1;
            assert!(ticks < 1_000, "never demoted");
        }

        assert!(control.state.average_temperature < 45.0);
        assert_eq!(control.state.speed.target, 0.0);

        drain_ramp(&mut control, 30.0);
        assert_eq!(control.state.speed.current, 0.0);
        assert_eq!(control.mode(), CoolingMode::Passive);
    }

    #[test]
    fn should_stay_spun_down_in_passive_mode() {
        let config = ThermalConfig {
            initial_mode: CoolingMode::Passive,
            ..Default::default()
        };
        let mut control = ControlLoop::new(config, RegisterMap::default());
        control.initialize(40.0);

        drain_ramp(&mut control, 50.0);

        assert_eq!(control.state.speed.current, 0.0);
        assert_eq!(control.state.last_evaluated_temperature, None);
        assert!(control.evaluate_if_active().is_none());
    }

    #[test]
    fn should_promote_and_evaluate_immediately() {
        let config = ThermalConfig {
            initial_mode: CoolingMode::Passive,
            ..Default::default()
        };
        let mut control = ControlLoop::new(config, RegisterMap::default());
        control.initialize(0.0);
        control.tick(40.0);

        control.tick(65.0);

        assert_eq!(control.mode(), CoolingMode::Active);
        assert_eq!(control.state.last_evaluated_temperature, Some(65.0));
        assert_eq!(control.state.speed.target, 34.0);
        assert_eq!(control.state.average_temperature, 65.0);

        // re-seeded average keeps the next tick active
        control.tick(64.0);
        assert_eq!(control.mode(), CoolingMode::Active);
    }

    #[test]
    fn should_keep_speeds_in_range_for_any_sequence() {
        let mut control = create_loop();
        control.initialize(100.0);

        let mut temperature: f32 = 55.0;
        for step in 0..3_000u32 {
            // deterministic zig-zag from 20 to 100
            let delta = ((step.wrapping_mul(2_654_435_761) >> 27) as f32) - 15.0;
            temperature = (temperature + delta * 0.7).clamp(20.0, 100.0);
            control.tick(temperature);

            let speed = &control.state.speed;
            assert!((0.0..=100.0).contains(&speed.target), "target {}", speed.target);
            assert!((0.0..=100.0).contains(&speed.current), "current {}", speed.current);
            if control.mode() == CoolingMode::Active
                && control.state.last_evaluated_temperature.is_some()
                && control.state.ticks_since_evaluation == 0
            {
                assert!(speed.target >= 34.0);
            }
        }
    }

    #[test]
    fn should_write_only_when_register_value_changes() {
        let mut control = settled_loop(70.0, 50.0);

        let first = control.tick(70.0);
        assert_eq!(
            first,
            Some(FanSpeedCommand {
                speed_percent: 50.0,
                register_value: 29
            })
        );
        assert_eq!(control.tick(70.5), None);
        assert_eq!(control.tick(69.5), None);
    }

    #[test]
    fn should_resync_after_external_takeover() {
        let mut control = settled_loop(70.0, 50.0);
        control.tick(70.0);
        assert_eq!(control.tick(70.0), None);

        let command = control.resync();

        assert_eq!(command.register_value, 29);
        assert_eq!(control.tick(70.0), None);
    }

    #[test]
    fn should_clamp_initial_hardware_reading() {
        let mut control = create_loop();
        control.initialize(130.0);
        assert_eq!(control.state.speed.current, 100.0);
        assert_eq!(control.state.speed.target, 100.0);
    }

    #[test]
    fn should_hand_back_via_register_map() {
        let control = create_loop();
        assert_eq!(control.shutdown(), RegisterMap::default().handback_sequence());
    }
}
