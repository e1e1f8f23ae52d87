//! The scheduler drives the control loop against real hardware.
//!
//! One tick per poll interval: read the temperature, run the control loop,
//! write the fan register if the value changed. Every few ticks it also
//! checks that the embedded controller has not taken manual control back,
//! and forces a PID evaluation as a safety net.
//!
//! Shutdown requests arrive through a [`CancellationToken`] and are only
//! observed between ticks. Any hardware error ends the run. Either way the
//! fan is handed back to the embedded controller, at most once per
//! process.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::ec::{MANUAL_CONTROL_OFF, MANUAL_CONTROL_ON, RegisterIo, RegisterMap, RegisterWrite};
use crate::error::Result;
use crate::sensor::TemperatureSource;
use crate::thermal::{AlarmStatus, ControlLoop, FanSpeedCommand, OverheatAlarm, ThermalConfig};
use crate::tracing::prelude::*;

/// One-shot latch guarding the hand-back to the embedded controller.
///
/// Clones share the latch, so whichever path claims it first (normal
/// shutdown, error path, or a last-resort caller) runs the hand-back.
#[derive(Debug, Clone, Default)]
pub struct HandbackGuard {
    claimed: Arc<AtomicBool>,
}

impl HandbackGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true exactly once across all clones.
    pub fn claim(&self) -> bool {
        !self.claimed.swap(true, Ordering::SeqCst)
    }

    pub fn is_claimed(&self) -> bool {
        self.claimed.load(Ordering::SeqCst)
    }
}

/// Perform the hand-back `writes` if the guard has not been claimed yet.
///
/// Every write is attempted even if an earlier one fails. Failures are
/// logged and not retried. Returns whether this call performed the
/// hand-back.
pub async fn hand_back<R: RegisterIo + ?Sized>(
    io: &mut R,
    writes: impl IntoIterator<Item = RegisterWrite>,
    guard: &HandbackGuard,
) -> bool {
    if !guard.claim() {
        return false;
    }

    info!("Handing fan control over to EC");
    for write in writes {
        if let Err(e) = io.write_register(write.address, write.value).await {
            error!(
                address = write.address,
                value = write.value,
                "Hand-back write failed: {e}"
            );
        }
    }
    true
}

pub struct Scheduler<S, R> {
    sensor: S,
    io: R,
    registers: RegisterMap,
    control_loop: ControlLoop,
    overheat: OverheatAlarm,
    guard: HandbackGuard,
    ticks: u64,
}

impl<S, R> Scheduler<S, R>
where
    S: TemperatureSource,
    R: RegisterIo,
{
    pub fn new(
        sensor: S,
        io: R,
        registers: RegisterMap,
        config: ThermalConfig,
        guard: HandbackGuard,
    ) -> Self {
        let overheat = OverheatAlarm::new(config.overheat_alarm_ticks);
        Self {
            sensor,
            io,
            registers,
            control_loop: ControlLoop::new(config, registers),
            overheat,
            guard,
            ticks: 0,
        }
    }

    pub fn control_loop(&self) -> &ControlLoop {
        &self.control_loop
    }

    /// Run until cancelled or until a hardware access fails, then hand the
    /// fan back. Returns the hardware error, if any.
    pub async fn run(mut self, cancellation: CancellationToken) -> Result<Self> {
        let result = self.control(&cancellation).await;
        if let Err(e) = &result {
            error!("Control loop aborted: {e}");
        }
        hand_back(&mut self.io, self.control_loop.shutdown(), &self.guard).await;
        result.map(|()| self)
    }

    async fn control(&mut self, cancellation: &CancellationToken) -> Result<()> {
        let raw = self.io.read_register(self.registers.speed_read).await?;
        let initial_speed = self.registers.read_scale.register_to_percent(raw);
        debug!(raw, speed_pct = %initial_speed, "Read fan speed");
        self.control_loop.initialize(initial_speed);

        self.io
            .write_register(self.registers.manual_enable, MANUAL_CONTROL_ON)
            .await?;
        info!(
            poll_interval_ms = self.control_loop.config().poll_interval_ms,
            mode = %self.control_loop.mode(),
            "Manual fan control enabled"
        );

        let mut interval = time::interval(self.control_loop.config().poll_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancellation.cancelled() => {
                    info!("Shutdown requested");
                    return Ok(());
                }
                _ = interval.tick() => {
                    self.tick().await?;
                }
            }
        }
    }

    async fn tick(&mut self) -> Result<()> {
        let config = self.control_loop.config();
        let manual_check_due =
            self.ticks > 0 && self.ticks % u64::from(config.manual_check_ticks) == 0;
        let safety_net_due =
            self.ticks > 0 && self.ticks % u64::from(config.safety_evaluation_ticks) == 0;
        self.ticks += 1;

        if manual_check_due {
            self.ensure_manual_control().await?;
        }
        if safety_net_due {
            self.control_loop.evaluate_if_active();
        }

        let temperature = self.sensor.read_temperature().await?;
        self.watch_overheat(temperature);

        if let Some(command) = self.control_loop.tick(temperature) {
            self.write_speed(command).await?;
        }

        trace!(
            temp_c = %temperature,
            mode = %self.control_loop.mode(),
            target_pct = %self.control_loop.state().speed.target,
            speed_pct = %self.control_loop.state().speed.current,
            "Tick"
        );
        Ok(())
    }

    /// Take control back if the embedded controller reclaimed it.
    async fn ensure_manual_control(&mut self) -> Result<()> {
        let enabled = self.io.read_register(self.registers.manual_enable).await?;
        if enabled != MANUAL_CONTROL_OFF {
            return Ok(());
        }

        warn!("Manual fan control was revoked, re-enabling");
        self.io
            .write_register(self.registers.manual_enable, MANUAL_CONTROL_ON)
            .await?;
        let command = self.control_loop.resync();
        self.write_speed(command).await
    }

    async fn write_speed(&mut self, command: FanSpeedCommand) -> Result<()> {
        self.io
            .write_register(self.registers.speed_control, command.register_value)
            .await?;
        debug!(
            speed_pct = %command.speed_percent.round(),
            value = command.register_value,
            "Wrote fan speed"
        );
        Ok(())
    }

    fn watch_overheat(&mut self, temperature: f32) {
        let dangerous = self.control_loop.config().dangerous_temperature_c;
        match self.overheat.check(temperature >= dangerous) {
            AlarmStatus::Triggered => error!(
                temp_c = %temperature,
                dangerous_c = %dangerous,
                "Temperature at dangerous level"
            ),
            AlarmStatus::Resolved => info!(
                temp_c = %temperature,
                "Temperature back below dangerous level"
            ),
            AlarmStatus::Idle | AlarmStatus::Pending | AlarmStatus::Active => {}
        }
    }
}
