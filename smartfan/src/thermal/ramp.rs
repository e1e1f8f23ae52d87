/// Commanded fan speed and the target it is moving toward, both in
/// percent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FanSpeed {
    pub target: f32,
    pub current: f32,
    /// Set once `current` reached `target`. Cleared by every retarget.
    pub satisfied: bool,
}

impl FanSpeed {
    /// Start at `percent` with the target equal to it.
    pub fn at(percent: f32) -> Self {
        let percent = percent.clamp(0.0, 100.0);
        Self {
            target: percent,
            current: percent,
            satisfied: false,
        }
    }

    pub fn retarget(&mut self, target: f32) {
        self.target = target.clamp(0.0, 100.0);
        self.satisfied = false;
    }
}

/// Moves the commanded speed toward its target a step per tick.
///
/// Spin-up uses larger steps the further away the target is; spin-down
/// always uses one small step.
#[derive(Debug, Clone)]
pub struct SpeedRamper {
    /// `(distance above which, step)`, checked in order. The last entry
    /// should have a distance of zero.
    pub up_steps: [(f32, f32); 3],
    pub down_step: f32,
}

impl Default for SpeedRamper {
    fn default() -> Self {
        Self {
            up_steps: [(16.0, 20.0), (8.0, 10.0), (0.0, 4.0)],
            down_step: 2.0,
        }
    }
}

impl SpeedRamper {
    /// Advance `speed` by one tick. No-op once satisfied.
    pub fn advance(&self, speed: &mut FanSpeed) {
        if speed.satisfied {
            return;
        }

        let distance = speed.target - speed.current;
        if distance > 0.0 {
            speed.current += self.up_step(distance);
            if speed.current >= speed.target {
                speed.current = speed.target;
                speed.satisfied = true;
            }
        } else if distance < 0.0 {
            speed.current -= self.down_step;
            if speed.current <= speed.target {
                speed.current = speed.target;
                speed.satisfied = true;
            }
        } else {
            speed.satisfied = true;
        }
    }

    fn up_step(&self, distance: f32) -> f32 {
        self.up_steps
            .iter()
            .find(|(above, _)| distance > *above)
            .map(|(_, step)| *step)
            .unwrap_or(self.up_steps[self.up_steps.len() - 1].1)
    }
}
