//! Tick-debounced alarm for sustained overheating.
//!
//! The alarm fires once the condition has held for a number of consecutive
//! ticks, stays quiet while it persists, and reports resolution once when
//! the condition clears.

/// Edge reported by [`OverheatAlarm::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmStatus {
    /// Condition false, nothing pending.
    Idle,
    /// Condition true, not yet for long enough.
    Pending,
    /// Condition has now held for the full debounce. Reported once per
    /// episode.
    Triggered,
    /// Already triggered and still true.
    Active,
    /// Was triggered, condition just cleared. Reported once.
    Resolved,
}

#[derive(Debug)]
pub struct OverheatAlarm {
    debounce_ticks: u32,
    consecutive: u32,
    fired: bool,
}

impl OverheatAlarm {
    pub fn new(debounce_ticks: u32) -> Self {
        Self {
            debounce_ticks: debounce_ticks.max(1),
            consecutive: 0,
            fired: false,
        }
    }

    pub fn check(&mut self, condition: bool) -> AlarmStatus {
        if !condition {
            self.consecutive = 0;
            if std::mem::take(&mut self.fired) {
                return AlarmStatus::Resolved;
            }
            return AlarmStatus::Idle;
        }

        if self.fired {
            return AlarmStatus::Active;
        }

        self.consecutive += 1;
        if self.consecutive >= self.debounce_ticks {
            self.fired = true;
            AlarmStatus::Triggered
        } else {
            AlarmStatus::Pending
        }
    }
}
