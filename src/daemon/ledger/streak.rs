use chrono::{DateTime, Utc};

/// Continuous productive time. Never persisted, starts at zero with every daemon run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreakState {
    pub current_streak_seconds: f64,
    pub last_productive_activity_time: Option<DateTime<Utc>>,
    /// Set once the current streak reaches the threshold, so each streak is counted once.
    pub threshold_crossed: bool,
}

impl StreakState {
    /// Extends the streak when the previous productive tick is at most `max_gap` seconds
    /// old, otherwise starts a new streak holding this tick's dwell.
    pub fn extend(&mut self, now: DateTime<Utc>, dwell_seconds: f64, max_gap: f64) {
        let continues = self
            .last_productive_activity_time
            .is_some_and(|last| (now - last).num_milliseconds() as f64 / 1000. <= max_gap);

        if continues {
            self.current_streak_seconds += dwell_seconds;
        } else {
            self.current_streak_seconds = dwell_seconds;
            self.threshold_crossed = false;
        }
        self.last_productive_activity_time = Some(now);
    }

    pub fn reset(&mut self) {
        *self = StreakState::default();
    }

    /// Returns `true` only on the tick that first reaches `threshold`.
    pub fn cross_threshold(&mut self, threshold: f64) -> bool {
        if self.current_streak_seconds >= threshold && !self.threshold_crossed {
            self.threshold_crossed = true;
            return true;
        }
        false
    }

    pub fn is_bonus_active(&self, threshold: f64) -> bool {
        self.current_streak_seconds >= threshold
    }
}
