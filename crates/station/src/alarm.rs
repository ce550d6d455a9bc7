//! Rate-limited alarm emitters.

use std::time::{Duration, Instant};

/// One alarm class. Fires at most once per `min_interval` while its
/// condition holds. The timer is cleared the moment the condition goes
/// false, so re-entering the alarm state fires immediately instead of
/// waiting out a stale interval.
#[derive(Debug)]
pub struct AlarmTimer {
    last_fired_at: Option<Instant>,
    min_interval: Duration,
}

impl AlarmTimer {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            last_fired_at: None,
            min_interval,
        }
    }

    /// Advance the timer for this tick. Returns true when the alarm side
    /// effects should fire now.
    pub fn update(&mut self, condition: bool, now: Instant) -> bool {
        if !condition {
            self.last_fired_at = None;
            return false;
        }
        match self.last_fired_at {
            Some(last) if now.duration_since(last) < self.min_interval => false,
            _ => {
                self.last_fired_at = Some(now);
                true
            }
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
