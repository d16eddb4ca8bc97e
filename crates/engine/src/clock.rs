use std::sync::Mutex;

use time::{Duration, OffsetDateTime};

/// Source of audit timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

/// Wall-clock time in UTC.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Deterministic clock: starts at a fixed instant and advances by `step`
/// after every reading. A zero step gives a frozen clock.
#[derive(Debug)]
pub struct SteppingClock {
    next: Mutex<OffsetDateTime>,
    step: Duration,
}

impl SteppingClock {
    pub fn new(start: OffsetDateTime, step: Duration) -> Self {
        Self {
            next: Mutex::new(start),
            step,
        }
    }

    pub fn fixed(at: OffsetDateTime) -> Self {
        Self::new(at, Duration::ZERO)
    }
}

impl Clock for SteppingClock {
    fn now(&self) -> OffsetDateTime {
        // A poisoned lock still holds a valid instant.
        let mut next = self.next.lock().unwrap_or_else(|p| p.into_inner());
        let now = *next;
        *next = now + self.step;
        now
    }
}
