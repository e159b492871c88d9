//! Wall-clock adapter.

use chrono::{DateTime, Utc};

use crate::ports::ClockPort;

/// Production clock backed by the system time.
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl ClockPort for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
