//! Per-tenant world clock.
//!
//! The clock counts elapsed world-seconds since the tenant's world began.
//! Calendar values (day, hour, period) are derived from the elapsed count and
//! the configured day length, so changing the day length never rewrites
//! persisted state.

use serde::{Deserialize, Serialize};

use crate::ids::{ClockId, TenantId};

/// World-seconds in one in-game day.
pub const DEFAULT_DAY_LENGTH_SECS: f64 = 86_400.0;

// =============================================================================
// Time of Day
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeOfDay {
    Morning,
    Afternoon,
    Evening,
    Night,
}

impl TimeOfDay {
    pub fn display_name(&self) -> &'static str {
        match self {
            TimeOfDay::Morning => "Morning",
            TimeOfDay::Afternoon => "Afternoon",
            TimeOfDay::Evening => "Evening",
            TimeOfDay::Night => "Night",
        }
    }

    /// Returns the starting hour for this time period.
    pub fn start_hour(&self) -> u8 {
        match self {
            TimeOfDay::Morning => 5,
            TimeOfDay::Afternoon => 12,
            TimeOfDay::Evening => 18,
            TimeOfDay::Night => 22,
        }
    }

    pub fn from_hour(hour: u32) -> TimeOfDay {
        match hour {
            5..=11 => TimeOfDay::Morning,
            12..=17 => TimeOfDay::Afternoon,
            18..=21 => TimeOfDay::Evening,
            _ => TimeOfDay::Night,
        }
    }

    /// Returns the next time period in sequence.
    pub fn next(&self) -> TimeOfDay {
        match self {
            TimeOfDay::Morning => TimeOfDay::Afternoon,
            TimeOfDay::Afternoon => TimeOfDay::Evening,
            TimeOfDay::Evening => TimeOfDay::Night,
            TimeOfDay::Night => TimeOfDay::Morning,
        }
    }
}

impl std::fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

// =============================================================================
// World Clock
// =============================================================================

/// One clock per tenant, persisted like any other world entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldClock {
    pub id: ClockId,
    pub tenant: TenantId,
    /// World-seconds since the world began. Non-decreasing.
    pub elapsed: f64,
    /// World-seconds per in-game day.
    pub day_length: f64,
}

impl WorldClock {
    pub fn new(tenant: TenantId) -> Self {
        Self {
            id: ClockId::new(),
            tenant,
            elapsed: 0.0,
            day_length: DEFAULT_DAY_LENGTH_SECS,
        }
    }

    pub fn advance(&mut self, delta: f64) {
        if delta > 0.0 {
            self.elapsed += delta;
        }
    }

    /// Day number, 1-based.
    pub fn day(&self) -> u64 {
        (self.elapsed / self.day_length).floor() as u64 + 1
    }

    /// Fraction of the current day in `[0, 1)`.
    pub fn fraction_of_day(&self) -> f64 {
        let frac = (self.elapsed % self.day_length) / self.day_length;
        if frac.is_finite() {
            frac
        } else {
            0.0
        }
    }

    /// Hour of the current day (0-23).
    pub fn hour(&self) -> u32 {
        ((self.fraction_of_day() * 24.0).floor() as u32).min(23)
    }

    /// Minute within the current hour (0-59).
    pub fn minute(&self) -> u32 {
        let hours = self.fraction_of_day() * 24.0;
        (((hours - hours.floor()) * 60.0).floor() as u32).min(59)
    }

    pub fn time_of_day(&self) -> TimeOfDay {
        TimeOfDay::from_hour(self.hour())
    }

    pub fn display_time(&self) -> String {
        let hour = self.hour();
        let minute = self.minute();

        let period = if hour >= 12 { "PM" } else { "AM" };
        let display_hour = if hour == 0 {
            12
        } else if hour > 12 {
            hour - 12
        } else {
            hour
        };

        format!("{}:{:02} {}", display_hour, minute, period)
    }

    pub fn display_date(&self) -> String {
        format!("Day {}, {}", self.day(), self.display_time())
    }
}
