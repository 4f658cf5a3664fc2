//! Wall clock abstraction.
//!
//! Outgoing messages carry a local hour:minute stamp. Routing the lookup
//! through [`Clock`] keeps the router deterministic under test.

use chrono::{Local, NaiveTime};

/// Source of the local time of day.
pub trait Clock: Send + Sync + 'static {
    /// Current local time of day.
    fn local_time(&self) -> NaiveTime;
}

/// Reads the system clock in the local timezone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn local_time(&self) -> NaiveTime {
        Local::now().time()
    }
}

/// Always reports the same time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock(pub NaiveTime);

impl FixedClock {
    /// Clock frozen at `hour:minute`. `None` if out of range.
    pub fn at(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(Self)
    }
}

impl Clock for FixedClock {
    fn local_time(&self) -> NaiveTime {
        self.0
    }
}
