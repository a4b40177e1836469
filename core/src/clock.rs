//! Simulation clock: owns tick state, pause, and the mapping from
//! ticks to days, regulatory periods and calendar dates.

use crate::types::{Period, RunId, Tick, HOURS_PER_DAY};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimClock {
    pub run_id:       RunId,
    pub current_tick: Tick,
    pub paused:       bool,
    /// Length of one regulatory period in simulated days.
    pub period_days:  u64,
}

impl SimClock {
    pub fn new(run_id: RunId, period_days: u64) -> Self {
        Self {
            run_id,
            current_tick: 0,
            paused: true,
            period_days: period_days.max(1),
        }
    }

    /// Advance one tick. Returns the new tick number.
    /// Panics if called while paused; callers must check.
    pub fn advance(&mut self) -> Tick {
        assert!(!self.paused, "advance() called on paused clock");
        self.current_tick += 1;
        self.current_tick
    }

    pub fn pause(&mut self)  { self.paused = true;  }
    pub fn resume(&mut self) { self.paused = false; }

    /// Whole simulated days elapsed at the current tick.
    pub fn day(&self) -> u64 {
        self.current_tick / HOURS_PER_DAY
    }

    /// The regulatory period the current tick falls in.
    pub fn period(&self) -> Period {
        self.period_of(self.current_tick)
    }

    pub fn period_of(&self, tick: Tick) -> Period {
        // The boundary tick itself still belongs to the closing period.
        tick.saturating_sub(1) / self.ticks_per_period()
    }

    pub fn ticks_per_period(&self) -> Tick {
        self.period_days * HOURS_PER_DAY
    }

    /// True on the last tick of a simulated day (the trading close).
    pub fn is_day_close(&self, tick: Tick) -> bool {
        tick > 0 && tick % HOURS_PER_DAY == 0
    }

    /// True on the last tick of a regulatory period.
    pub fn is_period_close(&self, tick: Tick) -> bool {
        tick > 0 && tick % self.ticks_per_period() == 0
    }
}

/// Maps ticks onto calendar dates, starting at midnight of `epoch`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Calendar {
    pub epoch: NaiveDate,
}

impl Calendar {
    pub fn new(epoch: NaiveDate) -> Self {
        Self { epoch }
    }

    pub fn datetime(&self, tick: Tick) -> NaiveDateTime {
        let hours = i64::try_from(tick).unwrap_or(i64::MAX / 3_600_000);
        self.epoch.and_time(NaiveTime::default()) + Duration::hours(hours)
    }

    pub fn date(&self, tick: Tick) -> NaiveDate {
        self.datetime(tick).date()
    }

    pub fn is_weekend(&self, tick: Tick) -> bool {
        matches!(self.date(tick).weekday(), Weekday::Sat | Weekday::Sun)
    }
}

impl Default for Calendar {
    fn default() -> Self {
        // 2001-01-01 was a Monday; keeps weekday arithmetic easy to reason about.
        Self { epoch: NaiveDate::from_ymd_opt(2001, 1, 1).unwrap_or_default() }
    }
}
