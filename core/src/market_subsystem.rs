//! Market subsystem: closes the trading session at the end of each
//! simulated day and rolls the regulatory period over at its last tick.
//!
//! Runs after the fleet, so every catch of the day is already on the
//! books when the session clears.

use crate::{
    clock::SimClock,
    error::SimResult,
    event::SimEvent,
    quota_system::QuotaSystem,
    rng::SubsystemRng,
    subsystem::SimSubsystem,
    types::Tick,
};
use std::any::Any;

#[derive(Debug, Default)]
pub struct MarketSubsystem {
    sessions_closed: u64,
}

impl MarketSubsystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sessions_closed(&self) -> u64 {
        self.sessions_closed
    }
}

impl SimSubsystem for MarketSubsystem {
    fn name(&self) -> &'static str {
        "market"
    }

    fn update(
        &mut self,
        tick:  Tick,
        clock: &SimClock,
        quota: &mut QuotaSystem,
        _rng:  &mut SubsystemRng,
    ) -> SimResult<Vec<SimEvent>> {
        if clock.is_day_close(tick) {
            let period_end = clock.is_period_close(tick);
            quota.clear_markets(tick, period_end)?;
            self.sessions_closed += 1;
            if period_end {
                quota.rollover(tick);
            }
        }
        Ok(quota.drain_events())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
