//! Subsystem trait.
//!
//! RULE: Every subsystem implements SimSubsystem.
//! The engine calls update() on each registered subsystem
//! in registration order, every tick.
//! Execution order is fixed and documented in engine.rs.

use crate::{
    clock::SimClock,
    error::SimResult,
    event::SimEvent,
    quota_system::QuotaSystem,
    rng::SubsystemRng,
    types::Tick,
};
use std::any::Any;

/// The contract every subsystem must fulfill.
pub trait SimSubsystem: Send {
    /// Unique stable name for this subsystem.
    fn name(&self) -> &'static str;

    /// Called once per tick by the engine.
    ///
    /// - `tick`:  the current tick number
    /// - `clock`: day and period boundaries
    /// - `quota`: the shared quota system; subsystems act through it
    /// - `rng`:   this subsystem's deterministic RNG for this tick
    ///
    /// Returns the tick's events from this subsystem, in emission order.
    fn update(
        &mut self,
        tick:  Tick,
        clock: &SimClock,
        quota: &mut QuotaSystem,
        rng:   &mut SubsystemRng,
    ) -> SimResult<Vec<SimEvent>>;

    /// For downcasting in tests and tooling only.
    fn as_any(&self) -> &dyn Any;
}
