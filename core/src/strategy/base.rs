//! Base strategies: the innermost node of a chain.

use super::{DecisionContext, FishingStrategy};
use crate::rng::SubsystemRng;

/// Keep fishing until the hold reaches `min_hold_fraction` of capacity.
pub struct FishUntilFull {
    min_hold_fraction: f64,
}

impl FishUntilFull {
    pub fn new(min_hold_fraction: f64) -> Self {
        Self { min_hold_fraction: min_hold_fraction.clamp(0.0, 1.0) }
    }
}

impl FishingStrategy for FishUntilFull {
    fn name(&self) -> &'static str {
        "fish_until_full"
    }

    fn should_continue(&mut self, ctx: &DecisionContext<'_>, _rng: &mut SubsystemRng) -> bool {
        ctx.trip.hold_fill(ctx.fisher.hold_capacity) < self.min_hold_fraction
    }
}

/// Always the same answer.
pub struct FixedDecision(pub bool);

impl FishingStrategy for FixedDecision {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn should_continue(&mut self, _ctx: &DecisionContext<'_>, _rng: &mut SubsystemRng) -> bool {
        self.0
    }
}
