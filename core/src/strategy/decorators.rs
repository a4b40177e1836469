//! Decorators: each one either forces a decision or asks the strategy
//! it wraps.

use super::{DecisionContext, FishingStrategy};
use crate::{ledger::BIOMASS_EPSILON, rng::SubsystemRng, types::Tick};

/// Go home as soon as any targeted species has no allowance left.
pub struct QuotaLimitDecorator {
    inner: Box<dyn FishingStrategy>,
}

impl QuotaLimitDecorator {
    pub fn new(inner: Box<dyn FishingStrategy>) -> Self {
        Self { inner }
    }
}

impl FishingStrategy for QuotaLimitDecorator {
    fn name(&self) -> &'static str {
        "quota_limit"
    }

    fn should_continue(&mut self, ctx: &DecisionContext<'_>, rng: &mut SubsystemRng) -> bool {
        for &species in &ctx.fisher.targets {
            match ctx.regulation.remaining(&ctx.fisher.id, species) {
                Ok(Some(left)) if left <= BIOMASS_EPSILON => return false,
                Ok(_) => {}
                Err(e) => {
                    log::warn!(
                        "tick={} strategy: {} cannot read allowance for species {species}: {e}",
                        ctx.now, ctx.fisher.id
                    );
                    return false;
                }
            }
        }
        self.inner.should_continue(ctx, rng)
    }

    fn trip_started(&mut self) {
        self.inner.trip_started();
    }
}

/// Go home after a fixed number of tows.
pub struct TowLimitDecorator {
    inner:    Box<dyn FishingStrategy>,
    max_tows: u32,
}

impl TowLimitDecorator {
    pub fn new(inner: Box<dyn FishingStrategy>, max_tows: u32) -> Self {
        Self { inner, max_tows }
    }
}

impl FishingStrategy for TowLimitDecorator {
    fn name(&self) -> &'static str {
        "tow_limit"
    }

    fn should_continue(&mut self, ctx: &DecisionContext<'_>, rng: &mut SubsystemRng) -> bool {
        if ctx.trip.effort >= self.max_tows {
            return false;
        }
        self.inner.should_continue(ctx, rng)
    }

    fn trip_started(&mut self) {
        self.inner.trip_started();
    }
}

/// Go home when the trip has run too long or the hold is full.
pub struct MaximumDurationDecorator {
    inner:     Box<dyn FishingStrategy>,
    max_hours: Tick,
}

impl MaximumDurationDecorator {
    pub fn new(inner: Box<dyn FishingStrategy>, max_hours: Tick) -> Self {
        Self { inner, max_hours }
    }
}

impl FishingStrategy for MaximumDurationDecorator {
    fn name(&self) -> &'static str {
        "maximum_duration"
    }

    fn should_continue(&mut self, ctx: &DecisionContext<'_>, rng: &mut SubsystemRng) -> bool {
        if ctx.trip.hours_at_sea > self.max_hours || ctx.trip.hold_is_full(ctx.fisher.hold_capacity) {
            return false;
        }
        self.inner.should_continue(ctx, rng)
    }

    fn trip_started(&mut self) {
        self.inner.trip_started();
    }
}

/// Asks the wrapped strategy at most once per window; keeps fishing in
/// between. Never lets a vessel turn back before its first tow or
/// before one window has passed.
pub struct DailyReturnDecorator {
    inner:        Box<dyn FishingStrategy>,
    window:       Tick,
    last_checked: Option<Tick>,
}

impl DailyReturnDecorator {
    pub fn new(inner: Box<dyn FishingStrategy>, window: Tick) -> Self {
        Self { inner, window: window.max(1), last_checked: None }
    }

    pub fn last_checked(&self) -> Option<Tick> {
        self.last_checked
    }
}

impl FishingStrategy for DailyReturnDecorator {
    fn name(&self) -> &'static str {
        "daily_return"
    }

    fn should_continue(&mut self, ctx: &DecisionContext<'_>, rng: &mut SubsystemRng) -> bool {
        if ctx.trip.effort == 0 || ctx.trip.hours_at_sea < self.window {
            return true;
        }
        if let Some(last) = self.last_checked {
            if ctx.now.saturating_sub(last) < self.window {
                return true;
            }
        }
        self.last_checked = Some(ctx.now);
        self.inner.should_continue(ctx, rng)
    }

    fn trip_started(&mut self) {
        self.last_checked = None;
        self.inner.trip_started();
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::FixedDecision;
    use super::*;
    use crate::{
        regulation::{IndividualQuota, Regulation},
        species::SpeciesId,
    };

    const COD: SpeciesId = SpeciesId(0);

    fn keep_going() -> Box<dyn FishingStrategy> {
        Box::new(FixedDecision(true))
    }

    #[test]
    fn quota_limit_returns_when_a_target_is_exhausted() {
        let mut quota = IndividualQuota::new(&[(COD, 10.0)]).unwrap();
        quota.register_fisher("a").unwrap();
        let mut reg = Regulation::IndividualQuota(quota);
        let fisher = profile(&[COD]);
        let mut chain = QuotaLimitDecorator::new(keep_going());

        assert!(ask(&mut chain, &fisher, &trip(1, 1, 5.0), &reg, 1));
        reg.record("a", COD, 10.0, 1, &mut Vec::new()).unwrap();
        assert!(!ask(&mut chain, &fisher, &trip(2, 2, 10.0), &reg, 2));
    }

    #[test]
    fn quota_limit_ignores_unregulated_species() {
        let mut chain = QuotaLimitDecorator::new(keep_going());
        assert!(ask(&mut chain, &profile(&[COD]), &trip(1, 1, 0.0), &Regulation::Unregulated, 1));
    }

    #[test]
    fn tow_limit_caps_effort() {
        let mut chain = TowLimitDecorator::new(keep_going(), 3);
        let fisher = profile(&[]);
        assert!(ask(&mut chain, &fisher, &trip(2, 2, 0.0), &Regulation::Unregulated, 2));
        assert!(!ask(&mut chain, &fisher, &trip(3, 3, 0.0), &Regulation::Unregulated, 3));
    }

    #[test]
    fn maximum_duration_checks_hours_and_hold() {
        let mut chain = MaximumDurationDecorator::new(keep_going(), 48);
        let fisher = profile(&[]);
        assert!(ask(&mut chain, &fisher, &trip(5, 48, 10.0), &Regulation::Unregulated, 48));
        assert!(!ask(&mut chain, &fisher, &trip(5, 49, 10.0), &Regulation::Unregulated, 49));
        assert!(!ask(&mut chain, &fisher, &trip(5, 10, 100.0), &Regulation::Unregulated, 10));
    }

    #[test]
    fn daily_return_consults_inner_once_per_window() {
        let mut chain = DailyReturnDecorator::new(Box::new(FixedDecision(false)), 24);
        let fisher = profile(&[]);
        let reg = Regulation::Unregulated;

        assert!(ask(&mut chain, &fisher, &trip(0, 30, 0.0), &reg, 30));
        assert!(ask(&mut chain, &fisher, &trip(5, 23, 0.0), &reg, 23));
        assert!(!ask(&mut chain, &fisher, &trip(6, 24, 0.0), &reg, 24));
        assert_eq!(chain.last_checked(), Some(24));
        assert!(ask(&mut chain, &fisher, &trip(7, 30, 0.0), &reg, 30));
        assert!(!ask(&mut chain, &fisher, &trip(8, 48, 0.0), &reg, 48));

        chain.trip_started();
        assert_eq!(chain.last_checked(), None);
    }
}
