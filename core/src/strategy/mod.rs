//! Fishing-continuation strategies: after every tow, should the vessel
//! keep fishing or head home?
//!
//! A chain is a stack of decorators around one base strategy. The outer
//! decorator is asked first and either forces an answer or asks the
//! strategy it wraps. Built once per fisher from `StrategyConfig`:
//!
//!   QuotaLimit -> TowLimit -> MaximumDuration -> DailyReturn -> base
//!
//! Decorators switched off in the config are left out of the stack.

pub mod base;
pub mod decorators;
pub mod logit;

pub use base::{FishUntilFull, FixedDecision};
pub use decorators::{
    DailyReturnDecorator, MaximumDurationDecorator, QuotaLimitDecorator, TowLimitDecorator,
};
pub use logit::{Feature, LogisticClassifier, LogitReturnStrategy, LogitTerm};

use crate::{
    clock::Calendar,
    config::{BaseStrategyConfig, StrategyConfig},
    market::QuotaMarkets,
    regulation::Regulation,
    rng::SubsystemRng,
    species::SpeciesId,
    types::{Biomass, FisherId, Tick},
};
use std::collections::BTreeMap;

/// What a fisher brings to every decision.
#[derive(Debug, Clone)]
pub struct FisherProfile {
    pub id:            FisherId,
    /// Species the gear catches; the quota-limit decorator watches these.
    pub targets:       Vec<SpeciesId>,
    pub hold_capacity: Biomass,
}

/// The trip so far. Updated by the fleet after each tow.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TripRecord {
    pub started_at:   Tick,
    /// Tows made this trip.
    pub effort:       u32,
    pub hours_at_sea: Tick,
    pub catch:        BTreeMap<SpeciesId, Biomass>,
}

impl TripRecord {
    pub fn new(started_at: Tick) -> Self {
        Self { started_at, ..Self::default() }
    }

    pub fn record_tow(&mut self, landed: &[(SpeciesId, Biomass)]) {
        self.effort += 1;
        for &(species, amount) in landed {
            *self.catch.entry(species).or_insert(0.0) += amount;
        }
    }

    pub fn total_catch(&self) -> Biomass {
        self.catch.values().sum()
    }

    /// Share of the hold in use, 0 for a vessel without a hold.
    pub fn hold_fill(&self, capacity: Biomass) -> f64 {
        if capacity > 0.0 { self.total_catch() / capacity } else { 0.0 }
    }

    pub fn hold_is_full(&self, capacity: Biomass) -> bool {
        capacity > 0.0 && self.total_catch() >= capacity
    }
}

/// Read-only view handed down the chain.
pub struct DecisionContext<'a> {
    pub fisher:     &'a FisherProfile,
    pub trip:       &'a TripRecord,
    pub regulation: &'a Regulation,
    pub markets:    &'a QuotaMarkets,
    pub calendar:   &'a Calendar,
    pub now:        Tick,
}

pub trait FishingStrategy: Send {
    fn name(&self) -> &'static str;

    /// True to keep fishing, false to return to port.
    fn should_continue(&mut self, ctx: &DecisionContext<'_>, rng: &mut SubsystemRng) -> bool;

    /// Called when a new trip begins; stateful nodes reset here.
    fn trip_started(&mut self) {}
}

/// Assemble the decorator stack for one fisher.
pub fn build_chain(config: &StrategyConfig) -> Box<dyn FishingStrategy> {
    let mut chain: Box<dyn FishingStrategy> = match &config.base {
        BaseStrategyConfig::FishUntilFull { min_hold_fraction } => {
            Box::new(FishUntilFull::new(*min_hold_fraction))
        }
        BaseStrategyConfig::Fixed { keep_fishing } => Box::new(FixedDecision(*keep_fishing)),
        BaseStrategyConfig::Logit { terms, effort_threshold } => Box::new(
            LogitReturnStrategy::new(LogisticClassifier::new(terms.clone()))
                .with_effort_threshold(*effort_threshold),
        ),
    };
    if let Some(window) = config.daily_return_hours {
        chain = Box::new(DailyReturnDecorator::new(chain, window));
    }
    if let Some(max_hours) = config.max_hours_at_sea {
        chain = Box::new(MaximumDurationDecorator::new(chain, max_hours));
    }
    if let Some(max_tows) = config.tow_limit {
        chain = Box::new(TowLimitDecorator::new(chain, max_tows));
    }
    if config.quota_limit {
        chain = Box::new(QuotaLimitDecorator::new(chain));
    }
    chain
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::rng::RngBank;
    use crate::rng::SubsystemSlot;

    pub fn profile(targets: &[SpeciesId]) -> FisherProfile {
        FisherProfile { id: "a".into(), targets: targets.to_vec(), hold_capacity: 100.0 }
    }

    pub fn trip(effort: u32, hours_at_sea: Tick, catch: Biomass) -> TripRecord {
        let mut trip = TripRecord { started_at: 0, effort, hours_at_sea, catch: BTreeMap::new() };
        if catch > 0.0 {
            trip.catch.insert(SpeciesId(0), catch);
        }
        trip
    }

    pub fn rng() -> SubsystemRng {
        RngBank::new(7).for_subsystem_at_tick(SubsystemSlot::Strategy, 0)
    }

    pub fn ask(
        strategy:   &mut dyn FishingStrategy,
        fisher:     &FisherProfile,
        trip:       &TripRecord,
        regulation: &Regulation,
        now:        Tick,
    ) -> bool {
        let markets = QuotaMarkets::new();
        let calendar = Calendar::default();
        let ctx = DecisionContext { fisher, trip, regulation, markets: &markets, calendar: &calendar, now };
        strategy.should_continue(&ctx, &mut rng())
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn chain_names_outer_first() {
        let config = StrategyConfig::default();
        let chain = build_chain(&config);
        assert_eq!(chain.name(), "quota_limit");
    }

    #[test]
    fn empty_trip_never_returns_through_default_chain() {
        let mut chain = build_chain(&StrategyConfig::default());
        let fisher = profile(&[]);
        let keep = ask(chain.as_mut(), &fisher, &trip(0, 0, 0.0), &Regulation::Unregulated, 1);
        assert!(keep);
    }
}
