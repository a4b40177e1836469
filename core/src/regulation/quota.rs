//! Quota regulations: one shared pool per species (aggregate), or one
//! entry per fisher and species (individual, non-tradable).

use crate::{
    error::{SimError, SimResult},
    event::SimEvent,
    ledger::{CatchLedger, Holder, LedgerEntry},
    species::SpeciesId,
    types::{Biomass, FisherId, Tick},
};

/// Total allowable catch shared by every fisher. Once any pool is
/// used up the whole season closes, for every species.
#[derive(Debug, Clone)]
pub struct AggregateQuota {
    ledger: CatchLedger,
    closed: bool,
}

impl AggregateQuota {
    pub fn new(totals: &[(SpeciesId, Biomass)]) -> SimResult<Self> {
        let mut ledger = CatchLedger::new();
        for &(species, total) in totals {
            ledger.open(Holder::Pool, species, total)?;
        }
        let mut quota = Self { ledger, closed: false };
        quota.closed = quota.any_pool_exhausted();
        Ok(quota)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn pool(&self, species: SpeciesId) -> Option<&LedgerEntry> {
        self.ledger.entry(&Holder::Pool, species)
    }

    pub fn ledger(&self) -> &CatchLedger {
        &self.ledger
    }

    pub(super) fn can_retain(&self, species: SpeciesId, proposed: Biomass) -> SimResult<Biomass> {
        let allowance = self.pool_allowance(species)?;
        if self.closed {
            return Ok(0.0);
        }
        Ok(proposed.min(allowance))
    }

    pub(super) fn record(
        &mut self,
        fisher:   &str,
        species:  SpeciesId,
        retained: Biomass,
        now:      Tick,
        events:   &mut Vec<SimEvent>,
    ) -> SimResult<()> {
        self.pool_allowance(species)?;
        self.ledger.debit(&Holder::Pool, species, retained)?;
        if !self.closed && self.any_pool_exhausted() {
            self.closed = true;
            log::info!(
                "tick={now} regulation: aggregate quota for species {species} used up by {fisher}, season closed"
            );
            events.push(SimEvent::SeasonClosed { tick: now, species });
        }
        Ok(())
    }

    pub(super) fn remaining(&self, species: SpeciesId) -> SimResult<Biomass> {
        let allowance = self.pool_allowance(species)?;
        Ok(if self.closed { 0.0 } else { allowance })
    }

    pub(super) fn rollover(&mut self) {
        self.ledger.rollover();
        self.closed = self.any_pool_exhausted();
    }

    fn pool_allowance(&self, species: SpeciesId) -> SimResult<Biomass> {
        self.ledger
            .allowance(&Holder::Pool, species)
            .ok_or(SimError::UnregulatedSpecies { species })
    }

    fn any_pool_exhausted(&self) -> bool {
        self.ledger.iter().any(|(_, _, e)| e.is_exhausted())
    }
}

/// Individual, non-tradable quota: every registered fisher gets the
/// same allotment per species.
#[derive(Debug, Clone)]
pub struct IndividualQuota {
    ledger:     CatchLedger,
    allotments: Vec<(SpeciesId, Biomass)>,
}

impl IndividualQuota {
    pub fn new(allotments: &[(SpeciesId, Biomass)]) -> SimResult<Self> {
        for &(species, amount) in allotments {
            if !amount.is_finite() || amount < 0.0 {
                return Err(SimError::InvalidConfig(format!(
                    "per-fisher allotment for species {species} must be finite and >= 0, got {amount}"
                )));
            }
        }
        Ok(Self { ledger: CatchLedger::new(), allotments: allotments.to_vec() })
    }

    pub fn register_fisher(&mut self, fisher: &str) -> SimResult<()> {
        for &(species, amount) in &self.allotments {
            if !self.ledger.contains(&Holder::fisher(fisher), species) {
                self.ledger.open(Holder::fisher(fisher), species, amount)?;
            }
        }
        Ok(())
    }

    pub fn covers(&self, species: SpeciesId) -> bool {
        self.allotments.iter().any(|(s, _)| *s == species)
    }

    pub fn ledger(&self) -> &CatchLedger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut CatchLedger {
        &mut self.ledger
    }

    pub fn allowance(&self, fisher: &str, species: SpeciesId) -> SimResult<Biomass> {
        if !self.covers(species) {
            return Err(SimError::UnregulatedSpecies { species });
        }
        self.ledger
            .allowance(&Holder::fisher(fisher), species)
            .ok_or_else(|| SimError::UnknownFisher {
                fisher:     fisher.to_string(),
                regulation: "individual_quota",
            })
    }

    /// (fisher, allowance) for every holder of `species`, in id order.
    pub fn allowances(&self, species: SpeciesId) -> Vec<(FisherId, Biomass)> {
        self.ledger
            .iter()
            .filter(|(_, s, _)| *s == species)
            .filter_map(|(holder, _, entry)| match holder {
                Holder::Fisher(id) => Some((id.clone(), entry.allowance)),
                Holder::Pool => None,
            })
            .collect()
    }

    pub(super) fn can_retain(&self, fisher: &str, species: SpeciesId, proposed: Biomass) -> SimResult<Biomass> {
        Ok(proposed.min(self.allowance(fisher, species)?))
    }

    pub(super) fn record(&mut self, fisher: &str, species: SpeciesId, retained: Biomass) -> SimResult<()> {
        self.allowance(fisher, species)?;
        self.ledger.debit(&Holder::fisher(fisher), species, retained)
    }

    pub(super) fn rollover(&mut self) {
        self.ledger.rollover();
    }
}
