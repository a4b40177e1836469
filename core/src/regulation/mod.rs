//! Regulation: decides, per catch event, how much of a capture may be
//! retained, and whether fishing is permitted at all.
//!
//! The variants form a closed set dispatched by `match`:
//!   Unregulated, AggregateQuota, IndividualQuota, Itq,
//!   AreaClosure (wraps one regulation), Composite (one per species).
//!
//! RULE: a regulation owns its ledger. Nothing else debits it; the
//! market only moves allowance between entries of an ITQ ledger.

pub mod closure;
pub mod composite;
pub mod itq;
pub mod quota;

pub use closure::{AreaClosure, ClosedArea, ClosureWindow, GridCell};
pub use composite::CompositeRegulation;
pub use itq::ItqRegulation;
pub use quota::{AggregateQuota, IndividualQuota};

use crate::{
    accounts::Accounts,
    error::{SimError, SimResult},
    event::SimEvent,
    market::QuotaMarkets,
    snapshot::LedgerRow,
    species::SpeciesId,
    types::{Biomass, Period, Tick},
};

/// Everything a regulation may touch besides its own ledger while it
/// decides on a catch: the markets (ITQ only), fishers' money, and the
/// event sink of the current tick.
pub struct MarketDesk<'a> {
    pub markets:  &'a mut QuotaMarkets,
    pub accounts: &'a mut Accounts,
    pub events:   &'a mut Vec<SimEvent>,
    pub period:   Period,
}

pub enum Regulation {
    Unregulated,
    AggregateQuota(AggregateQuota),
    IndividualQuota(IndividualQuota),
    Itq(ItqRegulation),
    AreaClosure(AreaClosure),
    Composite(CompositeRegulation),
}

impl Regulation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unregulated        => "unregulated",
            Self::AggregateQuota(_)  => "aggregate_quota",
            Self::IndividualQuota(_) => "individual_quota",
            Self::Itq(_)             => "itq",
            Self::AreaClosure(_)     => "area_closure",
            Self::Composite(_)       => "composite",
        }
    }

    /// Open per-fisher entries. Regulations without individual
    /// entries ignore this.
    pub fn register_fisher(&mut self, fisher: &str) -> SimResult<()> {
        match self {
            Self::Unregulated | Self::AggregateQuota(_) => Ok(()),
            Self::IndividualQuota(r) => r.register_fisher(fisher),
            Self::Itq(r)             => r.register_fisher(fisher),
            Self::AreaClosure(r)     => r.inner_mut().register_fisher(fisher),
            Self::Composite(r) => {
                for sub in r.regulations_mut() {
                    sub.register_fisher(fisher)?;
                }
                Ok(())
            }
        }
    }

    /// May `fisher` fish at `location` at all right now?
    pub fn is_active(&self, fisher: &str, location: GridCell, now: Tick) -> bool {
        match self {
            Self::Unregulated | Self::IndividualQuota(_) | Self::Itq(_) => true,
            Self::AggregateQuota(r) => !r.is_closed(),
            Self::AreaClosure(r) => {
                !r.closes(location, now) && r.inner().is_active(fisher, location, now)
            }
            Self::Composite(r) => r
                .regulations()
                .all(|sub| sub.is_active(fisher, location, now)),
        }
    }

    /// How much of `proposed` the fisher may keep: 0 <= result <= proposed.
    pub fn can_retain(
        &mut self,
        fisher:   &str,
        species:  SpeciesId,
        proposed: Biomass,
        now:      Tick,
        desk:     &mut MarketDesk<'_>,
    ) -> SimResult<Biomass> {
        check_biomass(species, proposed)?;
        let allowed = match self {
            Self::Unregulated        => proposed,
            Self::AggregateQuota(r)  => r.can_retain(species, proposed)?,
            Self::IndividualQuota(r) => r.can_retain(fisher, species, proposed)?,
            Self::Itq(r)             => r.can_retain(fisher, species, proposed, now, desk)?,
            Self::AreaClosure(r) => r
                .inner_mut()
                .can_retain(fisher, species, proposed, now, desk)?,
            Self::Composite(r) => r
                .regulation_for_mut(species)?
                .can_retain(fisher, species, proposed, now, desk)?,
        };
        Ok(allowed.clamp(0.0, proposed))
    }

    /// Debit what was actually kept.
    pub fn record(
        &mut self,
        fisher:   &str,
        species:  SpeciesId,
        retained: Biomass,
        now:      Tick,
        events:   &mut Vec<SimEvent>,
    ) -> SimResult<()> {
        check_biomass(species, retained)?;
        match self {
            Self::Unregulated        => Ok(()),
            Self::AggregateQuota(r)  => r.record(fisher, species, retained, now, events),
            Self::IndividualQuota(r) => r.record(fisher, species, retained),
            Self::Itq(r)             => r.record(fisher, species, retained),
            Self::AreaClosure(r)     => r.inner_mut().record(fisher, species, retained, now, events),
            Self::Composite(r) => r
                .regulation_for_mut(species)?
                .record(fisher, species, retained, now, events),
        }
    }

    /// Remaining allowance for `fisher` on `species`; None when the
    /// species is not quota-limited.
    pub fn remaining(&self, fisher: &str, species: SpeciesId) -> SimResult<Option<Biomass>> {
        match self {
            Self::Unregulated        => Ok(None),
            Self::AggregateQuota(r)  => r.remaining(species).map(Some),
            Self::IndividualQuota(r) => r.allowance(fisher, species).map(Some),
            Self::Itq(r)             => r.allowance(fisher, species).map(Some),
            Self::AreaClosure(r)     => r.inner().remaining(fisher, species),
            Self::Composite(r)       => r.regulation_for(species)?.remaining(fisher, species),
        }
    }

    /// New period: allowances back to allotment, closures lifted.
    pub fn rollover(&mut self) {
        match self {
            Self::Unregulated        => {}
            Self::AggregateQuota(r)  => r.rollover(),
            Self::IndividualQuota(r) => r.rollover(),
            Self::Itq(r)             => r.rollover(),
            Self::AreaClosure(r)     => r.inner_mut().rollover(),
            Self::Composite(r) => {
                for sub in r.regulations_mut() {
                    sub.rollover();
                }
            }
        }
    }

    /// The ITQ regulation managing `species`, wherever it sits.
    pub fn itq_mut(&mut self, species: SpeciesId) -> Option<&mut ItqRegulation> {
        match self {
            Self::Itq(r) if r.covers(species) => Some(r),
            Self::AreaClosure(r) => r.inner_mut().itq_mut(species),
            Self::Composite(r)   => r.regulation_for_mut(species).ok()?.itq_mut(species),
            _ => None,
        }
    }

    /// Every ledger entry held anywhere in this regulation.
    pub fn ledger_rows(&self) -> Vec<LedgerRow> {
        let mut rows = Vec::new();
        self.collect_rows(&mut rows);
        rows
    }

    fn collect_rows(&self, rows: &mut Vec<LedgerRow>) {
        let ledger = match self {
            Self::Unregulated        => return,
            Self::AggregateQuota(r)  => r.ledger(),
            Self::IndividualQuota(r) => r.ledger(),
            Self::Itq(r)             => r.ledger(),
            Self::AreaClosure(r) => {
                r.inner().collect_rows(rows);
                return;
            }
            Self::Composite(r) => {
                for sub in r.regulations() {
                    sub.collect_rows(rows);
                }
                return;
            }
        };
        rows.extend(ledger.iter().map(|(holder, species, entry)| LedgerRow {
            regulation: self.name().to_string(),
            holder:     holder.clone(),
            species,
            entry:      *entry,
        }));
    }
}

pub(crate) fn check_biomass(species: SpeciesId, value: Biomass) -> SimResult<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(SimError::InvalidBiomass { species, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COD: SpeciesId = SpeciesId(0);

    fn desk_parts() -> (QuotaMarkets, Accounts, Vec<SimEvent>) {
        (QuotaMarkets::new(), Accounts::new(), Vec::new())
    }

    #[test]
    fn unregulated_allows_everything() {
        let (mut markets, mut accounts, mut events) = desk_parts();
        let mut desk = MarketDesk { markets: &mut markets, accounts: &mut accounts, events: &mut events, period: 0 };
        let mut reg = Regulation::Unregulated;
        assert_eq!(reg.can_retain("a", COD, 123.0, 1, &mut desk).unwrap(), 123.0);
        assert!(reg.is_active("a", GridCell::default(), 1));
        assert_eq!(reg.remaining("a", COD).unwrap(), None);
    }

    #[test]
    fn negative_proposal_is_rejected_for_every_variant() {
        let (mut markets, mut accounts, mut events) = desk_parts();
        let mut desk = MarketDesk { markets: &mut markets, accounts: &mut accounts, events: &mut events, period: 0 };
        let mut reg = Regulation::AggregateQuota(AggregateQuota::new(&[(COD, 10.0)]).unwrap());
        assert!(matches!(
            reg.can_retain("a", COD, -1.0, 1, &mut desk),
            Err(SimError::InvalidBiomass { .. })
        ));
        assert!(matches!(
            Regulation::Unregulated.can_retain("a", COD, f64::NAN, 1, &mut desk),
            Err(SimError::InvalidBiomass { .. })
        ));
    }

    #[test]
    fn composite_without_species_fails_fast() {
        let (mut markets, mut accounts, mut events) = desk_parts();
        let mut desk = MarketDesk { markets: &mut markets, accounts: &mut accounts, events: &mut events, period: 0 };
        let mut reg = Regulation::Composite(
            CompositeRegulation::new().with(COD, Regulation::Unregulated),
        );
        let err = reg.can_retain("a", SpeciesId(9), 1.0, 1, &mut desk).unwrap_err();
        assert!(matches!(err, SimError::UnregulatedSpecies { species } if species == SpeciesId(9)));
    }
}
