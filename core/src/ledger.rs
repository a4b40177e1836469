//! Catch ledger: remaining allowance per holder and species for the
//! current regulatory period.
//!
//! RULE: The ledger is pure bookkeeping. Policy lives in the regulation
//! that owns it; agent code only ever reads a ledger.
//!
//! Invariants held after every call:
//!   - allowance >= 0
//!   - consumed never decreases within a period
//!   - rollover() restores allowance = allotment and consumed = 0

use crate::{
    error::{SimError, SimResult},
    species::SpeciesId,
    types::{Biomass, FisherId},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Amounts below this are treated as zero to absorb float dust
/// from pro-rata arithmetic.
pub const BIOMASS_EPSILON: Biomass = 1e-9;

/// Who an entry belongs to: one fisher, or the pool shared by every
/// fisher under an aggregate quota.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Holder {
    Pool,
    Fisher(FisherId),
}

impl Holder {
    pub fn fisher(id: &str) -> Self {
        Self::Fisher(id.to_string())
    }
}

impl fmt::Display for Holder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pool       => write!(f, "<pool>"),
            Self::Fisher(id) => write!(f, "{id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct LedgerEntry {
    /// Allowance granted at the start of each period.
    pub allotment: Biomass,
    /// Biomass that may still be retained this period.
    pub allowance: Biomass,
    /// Biomass retained so far this period.
    pub consumed:  Biomass,
}

impl LedgerEntry {
    fn new(allotment: Biomass) -> Self {
        Self { allotment, allowance: allotment, consumed: 0.0 }
    }

    pub fn is_exhausted(&self) -> bool {
        self.allowance <= BIOMASS_EPSILON
    }
}

#[derive(Debug, Clone, Default)]
pub struct CatchLedger {
    entries: BTreeMap<(Holder, SpeciesId), LedgerEntry>,
}

impl CatchLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open (or re-open) an entry with its per-period allotment.
    pub fn open(&mut self, holder: Holder, species: SpeciesId, allotment: Biomass) -> SimResult<()> {
        if !allotment.is_finite() || allotment < 0.0 {
            return Err(SimError::InvalidConfig(format!(
                "allotment for {holder} on species {species} must be finite and >= 0, got {allotment}"
            )));
        }
        self.entries.insert((holder, species), LedgerEntry::new(allotment));
        Ok(())
    }

    pub fn entry(&self, holder: &Holder, species: SpeciesId) -> Option<&LedgerEntry> {
        self.entries.get(&(holder.clone(), species))
    }

    pub fn allowance(&self, holder: &Holder, species: SpeciesId) -> Option<Biomass> {
        self.entry(holder, species).map(|e| e.allowance)
    }

    pub fn contains(&self, holder: &Holder, species: SpeciesId) -> bool {
        self.entries.contains_key(&(holder.clone(), species))
    }

    /// Record `amount` as retained against the entry.
    /// Fails without touching the entry if it would go negative.
    pub fn debit(&mut self, holder: &Holder, species: SpeciesId, amount: Biomass) -> SimResult<()> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(SimError::InvalidBiomass { species, value: amount });
        }
        let entry = self.entry_mut(holder, species)?;
        if amount > entry.allowance + BIOMASS_EPSILON {
            return Err(SimError::AllowanceExceeded {
                fisher:    holder.to_string(),
                species,
                requested: amount,
                allowance: entry.allowance,
            });
        }
        entry.allowance = settle(entry.allowance - amount);
        entry.consumed += amount;
        Ok(())
    }

    /// Move `quantity` of allowance from one holder to another.
    /// Used only by market clearing.
    pub fn transfer(
        &mut self,
        from: &Holder,
        to: &Holder,
        species: SpeciesId,
        quantity: Biomass,
    ) -> SimResult<()> {
        if !quantity.is_finite() || quantity < 0.0 {
            return Err(SimError::InvalidQuantity { quantity });
        }
        // Check both ends exist before mutating either.
        self.entry_mut(to, species)?;
        let seller = self.entry_mut(from, species)?;
        if quantity > seller.allowance + BIOMASS_EPSILON {
            return Err(SimError::AllowanceExceeded {
                fisher:    from.to_string(),
                species,
                requested: quantity,
                allowance: seller.allowance,
            });
        }
        seller.allowance = settle(seller.allowance - quantity);
        let buyer = self.entry_mut(to, species)?;
        buyer.allowance += quantity;
        Ok(())
    }

    /// Start a new period: every entry gets its allotment back.
    pub fn rollover(&mut self) {
        for entry in self.entries.values_mut() {
            entry.allowance = entry.allotment;
            entry.consumed = 0.0;
        }
    }

    /// All entries in deterministic (holder, species) order.
    pub fn iter(&self) -> impl Iterator<Item = (&Holder, SpeciesId, &LedgerEntry)> {
        self.entries.iter().map(|((h, s), e)| (h, *s, e))
    }

    /// Sum of allowance over every holder of `species`.
    pub fn total_allowance(&self, species: SpeciesId) -> Biomass {
        self.iter()
            .filter(|(_, s, _)| *s == species)
            .map(|(_, _, e)| e.allowance)
            .sum()
    }

    fn entry_mut(&mut self, holder: &Holder, species: SpeciesId) -> SimResult<&mut LedgerEntry> {
        self.entries
            .get_mut(&(holder.clone(), species))
            .ok_or_else(|| SimError::UnknownFisher {
                fisher:     holder.to_string(),
                regulation: "ledger",
            })
    }
}

fn settle(value: Biomass) -> Biomass {
    if value <= BIOMASS_EPSILON { 0.0 } else { value }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COD: SpeciesId = SpeciesId(0);

    #[test]
    fn debit_tracks_consumed_and_allowance() {
        let mut ledger = CatchLedger::new();
        let a = Holder::fisher("a");
        ledger.open(a.clone(), COD, 100.0).unwrap();
        ledger.debit(&a, COD, 30.0).unwrap();
        ledger.debit(&a, COD, 20.0).unwrap();
        let e = ledger.entry(&a, COD).unwrap();
        assert_eq!(e.allowance, 50.0);
        assert_eq!(e.consumed, 50.0);
    }

    #[test]
    fn overdraw_is_rejected_and_leaves_entry_untouched() {
        let mut ledger = CatchLedger::new();
        let a = Holder::fisher("a");
        ledger.open(a.clone(), COD, 10.0).unwrap();
        let err = ledger.debit(&a, COD, 10.5).unwrap_err();
        assert!(matches!(err, SimError::AllowanceExceeded { .. }));
        assert_eq!(ledger.allowance(&a, COD), Some(10.0));
        assert!(matches!(
            ledger.debit(&a, COD, -1.0),
            Err(SimError::InvalidBiomass { .. })
        ));
    }

    #[test]
    fn transfer_conserves_total() {
        let mut ledger = CatchLedger::new();
        let (a, b) = (Holder::fisher("a"), Holder::fisher("b"));
        ledger.open(a.clone(), COD, 100.0).unwrap();
        ledger.open(b.clone(), COD, 0.0).unwrap();
        ledger.transfer(&a, &b, COD, 40.0).unwrap();
        assert_eq!(ledger.allowance(&a, COD), Some(60.0));
        assert_eq!(ledger.allowance(&b, COD), Some(40.0));
        assert_eq!(ledger.total_allowance(COD), 100.0);
        assert!(ledger.transfer(&b, &a, COD, 41.0).is_err());
        assert_eq!(ledger.total_allowance(COD), 100.0);
    }

    #[test]
    fn rollover_restores_allotment() {
        let mut ledger = CatchLedger::new();
        let a = Holder::fisher("a");
        ledger.open(a.clone(), COD, 100.0).unwrap();
        ledger.debit(&a, COD, 100.0).unwrap();
        assert!(ledger.entry(&a, COD).unwrap().is_exhausted());
        ledger.rollover();
        let e = ledger.entry(&a, COD).unwrap();
        assert_eq!((e.allowance, e.consumed), (100.0, 0.0));
    }

    #[test]
    fn negative_allotment_is_a_config_error() {
        let mut ledger = CatchLedger::new();
        assert!(matches!(
            ledger.open(Holder::Pool, COD, -5.0),
            Err(SimError::InvalidConfig(_))
        ));
    }
}
