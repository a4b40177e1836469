//! Snapshot serialization: ledger, market and account state to JSON.
//!
//! A snapshot is taken every SNAPSHOT_INTERVAL ticks. It is a
//! reporting artifact: the event log remains the source of truth.

use crate::{
    accounts::FisherAccount,
    clock::SimClock,
    ledger::{Holder, LedgerEntry},
    species::SpeciesId,
    types::{FisherId, RunId, Tick, HOURS_PER_DAY},
};
use serde::{Deserialize, Serialize};

pub const SNAPSHOT_INTERVAL: Tick = 30 * HOURS_PER_DAY; // monthly

/// One ledger entry as seen by reporting collectors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerRow {
    pub regulation: String,
    pub holder:     Holder,
    pub species:    SpeciesId,
    pub entry:      LedgerEntry,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceRow {
    pub species:    SpeciesId,
    pub last_price: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimSnapshot {
    pub run_id:   RunId,
    pub tick:     Tick,
    pub clock:    SimClock,
    pub ledgers:  Vec<LedgerRow>,
    pub prices:   Vec<PriceRow>,
    pub accounts: Vec<(FisherId, FisherAccount)>,
    pub opportunity_costs: Vec<(FisherId, f64)>,
}
