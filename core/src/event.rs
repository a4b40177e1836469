//! Every event the quota engine emits.
//!
//! RULE: Components report what happened only through events.
//! The engine persists them in emission order; replaying the log of a
//! run must tell the whole story of every ledger and every market.

use crate::{
    species::SpeciesId,
    types::{Biomass, FisherId, Period, RunId, Tick},
};
use serde::{Deserialize, Serialize};

/// Variants are appended: never removed or reordered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SimEvent {
    // ── Engine events ──────────────────────────────
    TickStarted {
        tick: Tick,
    },
    TickCompleted {
        tick: Tick,
    },
    RunInitialized {
        run_id: RunId,
        seed:   u64,
    },

    // ── Catch events ───────────────────────────────
    CatchTruncated {
        tick:      Tick,
        fisher_id: FisherId,
        species:   SpeciesId,
        proposed:  Biomass,
        retained:  Biomass,
    },
    CatchRejected {
        tick:      Tick,
        fisher_id: FisherId,
        species:   SpeciesId,
        reason:    String,
    },
    SeasonClosed {
        tick:    Tick,
        species: SpeciesId,
    },
    OpportunityCostCharged {
        tick:      Tick,
        fisher_id: FisherId,
        species:   SpeciesId,
        retained:  Biomass,
        amount:    f64,
    },

    // ── Market events ──────────────────────────────
    BuyOrderQueued {
        tick:      Tick,
        fisher_id: FisherId,
        species:   SpeciesId,
        quantity:  Biomass,
    },
    SellOrderPosted {
        tick:      Tick,
        fisher_id: FisherId,
        species:   SpeciesId,
        quantity:  Biomass,
    },
    QuotaTraded {
        tick:     Tick,
        species:  SpeciesId,
        buyer:    FisherId,
        seller:   FisherId,
        quantity: Biomass,
        price:    f64,
    },
    MarketCleared {
        tick:    Tick,
        species: SpeciesId,
        demand:  Biomass,
        supply:  Biomass,
        matched: Biomass,
        price:   Option<f64>,
        matches: usize,
    },
    PeriodRolledOver {
        tick:       Tick,
        new_period: Period,
    },

    // ── Trip events ────────────────────────────────
    TripStarted {
        tick:      Tick,
        fisher_id: FisherId,
    },
    TripEnded {
        tick:         Tick,
        fisher_id:    FisherId,
        hours_at_sea: Tick,
        effort:       u32,
        landed:       Biomass,
    },
}

impl SimEvent {
    /// Stable string name for the event_type column in event_log.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::TickStarted { .. }            => "tick_started",
            Self::TickCompleted { .. }          => "tick_completed",
            Self::RunInitialized { .. }         => "run_initialized",
            Self::CatchTruncated { .. }         => "catch_truncated",
            Self::CatchRejected { .. }          => "catch_rejected",
            Self::SeasonClosed { .. }           => "season_closed",
            Self::OpportunityCostCharged { .. } => "opportunity_cost_charged",
            Self::BuyOrderQueued { .. }         => "buy_order_queued",
            Self::SellOrderPosted { .. }        => "sell_order_posted",
            Self::QuotaTraded { .. }            => "quota_traded",
            Self::MarketCleared { .. }          => "market_cleared",
            Self::PeriodRolledOver { .. }       => "period_rolled_over",
            Self::TripStarted { .. }            => "trip_started",
            Self::TripEnded { .. }              => "trip_ended",
        }
    }
}

/// The event log entry as persisted to SQLite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id:         Option<i64>,
    pub run_id:     RunId,
    pub tick:       Tick,
    pub subsystem:  String,
    pub event_type: String,
    pub payload:    String, // JSON-serialized SimEvent
}
