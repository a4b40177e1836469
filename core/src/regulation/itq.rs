//! Individual transferable quota: an individual quota whose allowance
//! can be bought and sold on the species' quota market.
//!
//! A fisher whose proposed catch exceeds its allowance bids for the
//! shortfall. With continuous clearing the bid is first filled from
//! resting asks; otherwise it waits for the day close and the catch
//! is truncated to what the fisher already holds.

use super::{quota::IndividualQuota, MarketDesk};
use crate::{
    error::{SimError, SimResult},
    event::SimEvent,
    ledger::{CatchLedger, BIOMASS_EPSILON},
    market::{MarketOrder, QuotaMarket, Side},
    species::SpeciesId,
    types::{Biomass, Period, Tick},
};
use serde::{Deserialize, Serialize};

/// How holders offer quota they do not expect to use.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItqTradingConfig {
    /// Share of its allowance a holder offers whenever there is demand.
    #[serde(default)]
    pub spare_fraction: f64,
    /// Offer the whole remaining allowance at the last session of a period.
    #[serde(default = "default_true")]
    pub sell_unused_at_period_end: bool,
    /// Offers smaller than this are not posted.
    #[serde(default)]
    pub minimum_lot: Biomass,
}

fn default_true() -> bool {
    true
}

impl Default for ItqTradingConfig {
    fn default() -> Self {
        Self { spare_fraction: 0.0, sell_unused_at_period_end: true, minimum_lot: 0.0 }
    }
}

#[derive(Debug, Clone)]
pub struct ItqRegulation {
    quotas:  IndividualQuota,
    trading: ItqTradingConfig,
}

impl ItqRegulation {
    pub fn new(allotments: &[(SpeciesId, Biomass)], trading: ItqTradingConfig) -> SimResult<Self> {
        if !(0.0..=1.0).contains(&trading.spare_fraction) {
            return Err(SimError::InvalidConfig(format!(
                "spare_fraction must be within [0, 1], got {}",
                trading.spare_fraction
            )));
        }
        if !trading.minimum_lot.is_finite() || trading.minimum_lot < 0.0 {
            return Err(SimError::InvalidConfig(format!(
                "minimum_lot must be finite and >= 0, got {}",
                trading.minimum_lot
            )));
        }
        Ok(Self { quotas: IndividualQuota::new(allotments)?, trading })
    }

    pub fn trading(&self) -> &ItqTradingConfig {
        &self.trading
    }

    pub fn covers(&self, species: SpeciesId) -> bool {
        self.quotas.covers(species)
    }

    pub fn register_fisher(&mut self, fisher: &str) -> SimResult<()> {
        self.quotas.register_fisher(fisher)
    }

    pub fn allowance(&self, fisher: &str, species: SpeciesId) -> SimResult<Biomass> {
        self.quotas.allowance(fisher, species)
    }

    pub fn ledger(&self) -> &CatchLedger {
        self.quotas.ledger()
    }

    /// The ledger market clearing settles against.
    pub fn ledger_mut(&mut self) -> &mut CatchLedger {
        self.quotas.ledger_mut()
    }

    pub(super) fn can_retain(
        &mut self,
        fisher:   &str,
        species:  SpeciesId,
        proposed: Biomass,
        now:      Tick,
        desk:     &mut MarketDesk<'_>,
    ) -> SimResult<Biomass> {
        let allowance = self.quotas.allowance(fisher, species)?;
        let shortfall = proposed - allowance;
        if shortfall <= BIOMASS_EPSILON {
            return Ok(proposed.min(allowance));
        }

        let market = desk
            .markets
            .get_mut(species)
            .ok_or(SimError::UnknownMarket { species })?;
        // A seller this session cannot also buy; it keeps what it holds.
        if !market.is_open(desk.period) || market.has_order(fisher, Side::Sell) {
            return Ok(allowance);
        }

        let mut filled = 0.0;
        if market.continuous() {
            filled = market.fill_now(fisher, shortfall, self.quotas.ledger_mut(), desk.accounts)?;
        }
        let unfilled = shortfall - filled;
        if unfilled > BIOMASS_EPSILON {
            market.bid_at_least(fisher, unfilled, desk.period)?;
            log::debug!("tick={now} itq: {fisher} bids {unfilled:.2} of species {species}");
            desk.events.push(SimEvent::BuyOrderQueued {
                tick:      now,
                fisher_id: fisher.to_string(),
                species,
                quantity:  unfilled,
            });
        }
        Ok(proposed.min(self.quotas.allowance(fisher, species)?))
    }

    pub(super) fn record(&mut self, fisher: &str, species: SpeciesId, retained: Biomass) -> SimResult<()> {
        self.quotas.record(fisher, species, retained)
    }

    pub(super) fn rollover(&mut self) {
        self.quotas.rollover();
    }

    /// Offer `quantity` of the fisher's own allowance this session.
    pub fn post_sell_order(
        &self,
        fisher:   &str,
        species:  SpeciesId,
        quantity: Biomass,
        now:      Tick,
        desk:     &mut MarketDesk<'_>,
    ) -> SimResult<u64> {
        let allowance = self.quotas.allowance(fisher, species)?;
        if quantity > allowance + BIOMASS_EPSILON {
            return Err(SimError::AllowanceExceeded {
                fisher: fisher.to_string(),
                species,
                requested: quantity,
                allowance,
            });
        }
        let market = desk
            .markets
            .get_mut(species)
            .ok_or(SimError::UnknownMarket { species })?;
        let id = market.submit(MarketOrder::sell(fisher, species, quantity, desk.period))?;
        desk.events.push(SimEvent::SellOrderPosted {
            tick:      now,
            fisher_id: fisher.to_string(),
            species,
            quantity,
        });
        Ok(id)
    }

    /// Before a session closes, holders with quota to spare offer it:
    /// a fraction of their allowance when someone is bidding, the whole
    /// of it at the last session of the period.
    pub fn solicit_sellers(
        &self,
        market:     &mut QuotaMarket,
        period:     Period,
        period_end: bool,
        now:        Tick,
        events:     &mut Vec<SimEvent>,
    ) -> SimResult<usize> {
        let species = market.species();
        if !market.is_open(period) {
            return Ok(0);
        }
        let unused_sale = period_end && self.trading.sell_unused_at_period_end;
        if !unused_sale && (!market.has_demand() || self.trading.spare_fraction <= 0.0) {
            return Ok(0);
        }

        let mut posted = 0;
        for (fisher, allowance) in self.quotas.allowances(species) {
            if market.has_order(&fisher, Side::Buy)
                || market.has_order(&fisher, Side::Sell)
                || market.penalty_sessions_left(&fisher).is_some()
            {
                continue;
            }
            let offer = if unused_sale { allowance } else { allowance * self.trading.spare_fraction };
            if offer <= BIOMASS_EPSILON || offer < self.trading.minimum_lot {
                continue;
            }
            market.submit(MarketOrder::sell(&fisher, species, offer, period))?;
            events.push(SimEvent::SellOrderPosted {
                tick:      now,
                fisher_id: fisher,
                species,
                quantity:  offer,
            });
            posted += 1;
        }
        if posted > 0 {
            log::debug!("tick={now} itq: {posted} holders offered species {species}");
        }
        Ok(posted)
    }
}
