//! QuotaSystem: the one object callers talk to.
//!
//! Owns the regulation (and through it every ledger), the quota
//! markets, fishers' accounts and the opportunity-cost estimator.
//! Everything that happens is recorded as a `SimEvent`; the engine
//! drains them once per tick.

use crate::{
    accounts::Accounts,
    error::{SimError, SimResult},
    event::SimEvent,
    ledger::BIOMASS_EPSILON,
    market::{ClearingReport, QuotaMarkets},
    opportunity_cost::OpportunityCostEstimator,
    regulation::{GridCell, MarketDesk, Regulation},
    snapshot::LedgerRow,
    species::{SpeciesId, SpeciesSet},
    types::{Biomass, Period, Tick},
};

pub struct QuotaSystem {
    species:    SpeciesSet,
    regulation: Regulation,
    markets:    QuotaMarkets,
    accounts:   Accounts,
    costs:      OpportunityCostEstimator,
    events:     Vec<SimEvent>,
    period:     Period,
}

impl QuotaSystem {
    pub fn new(species: SpeciesSet, regulation: Regulation, markets: QuotaMarkets) -> Self {
        Self {
            species,
            regulation,
            markets,
            accounts: Accounts::new(),
            costs:    OpportunityCostEstimator::new(),
            events:   Vec::new(),
            period:   0,
        }
    }

    pub fn register_fisher(&mut self, fisher: &str) -> SimResult<()> {
        self.regulation.register_fisher(fisher)
    }

    pub fn is_active(&self, fisher: &str, location: GridCell, now: Tick) -> bool {
        self.regulation.is_active(fisher, location, now)
    }

    /// How much of `proposed` may be kept. Under an ITQ this may queue
    /// a bid, or fill one immediately on a continuous market.
    pub fn can_retain(
        &mut self,
        fisher:   &str,
        species:  SpeciesId,
        proposed: Biomass,
        now:      Tick,
    ) -> SimResult<Biomass> {
        self.check_species(species)?;
        let mut desk = MarketDesk {
            markets:  &mut self.markets,
            accounts: &mut self.accounts,
            events:   &mut self.events,
            period:   self.period,
        };
        self.regulation.can_retain(fisher, species, proposed, now, &mut desk)
    }

    /// Debit retained catch and charge its opportunity cost.
    /// Returns the amount charged.
    pub fn record_catch(
        &mut self,
        fisher:   &str,
        species:  SpeciesId,
        retained: Biomass,
        now:      Tick,
    ) -> SimResult<f64> {
        self.check_species(species)?;
        self.regulation.record(fisher, species, retained, now, &mut self.events)?;
        let cost = self.costs.charge(fisher, species, retained, now, &self.markets, &mut self.accounts);
        if cost > 0.0 {
            self.events.push(SimEvent::OpportunityCostCharged {
                tick:      now,
                fisher_id: fisher.to_string(),
                species,
                retained,
                amount:    cost,
            });
        }
        Ok(cost)
    }

    /// `can_retain` then `record_catch`; the rest is discarded at sea.
    /// Returns the biomass landed.
    pub fn land_catch(
        &mut self,
        fisher:   &str,
        species:  SpeciesId,
        proposed: Biomass,
        now:      Tick,
    ) -> SimResult<Biomass> {
        let retained = self.can_retain(fisher, species, proposed, now)?;
        self.record_catch(fisher, species, retained, now)?;
        if retained < proposed - BIOMASS_EPSILON {
            log::debug!("tick={now} quota: {fisher} kept {retained:.2} of {proposed:.2} species {species}");
            self.events.push(SimEvent::CatchTruncated {
                tick:      now,
                fisher_id: fisher.to_string(),
                species,
                proposed,
                retained,
            });
        }
        Ok(retained)
    }

    pub fn remaining(&self, fisher: &str, species: SpeciesId) -> SimResult<Option<Biomass>> {
        self.regulation.remaining(fisher, species)
    }

    /// Offer part of the fisher's own allowance on the species market.
    pub fn post_sell_order(
        &mut self,
        fisher:   &str,
        species:  SpeciesId,
        quantity: Biomass,
        now:      Tick,
    ) -> SimResult<u64> {
        let Self { regulation, markets, accounts, events, period, .. } = self;
        let itq = regulation
            .itq_mut(species)
            .ok_or(SimError::UnknownMarket { species })?;
        let mut desk = MarketDesk { markets, accounts, events, period: *period };
        itq.post_sell_order(fisher, species, quantity, now, &mut desk)
    }

    /// Close today's session on every market. On the last session of a
    /// period holders are asked to sell what they will not use.
    pub fn clear_markets(&mut self, now: Tick, period_end: bool) -> SimResult<Vec<ClearingReport>> {
        let mut reports = Vec::new();
        for species in self.markets.species() {
            let Some(market) = self.markets.get_mut(species) else { continue };
            let Some(itq) = self.regulation.itq_mut(species) else {
                log::warn!("tick={now} quota: market for species {species} has no tradable quota, skipped");
                continue;
            };
            itq.solicit_sellers(market, self.period, period_end, now, &mut self.events)?;
            let report = market.clear(now, self.period, itq.ledger_mut(), &mut self.accounts)?;

            for fill in &report.fills {
                self.events.push(SimEvent::QuotaTraded {
                    tick:     now,
                    species,
                    buyer:    fill.buyer.clone(),
                    seller:   fill.seller.clone(),
                    quantity: fill.quantity,
                    price:    fill.price,
                });
            }
            if report.demand > 0.0 || report.supply > 0.0 || !report.fills.is_empty() {
                self.events.push(SimEvent::MarketCleared {
                    tick:    now,
                    species,
                    demand:  report.demand,
                    supply:  report.supply,
                    matched: report.matched,
                    price:   report.price,
                    matches: report.matches(),
                });
            }
            reports.push(report);
        }
        Ok(reports)
    }

    /// Start the next regulatory period.
    pub fn rollover(&mut self, now: Tick) {
        self.regulation.rollover();
        self.period += 1;
        for species in self.markets.species() {
            if let Some(market) = self.markets.get_mut(species) {
                market.reset(self.period);
            }
        }
        log::info!("tick={now} quota: period {} begins, allowances restored", self.period);
        self.events.push(SimEvent::PeriodRolledOver { tick: now, new_period: self.period });
    }

    pub fn last_price(&self, species: SpeciesId) -> Option<f64> {
        self.markets.last_price(species)
    }

    pub fn last_report(&self, species: SpeciesId) -> Option<&ClearingReport> {
        self.markets.get(species).and_then(|m| m.last_report())
    }

    pub fn opportunity_cost(&self, fisher: &str) -> f64 {
        self.costs.total(fisher)
    }

    pub fn costs(&self) -> &OpportunityCostEstimator {
        &self.costs
    }

    pub fn ledger_rows(&self) -> Vec<LedgerRow> {
        self.regulation.ledger_rows()
    }

    /// Append an event raised outside the quota system (trips), so the
    /// log keeps emission order.
    pub fn emit(&mut self, event: SimEvent) {
        self.events.push(event);
    }

    pub fn drain_events(&mut self) -> Vec<SimEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn species(&self) -> &SpeciesSet      { &self.species }
    pub fn regulation(&self) -> &Regulation   { &self.regulation }
    pub fn markets(&self) -> &QuotaMarkets    { &self.markets }
    pub fn accounts(&self) -> &Accounts       { &self.accounts }
    pub fn period(&self) -> Period            { self.period }

    fn check_species(&self, species: SpeciesId) -> SimResult<()> {
        if self.species.contains(species) {
            Ok(())
        } else {
            Err(SimError::UnregulatedSpecies { species })
        }
    }
}
