//! Opportunity cost of landing quota-managed fish: every unit retained
//! could have been sold as quota instead. The charge hits profit only,
//! so strategies that compare trips see what the catch really cost.

use crate::{
    accounts::Accounts,
    market::QuotaMarkets,
    species::SpeciesId,
    types::{Biomass, FisherId, Tick},
};
use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub struct OpportunityCostEstimator {
    totals: BTreeMap<FisherId, f64>,
}

impl OpportunityCostEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Charge `retained * last_price(species)` against the fisher's
    /// profit. Returns the amount charged; 0 when the species has no
    /// market or its market has never cleared.
    pub fn charge(
        &mut self,
        fisher:   &str,
        species:  SpeciesId,
        retained: Biomass,
        now:      Tick,
        markets:  &QuotaMarkets,
        accounts: &mut Accounts,
    ) -> f64 {
        if retained <= 0.0 {
            return 0.0;
        }
        let Some(price) = markets.last_price(species) else {
            log::debug!("tick={now} opportunity_cost: no price yet for species {species}, nothing charged to {fisher}");
            return 0.0;
        };
        let cost = retained * price;
        accounts.charge_profit(fisher, cost);
        *self.totals.entry(fisher.to_string()).or_insert(0.0) += cost;
        cost
    }

    pub fn total(&self, fisher: &str) -> f64 {
        self.totals.get(fisher).copied().unwrap_or(0.0)
    }

    pub fn totals(&self) -> impl Iterator<Item = (&FisherId, f64)> {
        self.totals.iter().map(|(f, c)| (f, *c))
    }
}
