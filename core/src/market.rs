//! ITQ order book: one instance per quota-managed species.
//!
//! Orders accumulate during a trading session and are consumed by a
//! single call to `clear()` at the session close (once per simulated
//! day). Every matched unit trades at one clearing price; matching is
//! pro-rata on the long side. Residual orders are discarded.
//!
//! Invariants after every clearing:
//!   - quota bought == quota sold (transfers go through the ledger)
//!   - no seller's allowance goes negative (asks are capped at the
//!     seller's allowance at clearing time)

use crate::{
    accounts::Accounts,
    config::MarketConfig,
    error::{SimError, SimResult},
    ledger::{CatchLedger, Holder, BIOMASS_EPSILON},
    species::SpeciesId,
    types::{Biomass, FisherId, Period, Tick},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Self::Buy  => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy  => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

/// An intent to trade quota. Lives until the next clearing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarketOrder {
    /// Assigned by the book on submission.
    pub id:       u64,
    pub fisher:   FisherId,
    pub species:  SpeciesId,
    pub side:     Side,
    pub quantity: Biomass,
    pub period:   Period,
}

impl MarketOrder {
    pub fn buy(fisher: &str, species: SpeciesId, quantity: Biomass, period: Period) -> Self {
        Self::new(fisher, species, Side::Buy, quantity, period)
    }

    pub fn sell(fisher: &str, species: SpeciesId, quantity: Biomass, period: Period) -> Self {
        Self::new(fisher, species, Side::Sell, quantity, period)
    }

    fn new(fisher: &str, species: SpeciesId, side: Side, quantity: Biomass, period: Period) -> Self {
        Self { id: 0, fisher: fisher.to_string(), species, side, quantity, period }
    }
}

/// How the clearing price moves from one session to the next.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum PricePolicy {
    /// p' = p · (1 + sensitivity · (demand − supply) / (demand + supply))
    Proportional { sensitivity: f64 },
    /// Always trade at the configured initial price.
    Fixed,
}

impl Default for PricePolicy {
    fn default() -> Self {
        Self::Proportional { sensitivity: 0.5 }
    }
}

impl PricePolicy {
    /// Next clearing price, bounded to [min, max].
    pub fn next_price(
        &self,
        previous:  f64,
        reference: f64,
        demand:    Biomass,
        supply:    Biomass,
        min:       f64,
        max:       f64,
    ) -> f64 {
        let raw = match self {
            Self::Fixed => reference,
            Self::Proportional { sensitivity } => {
                let total = demand + supply;
                if total <= BIOMASS_EPSILON {
                    previous
                } else {
                    previous * (1.0 + sensitivity * (demand - supply) / total)
                }
            }
        };
        raw.clamp(min, max)
    }
}

/// One buyer–seller transfer at the clearing price.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Fill {
    pub buyer:    FisherId,
    pub seller:   FisherId,
    pub quantity: Biomass,
    pub price:    f64,
}

/// What one session did. Also the reporting surface for collectors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClearingReport {
    pub species: SpeciesId,
    pub tick:    Tick,
    pub session: u64,
    /// Total quantity bid this session.
    pub demand:  Biomass,
    /// Total quantity offered, after capping at sellers' allowances.
    pub supply:  Biomass,
    pub matched: Biomass,
    /// Last traded price after the session; None if nothing has traded yet.
    pub price:   Option<f64>,
    /// Includes intraday fills made by continuous clearing.
    pub fills:   Vec<Fill>,
}

impl ClearingReport {
    pub fn matches(&self) -> usize {
        self.fills.len()
    }

    pub fn quota_volume(&self) -> Biomass {
        self.fills.iter().fold(0.0, |total, f| total + f.quantity)
    }

    pub fn money_volume(&self) -> f64 {
        self.fills.iter().fold(0.0, |total, f| total + f.quantity * f.price)
    }

    pub fn average_price(&self) -> Option<f64> {
        let volume = self.quota_volume();
        (volume > BIOMASS_EPSILON).then(|| self.money_volume() / volume)
    }
}

pub struct QuotaMarket {
    species:             SpeciesId,
    config:              MarketConfig,
    orders:              Vec<MarketOrder>,
    next_order_id:       u64,
    sessions:            u64,
    /// Orders are accepted only for this period.
    period:              Period,
    last_clearing_price: Option<f64>,
    /// Fisher -> sessions left during which it may not sell.
    penalty_box:         BTreeMap<FisherId, u32>,
    /// Buyers from intraday fills, boxed at the session close.
    pending_penalty:     Vec<FisherId>,
    intraday_fills:      Vec<Fill>,
    last_report:         Option<ClearingReport>,
}

impl QuotaMarket {
    pub fn new(species: SpeciesId, config: MarketConfig) -> Self {
        Self {
            species,
            config,
            orders: Vec::new(),
            next_order_id: 1,
            sessions: 0,
            period: 0,
            last_clearing_price: None,
            penalty_box: BTreeMap::new(),
            pending_penalty: Vec::new(),
            intraday_fills: Vec::new(),
            last_report: None,
        }
    }

    pub fn species(&self) -> SpeciesId {
        self.species
    }

    pub fn config(&self) -> &MarketConfig {
        &self.config
    }

    pub fn period(&self) -> Period {
        self.period
    }

    pub fn is_open(&self, period: Period) -> bool {
        period >= self.config.opening_period
    }

    pub fn continuous(&self) -> bool {
        self.config.continuous_clearing
    }

    /// The price of the most recent trade, if quota has ever changed
    /// hands on this market.
    pub fn last_price(&self) -> Option<f64> {
        self.last_clearing_price
    }

    /// The price the rule starts from: last clearing price, else the
    /// configured initial price.
    pub fn reference_price(&self) -> f64 {
        self.last_clearing_price.unwrap_or(self.config.initial_price)
    }

    pub fn last_report(&self) -> Option<&ClearingReport> {
        self.last_report.as_ref()
    }

    pub fn outstanding(&self) -> &[MarketOrder] {
        &self.orders
    }

    pub fn has_order(&self, fisher: &str, side: Side) -> bool {
        self.orders.iter().any(|o| o.fisher == fisher && o.side == side)
    }

    pub fn has_demand(&self) -> bool {
        self.orders.iter().any(|o| o.side == Side::Buy)
    }

    pub fn penalty_sessions_left(&self, fisher: &str) -> Option<u32> {
        self.penalty_box.get(fisher).copied()
    }

    /// Accept an order for the current session. Returns its id.
    pub fn submit(&mut self, mut order: MarketOrder) -> SimResult<u64> {
        if !order.quantity.is_finite() || order.quantity <= 0.0 {
            return Err(SimError::InvalidQuantity { quantity: order.quantity });
        }
        if order.species != self.species {
            return Err(SimError::UnknownMarket { species: order.species });
        }
        if order.period != self.period {
            return Err(SimError::StaleOrder {
                species: self.species,
                period:  order.period,
                current: self.period,
            });
        }
        let opposite = order.side.opposite();
        if self.has_order(&order.fisher, opposite) {
            return Err(SimError::ConflictingOrder {
                fisher:   order.fisher,
                species:  self.species,
                existing: opposite,
            });
        }
        if order.side == Side::Sell {
            if let Some(left) = self.penalty_sessions_left(&order.fisher) {
                return Err(SimError::InPenaltyBox {
                    fisher:        order.fisher,
                    species:       self.species,
                    sessions_left: left,
                });
            }
        }
        order.id = self.next_order_id;
        self.next_order_id += 1;
        log::debug!(
            "market {}: order #{} {} {:.2} by {}",
            self.species, order.id, order.side, order.quantity, order.fisher
        );
        let id = order.id;
        self.orders.push(order);
        Ok(id)
    }

    /// Make sure `fisher` bids for at least `quantity` this session,
    /// raising an existing bid rather than stacking a second one.
    pub fn bid_at_least(&mut self, fisher: &str, quantity: Biomass, period: Period) -> SimResult<()> {
        if let Some(existing) = self
            .orders
            .iter_mut()
            .find(|o| o.fisher == fisher && o.side == Side::Buy)
        {
            if quantity.is_finite() && quantity > existing.quantity {
                existing.quantity = quantity;
            }
            return Ok(());
        }
        self.submit(MarketOrder::buy(fisher, self.species, quantity, period))
            .map(|_| ())
    }

    /// Continuous clearing: fill `wanted` for `buyer` immediately from
    /// resting asks at the reference price. Returns the quantity filled.
    pub fn fill_now(
        &mut self,
        buyer:    &str,
        wanted:   Biomass,
        ledger:   &mut CatchLedger,
        accounts: &mut Accounts,
    ) -> SimResult<Biomass> {
        if !wanted.is_finite() || wanted <= 0.0 {
            return Err(SimError::InvalidQuantity { quantity: wanted });
        }
        if self.has_order(buyer, Side::Sell) {
            return Err(SimError::ConflictingOrder {
                fisher:   buyer.to_string(),
                species:  self.species,
                existing: Side::Sell,
            });
        }

        let price = self.reference_price();
        let buyer_holder = Holder::fisher(buyer);
        let mut filled = 0.0;
        for ask in self.orders.iter_mut().filter(|o| o.side == Side::Sell) {
            let still_wanted = wanted - filled;
            if still_wanted <= BIOMASS_EPSILON {
                break;
            }
            let seller = Holder::fisher(&ask.fisher);
            let available = ask.quantity.min(ledger.allowance(&seller, self.species).unwrap_or(0.0));
            let quantity = available.min(still_wanted);
            if quantity <= BIOMASS_EPSILON {
                continue;
            }
            ledger.transfer(&seller, &buyer_holder, self.species, quantity)?;
            accounts.spend(buyer, quantity * price);
            accounts.earn(&ask.fisher, quantity * price);
            ask.quantity -= quantity;
            filled += quantity;
            self.intraday_fills.push(Fill {
                buyer:  buyer.to_string(),
                seller: ask.fisher.clone(),
                quantity,
                price,
            });
        }
        self.orders.retain(|o| o.quantity > BIOMASS_EPSILON);
        if filled > 0.0 {
            self.last_clearing_price = Some(price);
            self.pending_penalty.push(buyer.to_string());
        }
        Ok(filled)
    }

    /// Close the session: price, match, settle, discard the rest.
    pub fn clear(
        &mut self,
        tick:     Tick,
        period:   Period,
        ledger:   &mut CatchLedger,
        accounts: &mut Accounts,
    ) -> SimResult<ClearingReport> {
        self.sessions += 1;
        let orders = std::mem::take(&mut self.orders);
        let mut fills = std::mem::take(&mut self.intraday_fills);

        if !self.is_open(period) {
            log::debug!("tick={tick} market {}: closed until period {}", self.species, self.config.opening_period);
            return Ok(self.finish(tick, 0.0, 0.0, 0.0, fills));
        }

        let bids: Vec<(FisherId, Biomass)> = orders
            .iter()
            .filter(|o| o.side == Side::Buy)
            .map(|o| (o.fisher.clone(), o.quantity))
            .collect();
        let asks = self.capped_asks(&orders, ledger);

        let demand: Biomass = bids.iter().fold(0.0, |total, (_, q)| total + q);
        let supply: Biomass = asks.iter().fold(0.0, |total, (_, q)| total + q);

        if orders.is_empty() {
            return Ok(self.finish(tick, 0.0, 0.0, 0.0, fills));
        }

        let price = self.config.price_policy.next_price(
            self.reference_price(),
            self.config.initial_price,
            demand,
            supply,
            self.config.min_price,
            self.config.max_price,
        );
        let matched = demand.min(supply);

        if matched > BIOMASS_EPSILON {
            let bid_ratio = matched / demand;
            let ask_ratio = matched / supply;
            let mut bids: Vec<(FisherId, Biomass)> =
                bids.into_iter().map(|(f, q)| (f, q * bid_ratio)).collect();
            let mut asks: Vec<(FisherId, Biomass)> =
                asks.into_iter().map(|(f, q)| (f, q * ask_ratio)).collect();

            let (mut i, mut j) = (0, 0);
            while i < bids.len() && j < asks.len() {
                let quantity = bids[i].1.min(asks[j].1);
                if quantity > BIOMASS_EPSILON {
                    let (buyer, seller) = (&bids[i].0, &asks[j].0);
                    ledger.transfer(
                        &Holder::fisher(seller),
                        &Holder::fisher(buyer),
                        self.species,
                        quantity,
                    )?;
                    accounts.spend(buyer, quantity * price);
                    accounts.earn(seller, quantity * price);
                    fills.push(Fill {
                        buyer:  buyer.clone(),
                        seller: seller.clone(),
                        quantity,
                        price,
                    });
                    if !self.pending_penalty.contains(buyer) {
                        self.pending_penalty.push(buyer.clone());
                    }
                }
                bids[i].1 -= quantity;
                asks[j].1 -= quantity;
                if bids[i].1 <= BIOMASS_EPSILON { i += 1; }
                if asks[j].1 <= BIOMASS_EPSILON { j += 1; }
            }
        }

        if matched > BIOMASS_EPSILON {
            self.last_clearing_price = Some(price);
            log::info!(
                "tick={tick} market {}: cleared {matched:.2} of {demand:.2} bid / {supply:.2} offered at {price:.4}",
                self.species
            );
        } else {
            log::debug!(
                "tick={tick} market {}: no match ({demand:.2} bid / {supply:.2} offered), price unchanged",
                self.species
            );
        }
        Ok(self.finish(tick, demand, supply, matched, fills))
    }

    /// Drop every outstanding order and the penalty box, then accept
    /// orders for `next_period`. Used at period rollover.
    pub fn reset(&mut self, next_period: Period) {
        self.period = next_period;
        self.orders.clear();
        self.intraday_fills.clear();
        self.pending_penalty.clear();
        self.penalty_box.clear();
    }

    /// Asks in submission order, each capped so that a seller never
    /// offers more than it holds at clearing time.
    fn capped_asks(&self, orders: &[MarketOrder], ledger: &CatchLedger) -> Vec<(FisherId, Biomass)> {
        let mut remaining: BTreeMap<&str, Biomass> = BTreeMap::new();
        orders
            .iter()
            .filter(|o| o.side == Side::Sell)
            .filter_map(|o| {
                let left = remaining.entry(o.fisher.as_str()).or_insert_with(|| {
                    ledger
                        .allowance(&Holder::fisher(&o.fisher), self.species)
                        .unwrap_or(0.0)
                });
                let quantity = o.quantity.min(*left);
                *left -= quantity;
                (quantity > BIOMASS_EPSILON).then(|| (o.fisher.clone(), quantity))
            })
            .collect()
    }

    fn finish(
        &mut self,
        tick:    Tick,
        demand:  Biomass,
        supply:  Biomass,
        matched: Biomass,
        fills:   Vec<Fill>,
    ) -> ClearingReport {
        // Existing sentences run down before this session's buyers go in.
        self.penalty_box.retain(|_, left| {
            *left = left.saturating_sub(1);
            *left > 0
        });
        let penalty = self.config.penalty_sessions;
        for buyer in self.pending_penalty.drain(..) {
            if penalty > 0 {
                self.penalty_box.insert(buyer, penalty);
            }
        }

        let report = ClearingReport {
            species: self.species,
            tick,
            session: self.sessions,
            demand,
            supply,
            matched,
            price: self.last_clearing_price,
            fills,
        };
        self.last_report = Some(report.clone());
        report
    }
}

/// All species markets of one run.
#[derive(Default)]
pub struct QuotaMarkets {
    markets: BTreeMap<SpeciesId, QuotaMarket>,
}

impl QuotaMarkets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, market: QuotaMarket) {
        self.markets.insert(market.species(), market);
    }

    pub fn get(&self, species: SpeciesId) -> Option<&QuotaMarket> {
        self.markets.get(&species)
    }

    pub fn get_mut(&mut self, species: SpeciesId) -> Option<&mut QuotaMarket> {
        self.markets.get_mut(&species)
    }

    pub fn last_price(&self, species: SpeciesId) -> Option<f64> {
        self.get(species).and_then(QuotaMarket::last_price)
    }

    pub fn species(&self) -> Vec<SpeciesId> {
        self.markets.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &QuotaMarket> {
        self.markets.values()
    }

    pub fn is_empty(&self) -> bool {
        self.markets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COD: SpeciesId = SpeciesId(0);

    fn market(policy: PricePolicy) -> QuotaMarket {
        QuotaMarket::new(COD, MarketConfig {
            initial_price: 10.0,
            min_price: 1.0,
            max_price: 20.0,
            price_policy: policy,
            ..MarketConfig::default()
        })
    }

    fn ledger(entries: &[(&str, f64)]) -> CatchLedger {
        let mut ledger = CatchLedger::new();
        for (id, q) in entries {
            ledger.open(Holder::fisher(id), COD, *q).unwrap();
        }
        ledger
    }

    #[test]
    fn proportional_price_moves_with_imbalance_and_respects_bounds() {
        let p = PricePolicy::Proportional { sensitivity: 0.5 };
        assert!((p.next_price(10.0, 10.0, 100.0, 80.0, 1.0, 20.0) - 10.0 * (1.0 + 0.5 * 20.0 / 180.0)).abs() < 1e-9);
        assert!(p.next_price(10.0, 10.0, 0.0, 100.0, 1.0, 20.0) < 10.0);
        assert_eq!(p.next_price(19.0, 10.0, 100.0, 0.0, 1.0, 20.0), 20.0);
        assert_eq!(p.next_price(10.0, 10.0, 0.0, 0.0, 1.0, 20.0), 10.0);
        assert_eq!(PricePolicy::Fixed.next_price(15.0, 10.0, 100.0, 0.0, 1.0, 20.0), 10.0);
    }

    #[test]
    fn empty_session_keeps_price_unset() {
        let mut m = market(PricePolicy::default());
        let mut l = ledger(&[]);
        let mut acc = Accounts::new();
        let report = m.clear(24, 0, &mut l, &mut acc).unwrap();
        assert_eq!(report.matched, 0.0);
        assert_eq!(m.last_price(), None);
        assert_eq!(report.average_price(), None);
    }

    #[test]
    fn asks_are_capped_at_seller_allowance() {
        let mut m = market(PricePolicy::Fixed);
        let mut l = ledger(&[("s", 30.0), ("b", 0.0)]);
        let mut acc = Accounts::new();
        m.submit(MarketOrder::sell("s", COD, 50.0, 0)).unwrap();
        m.submit(MarketOrder::sell("s", COD, 50.0, 0)).unwrap();
        m.submit(MarketOrder::buy("b", COD, 100.0, 0)).unwrap();
        let report = m.clear(24, 0, &mut l, &mut acc).unwrap();
        assert!((report.supply - 30.0).abs() < 1e-9);
        assert_eq!(l.allowance(&Holder::fisher("s"), COD), Some(0.0));
        assert!((l.allowance(&Holder::fisher("b"), COD).unwrap() - 30.0).abs() < 1e-9);
    }

    #[test]
    fn bid_at_least_raises_instead_of_stacking() {
        let mut m = market(PricePolicy::default());
        m.bid_at_least("b", 10.0, 0).unwrap();
        m.bid_at_least("b", 25.0, 0).unwrap();
        m.bid_at_least("b", 5.0, 0).unwrap();
        assert_eq!(m.outstanding().len(), 1);
        assert_eq!(m.outstanding()[0].quantity, 25.0);
    }

    #[test]
    fn closed_market_discards_orders() {
        let mut m = QuotaMarket::new(COD, MarketConfig { opening_period: 1, ..MarketConfig::default() });
        let mut l = ledger(&[("s", 50.0), ("b", 0.0)]);
        let mut acc = Accounts::new();
        m.submit(MarketOrder::sell("s", COD, 50.0, 0)).unwrap();
        m.submit(MarketOrder::buy("b", COD, 50.0, 0)).unwrap();
        let report = m.clear(24, 0, &mut l, &mut acc).unwrap();
        assert_eq!(report.matched, 0.0);
        assert!(m.outstanding().is_empty());
        assert_eq!(l.allowance(&Holder::fisher("s"), COD), Some(50.0));
    }
}
