//! ITQ market: bids from quota shortfalls, pro-rata clearing at one
//! price, conservation of quota, penalty box and period rollover.

use quota_core::{
    config::{
        FisherConfig, FleetConfig, ItqTradingConfig, MarketConfig, RegulationConfig,
        ScenarioConfig, SpeciesRegulationConfig,
    },
    error::SimError,
    event::SimEvent,
    market::{MarketOrder, QuotaMarket, Side},
    quota_system::QuotaSystem,
    regulation::GridCell,
    species::{Species, SpeciesId},
};

const COD: SpeciesId = SpeciesId(0);

fn scenario(market: MarketConfig, trading: ItqTradingConfig) -> ScenarioConfig {
    let mut config = ScenarioConfig::default_test();
    config.species = vec![Species { id: COD, name: "cod".into() }];
    config.regulations = vec![SpeciesRegulationConfig {
        species: "cod".into(),
        rule: RegulationConfig::Itq { per_fisher: 100.0, market, trading },
    }];
    config.fleet = FleetConfig {
        departure_hour: 6,
        fishers: ["buyer", "s1", "s2"]
            .iter()
            .map(|id| FisherConfig {
                id: (*id).into(),
                hold_capacity: 500.0,
                fishing_ground: GridCell::default(),
                catch_rates: Vec::new(),
            })
            .collect(),
    };
    config
}

/// Passive sellers: nobody is solicited, only explicit orders trade.
fn passive() -> ItqTradingConfig {
    ItqTradingConfig { spare_fraction: 0.0, sell_unused_at_period_end: false, minimum_lot: 0.0 }
}

fn system(market: MarketConfig, trading: ItqTradingConfig) -> QuotaSystem {
    scenario(market, trading).build_quota_system().expect("valid scenario")
}

fn allowance(qs: &QuotaSystem, fisher: &str) -> f64 {
    qs.remaining(fisher, COD).expect("remaining").expect("quota-managed")
}

fn total_allowance(qs: &QuotaSystem) -> f64 {
    ["buyer", "s1", "s2"].iter().map(|f| allowance(qs, f)).sum()
}

/// Buyer catches its whole allowance and bids `shortfall` more.
fn buyer_bids(qs: &mut QuotaSystem, shortfall: f64) {
    let kept = qs.land_catch("buyer", COD, 100.0 + shortfall, 1).expect("land");
    assert_eq!(kept, 100.0, "catch above allowance is truncated while the bid waits");
}

#[test]
fn two_sellers_one_buyer_clear_pro_rata() {
    let mut qs = system(MarketConfig::default(), passive());
    buyer_bids(&mut qs, 100.0);
    qs.post_sell_order("s1", COD, 50.0, 2).expect("s1 sells");
    qs.post_sell_order("s2", COD, 30.0, 3).expect("s2 sells");

    let before = total_allowance(&qs);
    let reports = qs.clear_markets(24, false).expect("clear");
    let report = &reports[0];

    assert!((report.demand - 100.0).abs() < 1e-9);
    assert!((report.supply - 80.0).abs() < 1e-9);
    assert!((report.matched - 80.0).abs() < 1e-9);

    let expected_price = 10.0 * (1.0 + 0.5 * (100.0 - 80.0) / 180.0);
    let price = qs.last_price(COD).expect("price after clearing");
    assert!((price - expected_price).abs() < 1e-9, "price {price} != {expected_price}");

    assert!((allowance(&qs, "buyer") - 80.0).abs() < 1e-9);
    assert!((allowance(&qs, "s1") - 50.0).abs() < 1e-9);
    assert!((allowance(&qs, "s2") - 70.0).abs() < 1e-9);
    assert!((total_allowance(&qs) - before).abs() < 1e-9, "quota must be conserved");

    let accounts = qs.accounts();
    assert!((accounts.get("buyer").cash + 80.0 * price).abs() < 1e-9);
    assert!((accounts.get("s1").cash - 50.0 * price).abs() < 1e-9);
    assert!((accounts.get("s2").cash - 30.0 * price).abs() < 1e-9);

    let bought: f64 = report.fills.iter().filter(|f| f.buyer == "buyer").map(|f| f.quantity).sum();
    let sold: f64 = report.fills.iter().map(|f| f.quantity).sum();
    assert!((bought - sold).abs() < 1e-9);
    assert_eq!(report.matches(), 2);
    assert!((report.average_price().expect("volume traded") - price).abs() < 1e-9);

    let traded = qs
        .drain_events()
        .into_iter()
        .filter(|e| matches!(e, SimEvent::QuotaTraded { .. }))
        .count();
    assert_eq!(traded, 2);
}

#[test]
fn residual_orders_are_discarded_after_clearing() {
    let mut qs = system(MarketConfig::default(), passive());
    buyer_bids(&mut qs, 100.0);
    qs.post_sell_order("s1", COD, 50.0, 2).expect("s1 sells");
    qs.clear_markets(24, false).expect("clear");
    assert!(qs.markets().get(COD).expect("market").outstanding().is_empty());
}

#[test]
fn no_liquidity_is_not_an_error() {
    let mut qs = system(MarketConfig::default(), passive());
    buyer_bids(&mut qs, 40.0);
    let reports = qs.clear_markets(24, false).expect("clear");
    assert_eq!(reports[0].matched, 0.0);
    assert!(reports[0].matched.is_sign_positive(), "an empty side reports +0");
    assert!((reports[0].demand - 40.0).abs() < 1e-9);
    assert!(reports[0].supply.is_sign_positive());
    assert!(reports[0].fills.is_empty());
    assert_eq!(allowance(&qs, "buyer"), 0.0);
    assert_eq!(allowance(&qs, "s1"), 100.0);
    // Nothing traded, so no price is published.
    assert_eq!(qs.last_price(COD), None);
    assert_eq!(reports[0].price, None);
}

#[test]
fn unmatched_session_keeps_the_previous_price() {
    let mut qs = system(MarketConfig::default(), passive());
    buyer_bids(&mut qs, 20.0);
    qs.post_sell_order("s1", COD, 20.0, 2).expect("s1 sells");
    qs.clear_markets(24, false).expect("first session");
    let traded = qs.last_price(COD).expect("trade happened");

    qs.post_sell_order("s2", COD, 30.0, 25).expect("s2 sells, nobody bids");
    qs.clear_markets(48, false).expect("second session");
    assert_eq!(qs.last_price(COD), Some(traded));
}

#[test]
fn empty_session_leaves_price_untouched() {
    let mut qs = system(MarketConfig::default(), passive());
    qs.clear_markets(24, false).expect("clear");
    assert_eq!(qs.last_price(COD), None);
    assert!(qs.drain_events().is_empty());
}

#[test]
fn fisher_cannot_buy_and_sell_in_one_session() {
    let mut qs = system(MarketConfig::default(), passive());
    buyer_bids(&mut qs, 10.0);
    let err = qs.post_sell_order("buyer", COD, 1.0, 2).expect_err("conflict");
    assert!(matches!(err, SimError::AllowanceExceeded { .. } | SimError::ConflictingOrder { .. }));

    qs.post_sell_order("s1", COD, 10.0, 2).expect("s1 sells");
    // A seller that runs short keeps what it has and does not bid.
    let kept = qs.land_catch("s1", COD, 120.0, 3).expect("land");
    assert_eq!(kept, 100.0);
    let book = qs.markets().get(COD).expect("market").outstanding();
    assert!(!book.iter().any(|o| o.fisher == "s1" && o.side == Side::Buy));
}

#[test]
fn invalid_and_conflicting_orders_are_rejected() {
    let mut qs = system(MarketConfig::default(), passive());
    let err = qs.post_sell_order("s1", COD, 0.0, 1).expect_err("zero quantity");
    assert!(matches!(err, SimError::InvalidQuantity { .. }));
    let err = qs.post_sell_order("s1", COD, -5.0, 1).expect_err("negative quantity");
    assert!(matches!(err, SimError::InvalidQuantity { .. }));

    let mut market = QuotaMarket::new(COD, MarketConfig::default());
    market.submit(MarketOrder::buy("a", COD, 10.0, 0)).expect("bid");
    let err = market.submit(MarketOrder::sell("a", COD, 5.0, 0)).expect_err("same fisher sells");
    assert!(matches!(err, SimError::ConflictingOrder { existing: Side::Buy, .. }));
    let err = market.submit(MarketOrder::buy("b", COD, f64::INFINITY, 0)).expect_err("infinite bid");
    assert!(matches!(err, SimError::InvalidQuantity { .. }));
}

#[test]
fn cannot_sell_more_than_held() {
    let mut qs = system(MarketConfig::default(), passive());
    let err = qs.post_sell_order("s1", COD, 150.0, 1).expect_err("too much");
    assert!(matches!(err, SimError::AllowanceExceeded { .. }));
}

#[test]
fn buyers_sit_in_the_penalty_box() {
    let market = MarketConfig { penalty_sessions: 2, ..MarketConfig::default() };
    let mut qs = system(market, passive());
    buyer_bids(&mut qs, 20.0);
    qs.post_sell_order("s1", COD, 20.0, 2).expect("s1 sells");
    qs.clear_markets(24, false).expect("first session");

    let err = qs.post_sell_order("buyer", COD, 5.0, 25).expect_err("boxed");
    assert!(matches!(err, SimError::InPenaltyBox { sessions_left: 2, .. }));

    qs.clear_markets(48, false).expect("second session");
    assert!(qs.post_sell_order("buyer", COD, 5.0, 49).is_err(), "still boxed after one session");

    qs.clear_markets(72, false).expect("third session");
    qs.post_sell_order("buyer", COD, 5.0, 73).expect("free to sell again");
}

#[test]
fn continuous_market_fills_bids_immediately() {
    let market = MarketConfig { continuous_clearing: true, ..MarketConfig::default() };
    let mut qs = system(market, passive());
    qs.post_sell_order("s1", COD, 50.0, 1).expect("s1 sells");

    let kept = qs.land_catch("buyer", COD, 130.0, 2).expect("land");
    assert_eq!(kept, 130.0, "shortfall bought on the spot");
    assert!(allowance(&qs, "buyer").abs() < 1e-9);
    assert!((allowance(&qs, "s1") - 70.0).abs() < 1e-9);

    let reports = qs.clear_markets(24, false).expect("clear");
    assert_eq!(reports[0].matches(), 1, "intraday fill is reported at the close");
    assert!((reports[0].quota_volume() - 30.0).abs() < 1e-9);
}

#[test]
fn intraday_fill_publishes_its_price() {
    let market = MarketConfig { continuous_clearing: true, ..MarketConfig::default() };
    let mut qs = system(market, passive());
    qs.post_sell_order("s1", COD, 30.0, 1).expect("s1 sells");

    let kept = qs.land_catch("buyer", COD, 130.0, 2).expect("land");
    assert_eq!(kept, 130.0);
    assert!(qs.markets().get(COD).expect("market").outstanding().is_empty(), "ask consumed");
    assert_eq!(qs.last_price(COD), Some(10.0), "spot trade at the reference price");

    let reports = qs.clear_markets(24, false).expect("clear");
    assert_eq!(reports[0].price, Some(10.0));
    assert_eq!(qs.last_price(COD), Some(10.0));

    let charged = qs.record_catch("s2", COD, 10.0, 30).expect("record");
    assert!((charged - 100.0).abs() < 1e-9);
}

#[test]
fn orders_for_another_period_are_refused() {
    let mut market = QuotaMarket::new(COD, MarketConfig::default());
    let err = market.submit(MarketOrder::buy("a", COD, 10.0, 1)).expect_err("future period");
    assert!(matches!(err, SimError::StaleOrder { period: 1, current: 0, .. }));

    market.reset(1);
    let err = market.submit(MarketOrder::sell("a", COD, 10.0, 0)).expect_err("past period");
    assert!(matches!(err, SimError::StaleOrder { period: 0, current: 1, .. }));
    market.submit(MarketOrder::sell("a", COD, 10.0, 1)).expect("current period");
    assert_eq!(market.period(), 1);
}

#[test]
fn holders_sell_unused_quota_at_period_end() {
    let trading = ItqTradingConfig { spare_fraction: 0.0, sell_unused_at_period_end: true, minimum_lot: 0.0 };
    let mut qs = system(MarketConfig::default(), trading);
    buyer_bids(&mut qs, 100.0);

    qs.clear_markets(24, false).expect("ordinary session");
    assert_eq!(allowance(&qs, "buyer"), 0.0, "nobody offers mid-period");

    buyer_bids_again(&mut qs, 100.0);
    let reports = qs.clear_markets(48, true).expect("last session");
    assert!((reports[0].supply - 200.0).abs() < 1e-9);
    assert!((allowance(&qs, "buyer") - 100.0).abs() < 1e-9);
    assert!((allowance(&qs, "s1") - 50.0).abs() < 1e-9);
    assert!((allowance(&qs, "s2") - 50.0).abs() < 1e-9);
}

fn buyer_bids_again(qs: &mut QuotaSystem, quantity: f64) {
    let kept = qs.land_catch("buyer", COD, quantity, 25).expect("land");
    assert_eq!(kept, 0.0);
}

#[test]
fn market_stays_shut_before_opening_period() {
    let market = MarketConfig { opening_period: 1, ..MarketConfig::default() };
    let mut qs = system(market, passive());
    buyer_bids(&mut qs, 30.0);
    assert!(qs.markets().get(COD).expect("market").outstanding().is_empty());

    qs.rollover(720);
    let kept = qs.land_catch("buyer", COD, 130.0, 721).expect("land");
    assert_eq!(kept, 100.0);
    assert_eq!(qs.markets().get(COD).expect("market").outstanding().len(), 1);
}

#[test]
fn rollover_restores_allotments_and_empties_books() {
    let mut qs = system(MarketConfig::default(), passive());
    buyer_bids(&mut qs, 20.0);
    qs.post_sell_order("s1", COD, 20.0, 2).expect("s1 sells");
    qs.clear_markets(24, false).expect("clear");
    qs.land_catch("buyer", COD, 50.0, 25).expect("land and bid again");
    assert!(!qs.markets().get(COD).expect("market").outstanding().is_empty());

    qs.rollover(720);
    for fisher in ["buyer", "s1", "s2"] {
        assert_eq!(allowance(&qs, fisher), 100.0, "{fisher} back at allotment");
    }
    assert!(qs.markets().get(COD).expect("market").outstanding().is_empty());
    assert_eq!(qs.markets().get(COD).expect("market").period(), 1);
    assert!(qs.last_price(COD).is_some(), "price history survives rollover");
    assert!(qs
        .drain_events()
        .iter()
        .any(|e| matches!(e, SimEvent::PeriodRolledOver { new_period: 1, .. })));
}
