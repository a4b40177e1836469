//! sim-runner: headless runner for the quota engine.
//!
//! Usage:
//!   sim-runner --seed 12345 --days 365 --db run.db --config data/scenario.json
//!   sim-runner --seed 12345 --days 90 --json

use anyhow::Result;
use quota_core::{config::ScenarioConfig, engine::SimEngine, store::SimStore};
use std::env;

#[derive(serde::Serialize)]
struct RunSummary {
    run_id:     String,
    seed:       u64,
    days:       u64,
    final_tick: u64,
    period:     u64,
    species:    Vec<SpeciesSummary>,
    fishers:    Vec<FisherSummary>,
}

#[derive(serde::Serialize)]
struct SpeciesSummary {
    name:          String,
    last_price:    Option<f64>,
    trades:        u64,
    last_session:  Option<SessionSummary>,
    allowance:     f64,
}

#[derive(serde::Serialize)]
struct SessionSummary {
    matches:       usize,
    quota_volume:  f64,
    money_volume:  f64,
    average_price: Option<f64>,
}

#[derive(serde::Serialize)]
struct FisherSummary {
    id:               String,
    trips:            u32,
    landed:           f64,
    cash:             f64,
    profit:           f64,
    opportunity_cost: f64,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let days = parse_arg(&args, "--days", 365u64);
    let json = args.iter().any(|a| a == "--json");
    let db = string_arg(&args, "--db").unwrap_or(":memory:");
    let config_path = string_arg(&args, "--config").unwrap_or("data/scenario.json");

    let config = ScenarioConfig::load(config_path)?;

    if !json {
        println!("Quota Desk — sim-runner");
        println!("  seed:    {seed}");
        println!("  days:    {days}");
        println!("  db:      {db}");
        println!("  config:  {config_path}");
        println!();
    }

    let store = if db == ":memory:" { SimStore::in_memory()? } else { SimStore::open(db)? };
    store.migrate()?;

    let run_id = format!("run-{seed}-{}", uuid::Uuid::new_v4());
    let mut engine = SimEngine::build(run_id.clone(), seed, store, &config)?;
    engine.run_days(days)?;

    let summary = summarize(&engine, &config, seed, days)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    log::info!("run {run_id} finished at tick {}", engine.clock.current_tick);
    Ok(())
}

fn summarize(engine: &SimEngine, config: &ScenarioConfig, seed: u64, days: u64) -> Result<RunSummary> {
    let quota = engine.quota();
    let trades = engine.store().count_events(&engine.run_id, "quota_traded")?;
    log::debug!("{trades} quota trades in total");
    let rows = quota.ledger_rows();

    let species = config
        .species
        .iter()
        .map(|s| SpeciesSummary {
            name:       s.name.clone(),
            last_price: quota.last_price(s.id),
            trades:     if trades > 0 { trades_for(engine, s.id.0) } else { 0 },
            last_session: quota.last_report(s.id).map(|r| SessionSummary {
                matches:       r.matches(),
                quota_volume:  r.quota_volume(),
                money_volume:  r.money_volume(),
                average_price: r.average_price(),
            }),
            allowance: rows
                .iter()
                .filter(|r| r.species == s.id)
                .map(|r| r.entry.allowance)
                .sum(),
        })
        .collect();

    let fleet = engine.fleet();
    let fishers = config
        .fleet
        .fishers
        .iter()
        .map(|f| {
            let tally = fleet.and_then(|fl| fl.vessel_log(&f.id)).unwrap_or_default();
            let account = quota.accounts().get(&f.id);
            FisherSummary {
                id:               f.id.clone(),
                trips:            tally.trips,
                landed:           tally.landed,
                cash:             account.cash,
                profit:           account.profit,
                opportunity_cost: quota.opportunity_cost(&f.id),
            }
        })
        .collect();

    Ok(RunSummary {
        run_id: engine.run_id.clone(),
        seed,
        days,
        final_tick: engine.clock.current_tick,
        period: quota.period(),
        species,
        fishers,
    })
}

/// Trades of one species, read back from the event log.
fn trades_for(engine: &SimEngine, species: u16) -> u64 {
    engine
        .store()
        .events_for_run(&engine.run_id)
        .map(|events| {
            events
                .iter()
                .filter(|e| e.event_type == "quota_traded")
                .filter_map(|e| serde_json::from_str::<serde_json::Value>(&e.payload).ok())
                .filter(|v| v["species"] == species)
                .count() as u64
        })
        .unwrap_or(0)
}

fn print_summary(summary: &RunSummary) {
    println!("=== RUN SUMMARY ===");
    println!("  run_id:      {}", summary.run_id);
    println!("  days run:    {}", summary.days);
    println!("  final tick:  {}", summary.final_tick);
    println!("  period:      {}", summary.period);

    println!();
    println!("=== SPECIES ===");
    for s in &summary.species {
        let price = s.last_price.map_or("-".to_string(), |p| format!("{p:.2}"));
        println!(
            "  {:<10} | price: {price:>8} | trades: {:>5} | allowance left: {:.1}",
            s.name, s.trades, s.allowance
        );
        if let Some(session) = &s.last_session {
            println!(
                "  {:<10} | last session: {} matches, {:.1} quota, {:.1} money",
                "", session.matches, session.quota_volume, session.money_volume
            );
        }
    }

    println!();
    println!("=== FISHERS ===");
    for f in &summary.fishers {
        println!(
            "  {:<8} | trips: {:>4} | landed: {:>9.1} | cash: {:>10.2} | profit: {:>10.2} | opp. cost: {:>10.2}",
            f.id, f.trips, f.landed, f.cash, f.profit, f.opportunity_cost
        );
    }
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}

fn string_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}
