//! The simulation engine: drives the quota system hour by hour.
//!
//! EXECUTION ORDER (fixed, documented, never reordered):
//!   1. Fleet subsystem   (departures, tows, catch landing, return decisions)
//!   2. Market subsystem  (daily clearing, period rollover)
//!
//! RULES:
//!   - Subsystems execute in registration order, every tick.
//!   - Subsystems act on the quota system only through its public API.
//!   - All randomness flows through the RngBank.
//!   - All state changes are recorded in the event log.

use crate::{
    clock::SimClock,
    config::ScenarioConfig,
    error::SimResult,
    event::{EventLogEntry, SimEvent},
    fleet_subsystem::FleetSubsystem,
    market_subsystem::MarketSubsystem,
    quota_system::QuotaSystem,
    rng::{RngBank, SubsystemSlot},
    snapshot::{PriceRow, SimSnapshot, SNAPSHOT_INTERVAL},
    store::SimStore,
    subsystem::SimSubsystem,
    types::{RunId, Tick, HOURS_PER_DAY},
};

pub struct SimEngine {
    pub run_id:     RunId,
    pub clock:      SimClock,
    pub rng_bank:   RngBank,
    seed:           u64,
    quota:          QuotaSystem,
    subsystems:     Vec<(SubsystemSlot, Box<dyn SimSubsystem>)>,
    store:          SimStore,
}

impl SimEngine {
    pub fn new(run_id: RunId, seed: u64, store: SimStore, quota: QuotaSystem, period_days: u64) -> Self {
        Self {
            clock:      SimClock::new(run_id.clone(), period_days),
            rng_bank:   RngBank::new(seed),
            seed,
            quota,
            subsystems: Vec::new(),
            store,
            run_id,
        }
    }

    /// Build a fully wired engine from a scenario. Refuses to start on
    /// an invalid configuration.
    pub fn build(run_id: RunId, seed: u64, store: SimStore, config: &ScenarioConfig) -> SimResult<Self> {
        let quota = config.build_quota_system()?;
        store.insert_run(
            &run_id,
            seed,
            env!("CARGO_PKG_VERSION"),
            &serde_json::to_string(config)?,
        )?;
        let mut engine = SimEngine::new(run_id, seed, store, quota, config.period_days);

        // EXECUTION ORDER: fixed, never reordered.
        let fleet = FleetSubsystem::from_config(config, engine.rng_bank)?;
        engine.register(SubsystemSlot::Fleet, Box::new(fleet));
        engine.register(SubsystemSlot::Market, Box::new(MarketSubsystem::new()));
        log::info!(
            "engine: run {} built with {} species, {} fishers, {}-day periods",
            engine.run_id,
            config.species.len(),
            config.fleet.fishers.len(),
            config.period_days
        );
        Ok(engine)
    }

    /// In-memory, migrated store and the default test scenario.
    pub fn build_test(seed: u64) -> SimResult<Self> {
        Self::build_test_with(seed, &ScenarioConfig::default_test())
    }

    pub fn build_test_with(seed: u64, config: &ScenarioConfig) -> SimResult<Self> {
        let store = SimStore::in_memory()?;
        store.migrate()?;
        Self::build(format!("test-{seed}"), seed, store, config)
    }

    /// Register a subsystem. Call in the documented execution order.
    pub fn register(&mut self, slot: SubsystemSlot, subsystem: Box<dyn SimSubsystem>) {
        self.subsystems.push((slot, subsystem));
    }

    /// Advance one tick. This is the core simulation step.
    pub fn tick(&mut self) -> SimResult<Vec<SimEvent>> {
        assert!(!self.clock.paused, "tick() called on paused engine");

        let current_tick = self.clock.advance();
        let mut tick_events: Vec<SimEvent> = vec![
            SimEvent::TickStarted { tick: current_tick }
        ];

        for (slot, subsystem) in &mut self.subsystems {
            let mut rng = self.rng_bank.for_subsystem_at_tick(*slot, current_tick);
            let new_events = subsystem.update(current_tick, &self.clock, &mut self.quota, &mut rng)?;

            for event in &new_events {
                let entry = EventLogEntry {
                    id:         None,
                    run_id:     self.run_id.clone(),
                    tick:       current_tick,
                    subsystem:  subsystem.name().to_string(),
                    event_type: event.type_name().to_string(),
                    payload:    serde_json::to_string(event)?,
                };
                self.store.append_event(&entry)?;
            }

            tick_events.extend(new_events);
        }

        tick_events.push(SimEvent::TickCompleted { tick: current_tick });

        if current_tick % SNAPSHOT_INTERVAL == 0 {
            self.take_snapshot(current_tick)?;
        }

        Ok(tick_events)
    }

    /// Run n ticks in a loop. Used for testing and fast-forward.
    pub fn run_ticks(&mut self, n: u64) -> SimResult<()> {
        // Emit RunInitialized at tick 0 so seed differences are observable.
        if self.clock.current_tick == 0 {
            let init_event = SimEvent::RunInitialized {
                run_id: self.run_id.clone(),
                seed: self.seed,
            };
            let entry = EventLogEntry {
                id:         None,
                run_id:     self.run_id.clone(),
                tick:       0,
                subsystem:  "engine".to_string(),
                event_type: init_event.type_name().to_string(),
                payload:    serde_json::to_string(&init_event)?,
            };
            self.store.append_event(&entry)?;
        }
        self.clock.resume();
        for _ in 0..n {
            self.tick()?;
        }
        self.clock.pause();
        Ok(())
    }

    pub fn run_days(&mut self, days: u64) -> SimResult<()> {
        self.run_ticks(days * HOURS_PER_DAY)
    }

    /// Query events for a specific tick from the store.
    /// Used by the determinism test and replay tooling.
    pub fn store_events_for_tick(
        &self,
        run_id: &str,
        tick: Tick,
    ) -> SimResult<Vec<EventLogEntry>> {
        self.store.events_for_tick(run_id, tick)
    }

    pub fn store(&self) -> &SimStore {
        &self.store
    }

    pub fn quota(&self) -> &QuotaSystem {
        &self.quota
    }

    /// For callers acting on the quota system between ticks (selling
    /// quota by hand, forcing a rollover).
    pub fn quota_mut(&mut self) -> &mut QuotaSystem {
        &mut self.quota
    }

    /// The fleet's running totals. Used by sim-runner summaries.
    pub fn fleet(&self) -> Option<&FleetSubsystem> {
        self.subsystems
            .iter()
            .find_map(|(_, sub)| sub.as_any().downcast_ref::<FleetSubsystem>())
    }

    pub fn snapshot(&self, tick: Tick) -> SimSnapshot {
        let markets = self.quota.markets();
        SimSnapshot {
            run_id:   self.run_id.clone(),
            tick,
            clock:    self.clock.clone(),
            ledgers:  self.quota.ledger_rows(),
            prices:   markets
                .iter()
                .map(|m| PriceRow { species: m.species(), last_price: m.last_price() })
                .collect(),
            accounts: self
                .quota
                .accounts()
                .iter()
                .map(|(id, acc)| (id.clone(), *acc))
                .collect(),
            opportunity_costs: self
                .quota
                .costs()
                .totals()
                .map(|(id, cost)| (id.clone(), cost))
                .collect(),
        }
    }

    fn take_snapshot(&self, tick: Tick) -> SimResult<()> {
        let json = serde_json::to_string(&self.snapshot(tick))?;
        self.store.save_snapshot(&self.run_id, tick, &json)?;
        log::debug!("tick={tick} engine: snapshot saved");
        Ok(())
    }
}
