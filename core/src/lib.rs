pub mod accounts;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod fleet_subsystem;
pub mod ledger;
pub mod market;
pub mod market_subsystem;
pub mod opportunity_cost;
pub mod quota_system;
pub mod regulation;
pub mod rng;
pub mod snapshot;
pub mod species;
pub mod store;
pub mod strategy;
pub mod subsystem;
pub mod types;
