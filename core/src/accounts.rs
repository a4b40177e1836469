//! Per-fisher money. Trades move `cash` and `profit` together;
//! opportunity-cost charges move `profit` only.

use crate::types::FisherId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct FisherAccount {
    pub cash:   f64,
    pub profit: f64,
}

#[derive(Debug, Clone, Default)]
pub struct Accounts {
    accounts: BTreeMap<FisherId, FisherAccount>,
}

impl Accounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, fisher: &str) -> FisherAccount {
        self.accounts.get(fisher).copied().unwrap_or_default()
    }

    pub fn earn(&mut self, fisher: &str, amount: f64) {
        let acc = self.entry(fisher);
        acc.cash += amount;
        acc.profit += amount;
    }

    pub fn spend(&mut self, fisher: &str, amount: f64) {
        let acc = self.entry(fisher);
        acc.cash -= amount;
        acc.profit -= amount;
    }

    /// Accounting-only charge: profit goes down, cash does not move.
    pub fn charge_profit(&mut self, fisher: &str, amount: f64) {
        self.entry(fisher).profit -= amount;
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FisherId, &FisherAccount)> {
        self.accounts.iter()
    }

    fn entry(&mut self, fisher: &str) -> &mut FisherAccount {
        self.accounts.entry(fisher.to_string()).or_default()
    }
}
