use crate::{
    clock::Calendar,
    error::{SimError, SimResult},
    market::{PricePolicy, QuotaMarket, QuotaMarkets},
    quota_system::QuotaSystem,
    regulation::{
        AggregateQuota, AreaClosure, ClosedArea, ClosureWindow, CompositeRegulation, GridCell,
        IndividualQuota, ItqRegulation, Regulation,
    },
    species::{Species, SpeciesId, SpeciesSet},
    strategy::{LogisticClassifier, LogitTerm},
    types::{Biomass, FisherId, Period, Tick, HOURS_PER_DAY},
};
use serde::{Deserialize, Serialize};

pub use crate::regulation::itq::ItqTradingConfig;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarketConfig {
    pub initial_price: f64,
    pub min_price: f64,
    pub max_price: f64,
    #[serde(default)]
    pub price_policy: PricePolicy,
    /// Fill bids from resting asks as they arrive instead of waiting
    /// for the day close.
    #[serde(default)]
    pub continuous_clearing: bool,
    /// Sessions a buyer must wait before it may sell the same species.
    #[serde(default)]
    pub penalty_sessions: u32,
    /// First period in which the market trades.
    #[serde(default)]
    pub opening_period: Period,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            initial_price: 10.0,
            min_price: 0.1,
            max_price: 100.0,
            price_policy: PricePolicy::default(),
            continuous_clearing: false,
            penalty_sessions: 0,
            opening_period: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RegulationConfig {
    Unregulated,
    AggregateQuota {
        total: Biomass,
    },
    IndividualQuota {
        per_fisher: Biomass,
    },
    Itq {
        per_fisher: Biomass,
        #[serde(default)]
        market: MarketConfig,
        #[serde(default)]
        trading: ItqTradingConfig,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpeciesRegulationConfig {
    /// Species name, as listed in `species`.
    pub species: String,
    #[serde(flatten)]
    pub rule: RegulationConfig,
}

/// Closed cells and an optional yearly window; wraps every species'
/// regulation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClosureConfig {
    #[serde(default)]
    pub areas: Vec<ClosedArea>,
    #[serde(default)]
    pub window: Option<ClosureWindow>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BaseStrategyConfig {
    FishUntilFull {
        min_hold_fraction: f64,
    },
    Fixed {
        keep_fishing: bool,
    },
    Logit {
        terms: Vec<LogitTerm>,
        #[serde(default = "default_effort_threshold")]
        effort_threshold: u32,
    },
}

fn default_effort_threshold() -> u32 {
    1
}

/// Decorators left as `None` (or `false`) are not part of the chain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StrategyConfig {
    pub quota_limit: bool,
    pub tow_limit: Option<u32>,
    pub max_hours_at_sea: Option<Tick>,
    pub daily_return_hours: Option<Tick>,
    pub base: BaseStrategyConfig,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            quota_limit: true,
            tow_limit: None,
            max_hours_at_sea: Some(6 * HOURS_PER_DAY),
            daily_return_hours: Some(HOURS_PER_DAY),
            base: BaseStrategyConfig::Logit {
                terms: LogisticClassifier::handline().terms().to_vec(),
                effort_threshold: 1,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatchRateConfig {
    pub species: String,
    /// Mean biomass per tow; draws are exponential around it.
    pub mean_per_tow: Biomass,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FisherConfig {
    pub id: FisherId,
    pub hold_capacity: Biomass,
    #[serde(default)]
    pub fishing_ground: GridCell,
    pub catch_rates: Vec<CatchRateConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FleetConfig {
    /// Hour of day at which idle vessels leave port.
    #[serde(default = "default_departure_hour")]
    pub departure_hour: Tick,
    pub fishers: Vec<FisherConfig>,
}

fn default_departure_hour() -> Tick {
    6
}

fn default_period_days() -> u64 {
    365
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScenarioConfig {
    pub species: Vec<Species>,
    #[serde(default = "default_period_days")]
    pub period_days: u64,
    #[serde(default)]
    pub calendar: Calendar,
    pub regulations: Vec<SpeciesRegulationConfig>,
    #[serde(default)]
    pub closures: Vec<ClosureConfig>,
    #[serde(default)]
    pub strategy: StrategyConfig,
    pub fleet: FleetConfig,
}

impl ScenarioConfig {
    /// Load a scenario JSON file.
    /// In tests, use ScenarioConfig::default_test().
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        Ok(config)
    }

    /// Two species, three vessels: cod under ITQ, haddock under a
    /// shared total allowable catch. Monthly periods.
    pub fn default_test() -> Self {
        Self {
            species: vec![
                Species { id: SpeciesId(0), name: "cod".into() },
                Species { id: SpeciesId(1), name: "haddock".into() },
            ],
            period_days: 30,
            calendar: Calendar::default(),
            regulations: vec![
                SpeciesRegulationConfig {
                    species: "cod".into(),
                    rule: RegulationConfig::Itq {
                        per_fisher: 500.0,
                        market: MarketConfig::default(),
                        trading: ItqTradingConfig {
                            spare_fraction: 0.25,
                            ..ItqTradingConfig::default()
                        },
                    },
                },
                SpeciesRegulationConfig {
                    species: "haddock".into(),
                    rule: RegulationConfig::AggregateQuota { total: 3000.0 },
                },
            ],
            closures: Vec::new(),
            strategy: StrategyConfig::default(),
            fleet: FleetConfig {
                departure_hour: default_departure_hour(),
                fishers: ["f1", "f2", "f3"]
                    .iter()
                    .enumerate()
                    .map(|(i, id)| FisherConfig {
                        id: (*id).into(),
                        hold_capacity: 400.0,
                        fishing_ground: GridCell::new(i as i32, 0),
                        catch_rates: vec![
                            CatchRateConfig { species: "cod".into(), mean_per_tow: 30.0 + 10.0 * i as f64 },
                            CatchRateConfig { species: "haddock".into(), mean_per_tow: 20.0 },
                        ],
                    })
                    .collect(),
            },
        }
    }

    pub fn species_set(&self) -> SimResult<SpeciesSet> {
        SpeciesSet::new(self.species.clone())
    }

    pub fn species_id(&self, name: &str) -> SimResult<SpeciesId> {
        self.species
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.id)
            .ok_or_else(|| SimError::InvalidConfig(format!("unknown species '{name}'")))
    }

    /// Reject every configuration the engine cannot run.
    pub fn validate(&self) -> SimResult<()> {
        let species = self.species_set()?;
        if species.is_empty() {
            return Err(invalid("at least one species is required"));
        }
        if self.period_days == 0 {
            return Err(invalid("period_days must be >= 1"));
        }

        let mut regulated = Vec::new();
        for entry in &self.regulations {
            let id = self.species_id(&entry.species)?;
            if regulated.contains(&id) {
                return Err(invalid(format!("species '{}' has two regulations", entry.species)));
            }
            regulated.push(id);
            validate_rule(&entry.species, &entry.rule)?;
        }
        for s in species.iter() {
            if !regulated.contains(&s.id) {
                return Err(invalid(format!("no regulation configured for species '{}'", s.name)));
            }
        }

        for closure in &self.closures {
            if let Some(window) = &closure.window {
                window.validate()?;
            }
            for area in &closure.areas {
                if area.min_x > area.max_x || area.min_y > area.max_y {
                    return Err(invalid(format!("closed area {area:?} has min > max")));
                }
            }
        }

        self.validate_strategy()?;
        self.validate_fleet()
    }

    fn validate_strategy(&self) -> SimResult<()> {
        let s = &self.strategy;
        if s.tow_limit == Some(0) {
            return Err(invalid("tow_limit must be >= 1"));
        }
        if s.max_hours_at_sea == Some(0) {
            return Err(invalid("max_hours_at_sea must be >= 1"));
        }
        if s.daily_return_hours == Some(0) {
            return Err(invalid("daily_return_hours must be >= 1"));
        }
        match &s.base {
            BaseStrategyConfig::FishUntilFull { min_hold_fraction } => {
                if !(*min_hold_fraction > 0.0 && *min_hold_fraction <= 1.0) {
                    return Err(invalid("min_hold_fraction must be within (0, 1]"));
                }
            }
            BaseStrategyConfig::Logit { terms, effort_threshold } => {
                if terms.iter().any(|t| !t.beta.is_finite()) {
                    return Err(invalid("logit coefficients must be finite"));
                }
                if *effort_threshold == 0 {
                    return Err(invalid("logit effort_threshold must be >= 1"));
                }
            }
            BaseStrategyConfig::Fixed { .. } => {}
        }
        Ok(())
    }

    fn validate_fleet(&self) -> SimResult<()> {
        if self.fleet.departure_hour >= HOURS_PER_DAY {
            return Err(invalid("departure_hour must be within 0..24"));
        }
        let mut seen: Vec<&str> = Vec::new();
        for fisher in &self.fleet.fishers {
            if fisher.id.is_empty() || seen.contains(&fisher.id.as_str()) {
                return Err(invalid(format!("fisher id '{}' is empty or duplicated", fisher.id)));
            }
            seen.push(&fisher.id);
            if !(fisher.hold_capacity.is_finite() && fisher.hold_capacity > 0.0) {
                return Err(invalid(format!("fisher '{}' needs a positive hold capacity", fisher.id)));
            }
            for rate in &fisher.catch_rates {
                self.species_id(&rate.species)?;
                if !(rate.mean_per_tow.is_finite() && rate.mean_per_tow >= 0.0) {
                    return Err(invalid(format!(
                        "fisher '{}' has a negative catch rate for '{}'",
                        fisher.id, rate.species
                    )));
                }
            }
        }
        Ok(())
    }

    /// Validate, then assemble regulation, markets and ledgers, with
    /// every fleet member registered.
    pub fn build_quota_system(&self) -> SimResult<QuotaSystem> {
        self.validate()?;
        let species = self.species_set()?;
        let mut composite = CompositeRegulation::new();
        let mut markets = QuotaMarkets::new();

        for entry in &self.regulations {
            let id = self.species_id(&entry.species)?;
            let regulation = match &entry.rule {
                RegulationConfig::Unregulated => Regulation::Unregulated,
                RegulationConfig::AggregateQuota { total } => {
                    Regulation::AggregateQuota(AggregateQuota::new(&[(id, *total)])?)
                }
                RegulationConfig::IndividualQuota { per_fisher } => {
                    Regulation::IndividualQuota(IndividualQuota::new(&[(id, *per_fisher)])?)
                }
                RegulationConfig::Itq { per_fisher, market, trading } => {
                    markets.insert(QuotaMarket::new(id, market.clone()));
                    Regulation::Itq(ItqRegulation::new(&[(id, *per_fisher)], trading.clone())?)
                }
            };
            composite.insert(id, regulation);
        }

        let mut regulation = Regulation::Composite(composite);
        for closure in &self.closures {
            regulation = Regulation::AreaClosure(AreaClosure::new(
                regulation,
                closure.areas.clone(),
                closure.window,
                self.calendar,
            )?);
        }

        let mut system = QuotaSystem::new(species, regulation, markets);
        for fisher in &self.fleet.fishers {
            system.register_fisher(&fisher.id)?;
        }
        Ok(system)
    }
}

fn validate_rule(species: &str, rule: &RegulationConfig) -> SimResult<()> {
    let quantity = match rule {
        RegulationConfig::Unregulated => return Ok(()),
        RegulationConfig::AggregateQuota { total } => *total,
        RegulationConfig::IndividualQuota { per_fisher } => *per_fisher,
        RegulationConfig::Itq { per_fisher, market, trading } => {
            validate_market(species, market)?;
            if !(0.0..=1.0).contains(&trading.spare_fraction) {
                return Err(invalid(format!("'{species}': spare_fraction must be within [0, 1]")));
            }
            if !(trading.minimum_lot.is_finite() && trading.minimum_lot >= 0.0) {
                return Err(invalid(format!("'{species}': minimum_lot must be >= 0")));
            }
            *per_fisher
        }
    };
    if !(quantity.is_finite() && quantity >= 0.0) {
        return Err(invalid(format!("'{species}': quota must be finite and >= 0, got {quantity}")));
    }
    Ok(())
}

fn validate_market(species: &str, market: &MarketConfig) -> SimResult<()> {
    if !(market.initial_price.is_finite() && market.initial_price > 0.0) {
        return Err(invalid(format!("'{species}': initial_price must be > 0")));
    }
    if !(market.min_price.is_finite() && market.max_price.is_finite()) || market.min_price < 0.0 {
        return Err(invalid(format!("'{species}': price bounds must be finite and >= 0")));
    }
    if market.min_price > market.max_price {
        return Err(invalid(format!(
            "'{species}': min_price {} exceeds max_price {}",
            market.min_price, market.max_price
        )));
    }
    if let PricePolicy::Proportional { sensitivity } = market.price_policy {
        if !(sensitivity.is_finite() && sensitivity >= 0.0) {
            return Err(invalid(format!("'{species}': price sensitivity must be >= 0")));
        }
    }
    Ok(())
}

fn invalid(message: impl Into<String>) -> SimError {
    SimError::InvalidConfig(message.into())
}
