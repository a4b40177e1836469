//! Logistic return decision: a linear score over observed features,
//! squashed to a probability of heading home, then one uniform draw.

use super::{DecisionContext, FishingStrategy};
use crate::{rng::SubsystemRng, species::SpeciesId, types::HOURS_PER_DAY};
use serde::{Deserialize, Serialize};

/// What the classifier can observe.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "feature", rename_all = "snake_case")]
pub enum Feature {
    /// Constant 1.
    Intercept,
    /// Catch on board over hold capacity.
    HoldFillRatio,
    /// Whole days since departure.
    DaysAtSea,
    /// Tows this trip.
    Effort,
    /// 1 on Saturdays and Sundays.
    Weekend,
    /// Last clearing price of a quota market, 0 before any clearing.
    QuotaPrice { species: SpeciesId },
}

impl Feature {
    pub fn observe(&self, ctx: &DecisionContext<'_>) -> f64 {
        match self {
            Self::Intercept     => 1.0,
            Self::HoldFillRatio => ctx.trip.hold_fill(ctx.fisher.hold_capacity),
            Self::DaysAtSea     => (ctx.trip.hours_at_sea / HOURS_PER_DAY) as f64,
            Self::Effort        => f64::from(ctx.trip.effort),
            Self::Weekend       => if ctx.calendar.is_weekend(ctx.now) { 1.0 } else { 0.0 },
            Self::QuotaPrice { species } => ctx.markets.last_price(*species).unwrap_or(0.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogitTerm {
    #[serde(flatten)]
    pub feature: Feature,
    pub beta:    f64,
}

impl LogitTerm {
    pub fn new(feature: Feature, beta: f64) -> Self {
        Self { feature, beta }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogisticClassifier {
    terms: Vec<LogitTerm>,
}

impl LogisticClassifier {
    pub fn new(terms: Vec<LogitTerm>) -> Self {
        Self { terms }
    }

    /// Handline return model fitted on Gulf of Mexico logbooks.
    pub fn handline() -> Self {
        Self::new(vec![
            LogitTerm::new(Feature::Intercept, -3.47701),
            LogitTerm::new(Feature::HoldFillRatio, 4.37828),
            LogitTerm::new(Feature::Weekend, -0.24437),
        ])
    }

    pub fn terms(&self) -> &[LogitTerm] {
        &self.terms
    }

    pub fn probability(&self, ctx: &DecisionContext<'_>) -> f64 {
        let score: f64 = self
            .terms
            .iter()
            .map(|t| t.beta * t.feature.observe(ctx))
            .sum();
        1.0 / (1.0 + (-score).exp())
    }
}

pub struct LogitReturnStrategy {
    classifier:       LogisticClassifier,
    effort_threshold: u32,
}

impl LogitReturnStrategy {
    pub fn new(classifier: LogisticClassifier) -> Self {
        Self { classifier, effort_threshold: 1 }
    }

    /// The classifier is never consulted before the first tow.
    pub fn with_effort_threshold(mut self, threshold: u32) -> Self {
        self.effort_threshold = threshold.max(1);
        self
    }
}

impl FishingStrategy for LogitReturnStrategy {
    fn name(&self) -> &'static str {
        "logit_return"
    }

    fn should_continue(&mut self, ctx: &DecisionContext<'_>, rng: &mut SubsystemRng) -> bool {
        if ctx.trip.effort < self.effort_threshold {
            return true;
        }
        if ctx.trip.hold_is_full(ctx.fisher.hold_capacity) {
            return false;
        }
        let p_return = self.classifier.probability(ctx);
        !rng.chance(p_return)
    }
}
