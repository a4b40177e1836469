use crate::{market::Side, species::SpeciesId, types::{FisherId, Period}};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No regulation configured for species {species}")]
    UnregulatedSpecies { species: SpeciesId },

    #[error("No quota market for species {species}")]
    UnknownMarket { species: SpeciesId },

    #[error("Fisher '{fisher}' is not registered with the {regulation} regulation")]
    UnknownFisher {
        fisher:     FisherId,
        regulation: &'static str,
    },

    #[error("Invalid biomass {value} for species {species}")]
    InvalidBiomass { species: SpeciesId, value: f64 },

    #[error(
        "Fisher '{fisher}' tried to retain {requested:.3} kg of species {species} \
         with only {allowance:.3} kg allowed"
    )]
    AllowanceExceeded {
        fisher:    FisherId,
        species:   SpeciesId,
        requested: f64,
        allowance: f64,
    },

    #[error("Order quantity must be positive and finite, got {quantity}")]
    InvalidQuantity { quantity: f64 },

    #[error("Fisher '{fisher}' already has a {existing} order for species {species} this period")]
    ConflictingOrder {
        fisher:   FisherId,
        species:  SpeciesId,
        existing: Side,
    },

    #[error("Order for period {period} on species {species} arrived during period {current}")]
    StaleOrder {
        species: SpeciesId,
        period:  Period,
        current: Period,
    },

    #[error("Fisher '{fisher}' may not sell species {species} for {sessions_left} more sessions")]
    InPenaltyBox {
        fisher:        FisherId,
        species:       SpeciesId,
        sessions_left: u32,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type SimResult<T> = Result<T, SimError>;
