//! Shared primitive types used across the entire simulation.

/// A simulation tick. One tick = one simulated hour.
pub type Tick = u64;

/// Ticks in one simulated day. Markets clear once per day.
pub const HOURS_PER_DAY: Tick = 24;

/// A stable, unique identifier for a fisher (one vessel, one agent).
pub type FisherId = String;

/// The canonical run identifier.
pub type RunId = String;

/// Index of the regulatory period (season) a tick belongs to, from 0.
pub type Period = u64;

/// Biomass in kilograms.
pub type Biomass = f64;
