//! Fleet subsystem: the trip loop that drives the quota system.
//!
//! Every idle vessel leaves port at the configured hour of day if its
//! regulation lets it fish and at least one targeted species still has
//! allowance. At sea it tows once per tick: one exponential draw per
//! targeted species, capped by free hold space, landed through
//! `QuotaSystem::land_catch`. After each tow the vessel's strategy
//! chain decides whether the trip goes on.

use crate::{
    clock::{Calendar, SimClock},
    config::ScenarioConfig,
    error::{SimError, SimResult},
    event::SimEvent,
    ledger::BIOMASS_EPSILON,
    quota_system::QuotaSystem,
    regulation::GridCell,
    rng::{RngBank, SubsystemRng, SubsystemSlot},
    species::SpeciesId,
    strategy::{build_chain, DecisionContext, FisherProfile, FishingStrategy, TripRecord},
    subsystem::SimSubsystem,
    types::{Biomass, Tick, HOURS_PER_DAY},
};
use std::any::Any;

struct Vessel {
    profile:     FisherProfile,
    ground:      GridCell,
    catch_rates: Vec<(SpeciesId, Biomass)>,
    strategy:    Box<dyn FishingStrategy>,
    trip:        Option<TripRecord>,
    tally:       VesselLog,
}

/// Running totals per vessel, for summaries.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VesselLog {
    pub trips:        u32,
    pub tows:         u32,
    pub hours_at_sea: Tick,
    pub landed:       Biomass,
}

pub struct FleetSubsystem {
    vessels:        Vec<Vessel>,
    departure_hour: Tick,
    calendar:       Calendar,
    /// Strategy draws use their own stream so catch draws do not shift
    /// when a strategy changes.
    rng_bank:       RngBank,
}

impl FleetSubsystem {
    pub fn from_config(config: &ScenarioConfig, rng_bank: RngBank) -> SimResult<Self> {
        let mut vessels = Vec::with_capacity(config.fleet.fishers.len());
        for fisher in &config.fleet.fishers {
            let mut catch_rates = Vec::new();
            for rate in &fisher.catch_rates {
                catch_rates.push((config.species_id(&rate.species)?, rate.mean_per_tow));
            }
            let targets = catch_rates
                .iter()
                .filter(|(_, mean)| *mean > 0.0)
                .map(|(s, _)| *s)
                .collect();
            vessels.push(Vessel {
                profile: FisherProfile {
                    id:            fisher.id.clone(),
                    targets,
                    hold_capacity: fisher.hold_capacity,
                },
                ground: fisher.fishing_ground,
                catch_rates,
                strategy: build_chain(&config.strategy),
                trip: None,
                tally: VesselLog::default(),
            });
        }
        // Fishers act in id order, whatever the config order.
        vessels.sort_by(|a, b| a.profile.id.cmp(&b.profile.id));
        Ok(Self {
            vessels,
            departure_hour: config.fleet.departure_hour,
            calendar: config.calendar,
            rng_bank,
        })
    }

    pub fn is_at_sea(&self, fisher: &str) -> bool {
        self.vessel(fisher).is_some_and(|v| v.trip.is_some())
    }

    pub fn vessel_log(&self, fisher: &str) -> Option<VesselLog> {
        self.vessel(fisher).map(|v| v.tally)
    }

    pub fn logs(&self) -> impl Iterator<Item = (&str, VesselLog)> {
        self.vessels.iter().map(|v| (v.profile.id.as_str(), v.tally))
    }

    fn vessel(&self, fisher: &str) -> Option<&Vessel> {
        self.vessels.iter().find(|v| v.profile.id == fisher)
    }
}

impl SimSubsystem for FleetSubsystem {
    fn name(&self) -> &'static str {
        "fleet"
    }

    fn update(
        &mut self,
        tick:  Tick,
        _clock: &SimClock,
        quota: &mut QuotaSystem,
        rng:   &mut SubsystemRng,
    ) -> SimResult<Vec<SimEvent>> {
        let mut decisions = self.rng_bank.for_subsystem_at_tick(SubsystemSlot::Strategy, tick);
        let departing = tick % HOURS_PER_DAY == self.departure_hour;

        for vessel in &mut self.vessels {
            let Vessel { profile, ground, catch_rates, strategy, trip, tally } = vessel;
            let id = profile.id.as_str();

            if trip.is_none() {
                if departing && quota.is_active(id, *ground, tick) && has_allowance_left(profile, quota) {
                    *trip = Some(TripRecord::new(tick));
                    strategy.trip_started();
                    log::debug!("tick={tick} fleet: {id} leaves port");
                    quota.emit(SimEvent::TripStarted { tick, fisher_id: id.to_string() });
                } else {
                    continue;
                }
            }
            let Some(current) = trip.as_mut() else { continue };

            if !quota.is_active(id, *ground, tick) {
                log::debug!("tick={tick} fleet: {id} ordered back to port");
                end_trip(tick, id, current, tally, quota);
                *trip = None;
                continue;
            }

            let mut landed = Vec::new();
            let mut free_hold = (profile.hold_capacity - current.total_catch()).max(0.0);
            for &(species, mean) in catch_rates.iter() {
                if mean <= 0.0 || free_hold <= BIOMASS_EPSILON {
                    continue;
                }
                let proposed = rng.exponential(mean).min(free_hold);
                match quota.land_catch(id, species, proposed, tick) {
                    Ok(kept) => {
                        free_hold -= kept;
                        landed.push((species, kept));
                    }
                    Err(e) => reject(tick, id, species, e, quota),
                }
            }
            current.record_tow(&landed);
            current.hours_at_sea = tick + 1 - current.started_at;

            let ctx = DecisionContext {
                fisher:     profile,
                trip:       current,
                regulation: quota.regulation(),
                markets:    quota.markets(),
                calendar:   &self.calendar,
                now:        tick,
            };
            if !strategy.should_continue(&ctx, &mut decisions) {
                end_trip(tick, id, current, tally, quota);
                *trip = None;
            }
        }
        Ok(quota.drain_events())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Some targeted species is unregulated or still has allowance.
fn has_allowance_left(profile: &FisherProfile, quota: &QuotaSystem) -> bool {
    profile.targets.iter().any(|&species| match quota.remaining(&profile.id, species) {
        Ok(None) => true,
        Ok(Some(left)) => left > BIOMASS_EPSILON,
        Err(_) => false,
    })
}

fn end_trip(tick: Tick, id: &str, trip: &TripRecord, tally: &mut VesselLog, quota: &mut QuotaSystem) {
    tally.trips += 1;
    tally.tows += trip.effort;
    tally.hours_at_sea += trip.hours_at_sea;
    tally.landed += trip.total_catch();
    log::debug!(
        "tick={tick} fleet: {id} back in port after {}h, {} tows, {:.1} landed",
        trip.hours_at_sea, trip.effort, trip.total_catch()
    );
    quota.emit(SimEvent::TripEnded {
        tick,
        fisher_id:    id.to_string(),
        hours_at_sea: trip.hours_at_sea,
        effort:       trip.effort,
        landed:       trip.total_catch(),
    });
}

fn reject(tick: Tick, id: &str, species: SpeciesId, error: SimError, quota: &mut QuotaSystem) {
    log::warn!("tick={tick} fleet: catch of species {species} by {id} rejected: {error}");
    quota.emit(SimEvent::CatchRejected {
        tick,
        fisher_id: id.to_string(),
        species,
        reason:    error.to_string(),
    });
}
