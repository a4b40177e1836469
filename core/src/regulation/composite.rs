//! One regulation per species. Fishing is permitted only when every
//! sub-regulation permits it; quota questions go to the regulation of
//! the species asked about.

use super::Regulation;
use crate::{
    error::{SimError, SimResult},
    species::SpeciesId,
};
use std::collections::BTreeMap;

#[derive(Default)]
pub struct CompositeRegulation {
    by_species: BTreeMap<SpeciesId, Regulation>,
}

impl CompositeRegulation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, species: SpeciesId, regulation: Regulation) -> Self {
        self.insert(species, regulation);
        self
    }

    pub fn insert(&mut self, species: SpeciesId, regulation: Regulation) {
        self.by_species.insert(species, regulation);
    }

    pub fn regulation_for(&self, species: SpeciesId) -> SimResult<&Regulation> {
        self.by_species
            .get(&species)
            .ok_or(SimError::UnregulatedSpecies { species })
    }

    pub fn regulation_for_mut(&mut self, species: SpeciesId) -> SimResult<&mut Regulation> {
        self.by_species
            .get_mut(&species)
            .ok_or(SimError::UnregulatedSpecies { species })
    }

    pub fn regulations(&self) -> impl Iterator<Item = &Regulation> {
        self.by_species.values()
    }

    pub fn regulations_mut(&mut self) -> impl Iterator<Item = &mut Regulation> {
        self.by_species.values_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regulation::{AggregateQuota, GridCell};

    #[test]
    fn active_only_when_every_species_allows_it() {
        let quota = AggregateQuota::new(&[(SpeciesId(1), 5.0)]).unwrap();
        let mut composite = CompositeRegulation::new().with(SpeciesId(0), Regulation::Unregulated);
        assert!(Regulation::Composite(CompositeRegulation::new()).is_active("a", GridCell::default(), 1));

        let mut events = Vec::new();
        let mut reg = Regulation::AggregateQuota(quota);
        reg.record("a", SpeciesId(1), 5.0, 1, &mut events).unwrap();
        composite.insert(SpeciesId(1), reg);
        let composite = Regulation::Composite(composite);
        assert!(!composite.is_active("a", GridCell::default(), 2));
    }
}
