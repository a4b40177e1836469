//! Species identity. The species list is fixed at scenario setup and
//! never changes during a run.

use crate::error::{SimError, SimResult};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct SpeciesId(pub u16);

impl fmt::Display for SpeciesId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Species {
    pub id:   SpeciesId,
    pub name: String,
}

/// The ordered, immutable set of species a run knows about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpeciesSet {
    species: Vec<Species>,
}

impl SpeciesSet {
    /// Build the set, rejecting duplicate ids or names.
    pub fn new(species: Vec<Species>) -> SimResult<Self> {
        for (i, s) in species.iter().enumerate() {
            if species[..i].iter().any(|o| o.id == s.id || o.name == s.name) {
                return Err(SimError::InvalidConfig(format!(
                    "duplicate species {} ({})", s.id, s.name
                )));
            }
        }
        Ok(Self { species })
    }

    pub fn get(&self, id: SpeciesId) -> Option<&Species> {
        self.species.iter().find(|s| s.id == id)
    }

    pub fn by_name(&self, name: &str) -> Option<&Species> {
        self.species.iter().find(|s| s.name == name)
    }

    pub fn contains(&self, id: SpeciesId) -> bool {
        self.get(id).is_some()
    }

    pub fn ids(&self) -> impl Iterator<Item = SpeciesId> + '_ {
        self.species.iter().map(|s| s.id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Species> {
        self.species.iter()
    }

    pub fn len(&self) -> usize {
        self.species.len()
    }

    pub fn is_empty(&self) -> bool {
        self.species.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sp(id: u16, name: &str) -> Species {
        Species { id: SpeciesId(id), name: name.into() }
    }

    #[test]
    fn keeps_declaration_order() {
        let set = SpeciesSet::new(vec![sp(3, "sole"), sp(1, "cod")]).unwrap();
        let ids: Vec<_> = set.ids().collect();
        assert_eq!(ids, vec![SpeciesId(3), SpeciesId(1)]);
        assert_eq!(set.by_name("cod").map(|s| s.id), Some(SpeciesId(1)));
    }

    #[test]
    fn rejects_duplicates() {
        assert!(SpeciesSet::new(vec![sp(1, "cod"), sp(1, "hake")]).is_err());
        assert!(SpeciesSet::new(vec![sp(1, "cod"), sp(2, "cod")]).is_err());
    }
}
