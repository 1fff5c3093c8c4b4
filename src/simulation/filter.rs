//! Per-pair overrides of which entities collide.

use super::config::CollisionFilter;
use crate::entity::EntityID;
use std::collections::HashSet;

/// The list of entity pairs whose collision setting differs from the
/// filter's default: disabled pairs for an inclusive filter, enabled pairs
/// for an exclusive one.
#[derive(Clone, Debug, Default)]
pub struct CollisionPairs {
    filter: CollisionFilter,
    pairs: HashSet<(EntityID, EntityID)>,
}

fn unordered(entity_a: EntityID, entity_b: EntityID) -> (EntityID, EntityID) {
    if entity_a <= entity_b {
        (entity_a, entity_b)
    } else {
        (entity_b, entity_a)
    }
}

impl CollisionPairs {
    pub fn new(filter: CollisionFilter) -> Self {
        Self {
            filter,
            pairs: HashSet::new(),
        }
    }

    pub fn filter(&self) -> CollisionFilter {
        self.filter
    }

    /// Returns the number of pairs overriding the default.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Makes the two entities collide.
    pub fn enable(&mut self, entity_a: EntityID, entity_b: EntityID) {
        let pair = unordered(entity_a, entity_b);
        match self.filter {
            CollisionFilter::Inclusive => {
                self.pairs.remove(&pair);
            }
            CollisionFilter::Exclusive => {
                self.pairs.insert(pair);
            }
        }
    }

    /// Makes the two entities pass through each other.
    pub fn disable(&mut self, entity_a: EntityID, entity_b: EntityID) {
        let pair = unordered(entity_a, entity_b);
        match self.filter {
            CollisionFilter::Inclusive => {
                self.pairs.insert(pair);
            }
            CollisionFilter::Exclusive => {
                self.pairs.remove(&pair);
            }
        }
    }

    /// Whether the two entities collide.
    pub fn check(&self, entity_a: EntityID, entity_b: EntityID) -> bool {
        let listed = self.pairs.contains(&unordered(entity_a, entity_b));
        match self.filter {
            CollisionFilter::Inclusive => !listed,
            CollisionFilter::Exclusive => listed,
        }
    }

    /// Forgets every pair involving the given entity.
    pub fn remove_entity(&mut self, entity: EntityID) {
        self.pairs.retain(|(a, b)| *a != entity && *b != entity);
    }

    pub fn clear(&mut self) {
        self.pairs.clear();
    }
}
