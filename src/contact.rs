//! Histories of the contacts between pairs of entities.

use crate::{
    entity::EntityID,
    fph,
    quantities::{Position, Velocity},
    registry::{RegistryIndex, define_registry_index},
    rendering::{Renderable, RenderableKind},
    world::{CollisionRecord, RigidBodyID},
};
use bitflags::bitflags;
use std::collections::VecDeque;

define_registry_index!(
    /// Index of a [`Contact`] in the order of registration.
    ContactIndex
);

bitflags! {
    /// Which parts of a contact history are drawn.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct ContactDisplayFlags: u8 {
        /// The most recent contact location on entity A.
        const LOCATION_A = 1 << 0;
        /// The most recent contact location on entity B.
        const LOCATION_B = 1 << 1;
        /// Every recorded contact location on entity A.
        const PATH_A     = 1 << 2;
        /// Every recorded contact location on entity B.
        const PATH_B     = 1 << 3;
    }
}

/// One contact between two tracked entities at a point in simulated time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ContactPoint {
    pub timestamp: fph,
    pub location_a: Position,
    pub location_b: Position,
    /// Velocity of entity A relative to entity B in the contact plane.
    pub slip_velocity: Velocity,
    /// Force along the contact normal.
    pub normal_force: fph,
}

/// The recorded contact points between two entities, oldest first.
#[derive(Clone, Debug, PartialEq)]
pub struct Contact {
    entity_a: EntityID,
    entity_b: EntityID,
    points: VecDeque<ContactPoint>,
    history_length: usize,
    display_mask: ContactDisplayFlags,
}

/// All tracked entity pairs, in the order they were added.
#[derive(Clone, Debug, Default)]
pub struct ContactTracker {
    contacts: Vec<Contact>,
}

impl Contact {
    /// Starts tracking the contacts between the two entities, keeping the
    /// given number of most recent points, or all points if it is zero.
    pub fn new(entity_a: EntityID, entity_b: EntityID, history_length: usize) -> Self {
        Self {
            entity_a,
            entity_b,
            points: VecDeque::new(),
            history_length,
            display_mask: ContactDisplayFlags::empty(),
        }
    }

    pub fn entity_a(&self) -> EntityID {
        self.entity_a
    }

    pub fn entity_b(&self) -> EntityID {
        self.entity_b
    }

    /// Whether this contact is between the two entities, in any order.
    pub fn is_between(&self, entity_a: EntityID, entity_b: EntityID) -> bool {
        (self.entity_a == entity_a && self.entity_b == entity_b)
            || (self.entity_a == entity_b && self.entity_b == entity_a)
    }

    pub fn history_length(&self) -> usize {
        self.history_length
    }

    pub fn points(&self) -> &VecDeque<ContactPoint> {
        &self.points
    }

    pub fn latest(&self) -> Option<&ContactPoint> {
        self.points.back()
    }

    /// Returns the net normal force of the points recorded at the most
    /// recent timestamp.
    pub fn latest_normal_force(&self) -> fph {
        let Some(latest) = self.latest() else {
            return 0.0;
        };
        self.points
            .iter()
            .rev()
            .take_while(|point| point.timestamp == latest.timestamp)
            .map(|point| point.normal_force)
            .sum()
    }

    pub fn display_mask(&self) -> ContactDisplayFlags {
        self.display_mask
    }

    pub fn set_display_mask(&mut self, display_mask: ContactDisplayFlags) {
        self.display_mask = display_mask;
    }

    /// Appends the given point, dropping the oldest when the history is
    /// full.
    pub fn add_point(&mut self, point: ContactPoint) {
        if self.history_length > 0 && self.points.len() == self.history_length {
            self.points.pop_front();
        }
        self.points.push_back(point);
    }

    pub fn clear_points(&mut self) {
        self.points.clear();
    }

    fn render(&self, renderables: &mut Vec<Renderable>) {
        if self.display_mask.is_empty() {
            return;
        }
        let mut points = Vec::new();
        if self.display_mask.contains(ContactDisplayFlags::PATH_A) {
            points.extend(self.points.iter().map(|point| point.location_a));
        } else if self.display_mask.contains(ContactDisplayFlags::LOCATION_A) {
            points.extend(self.latest().map(|point| point.location_a));
        }
        if self.display_mask.contains(ContactDisplayFlags::PATH_B) {
            points.extend(self.points.iter().map(|point| point.location_b));
        } else if self.display_mask.contains(ContactDisplayFlags::LOCATION_B) {
            points.extend(self.latest().map(|point| point.location_b));
        }
        if !points.is_empty() {
            renderables.push(Renderable::from_points(
                RenderableKind::ContactPoints,
                points,
            ));
        }
    }
}

impl ContactTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    /// Starts tracking the contacts between the two entities and returns
    /// the index of the contact. If the pair is already tracked, in either
    /// order, the existing contact is returned unchanged.
    pub fn add_contact(
        &mut self,
        entity_a: EntityID,
        entity_b: EntityID,
        history_length: usize,
    ) -> ContactIndex {
        if let Some(index) = self.index_of(entity_a, entity_b) {
            return index;
        }
        self.contacts
            .push(Contact::new(entity_a, entity_b, history_length));
        ContactIndex::from_idx(self.contacts.len() - 1)
    }

    pub fn get(&self, index: ContactIndex) -> Option<&Contact> {
        self.contacts.get(index.idx())
    }

    pub fn get_mut(&mut self, index: ContactIndex) -> Option<&mut Contact> {
        self.contacts.get_mut(index.idx())
    }

    /// Returns the index of the contact between the two entities, in any
    /// order.
    pub fn index_of(&self, entity_a: EntityID, entity_b: EntityID) -> Option<ContactIndex> {
        self.contacts
            .iter()
            .position(|contact| contact.is_between(entity_a, entity_b))
            .map(ContactIndex::from_idx)
    }

    /// Returns the contact between the two entities, in any order.
    pub fn find(&self, entity_a: EntityID, entity_b: EntityID) -> Option<&Contact> {
        self.get(self.index_of(entity_a, entity_b)?)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ContactIndex, &Contact)> {
        self.contacts
            .iter()
            .enumerate()
            .map(|(idx, contact)| (ContactIndex::from_idx(idx), contact))
    }

    /// Adds every resolved contact point between tracked entities to their
    /// history, with locations ordered like the tracked pair.
    pub fn record(
        &mut self,
        time: fph,
        collisions: &[CollisionRecord],
        entity_of_body: impl Fn(RigidBodyID) -> Option<EntityID>,
    ) {
        if self.contacts.is_empty() {
            return;
        }
        for collision in collisions {
            let (Some(entity_a), Some(entity_b)) = (
                entity_of_body(collision.body_a),
                entity_of_body(collision.body_b),
            ) else {
                continue;
            };
            let Some(contact) = self
                .contacts
                .iter_mut()
                .find(|contact| contact.is_between(entity_a, entity_b))
            else {
                continue;
            };
            let flipped = contact.entity_a != entity_a;

            for record in &collision.contacts {
                let point = if flipped {
                    ContactPoint {
                        timestamp: time,
                        location_a: record.position_on_b,
                        location_b: record.position_on_a,
                        slip_velocity: -record.slip_velocity,
                        normal_force: record.normal_force,
                    }
                } else {
                    ContactPoint {
                        timestamp: time,
                        location_a: record.position_on_a,
                        location_b: record.position_on_b,
                        slip_velocity: record.slip_velocity,
                        normal_force: record.normal_force,
                    }
                };
                contact.add_point(point);
            }
        }
    }

    /// Appends what should be drawn of every contact to the given list.
    pub fn render(&self, renderables: &mut Vec<Renderable>) {
        for contact in &self.contacts {
            contact.render(renderables);
        }
    }

    pub fn clear(&mut self) {
        self.contacts.clear();
    }
}
