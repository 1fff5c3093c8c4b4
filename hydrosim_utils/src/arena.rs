//! Generational arena with stable keys.

use std::fmt;

/// A [`Vec`] of slots that reuses removed slots for new values.
///
/// Each slot carries a generation that is advanced whenever its value is
/// removed, so a key handed out for a previous occupant of the slot can never
/// be used to reach a newer value.
#[derive(Clone, Debug)]
pub struct Arena<V> {
    slots: Vec<Slot<V>>,
    free_indices: Vec<u32>,
}

/// A key into an [`Arena`].
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArenaKey {
    idx: u32,
    generation: u32,
}

#[derive(Clone, Debug)]
struct Slot<V> {
    generation: u32,
    value: Option<V>,
}

impl<V> Arena<V> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_indices: Vec::new(),
        }
    }

    /// Returns the number of occupied slots.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free_indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a reference to the value for the given key, or [`None`] if the
    /// value has been removed or the key belongs to another arena.
    pub fn get(&self, key: ArenaKey) -> Option<&V> {
        let slot = self.slots.get(key.idx as usize)?;
        if slot.generation == key.generation {
            slot.value.as_ref()
        } else {
            None
        }
    }

    /// Returns a mutable reference to the value for the given key, or
    /// [`None`] if the value has been removed.
    pub fn get_mut(&mut self, key: ArenaKey) -> Option<&mut V> {
        let slot = self.slots.get_mut(key.idx as usize)?;
        if slot.generation == key.generation {
            slot.value.as_mut()
        } else {
            None
        }
    }

    /// Returns mutable references to the values for the two given keys, or
    /// [`None`] if either is missing.
    ///
    /// # Panics
    /// If the two keys are equal.
    pub fn get_two_mut(&mut self, key_a: ArenaKey, key_b: ArenaKey) -> Option<(&mut V, &mut V)> {
        assert_ne!(key_a, key_b, "Tried to borrow the same arena slot twice");
        if self.get(key_a).is_none() || self.get(key_b).is_none() {
            return None;
        }
        let [slot_a, slot_b] = self
            .slots
            .get_disjoint_mut([key_a.idx as usize, key_b.idx as usize])
            .ok()?;
        Some((slot_a.value.as_mut()?, slot_b.value.as_mut()?))
    }

    pub fn contains(&self, key: ArenaKey) -> bool {
        self.get(key).is_some()
    }

    /// Inserts the given value, reusing a free slot if one exists.
    pub fn insert(&mut self, value: V) -> ArenaKey {
        if let Some(idx) = self.free_indices.pop() {
            let slot = &mut self.slots[idx as usize];
            slot.value = Some(value);
            ArenaKey {
                idx,
                generation: slot.generation,
            }
        } else {
            let idx = u32::try_from(self.slots.len()).expect("Arena slot count overflowed u32");
            self.slots.push(Slot {
                generation: 0,
                value: Some(value),
            });
            ArenaKey { idx, generation: 0 }
        }
    }

    /// Removes and returns the value for the given key, or returns [`None`]
    /// if there is no such value.
    pub fn remove(&mut self, key: ArenaKey) -> Option<V> {
        let slot = self.slots.get_mut(key.idx as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_indices.push(key.idx);
        Some(value)
    }

    /// Returns an iterator over keys and values in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (ArenaKey, &V)> {
        self.slots.iter().enumerate().filter_map(|(idx, slot)| {
            slot.value.as_ref().map(|value| {
                (
                    ArenaKey {
                        idx: idx as u32,
                        generation: slot.generation,
                    },
                    value,
                )
            })
        })
    }

    /// Returns an iterator over keys and mutable values in slot order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ArenaKey, &mut V)> {
        self.slots.iter_mut().enumerate().filter_map(|(idx, slot)| {
            let generation = slot.generation;
            slot.value.as_mut().map(|value| {
                (
                    ArenaKey {
                        idx: idx as u32,
                        generation,
                    },
                    value,
                )
            })
        })
    }

    /// Returns an iterator over the values in slot order.
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.slots.iter().filter_map(|slot| slot.value.as_ref())
    }

    /// Returns an iterator over mutable values in slot order.
    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut V> {
        self.slots.iter_mut().filter_map(|slot| slot.value.as_mut())
    }

    /// Removes all values. Previously issued keys stay invalid.
    pub fn clear(&mut self) {
        self.free_indices.clear();
        for (idx, slot) in self.slots.iter_mut().enumerate() {
            if slot.value.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
            }
            self.free_indices.push(idx as u32);
        }
        self.free_indices.reverse();
    }
}

impl<V> Default for Arena<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl ArenaKey {
    /// Returns the slot index of the key.
    pub fn idx(&self) -> u32 {
        self.idx
    }

    /// Returns the generation of the key.
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for ArenaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.idx, self.generation)
    }
}

impl fmt::Display for ArenaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.idx, self.generation)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn inserted_values_are_reachable_by_key() {
        let mut arena = Arena::new();
        let a = arena.insert("a");
        let b = arena.insert("b");
        assert_eq!(arena.len(), 2);
        assert_eq!(arena.get(a), Some(&"a"));
        assert_eq!(arena.get(b), Some(&"b"));
    }

    #[test]
    fn removed_slot_is_reused_with_new_generation() {
        let mut arena = Arena::new();
        let a = arena.insert(1);
        assert_eq!(arena.remove(a), Some(1));
        assert!(arena.get(a).is_none());

        let b = arena.insert(2);
        assert_eq!(b.idx(), a.idx());
        assert_ne!(b.generation(), a.generation());
        assert!(arena.get(a).is_none());
        assert_eq!(arena.get(b), Some(&2));
    }

    #[test]
    fn removing_twice_is_harmless() {
        let mut arena = Arena::new();
        let a = arena.insert(1);
        assert!(arena.remove(a).is_some());
        assert!(arena.remove(a).is_none());
        assert!(arena.is_empty());
    }

    #[test]
    fn clearing_invalidates_all_keys() {
        let mut arena = Arena::new();
        let keys: Vec<_> = (0..4).map(|i| arena.insert(i)).collect();
        arena.clear();
        assert!(arena.is_empty());
        assert!(keys.iter().all(|key| arena.get(*key).is_none()));
        let first = arena.insert(10);
        assert_eq!(first.idx(), 0);
    }

    #[test]
    fn two_values_can_be_borrowed_mutably() {
        let mut arena = Arena::new();
        let a = arena.insert(1);
        let b = arena.insert(2);
        let (va, vb) = arena.get_two_mut(a, b).unwrap();
        std::mem::swap(va, vb);
        assert_eq!(arena.get(a), Some(&2));
        assert_eq!(arena.get(b), Some(&1));
    }
}
