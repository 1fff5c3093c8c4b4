//! Mapping from keys to indices in a densely packed [`Vec`].

use std::{collections::HashMap, fmt::Debug, hash::Hash};

/// Keeps track of which key corresponds to which index in an underlying
/// [`Vec`], so that items can be stored compactly and still be looked up by
/// key after being reordered through swap removals.
#[derive(Clone, Debug)]
pub struct KeyIndexMapper<K> {
    indices_for_keys: HashMap<K, usize>,
    keys_at_indices: Vec<K>,
}

impl<K> KeyIndexMapper<K>
where
    K: Copy + Hash + Eq + Debug,
{
    /// Creates a new mapper with no keys.
    pub fn new() -> Self {
        Self {
            indices_for_keys: HashMap::new(),
            keys_at_indices: Vec::new(),
        }
    }

    /// Returns an iterator over all keys in index order.
    pub fn key_at_each_idx(&self) -> impl Iterator<Item = K> + '_ {
        self.keys_at_indices.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.keys_at_indices.is_empty()
    }

    pub fn contains_key(&self, key: K) -> bool {
        self.indices_for_keys.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.keys_at_indices.len()
    }

    /// Returns the index corresponding to the given key.
    ///
    /// # Panics
    /// If the key does not exist.
    pub fn idx(&self, key: K) -> usize {
        self.indices_for_keys[&key]
    }

    /// Returns the index corresponding to the given key, or [`None`] if the
    /// key does not exist.
    pub fn get(&self, key: K) -> Option<usize> {
        self.indices_for_keys.get(&key).copied()
    }

    /// Returns the key at the given index.
    ///
    /// # Panics
    /// If the index is out of bounds.
    pub fn key_at_idx(&self, idx: usize) -> K {
        self.keys_at_indices[idx]
    }

    /// Maps the given key to the next index.
    ///
    /// # Panics
    /// If the key already exists.
    pub fn push_key(&mut self, key: K) {
        let idx_of_new_key = self.keys_at_indices.len();
        self.keys_at_indices.push(key);
        let existing_entry = self.indices_for_keys.insert(key, idx_of_new_key);
        assert!(existing_entry.is_none(), "Tried to add an existing key");
    }

    /// Removes the given key and moves the key at the last index into the
    /// freed index, mirroring [`Vec::swap_remove`].
    ///
    /// # Returns
    /// The index of the removed key, or [`None`] if the key does not exist.
    pub fn try_swap_remove_key(&mut self, key: K) -> Option<usize> {
        let idx_of_removed_key = self.indices_for_keys.remove(&key)?;
        self.keys_at_indices.swap_remove(idx_of_removed_key);
        if let Some(&moved_key) = self.keys_at_indices.get(idx_of_removed_key) {
            self.indices_for_keys.insert(moved_key, idx_of_removed_key);
        }
        Some(idx_of_removed_key)
    }

    /// Removes the key at the given index in the same manner as
    /// [`Self::try_swap_remove_key`].
    ///
    /// # Panics
    /// If the index is out of bounds.
    pub fn swap_remove_key_at_idx(&mut self, idx: usize) {
        let removed_key = self.keys_at_indices.swap_remove(idx);
        self.indices_for_keys.remove(&removed_key);
        if let Some(&moved_key) = self.keys_at_indices.get(idx) {
            self.indices_for_keys.insert(moved_key, idx);
        }
    }

    pub fn clear(&mut self) {
        self.indices_for_keys.clear();
        self.keys_at_indices.clear();
    }
}

impl<K> Default for KeyIndexMapper<K>
where
    K: Copy + Hash + Eq + Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn pushing_keys_assigns_consecutive_indices() {
        let mut mapper = KeyIndexMapper::new();
        mapper.push_key('a');
        mapper.push_key('b');
        assert_eq!(mapper.len(), 2);
        assert_eq!(mapper.idx('a'), 0);
        assert_eq!(mapper.idx('b'), 1);
        assert_eq!(mapper.key_at_idx(1), 'b');
    }

    #[test]
    #[should_panic]
    fn pushing_existing_key_fails() {
        let mut mapper = KeyIndexMapper::new();
        mapper.push_key(7);
        mapper.push_key(7);
    }

    #[test]
    fn swap_removing_key_moves_last_key_into_hole() {
        let mut mapper = KeyIndexMapper::new();
        for key in [10, 20, 30] {
            mapper.push_key(key);
        }
        assert_eq!(mapper.try_swap_remove_key(10), Some(0));
        assert_eq!(mapper.idx(30), 0);
        assert_eq!(mapper.idx(20), 1);
        assert!(!mapper.contains_key(10));
        assert_eq!(mapper.try_swap_remove_key(10), None);
    }

    #[test]
    fn swap_removing_last_key_leaves_others_in_place() {
        let mut mapper = KeyIndexMapper::new();
        for key in [1, 2] {
            mapper.push_key(key);
        }
        mapper.swap_remove_key_at_idx(1);
        assert_eq!(mapper.len(), 1);
        assert_eq!(mapper.idx(1), 0);
        assert_eq!(mapper.key_at_each_idx().collect::<Vec<_>>(), vec![1]);
    }
}
