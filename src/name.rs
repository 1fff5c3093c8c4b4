//! Unique naming within a namespace.

use std::collections::HashSet;

/// Hands out names that are unique within one namespace (materials, fluids,
/// entities, sensors and so on).
///
/// A proposed name that is already taken is made unique by appending the
/// smallest unused integer suffix, starting from 1. The first proposal of a
/// name always keeps the bare name.
#[derive(Clone, Debug, Default)]
pub struct NameManager {
    names: HashSet<String>,
}

impl NameManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of names in the namespace.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Whether the given name is taken.
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Registers a name based on the proposed one and returns it. If the
    /// proposal is taken, a numeric suffix is appended.
    pub fn add_name(&mut self, proposed: &str) -> String {
        let name = if self.names.contains(proposed) {
            (1_u64..)
                .map(|suffix| format!("{proposed}{suffix}"))
                .find(|candidate| !self.names.contains(candidate))
                .unwrap_or_else(|| unreachable!("suffix space is unbounded"))
        } else {
            proposed.to_owned()
        };
        self.names.insert(name.clone());
        name
    }

    /// Removes the given name if present. Removing an absent name does
    /// nothing.
    pub fn remove_name(&mut self, name: &str) {
        self.names.remove(name);
    }

    /// Removes every name in the namespace.
    pub fn clear_names(&mut self) {
        self.names.clear();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn repeated_proposals_get_increasing_suffixes() {
        let mut names = NameManager::new();
        assert_eq!(names.add_name("A"), "A");
        assert_eq!(names.add_name("A"), "A1");
        assert_eq!(names.add_name("A"), "A2");
        assert_eq!(names.len(), 3);
    }

    #[test]
    fn removed_name_becomes_available_again() {
        let mut names = NameManager::new();
        for _ in 0..3 {
            names.add_name("A");
        }
        names.remove_name("A1");
        assert!(!names.contains("A1"));
        assert_eq!(names.add_name("A"), "A1");
        assert_eq!(names.add_name("A"), "A3");
    }

    #[test]
    fn removing_unknown_name_does_nothing() {
        let mut names = NameManager::new();
        names.add_name("Robot");
        names.remove_name("Vehicle");
        assert_eq!(names.len(), 1);
    }

    #[test]
    fn suffixed_proposal_does_not_collide_with_generated_name() {
        let mut names = NameManager::new();
        assert_eq!(names.add_name("A"), "A");
        assert_eq!(names.add_name("A1"), "A1");
        assert_eq!(names.add_name("A"), "A2");
    }

    #[test]
    fn clearing_frees_all_names() {
        let mut names = NameManager::new();
        names.add_name("A");
        names.add_name("B");
        names.clear_names();
        assert!(names.is_empty());
        assert_eq!(names.add_name("A"), "A");
    }

    proptest! {
        #[test]
        fn all_returned_names_are_distinct(proposals in prop::collection::vec("[ab]{1,2}", 0..40)) {
            let mut names = NameManager::new();
            let mut returned = HashSet::new();
            for proposal in &proposals {
                let name = names.add_name(proposal);
                prop_assert!(name.starts_with(proposal.as_str()));
                prop_assert!(returned.insert(name));
            }
            prop_assert_eq!(names.len(), proposals.len());
        }
    }
}
