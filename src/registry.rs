//! Ordered collections of uniquely named items.

use crate::name::NameManager;

/// An item with a name that is unique within its [`Registry`].
pub trait Named {
    fn name(&self) -> &str;

    /// Replaces the name. Only called by the registry when it makes the
    /// proposed name unique.
    fn rename(&mut self, name: String);
}

/// An index into a [`Registry`].
pub trait RegistryIndex: Copy {
    fn from_idx(idx: usize) -> Self;

    fn idx(&self) -> usize;
}

/// Items stored in registration order, which is also the order in which
/// they are updated. Names are made unique on insertion.
#[derive(Clone, Debug)]
pub struct Registry<I, T> {
    items: Vec<T>,
    names: NameManager,
    _index: std::marker::PhantomData<I>,
}

/// Defines an index type for a [`Registry`].
macro_rules! define_registry_index {
    ($(#[$attr:meta])* $name:ident) => {
        $(#[$attr])*
        #[repr(transparent)]
        #[derive(
            Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash,
            bytemuck::Zeroable, bytemuck::Pod,
        )]
        pub struct $name(u32);

        impl $crate::registry::RegistryIndex for $name {
            fn from_idx(idx: usize) -> Self {
                Self(u32::try_from(idx).unwrap_or(u32::MAX))
            }

            fn idx(&self) -> usize {
                self.0 as usize
            }
        }
    };
}
pub(crate) use define_registry_index;

impl<I: RegistryIndex, T: Named> Registry<I, T> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            names: NameManager::new(),
            _index: std::marker::PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Appends the given item, suffixing its name if it is taken, and returns
    /// its index.
    pub fn add(&mut self, mut item: T) -> I {
        let name = self.names.add_name(item.name());
        if name != item.name() {
            log::debug!("Renaming {} to {name} to keep names unique", item.name());
            item.rename(name);
        }
        self.items.push(item);
        I::from_idx(self.items.len() - 1)
    }

    pub fn get(&self, index: I) -> Option<&T> {
        self.items.get(index.idx())
    }

    pub fn get_mut(&mut self, index: I) -> Option<&mut T> {
        self.items.get_mut(index.idx())
    }

    /// Returns the index of the item with the given name.
    pub fn index_of(&self, name: &str) -> Option<I> {
        self.items
            .iter()
            .position(|item| item.name() == name)
            .map(I::from_idx)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&T> {
        self.index_of(name).and_then(|index| self.get(index))
    }

    pub fn get_by_name_mut(&mut self, name: &str) -> Option<&mut T> {
        self.index_of(name).and_then(|index| self.get_mut(index))
    }

    /// Iterates over the items in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (I, &T)> {
        self.items
            .iter()
            .enumerate()
            .map(|(idx, item)| (I::from_idx(idx), item))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (I, &mut T)> {
        self.items
            .iter_mut()
            .enumerate()
            .map(|(idx, item)| (I::from_idx(idx), item))
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// Removes all items and frees their names.
    pub fn clear(&mut self) {
        self.items.clear();
        self.names.clear_names();
    }
}

impl<I: RegistryIndex, T: Named> Default for Registry<I, T> {
    fn default() -> Self {
        Self::new()
    }
}
