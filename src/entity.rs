//! Entities are plain indices into storages.
//!
//! An entity has no data of its own.
//! A storage only becomes aware of an entity once a component is inserted for it.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};
use xias::Xias;

/// Identifies an entity in a [`World`](crate::World).
///
/// IDs are dense, allocated sequentially and never carry a generation.
/// [`EntityId::NULL`] is the sentinel for "no entity".
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u32);

impl EntityId {
    /// The null entity.
    pub const NULL: Self = Self(u32::MAX);

    /// Returns true if this is [`EntityId::NULL`].
    pub fn is_null(self) -> bool { self == Self::NULL }

    /// Converts the ID to an index for vec-based tables.
    ///
    /// # Panics
    /// Panics if the ID is null.
    pub fn index(self) -> usize {
        assert!(!self.is_null(), "The null entity cannot be used as an index");
        self.0.small_int()
    }

    /// Converts a table index back to an entity ID.
    pub fn from_index(index: usize) -> Self {
        let id: u32 = index.small_int();
        assert!(id != u32::MAX, "Entity index {index} collides with the null entity");
        Self(id)
    }
}

impl Default for EntityId {
    fn default() -> Self { Self::NULL }
}

impl From<u32> for EntityId {
    fn from(id: u32) -> Self { Self(id) }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "EntityId(null)")
        } else {
            write!(f, "EntityId({})", self.0)
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "null")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Allocates entity IDs for a world.
///
/// IDs are never recycled, so the highest allocated ID is also the upper bound of every scan.
/// Allocation only needs a shared reference, so systems can create entities while running.
#[derive(Debug, Default)]
pub(crate) struct Allocator {
    count: AtomicU32,
}

impl Allocator {
    /// Allocates a new ID.
    pub(crate) fn allocate(&self) -> EntityId {
        let id = self.count.fetch_add(1, Ordering::Relaxed);
        assert!(id < u32::MAX, "Entity ID space is exhausted");
        EntityId(id)
    }

    /// The most recently allocated ID, or null if nothing has been allocated.
    pub(crate) fn last(&self) -> EntityId {
        match self.count.load(Ordering::Relaxed) {
            0 => EntityId::NULL,
            count => EntityId(count - 1),
        }
    }

    /// Number of allocated IDs.
    pub(crate) fn len(&self) -> usize { self.count.load(Ordering::Relaxed).small_int() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocator_sequence() {
        let alloc = Allocator::default();
        assert_eq!(alloc.last(), EntityId::NULL);

        assert_eq!(alloc.allocate(), EntityId(0));
        assert_eq!(alloc.allocate(), EntityId(1));
        assert_eq!(alloc.last(), EntityId(1));
        assert_eq!(alloc.len(), 2);
    }

    #[test]
    fn test_null_display() {
        assert!(EntityId::default().is_null());
        assert_eq!(EntityId::NULL.to_string(), "null");
        assert_eq!(format!("{:?}", EntityId(3)), "EntityId(3)");
    }

    #[test]
    #[should_panic = "The null entity cannot be used as an index"]
    fn test_null_index_panics() { EntityId::NULL.index(); }
}
