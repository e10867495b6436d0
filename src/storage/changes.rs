use super::EntityList;
use crate::entity::EntityId;

/// Records which entities of a storage changed since the last flush.
///
/// Tracing is off by default; all notifications are ignored until it is enabled.
#[derive(Debug, Default)]
pub struct ChangeTracker {
    tracing: bool,
    changed: EntityList,
}

impl ChangeTracker {
    /// Enables or disables tracing.
    pub fn set_tracing(&mut self, tracing: bool) { self.tracing = tracing; }

    /// Whether tracing is enabled.
    pub fn is_tracing(&self) -> bool { self.tracing }

    /// Marks the entity as changed.
    pub fn notify_changed(&mut self, entity: EntityId) {
        if self.tracing {
            self.changed.insert(entity);
        }
    }

    /// Marks the entity as no longer changed.
    pub fn notify_updated(&mut self, entity: EntityId) {
        if self.tracing {
            self.changed.remove(entity);
        }
    }

    /// Whether the entity changed since the last flush. Always false when not tracing.
    pub fn is_changed(&self, entity: EntityId) -> bool { self.tracing && self.changed.has(entity) }

    /// The changed entities.
    pub fn entities(&self) -> &[EntityId] { self.changed.as_slice() }

    /// Forgets all changes.
    pub fn flush(&mut self) {
        if self.tracing {
            self.changed.clear();
        }
    }

    /// Forgets all changes and releases the memory, regardless of tracing.
    pub fn reset(&mut self) { self.changed.reset(); }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ignored_without_tracing() {
        let mut tracker = ChangeTracker::default();
        tracker.notify_changed(EntityId(1));
        assert!(!tracker.is_changed(EntityId(1)));
        assert!(tracker.entities().is_empty());
    }

    #[test]
    fn test_changed_then_updated() {
        let mut tracker = ChangeTracker::default();
        tracker.set_tracing(true);
        tracker.notify_changed(EntityId(1));
        tracker.notify_changed(EntityId(2));
        assert!(tracker.is_changed(EntityId(1)));

        tracker.notify_updated(EntityId(1));
        assert!(!tracker.is_changed(EntityId(1)));
        assert_eq!(tracker.entities(), [EntityId(2)]);

        tracker.flush();
        assert!(tracker.entities().is_empty());
    }
}
