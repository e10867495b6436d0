use super::*;
use crate::storage::Child;
use crate::test_util::{Counter, Transform};

crate::storage::tests::test_storage!(counter => HierarchicalStorage<Counter>);

fn link(hierarchy: &mut Hierarchy, entity: u32, parent: u32) {
    hierarchy.insert(EntityId(entity), Child::new(EntityId(parent)));
}

fn global(storage: &HierarchicalStorage<Transform>, entity: u32) -> Transform {
    storage.get_in(EntityId(entity), Space::Global).expect("entity has a transform").clone()
}

fn chain() -> (Hierarchy, HierarchicalStorage<Transform>) {
    let mut hierarchy = Hierarchy::default();
    link(&mut hierarchy, 1, 0);
    link(&mut hierarchy, 2, 1);

    let mut storage = HierarchicalStorage::default();
    for id in 0..3 {
        storage.insert(EntityId(id), Transform::translate(1.0));
    }
    (hierarchy, storage)
}

#[test]
fn test_chain_translation() {
    let (hierarchy, mut storage) = chain();
    storage.flush_changes(&hierarchy);

    assert_eq!(global(&storage, 0), Transform::translate(1.0));
    assert_eq!(global(&storage, 1), Transform::translate(2.0));
    assert_eq!(global(&storage, 2), Transform::translate(3.0));
    assert!(!storage.is_dirty(EntityId(2)));
}

#[test]
fn test_composition_order() {
    let mut hierarchy = Hierarchy::default();
    link(&mut hierarchy, 1, 0);

    let mut storage = HierarchicalStorage::default();
    storage.insert(EntityId(0), Transform::scaled(2.0));
    storage.insert(EntityId(1), Transform::translate(3.0));
    storage.flush_changes(&hierarchy);

    // parent applied outside: 2 * (x + 3) = 2x + 6
    assert_eq!(global(&storage, 1), Transform { scale: 2.0, translation: 6.0 });
}

#[test]
fn test_local_write_repropagates_subtree() {
    let (hierarchy, mut storage) = chain();
    storage.flush_changes(&hierarchy);

    *storage.get_mut_in(EntityId(0), Space::Local).expect("present") = Transform::translate(5.0);
    assert!(storage.is_dirty(EntityId(0)));
    storage.flush_changes(&hierarchy);

    assert_eq!(global(&storage, 2), Transform::translate(7.0));
}

#[test]
fn test_global_write_derives_local() {
    let (hierarchy, mut storage) = chain();
    storage.flush_changes(&hierarchy);

    *storage.get_mut_in(EntityId(1), Space::Global).expect("present") = Transform::translate(10.0);
    storage.flush_changes(&hierarchy);

    let record = storage.local_global(EntityId(1)).expect("present");
    assert_eq!(record.local, Transform::translate(9.0));
    assert!(!record.global_changed);
    assert_eq!(global(&storage, 2), Transform::translate(11.0));
}

#[test]
fn test_global_write_on_root_writes_local() {
    let (hierarchy, mut storage) = chain();
    storage.flush_changes(&hierarchy);

    *storage.get_mut_in(EntityId(0), Space::Global).expect("present") = Transform::translate(4.0);
    assert_eq!(storage.get_in(EntityId(0), Space::Local), Some(&Transform::translate(4.0)));
    storage.flush_changes(&hierarchy);
    assert_eq!(global(&storage, 1), Transform::translate(5.0));
}

#[test]
fn test_reading_does_not_dirty() {
    let (hierarchy, mut storage) = chain();
    storage.flush_changes(&hierarchy);

    let _ = storage.get_in(EntityId(1), Space::Global);
    let _ = storage.get(EntityId(1));
    assert!(!storage.is_dirty(EntityId(1)));
}

#[test]
fn test_reparent_updates_only_moved_subtree() {
    let mut hierarchy = Hierarchy::default();
    link(&mut hierarchy, 1, 0);
    link(&mut hierarchy, 2, 1);
    link(&mut hierarchy, 11, 10);

    let mut storage = HierarchicalStorage::default();
    storage.insert(EntityId(0), Transform::translate(1.0));
    storage.insert(EntityId(1), Transform::translate(1.0));
    storage.insert(EntityId(2), Transform::translate(1.0));
    storage.insert(EntityId(10), Transform::translate(100.0));
    storage.insert(EntityId(11), Transform::translate(1.0));
    storage.insert(EntityId(20), Transform::translate(50.0));
    hierarchy.flush_hierarchy_changes();
    storage.flush_changes(&hierarchy);
    assert_eq!(global(&storage, 11), Transform::translate(101.0));

    link(&mut hierarchy, 1, 20);
    let changed = hierarchy.flush_hierarchy_changes();
    storage.flush_hierarchy_changes(&hierarchy, &changed);

    assert_eq!(global(&storage, 1), Transform::translate(51.0));
    assert_eq!(global(&storage, 2), Transform::translate(52.0));
    assert_eq!(global(&storage, 11), Transform::translate(101.0));
    assert_eq!(global(&storage, 0), Transform::translate(1.0));
}

#[test]
fn test_detached_entity_becomes_root() {
    let (mut hierarchy, mut storage) = chain();
    storage.flush_changes(&hierarchy);

    hierarchy.remove(EntityId(1));
    let changed = hierarchy.flush_hierarchy_changes();
    storage.flush_hierarchy_changes(&hierarchy, &changed);

    let record = storage.local_global(EntityId(2)).expect("present");
    assert!(record.is_root);
    assert!(!record.has_relationship);
    assert_eq!(global(&storage, 2), Transform::translate(1.0));
}

#[test]
fn test_removed_parent_detaches_children() {
    let (hierarchy, mut storage) = chain();
    storage.flush_changes(&hierarchy);

    assert!(storage.remove(EntityId(0)));
    storage.flush_changes(&hierarchy);

    let record = storage.local_global(EntityId(1)).expect("present");
    assert!(record.is_root);
    assert_eq!(global(&storage, 1), Transform::translate(1.0));
    assert_eq!(global(&storage, 2), Transform::translate(2.0));
}

#[test]
fn test_insert_in_propagates_eagerly() {
    let (hierarchy, mut storage) = chain();
    storage.flush_changes(&hierarchy);

    storage.insert_in(EntityId(1), Transform::scaled(3.0), &hierarchy);
    assert!(!storage.is_dirty(EntityId(1)));
    assert_eq!(global(&storage, 1), Transform { scale: 3.0, translation: 1.0 });
    assert_eq!(global(&storage, 2), Transform { scale: 3.0, translation: 4.0 });
}

#[test]
fn test_counter_inverse() {
    let mut hierarchy = Hierarchy::default();
    link(&mut hierarchy, 1, 0);

    let mut storage = HierarchicalStorage::default();
    storage.insert(EntityId(0), Counter::new(5));
    storage.insert(EntityId(1), Counter::new(2));
    storage.flush_changes(&hierarchy);
    assert_eq!(storage.get_in(EntityId(1), Space::Global), Some(&Counter::new(7)));

    storage.get_mut_in(EntityId(1), Space::Global).expect("present").value = 20;
    storage.on_system_release(&hierarchy);
    assert_eq!(storage.get(EntityId(1)), &Counter::new(15));
}
