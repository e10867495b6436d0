use super::*;
use crate::storage::Space;
use crate::test_util::{self, Anchor, Counter, FrameCount, Impulse, Material, Transform};

fn world() -> World {
    test_util::init_logger();
    World::new(test_util::registry())
}

#[test]
fn test_create_entity_with_components() {
    let mut world = world();
    let first = world.create_entity().with(Counter::new(1)).build();
    let second =
        world.create_entity().with(Counter::new(2)).with(Impulse { strength: 0.5 }).build();

    assert_eq!(first, EntityId(0));
    assert_eq!(second, EntityId(1));
    assert_eq!(world.last_entity_id(), second);
    assert_eq!(world.entity_count(), 2);

    assert_eq!(world.storage::<Counter>().get(second), &Counter::new(2));
    assert!(world.has_component::<Impulse>(second));
    assert!(!world.has_component::<Impulse>(first));
    assert!(!world.has_component::<Anchor>(first));
}

#[test]
fn test_empty_world() {
    let world = world();
    assert!(world.last_entity_id().is_null());
    assert!(world.get_storage(Registry::CHILD).is_some());
    assert!(world.try_storage::<Counter>().is_none());
}

#[test]
fn test_destroy_entity_orphans_children() {
    let mut world = world();
    let parent = world.create_entity().with(Counter::new(1)).build();
    let child = world.create_entity().with(Child::new(parent)).with(Counter::new(2)).build();

    world.destroy_entity(parent);

    assert!(!world.has_component::<Counter>(parent));
    assert!(world.has_component::<Counter>(child));
    assert_eq!(world.hierarchy().parent_of(child), None);
    assert_eq!(world.last_entity_id(), child);
}

#[test]
fn test_remove_component() {
    let mut world = world();
    let entity = world.create_entity().with(Counter::new(1)).build();

    assert!(world.remove_component::<Counter>(entity));
    assert!(!world.remove_component::<Counter>(entity));
    assert!(!world.remove_component::<Anchor>(entity));
}

#[test]
fn test_insert_dynamic() {
    let mut world = world();
    let entity = world.allocate_entity();
    let anchor = world.registry().expect_component_id::<Anchor>();

    world
        .insert_dynamic(
            entity,
            anchor,
            &[("label", Value::Str("door".into())), ("target", Value::Int(7))],
        )
        .unwrap();

    let storage = world.storage::<Anchor>();
    assert_eq!(storage.get(entity), &Anchor { target: EntityId(7), label: "door".into() });
}

#[test]
fn test_insert_dynamic_unknown_property() {
    let mut world = world();
    let entity = world.allocate_entity();
    let counter = world.registry().expect_component_id::<Counter>();

    let err = world.insert_dynamic(entity, counter, &[("velocity", Value::Int(1))]).unwrap_err();
    assert_eq!(
        err,
        AccessError::UnknownProperty { component: "Counter", property: "velocity".into() }
    );
    assert!(!world.has_component::<Counter>(entity));
}

#[test]
fn test_databag() {
    let mut world = world();
    world.add_databag(FrameCount { frames: 3 });
    world.databag_mut::<FrameCount>().frames += 1;
    assert_eq!(world.databag::<FrameCount>().frames, 4);
    assert!(world.try_databag::<FrameCount>().is_some());
}

#[test]
fn test_flush_hierarchy_propagates_followers() {
    let mut world = world();
    let root = world.create_entity().with(Transform::translate(1.0)).build();
    let child =
        world.create_entity().with(Child::new(root)).with(Transform::translate(2.0)).build();

    world.flush_hierarchy();

    assert!(world.hierarchy().pending_changes().is_empty());
    let storage = world.storage::<Transform>();
    assert_eq!(storage.get_in(child, Space::Global), Some(&Transform::translate(3.0)));
}

#[test]
fn test_release_flushes_written_storages() {
    let mut world = world();
    let root = world.create_entity().with(Transform::translate(1.0)).build();
    let child =
        world.create_entity().with(Child::new(root)).with(Transform::translate(1.0)).build();
    world.flush_hierarchy();

    *world.storage_mut::<Transform>().get_mut(root) = Transform::translate(5.0);
    let transform = world.registry().expect_component_id::<Transform>();
    world.release(&[transform]);

    let storage = world.storage::<Transform>();
    assert_eq!(storage.get_in(child, Space::Global), Some(&Transform::translate(6.0)));
}

#[test]
fn test_component_added_under_existing_parent_is_composed() {
    let mut world = world();
    let root = world.create_entity().with(Transform::translate(1.0)).build();
    let child = world.create_entity().with(Child::new(root)).build();
    world.flush_hierarchy();

    world.add_component(child, Transform::translate(1.0));
    let global = |world: &World| world.storage::<Transform>().get_in(child, Space::Global).cloned();
    assert_eq!(global(&world), Some(Transform::translate(2.0)));

    world.flush_hierarchy();
    assert_eq!(global(&world), Some(Transform::translate(2.0)));
}

#[test]
fn test_reinserted_parent_updates_children() {
    let mut world = world();
    let root = world.create_entity().with(Transform::translate(1.0)).build();
    let child =
        world.create_entity().with(Child::new(root)).with(Transform::translate(1.0)).build();

    world.add_component(root, Transform::translate(5.0));

    let storage = world.storage::<Transform>();
    assert_eq!(storage.get_in(child, Space::Global), Some(&Transform::translate(6.0)));
}

#[test]
fn test_insert_dynamic_composes_with_parent() {
    let mut world = world();
    let root = world.create_entity().with(Transform::translate(1.0)).build();
    let child = world.create_entity().with(Child::new(root)).build();
    let transform = world.registry().expect_component_id::<Transform>();

    world.insert_dynamic(child, transform, &[("translation", Value::Float(2.0))]).unwrap();

    let storage = world.storage::<Transform>();
    assert_eq!(storage.get_in(child, Space::Global), Some(&Transform::translate(3.0)));
}

#[test]
fn test_flush_hierarchy_drains_writes_without_structural_changes() {
    let mut world = world();
    let root = world.create_entity().with(Transform::translate(1.0)).build();
    let child =
        world.create_entity().with(Child::new(root)).with(Transform::translate(1.0)).build();
    world.flush_hierarchy();

    *world.storage_mut::<Transform>().get_mut(root) = Transform::translate(5.0);
    assert!(world.hierarchy().pending_changes().is_empty());
    world.flush_hierarchy();

    let storage = world.storage::<Transform>();
    assert_eq!(storage.get_in(child, Space::Global), Some(&Transform::translate(6.0)));
}

#[test]
fn test_removed_parent_value_detaches_children() {
    let mut world = world();
    let root = world.create_entity().with(Transform::translate(4.0)).build();
    let child =
        world.create_entity().with(Child::new(root)).with(Transform::translate(1.0)).build();
    world.flush_hierarchy();

    assert!(world.remove_component::<Transform>(root));
    world.flush_hierarchy();

    let storage = world.storage::<Transform>();
    let record = storage.local_global(child).expect("child keeps its transform");
    assert!(record.is_root);
    assert_eq!(storage.get_in(child, Space::Global), Some(&Transform::translate(1.0)));
}

#[test]
fn test_shared_component() {
    let mut world = world();
    let first = world.allocate_entity();
    let second = world.allocate_entity();

    let shared = world.create_shared_component(Material { roughness: 0.5 });
    assert!(world.add_shared_component::<Material>(first, shared));
    assert!(world.add_shared_component::<Material>(second, shared));

    world.storage_mut::<Material>().get_mut(first).roughness = 0.25;
    assert_eq!(world.storage::<Material>().get(second), &Material { roughness: 0.25 });

    world.storage_mut::<Material>().free_shared(shared);
    assert!(!world.has_component::<Material>(second));
    assert!(!world.add_shared_component::<Material>(first, shared));
}

#[test]
fn test_flush_changes() {
    let mut config = Config::default();
    config.storages.insert("Counter".into(), crate::config::StorageConfig {
        trace_changes: true,
        ..Default::default()
    });
    let mut world = World::with_config(test_util::registry(), config);
    let entity = world.create_entity().with(Counter::new(1)).build();

    assert!(world.storage::<Counter>().changes().is_changed(entity));
    world.flush_changes();
    assert!(!world.storage::<Counter>().changes().is_changed(entity));
}

#[test]
#[should_panic = "Storage of Counter is locked by another system. Maybe scheduler bug?"]
fn test_write_contention_panics() {
    let mut world = world();
    world.create_storage::<Counter>();
    let _reader = world.storage::<Counter>();
    let _writer = world.storage_mut::<Counter>();
}

#[test]
#[should_panic = "Storage of Anchor does not exist in this world"]
fn test_missing_storage_panics() {
    let world = world();
    let _ = world.storage::<Anchor>();
}
