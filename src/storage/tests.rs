use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::StorageConfig;
use crate::entity::EntityId;
use crate::storage::{Space, Storage};
use crate::test_util::Counter;

macro_rules! test_storage {
    ($mod_name:ident => $storage:ty) => {
        mod $mod_name {
            #[allow(unused_imports)]
            use super::*;

            crate::storage::tests::test_storage! { @ $storage =>
                test_insert_get
                test_remove_sequence_ascending
                test_remove_sequence_shuffled
                test_clear
                test_entities_listing
                test_change_tracing
                test_random_operations
            }
        }
    };
    (@ $storage:ty => $($(#[$meta:meta])* $tests:ident)*) => {
        $(
            $(#[$meta])*
            #[test]
            fn $tests() { crate::storage::tests::$tests::<$storage>(); }
        )*
    };
}

pub(crate) use test_storage;

fn value<S: Storage<Comp = Counter>>(storage: &S, id: u32) -> Option<i64> {
    storage.element(EntityId(id), 0, Space::Local).map(|counter| counter.value)
}

fn check_model<S: Storage<Comp = Counter>>(storage: &S, model: &BTreeMap<u32, i64>) {
    for id in 0..64 {
        assert_eq!(value(storage, id), model.get(&id).copied(), "value of entity {id}");
        assert_eq!(storage.has(EntityId(id)), model.contains_key(&id), "presence of entity {id}");
    }

    let mut listed: Vec<u32> = storage.entities().iter().map(|entity| entity.0).collect();
    listed.sort_unstable();
    assert_eq!(listed, model.keys().copied().collect::<Vec<_>>());
}

fn remove_in_order<S: Storage<Comp = Counter>>(inserts: &[u32], removes: &[u32]) {
    let mut storage = S::with_config(&StorageConfig::default());
    let mut model = BTreeMap::new();

    for &id in inserts {
        storage.insert(EntityId(id), Counter::new(i64::from(id) * 10));
        model.insert(id, i64::from(id) * 10);
    }
    check_model(&storage, &model);

    for &id in removes {
        assert!(storage.remove(EntityId(id)));
        model.remove(&id);
        check_model(&storage, &model);
    }
}

pub(super) fn test_insert_get<S: Storage<Comp = Counter>>() {
    let mut storage = S::with_config(&StorageConfig::default());
    storage.insert(EntityId(3), Counter::new(7));

    assert!(storage.has(EntityId(3)));
    assert!(!storage.has(EntityId(2)));
    assert!(!storage.has(EntityId::NULL));
    assert_eq!(value(&storage, 3), Some(7));
    assert_eq!(storage.batch_len(EntityId(3)), 1);

    storage.element_mut(EntityId(3), 0, Space::Local).expect("inserted above").value = 9;
    assert_eq!(value(&storage, 3), Some(9));
    assert!(storage.element(EntityId(3), 1, Space::Local).is_none());
}

pub(super) fn test_remove_sequence_ascending<S: Storage<Comp = Counter>>() {
    remove_in_order::<S>(&[0, 1, 2, 3, 4], &[4, 0, 1, 3, 2]);
}

pub(super) fn test_remove_sequence_shuffled<S: Storage<Comp = Counter>>() {
    remove_in_order::<S>(&[0, 4, 1, 3, 2], &[4, 0, 1, 3, 2]);
}

pub(super) fn test_clear<S: Storage<Comp = Counter>>() {
    let mut storage = S::with_config(&StorageConfig::default());
    for id in 0..5 {
        storage.insert(EntityId(id), Counter::new(1));
    }
    storage.clear();

    assert!(storage.entities().is_empty());
    assert!(!storage.has(EntityId(2)));
    assert!(!storage.remove(EntityId(2)));

    storage.insert(EntityId(2), Counter::new(4));
    assert_eq!(value(&storage, 2), Some(4));
}

pub(super) fn test_entities_listing<S: Storage<Comp = Counter>>() {
    let mut storage = S::with_config(&StorageConfig::default());
    for id in [9, 2, 5] {
        storage.insert(EntityId(id), Counter::new(0));
    }
    let mut listed = storage.entities().to_vec();
    listed.sort_unstable();
    assert_eq!(listed, [EntityId(2), EntityId(5), EntityId(9)]);
}

pub(super) fn test_change_tracing<S: Storage<Comp = Counter>>() {
    let mut storage = S::with_config(&StorageConfig { trace_changes: true, ..Default::default() });
    storage.insert(EntityId(1), Counter::new(0));
    storage.insert(EntityId(2), Counter::new(0));
    assert!(storage.changes().is_changed(EntityId(1)));

    storage.changes_mut().flush();
    assert!(!storage.changes().is_changed(EntityId(1)));

    let _ = storage.element(EntityId(1), 0, Space::Local);
    assert!(!storage.changes().is_changed(EntityId(1)));

    let _ = storage.element_mut(EntityId(1), 0, Space::Local);
    assert!(storage.changes().is_changed(EntityId(1)));

    storage.remove(EntityId(1));
    assert!(!storage.changes().is_changed(EntityId(1)));
}

pub(super) fn test_random_operations<S: Storage<Comp = Counter>>() {
    let mut rng = StdRng::seed_from_u64(0xdead_beef);
    let mut storage = S::with_config(&StorageConfig { pre_allocate: 4, ..Default::default() });
    let mut model = BTreeMap::new();

    for step in 0..500 {
        let id = rng.gen_range(0..64);
        if model.contains_key(&id) {
            assert!(storage.remove(EntityId(id)));
            model.remove(&id);
        } else {
            storage.insert(EntityId(id), Counter::new(step));
            model.insert(id, step);
        }
        check_model(&storage, &model);
    }
}
