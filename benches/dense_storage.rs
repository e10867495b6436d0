use std::time::Duration;

use criterion::*;
use rand::Rng;
use tessera::config::StorageConfig;
use tessera::storage::{DenseVectorStorage, SteadyStorage};
use tessera::test_util::{Anchor, Counter};
use tessera::{EntityId, Storage};

fn fill<S: Storage>(storage: &mut S, num_entities: u32, make: impl Fn(i64) -> S::Comp) {
    let mut rng = rand::thread_rng();
    for id in 0..num_entities {
        if rng.gen_bool(0.75) {
            storage.insert(EntityId(id), make(rng.gen_range(-65536..=65536)));
        }
    }
}

fn iterate_add(c: &mut Criterion) {
    let mut group = c.benchmark_group("iterate (a += 1)");
    group.measurement_time(Duration::from_secs(10));

    for log_entities in (4..=16).step_by(4) {
        let num_entities = 1_u32 << log_entities;
        group.throughput(Throughput::Elements(num_entities.into()));

        group.bench_with_input(
            BenchmarkId::new("dense", format!("{num_entities} entities")),
            &num_entities,
            |b, &num_entities| {
                let mut storage =
                    DenseVectorStorage::<Counter>::with_config(&StorageConfig::default());
                fill(&mut storage, num_entities, Counter::new);
                b.iter(|| {
                    for entity in storage.entities().to_vec() {
                        storage.get_mut(entity).value += 1;
                    }
                })
            },
        );

        group.bench_with_input(
            BenchmarkId::new("steady", format!("{num_entities} entities")),
            &num_entities,
            |b, &num_entities| {
                let mut storage = SteadyStorage::<Anchor>::with_config(&StorageConfig::default());
                fill(&mut storage, num_entities, |value| Anchor {
                    target: EntityId(value.unsigned_abs() as u32),
                    label:  String::new(),
                });
                b.iter(|| {
                    for entity in storage.entities().to_vec() {
                        let anchor = storage.get_mut(entity);
                        anchor.target = EntityId(anchor.target.0.wrapping_add(1));
                    }
                })
            },
        );
    }
}

fn insert_remove(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert then remove");

    for log_entities in (4..=16).step_by(4) {
        let num_entities = 1_u32 << log_entities;
        group.throughput(Throughput::Elements(num_entities.into()));
        group.bench_with_input(
            BenchmarkId::new("dense", format!("{num_entities} entities")),
            &num_entities,
            |b, &num_entities| {
                b.iter_batched_ref(
                    || DenseVectorStorage::<Counter>::with_config(&StorageConfig::default()),
                    |storage| {
                        for id in 0..num_entities {
                            storage.insert(EntityId(id), Counter::new(i64::from(id)));
                        }
                        for id in (0..num_entities).step_by(2) {
                            storage.remove(EntityId(id));
                        }
                    },
                    BatchSize::SmallInput,
                )
            },
        );
    }
}

criterion_group!(benches, iterate_add, insert_remove);
criterion_main!(benches);
