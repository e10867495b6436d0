use std::sync::Arc;
use std::time::Duration;

use criterion::*;
use rand::Rng;
use tessera::property::Value;
use tessera::query::DynamicQuery;
use tessera::test_util::{self, Counter, Transform};
use tessera::World;

fn populate(num_entities: u32) -> World {
    let mut world = World::new(test_util::registry());
    world.create_storage::<Counter>();
    world.create_storage::<Transform>();

    let mut rng = rand::thread_rng();
    for _ in 0..num_entities {
        let mut builder = world.create_entity();
        if rng.gen_bool(0.5) {
            builder = builder.with(Counter::new(rng.gen_range(-65536..=65536)));
        }
        if rng.gen_bool(0.5) {
            builder = builder.with(Transform::translate(rng.gen_range(-65536.0..=65536.0)));
        }
        builder.build();
    }
    world
}

fn query_add(c: &mut Criterion) {
    let mut group = c.benchmark_group("dynamic query (a += b)");
    group.measurement_time(Duration::from_secs(10));

    for log_entities in (4..=16).step_by(4) {
        let num_entities = 1_u32 << log_entities;
        group.throughput(Throughput::Elements(num_entities.into()));
        group.bench_with_input(
            BenchmarkId::new("by property name", format!("{num_entities} entities")),
            &num_entities,
            |b, &num_entities| {
                let world = populate(num_entities);
                let registry = world.registry();
                let mut query = DynamicQuery::new(Arc::clone(registry));
                query.add_component(registry.expect_component_id::<Counter>(), true).unwrap();
                query.add_component(registry.expect_component_id::<Transform>(), false).unwrap();

                b.iter(|| {
                    query.begin(&world);
                    while !query.is_done() {
                        let translation = match query.access(1).get("translation") {
                            Ok(Value::Float(translation)) => translation,
                            _ => 0.0,
                        };
                        let counter = query.access_mut(0);
                        if let Ok(Value::Int(value)) = counter.get("value") {
                            counter.set("value", Value::Int(value + translation as i64)).unwrap();
                        }
                        query.next_entity();
                    }
                    query.end();
                })
            },
        );
    }
}

criterion_group!(benches, query_add);
criterion_main!(benches);
