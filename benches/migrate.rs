use std::hint::black_box;

use criterion::*;

mod common;
use common::*;

#[derive(Clone, Copy)]
struct Bankrupt;

fn migrate_benchmark(c: &mut Criterion) {
    init_components();
    strata_ecs::register_component::<Bankrupt>();

    let mut group = c.benchmark_group("migrate");

    group.bench_function("add_then_remove_tag_10k", |b| {
        b.iter_batched(
            || {
                let mut world = make_world(AGENTS_SMALL);
                let ids = populate(&mut world, AGENTS_SMALL);
                (world, ids)
            },
            |(mut world, ids)| {
                for &id in &ids {
                    world.add_component(id, Bankrupt);
                }
                for &id in &ids {
                    world.remove_component::<Bankrupt>(id);
                }
                black_box(world);
            },
            BatchSize::LargeInput,
        );
    });

    group.bench_function("remove_component_10k", |b| {
        b.iter_batched(
            || {
                let mut world = make_world(AGENTS_SMALL);
                let ids = populate(&mut world, AGENTS_SMALL);
                (world, ids)
            },
            |(mut world, ids)| {
                for &id in &ids {
                    world.remove_component::<Productivity>(id);
                }
                black_box(world);
            },
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

criterion_group!(benches, migrate_benchmark);
criterion_main!(benches);
