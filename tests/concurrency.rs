use std::sync::Arc;
use std::sync::atomic::AtomicU32;

use rayon::prelude::*;
use strata_ecs::{World, WorldOptions};

mod common;
use common::{init, live, Dropper, Mesh, Position, Scale};

const AGENTS: usize = 10_000;

fn crowd() -> World {
    init();
    let mut world = World::new(
        WorldOptions::default()
            .with_entity_capacity(AGENTS as u32 * 2)
            .with_archetype_capacity(AGENTS as u32),
    )
    .unwrap();
    world.extend((
        (0..AGENTS).map(|i| Position(i as f32, 0.0)).collect::<Vec<_>>(),
        vec![Scale(1.0, 1.0); AGENTS],
    ));
    world.extend((vec![Position(0.0, 0.0); 16], vec![Mesh::named("rock"); 16]));
    world
}

#[test]
fn disjoint_checked_writers_run_in_parallel() {
    let mut world = crowd();

    let (positions, scales) = rayon::join(
        || {
            let mut n = 0;
            for (_, position) in world.query_checked::<&mut Position>().iter() {
                position.1 += 1.0;
                n += 1;
            }
            n
        },
        || {
            let mut n = 0;
            for (_, scale) in world.query_checked::<&mut Scale>().iter() {
                scale.0 *= 2.0;
                n += 1;
            }
            n
        },
    );

    assert_eq!(positions, AGENTS + 16);
    assert_eq!(scales, AGENTS);
    assert!(world.query::<&Scale>().all(|(_, s)| s.0 == 2.0));
    assert!(world.query::<&Position>().all(|(_, p)| p.1 == 1.0));
}

#[test]
fn shared_readers_from_many_threads() {
    let world = crowd();

    let sums: Vec<f64> = (0..8)
        .into_par_iter()
        .map(|_| {
            world
                .query_checked::<(&Position, &Scale)>()
                .iter()
                .map(|(_, (p, s))| (p.0 * s.0) as f64)
                .sum::<f64>()
        })
        .collect();

    let expected = (0..AGENTS).map(|i| i as f64).sum::<f64>();
    assert!(sums.iter().all(|&sum| sum == expected));
}

#[test]
fn conflicting_writer_is_rejected_while_readers_run() {
    let world = crowd();
    let reader = world.query_checked::<&Position>();

    let rejected = std::thread::scope(|scope| {
        scope
            .spawn(|| world.try_query_checked::<&mut Position>().is_err())
            .join()
            .unwrap()
    });
    assert!(rejected);

    drop(reader);
    assert!(world.try_query_checked::<&mut Position>().is_ok());
}

#[test]
fn worlds_move_between_threads() {
    let counter = Arc::new(AtomicU32::new(0));
    let mut world = crowd();
    world.extend((vec![Dropper::new(&counter), Dropper::new(&counter)],));

    let handle = std::thread::spawn(move || {
        let count = world.query::<&Dropper>().count();
        drop(world);
        count
    });

    assert_eq!(handle.join().unwrap(), 2);
    assert_eq!(live(&counter), 0);
}
