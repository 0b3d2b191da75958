#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Once};

use strata_ecs::{register_component, World, WorldOptions};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Position(pub f32, pub f32);

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Scale(pub f32, pub f32);

#[derive(Clone, Debug, PartialEq)]
pub struct Mesh {
    pub name: String,
    pub indices: Vec<u32>,
}

impl Mesh {
    pub fn named(name: &str) -> Self {
        Self { name: name.to_owned(), indices: vec![0, 1, 2] }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tag;

/// Counts how many of its clones are alive.
#[derive(Debug)]
pub struct Dropper(pub Arc<AtomicU32>);

impl Dropper {
    pub fn new(counter: &Arc<AtomicU32>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter.clone())
    }
}

impl Drop for Dropper {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub fn live(counter: &Arc<AtomicU32>) -> u32 {
    counter.load(Ordering::SeqCst)
}

static INIT: Once = Once::new();

pub fn init() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        register_component::<Position>();
        register_component::<Scale>();
        register_component::<Mesh>();
        register_component::<Tag>();
        register_component::<Dropper>();
    });
}

pub fn small_world() -> World {
    init();
    World::new(
        WorldOptions::default()
            .with_entity_capacity(4096)
            .with_archetype_capacity(4096),
    )
    .expect("world creation failed")
}

/// Checks that every live slot of every archetype points back at itself.
pub fn assert_compact(world: &World) {
    let mut total = 0;
    for (index, archetype) in world.archetypes().iter().enumerate() {
        assert_eq!(archetype.entity_ids().len(), archetype.len() as usize);
        for (offset, &id) in archetype.entity_ids().iter().enumerate() {
            let location = world.lookup(id).expect("archetype holds a dead entity");
            assert_eq!(location.archetype.as_usize(), index);
            assert_eq!(location.entity.as_usize(), offset + 1);
        }
        total += archetype.len();
    }
    assert_eq!(total, world.len());
}
