#![allow(dead_code)]

use std::sync::Once;

use strata_ecs::{register_component, EntityId, World, WorldOptions};

pub const AGENTS_SMALL: usize = 10_000;
pub const AGENTS_MED: usize = 100_000;
pub const AGENTS_LARGE: usize = 1_000_000;

#[derive(Clone, Copy)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

#[derive(Clone, Copy)]
pub struct Velocity {
    pub dx: f32,
    pub dy: f32,
}

#[derive(Clone, Copy)]
pub struct Wealth {
    pub value: f32,
}

#[derive(Clone, Copy)]
pub struct Productivity {
    pub rate: f32,
}

static INIT: Once = Once::new();

pub fn init_components() {
    INIT.call_once(|| {
        register_component::<Position>();
        register_component::<Velocity>();
        register_component::<Wealth>();
        register_component::<Productivity>();
    });
}

pub fn make_world(agent_count: usize) -> World {
    init_components();
    let capacity = (agent_count as u32).max(1) * 2;
    World::new(
        WorldOptions::default()
            .with_entity_capacity(capacity)
            .with_archetype_capacity(capacity),
    )
    .expect("world creation failed in benchmark")
}

pub fn populate(world: &mut World, agent_count: usize) -> Vec<EntityId> {
    world.extend((
        vec![Position { x: 0.0, y: 0.0 }; agent_count],
        vec![Velocity { dx: 1.0, dy: 0.5 }; agent_count],
        vec![Wealth { value: 100.0 }; agent_count],
        vec![Productivity { rate: 1.0 }; agent_count],
    ))
}
