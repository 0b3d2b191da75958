//! # Strata ECS
//!
//! Archetype-based entity/component storage and query engine.
//!
//! ## Design Goals
//! - Columnar, type-erased archetype storage for cache efficiency
//! - Stable column addresses backed by fixed virtual-memory reservations
//! - Generational entity handles that never resolve after reuse
//! - Runtime-checked queries for safe parallel access through a shared world
//!
//! ## Quick start
//! ```rust
//! use strata_ecs::prelude::*;
//!
//! #[derive(Debug, PartialEq)]
//! struct Position(f32, f32);
//! struct Velocity(f32, f32);
//!
//! register_component::<Position>();
//! register_component::<Velocity>();
//!
//! let mut world = World::new(WorldOptions::default().with_archetype_capacity(1024)).unwrap();
//! let ids = world.extend((
//!     vec![Position(0.0, 0.0), Position(1.0, 1.0)],
//!     vec![Velocity(1.0, 0.0), Velocity(0.0, 1.0)],
//! ));
//!
//! for (_, (position, velocity)) in world.query_mut::<(&mut Position, &Velocity)>() {
//!     position.0 += velocity.0;
//!     position.1 += velocity.1;
//! }
//!
//! assert_eq!(world.query_one::<&Position>(ids[1]), Some(&Position(1.0, 2.0)));
//! ```

#![forbid(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

pub mod engine;

// ─────────────────────────────────────────────────────────────────────────────
// Re-exports (Public API)
// ─────────────────────────────────────────────────────────────────────────────

pub use engine::world::{
    World,
    WorldOptions,
    DEFAULT_ARCHETYPE_CAPACITY,
    DEFAULT_ENTITY_CAPACITY,
};

pub use engine::entity::{
    EntityFreeListLink,
    EntityLocation,
    EntitySlot,
    EntityStorage,
    MAX_ENTITY_CAPACITY,
};

pub use engine::component::{
    Component,
    ComponentRegistry,
    ComponentTypeDescription,
    DropFn,
    component_description,
    component_registry,
    register_component,
    register_component_dynamic,
};

pub use engine::layout::{EntityLayout, EntityLayoutBuf};

pub use engine::archetype::{Archetype, ArchetypeEdge, ComponentColumn};

pub use engine::borrow::{AccessGuard, ColumnBorrow, ColumnRef};

pub use engine::source::{ComponentBatch, ComponentSource, IntoComponentSource};

pub use engine::query::{
    CheckedIter,
    CheckedQuery,
    ComponentQuery,
    ComponentRead,
    ComponentWrite,
    Fetch,
    Query,
    QueryItem,
};

pub use engine::storage::{VirtualVec, PAGE_SIZE};

pub use engine::error::{
    AccessConflictError,
    ECSError,
    ECSResult,
    InvalidCapacityError,
    ReservationError,
};

pub use engine::types::{
    AccessMode,
    AccessSet,
    ArchetypeEntityIndex,
    ArchetypeIndex,
    ComponentAccess,
    ComponentTypeId,
    EntityId,
    EntityIndex,
    Generation,
};

// ─────────────────────────────────────────────────────────────────────────────
// Prelude
// ─────────────────────────────────────────────────────────────────────────────

/// Commonly used types.
///
/// Import with:
/// ```rust
/// use strata_ecs::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        World,
        WorldOptions,
        EntityId,
        Component,
        ComponentBatch,
        ComponentQuery,
        AccessMode,
        AccessSet,
        register_component,
    };
}
