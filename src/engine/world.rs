//! The world: entity handles, archetypes and structural changes.
//!
//! A [`World`] owns one [`EntityStorage`] and every [`Archetype`], keyed by
//! layout. It is the only place where the two are kept in agreement:
//!
//! - every live id's [`EntityLocation`] names the archetype and slot holding
//!   its components,
//! - every live slot of every archetype records the id that points at it.
//!
//! ## Structural operations
//!
//! | Operation | Effect |
//! |---|---|
//! | [`World::extend`] | Bulk insert into the archetype of the input layout. |
//! | [`World::remove_entity`] | Swap-remove the entity's slot, drop its components, free its id. |
//! | [`World::add_component`] | Move the entity to the layout with one more type. |
//! | [`World::remove_component`] | Move the other components to the smaller layout, then drop the removed one. |
//!
//! Every swap-remove may move another entity into the vacated slot; the
//! world patches that entity's location immediately.
//!
//! ## Archetype graph
//!
//! Index `0` is always the archetype with the empty layout. Transitions
//! between layouts by adding or removing one type are cached on both
//! archetypes as [`crate::ArchetypeEdge`]s, so repeated migrations skip the
//! layout hashing.
//!
//! ## Threading
//! `World` is `Send + Sync` and has no internal locks. Structural changes and
//! the plain queries require `&mut World`. Shared access only hands out
//! component data through [`World::query_checked`] and guarded column views,
//! whose borrows are checked at runtime.

use std::collections::HashMap;
use std::mem::{self, ManuallyDrop};
use std::slice;

use tracing::{debug, trace};

use crate::engine::archetype::Archetype;
use crate::engine::component::{
    component_registry, register_component, register_component_dynamic, Component,
    ComponentTypeDescription,
};
use crate::engine::entity::{EntityLocation, EntityStorage, MAX_ENTITY_CAPACITY};
use crate::engine::error::{AccessConflictError, ECSResult, InvalidCapacityError};
use crate::engine::layout::{EntityLayout, EntityLayoutBuf};
use crate::engine::query::{CheckedQuery, ComponentQuery, Fetch, Query, QueryItem};
use crate::engine::source::{ComponentSource, IntoComponentSource};
use crate::engine::types::{ArchetypeEntityIndex, ArchetypeIndex, ComponentTypeId, EntityId};

/// Default maximum number of live entities in a world.
pub const DEFAULT_ENTITY_CAPACITY: u32 = 1024 * 1024;

/// Default maximum number of live entities per archetype.
pub const DEFAULT_ARCHETYPE_CAPACITY: u32 = 1024 * 512;

/// Capacity configuration for a [`World`].
///
/// Both capacities are fixed for the lifetime of the world; exceeding either
/// panics. Only address space is reserved up front.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorldOptions {
    /// Maximum number of live entities.
    pub entity_capacity: u32,

    /// Maximum number of live entities in any one archetype.
    pub archetype_capacity: u32,
}

impl Default for WorldOptions {
    fn default() -> Self {
        Self {
            entity_capacity: DEFAULT_ENTITY_CAPACITY,
            archetype_capacity: DEFAULT_ARCHETYPE_CAPACITY,
        }
    }
}

impl WorldOptions {
    /// Sets the entity capacity.
    pub fn with_entity_capacity(mut self, capacity: u32) -> Self {
        self.entity_capacity = capacity;
        self
    }

    /// Sets the per-archetype capacity.
    pub fn with_archetype_capacity(mut self, capacity: u32) -> Self {
        self.archetype_capacity = capacity;
        self
    }
}

/// Entity and component storage.

pub struct World {
    options: WorldOptions,
    entities: EntityStorage,
    archetype_map: HashMap<EntityLayoutBuf, ArchetypeIndex>,
    archetypes: Vec<Archetype>,
}

impl World {

    /// Creates an empty world.
    ///
    /// ## Errors
    /// * [`InvalidCapacityError`] if a capacity is zero or too large.
    /// * [`crate::ReservationError`] if address space cannot be reserved.

    pub fn new(options: WorldOptions) -> ECSResult<Self> {
        if options.archetype_capacity == 0 || options.archetype_capacity > MAX_ENTITY_CAPACITY {
            return Err(InvalidCapacityError {
                what: "archetype",
                requested: options.archetype_capacity as u64,
                max: MAX_ENTITY_CAPACITY as u64,
            }
            .into());
        }

        let entities = EntityStorage::new(options.entity_capacity)?;
        let empty = Archetype::new(options.archetype_capacity, EntityLayout::empty(), &component_registry())?;

        let mut archetype_map = HashMap::new();
        archetype_map.insert(EntityLayoutBuf::new(), ArchetypeIndex::EMPTY);

        debug!(
            entity_capacity = options.entity_capacity,
            archetype_capacity = options.archetype_capacity,
            "created world"
        );

        Ok(Self { options, entities, archetype_map, archetypes: vec![empty] })
    }

    /// Capacity configuration.
    #[inline]
    pub fn options(&self) -> &WorldOptions {
        &self.options
    }

    /// Number of live entities.
    #[inline]
    pub fn len(&self) -> u32 {
        self.entities.len()
    }

    /// Returns `true` if no entity is alive.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Number of archetypes, the empty-layout archetype included.
    #[inline]
    pub fn archetype_count(&self) -> usize {
        self.archetypes.len()
    }

    /// All archetypes, indexable by [`ArchetypeIndex`].
    #[inline]
    pub fn archetypes(&self) -> &[Archetype] {
        &self.archetypes
    }

    /// Archetype at `index`.
    #[inline]
    pub fn archetype(&self, index: ArchetypeIndex) -> Option<&Archetype> {
        self.archetypes.get(index.as_usize())
    }

    /// Location of a live entity.
    #[inline]
    pub fn lookup(&self, entity: EntityId) -> Option<EntityLocation> {
        self.entities.lookup(entity)
    }

    /// Returns `true` if `entity` is alive.
    #[inline]
    pub fn contains(&self, entity: EntityId) -> bool {
        self.entities.lookup(entity).is_some()
    }

    /// Registers `T` in the process-wide component registry.
    #[inline]
    pub fn register<T: Component>(&self) -> ComponentTypeDescription {
        register_component::<T>()
    }

    /// Registers an arbitrary component description.
    ///
    /// ## Safety
    /// See [`crate::ComponentRegistry::register_dynamic`].
    #[inline]
    pub unsafe fn register_dynamic(&self, description: &ComponentTypeDescription) -> bool {
        // SAFETY: forwarded to the caller.
        unsafe { register_component_dynamic(description) }
    }

    /// Spawns one entity per row of `source` and returns their ids in input
    /// order.
    ///
    /// The component values are moved into the world.
    ///
    /// ## Panics
    /// * The source has no component types.
    /// * A component type is not registered.
    /// * The entity or archetype capacity would be exceeded.

    pub fn extend<S: IntoComponentSource>(&mut self, source: S) -> Vec<EntityId> {
        let mut source = source.into_component_source();
        assert!(
            !source.entity_layout().is_empty(),
            "cannot spawn entities without components"
        );

        let count = source.count();
        if count == 0 {
            return Vec::new();
        }
        assert!(
            self.entities.len() as u64 + count as u64 <= self.entities.capacity() as u64,
            "entity capacity exceeded: {} live + {} new > {}",
            self.entities.len(),
            count,
            self.entities.capacity()
        );

        let index = self.find_or_create_archetype(source.entity_layout());
        let archetype = &mut self.archetypes[index.as_usize()];

        let base = archetype.allocate_entities(count);
        archetype.copy_from_source(base, &source);
        source.mark_moved();

        let mut ids = Vec::with_capacity(count as usize);
        for offset in 0..count {
            let slot = ArchetypeEntityIndex(base.0.saturating_add(offset));
            let id = self.entities.create(EntityLocation { archetype: index, entity: slot });
            archetype.set_entity_id(slot, id);
            ids.push(id);
        }

        trace!(count, archetype = %index, "inserted entities");
        ids
    }

    /// Destroys `entity`, dropping its components.
    ///
    /// Returns `false` if the id is stale or null.

    pub fn remove_entity(&mut self, entity: EntityId) -> bool {
        let Some(location) = self.entities.destroy(entity) else {
            return false;
        };

        let archetype = &mut self.archetypes[location.archetype.as_usize()];
        if let Some(moved) = archetype.remove_entity::<true>(location.entity) {
            self.patch_slot(moved, location.entity);
        }

        trace!(entity = %entity, archetype = %location.archetype, "removed entity");
        true
    }

    /// Adds `component` to `entity`.
    ///
    /// Returns `false`, dropping `component`, if the id is stale or the
    /// entity already has a `T`; the existing value is left untouched.
    ///
    /// ## Panics
    /// Panics if `T` is not registered.

    pub fn add_component<T: Component>(&mut self, entity: EntityId, component: T) -> bool {
        let component = ManuallyDrop::new(component);
        let added = {
            let ptr = (&*component as *const T).cast::<u8>();
            // SAFETY: `component` is a live `T`, viewed as its own bytes.
            let bytes = unsafe { slice::from_raw_parts(ptr, mem::size_of::<T>()) };
            // SAFETY: the bytes are a valid `T` and ownership passes to the
            // world only when `true` is returned.
            unsafe { self.add_component_dynamic(entity, ComponentTypeId::of::<T>(), bytes) }
        };
        if !added {
            drop(ManuallyDrop::into_inner(component));
        }
        added
    }

    /// Removes and drops the `T` of `entity`.
    ///
    /// Returns `false` if the id is stale or the entity has no `T`.
    #[inline]
    pub fn remove_component<T: Component>(&mut self, entity: EntityId) -> bool {
        self.remove_component_dynamic(entity, ComponentTypeId::of::<T>())
    }

    /// Byte-level form of [`World::add_component`].
    ///
    /// ## Panics
    /// Panics if `component` is not registered or `data` does not match its
    /// size.
    ///
    /// ## Safety
    /// `data` must be a valid value of the component type. When `true` is
    /// returned the world owns that value and the caller must not drop it.

    pub unsafe fn add_component_dynamic(
        &mut self,
        entity: EntityId,
        component: ComponentTypeId,
        data: &[u8],
    ) -> bool {
        let Some(location) = self.entities.lookup(entity) else {
            return false;
        };
        let Some(target) = self.follow_edge::<true>(location.archetype, component) else {
            return false;
        };

        let archetype = &self.archetypes[target.as_usize()];
        let expected = archetype.column(component).map_or(0, |c| c.description().type_size);
        assert_eq!(data.len(), expected, "component {component} expects {expected} bytes");

        let slot = self.move_entity(entity, location, target, None);
        // SAFETY: the slot was just allocated and the caller vouches for `data`.
        unsafe {
            self.archetypes[target.as_usize()].copy_component_data_into_slot(slot, component, data);
        }
        true
    }

    /// Byte-level form of [`World::remove_component`].
    ///
    /// The remaining components are moved first; the removed value is dropped
    /// only once the destination slot exists.

    pub fn remove_component_dynamic(&mut self, entity: EntityId, component: ComponentTypeId) -> bool {
        let Some(location) = self.entities.lookup(entity) else {
            return false;
        };
        let Some(target) = self.follow_edge::<false>(location.archetype, component) else {
            return false;
        };

        self.move_entity(entity, location, target, Some(component));
        true
    }

    /// Returns `true` if `entity` is alive and has a `T`.
    #[inline]
    pub fn has_component<T: Component>(&self, entity: EntityId) -> bool {
        self.has_component_dynamic(entity, ComponentTypeId::of::<T>())
    }

    /// Returns `true` if `entity` is alive and has `component`.
    pub fn has_component_dynamic(&self, entity: EntityId, component: ComponentTypeId) -> bool {
        self.entities.lookup(entity).is_some_and(|location| {
            self.archetypes[location.archetype.as_usize()]
                .entity_layout()
                .contains_component_type(component)
        })
    }

    /// Fetches the components of one entity with a read-only query.
    ///
    /// Returns `None` if the id is stale or the entity lacks a queried type.
    /// Takes the world exclusively so no checked writer can be live:
    ///
    /// ```compile_fail
    /// # use strata_ecs::{register_component, World, WorldOptions};
    /// struct Health(u32);
    /// register_component::<Health>();
    /// let mut world = World::new(WorldOptions::default().with_archetype_capacity(16)).unwrap();
    /// let id = world.extend((vec![Health(10)],))[0];
    ///
    /// let mut writer = world.query_checked::<&mut Health>();
    /// let seen = world.query_one::<&Health>(id);
    /// for (_, health) in &mut writer {
    ///     health.0 = 0;
    /// }
    /// drop(seen);
    /// ```
    ///
    /// ## Panics
    /// Panics if `Q` requests mutable access.

    pub fn query_one<Q: ComponentQuery>(&mut self, entity: EntityId) -> Option<QueryItem<'_, Q>> {
        assert!(
            !Q::wants_any_mutable_access(),
            "query_one requires a read-only query; use query_one_mut"
        );
        // SAFETY: the world is borrowed exclusively and only shared
        // references are produced.
        unsafe { self.fetch_one::<Q>(entity) }
    }

    /// Fetches the components of one entity, mutably.
    pub fn query_one_mut<Q: ComponentQuery>(&mut self, entity: EntityId) -> Option<QueryItem<'_, Q>> {
        // SAFETY: the world is borrowed exclusively.
        unsafe { self.fetch_one::<Q>(entity) }
    }

    unsafe fn fetch_one<'w, Q: ComponentQuery>(&'w self, entity: EntityId) -> Option<QueryItem<'w, Q>> {
        // Rejects queries naming a type twice.
        let _ = Q::layout();
        let location = self.entities.lookup(entity)?;
        let archetype = &self.archetypes[location.archetype.as_usize()];
        let fetch = <Q::Fetch as Fetch<'w>>::create_at(archetype, location.entity)?;
        // SAFETY: the slot is live; aliasing is upheld by the caller.
        Some(unsafe { <Q::Fetch as Fetch<'w>>::get(&fetch) })
    }

    /// Iterates entities matching a read-only query.
    ///
    /// Takes the world exclusively; use [`World::query_checked`] to read
    /// through a shared world.
    ///
    /// ## Panics
    /// Panics if `Q` requests mutable access.

    pub fn query<Q: ComponentQuery>(&mut self) -> Query<'_, Q> {
        assert!(
            !Q::wants_any_mutable_access(),
            "query requires a read-only query; use query_mut or query_checked"
        );
        Query::new(&self.archetypes)
    }

    /// Iterates entities matching `Q` with exclusive access to the world.
    pub fn query_mut<Q: ComponentQuery>(&mut self) -> Query<'_, Q> {
        Query::new(&self.archetypes)
    }

    /// Iterates entities matching `Q` through a shared world, borrowing the
    /// queried columns at runtime.
    ///
    /// Items are borrowed from the returned [`CheckedQuery`]; iterate it with
    /// [`CheckedQuery::iter`] or `for item in &mut query`.
    ///
    /// ## Panics
    /// Panics if a live checked query holds conflicting access to a queried
    /// column (write/write, write/read or read/write).

    pub fn query_checked<Q: ComponentQuery>(&self) -> CheckedQuery<'_, Q> {
        match self.try_query_checked::<Q>() {
            Ok(query) => query,
            Err(error) => panic!("{error}"),
        }
    }

    /// Non-panicking form of [`World::query_checked`].
    pub fn try_query_checked<Q: ComponentQuery>(&self) -> Result<CheckedQuery<'_, Q>, AccessConflictError> {
        CheckedQuery::new(&self.archetypes)
    }

    /// Iterates entities matching `Q` through a shared world without any
    /// access checks.
    ///
    /// ## Safety
    /// No other reference to a column written by `Q` may exist while the
    /// query or its items are alive.
    pub unsafe fn query_unchecked<Q: ComponentQuery>(&self) -> Query<'_, Q> {
        Query::new(&self.archetypes)
    }
}

impl World {
    fn find_or_create_archetype(&mut self, layout: &EntityLayout) -> ArchetypeIndex {
        if let Some(&index) = self.archetype_map.get(layout) {
            return index;
        }

        let archetype = match Archetype::new(self.options.archetype_capacity, layout, &component_registry()) {
            Ok(archetype) => archetype,
            Err(error) => panic!("failed to reserve storage for archetype {layout:?}: {error}"),
        };

        let index = ArchetypeIndex(self.archetypes.len() as u32);
        self.archetypes.push(archetype);
        self.archetype_map.insert(layout.to_owned(), index);

        debug!(archetype = %index, layout = ?layout, capacity = self.options.archetype_capacity, "created archetype");
        index
    }

    /// Resolves the archetype reached from `source` by adding (`ADD`) or
    /// removing `component`, or `None` if that is a no-op.
    fn follow_edge<const ADD: bool>(&mut self, source: ArchetypeIndex, component: ComponentTypeId) -> Option<ArchetypeIndex> {
        let archetype = &self.archetypes[source.as_usize()];
        if archetype.entity_layout().contains_component_type(component) == ADD {
            return None;
        }

        let edge = archetype.edge(component);
        let cached = if ADD { edge.add } else { edge.remove };
        if cached.is_some() {
            return cached;
        }

        let mut layout = archetype.entity_layout().to_owned();
        if ADD {
            layout.add_component_type(component);
        } else {
            layout.remove_component_type(component);
        }
        let target = self.find_or_create_archetype(&layout);

        let forward = self.archetypes[source.as_usize()].edge_mut(component);
        if ADD { forward.add = Some(target) } else { forward.remove = Some(target) }
        let backward = self.archetypes[target.as_usize()].edge_mut(component);
        if ADD { backward.remove = Some(source) } else { backward.add = Some(source) }

        Some(target)
    }

    /// Moves the shared components of `entity` into `target`, releases its
    /// old slot and updates every affected location.
    ///
    /// `dropped` names a component left behind in the old slot; it is dropped
    /// after the destination slot has been allocated, so a full `target`
    /// panics with the entity still intact.
    fn move_entity(
        &mut self,
        entity: EntityId,
        location: EntityLocation,
        target: ArchetypeIndex,
        dropped: Option<ComponentTypeId>,
    ) -> ArchetypeEntityIndex {
        let (source, destination) = archetype_pair_mut(&mut self.archetypes, location.archetype, target);

        let slot = destination.copy_from_archetype(source, location.entity);
        if let Some(component) = dropped {
            // SAFETY: the slot is live and `target` lacks `component`, so the
            // value was not copied and is released below without a drop.
            unsafe { source.drop_component_in_slot(location.entity, component) };
        }
        if let Some(moved) = source.remove_entity::<false>(location.entity) {
            self.patch_slot(moved, location.entity);
        }

        if let Some(current) = self.entities.location_mut(entity) {
            *current = EntityLocation { archetype: target, entity: slot };
        }

        trace!(entity = %entity, from = %location.archetype, to = %target, "moved entity");
        slot
    }

    /// Points `moved` at `slot` after a swap-remove.
    fn patch_slot(&mut self, moved: EntityId, slot: ArchetypeEntityIndex) {
        if let Some(location) = self.entities.location_mut(moved) {
            location.entity = slot;
        }
        trace!(entity = %moved, slot = slot.0.get(), "update moved entity location");
    }
}

/// Returns mutable references to two distinct archetypes.
#[inline]
fn archetype_pair_mut(
    archetypes: &mut [Archetype],
    a: ArchetypeIndex,
    b: ArchetypeIndex,
) -> (&mut Archetype, &mut Archetype) {
    assert!(a != b);

    let (low, high) = if a < b { (a, b) } else { (b, a) };
    let (head, tail) = archetypes.split_at_mut(high.as_usize());

    let left = &mut head[low.as_usize()];
    let right = &mut tail[0];

    if a < b { (left, right) } else { (right, left) }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("options", &self.options)
            .field("len", &self.len())
            .field("archetypes", &self.archetypes)
            .finish()
    }
}
