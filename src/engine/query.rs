//! Typed component queries over archetype storage.
//!
//! A query type is a statically known set of `(component, mode)` pairs:
//! `&T` reads `T`, `&mut T` writes `T`, and tuples of up to twelve of those
//! combine them. Iterating a query walks every archetype whose layout is a
//! superset of the queried types and yields `(EntityId, item)` for each live
//! slot.
//!
//! ## Execution model
//! 1. The query type is turned into an [`EntityLayoutBuf`] (the types it
//!    requires) and an [`AccessSet`] (how it touches them). Naming a
//!    component type twice panics here.
//! 2. [`Query`] lazily scans the world's archetypes, skipping empty ones and
//!    ones whose layout does not contain the required types.
//! 3. For each matching archetype a [`Fetch`] cursor is positioned at slot `1`
//!    and advanced slot by slot until `len`.
//!
//! A query instance is single pass: once exhausted, a fresh one must be
//! requested from the world.
//!
//! ## Access control
//! * `World::query` and `World::query_mut` take the world exclusively;
//!   `query` additionally only accepts read-only queries.
//! * [`CheckedQuery`] takes the world shared and borrows every queried column
//!   of every matching archetype at construction through the column's
//!   [`crate::ColumnBorrow`]. A conflicting request fails before any item is
//!   produced; the borrows are released when the query is dropped, and items
//!   borrow from the query so they cannot outlive it.
//!
//! ## Concurrency
//! Checked queries with non-conflicting access sets may be created and
//! iterated on different threads at the same time. Unchecked queries rely on
//! Rust's borrow rules on the world.

use std::marker::PhantomData;
use std::ptr::NonNull;

use tracing::trace;

use crate::engine::archetype::{typed_ptr, Archetype};
use crate::engine::borrow::AccessGuard;
use crate::engine::component::Component;
use crate::engine::error::AccessConflictError;
use crate::engine::layout::EntityLayoutBuf;
use crate::engine::types::{
    AccessMode, AccessSet, ArchetypeEntityIndex, ArchetypeIndex, ComponentTypeId, EntityId,
};

/// Statically typed description of what a query reads and writes.

pub trait ComponentQuery {
    /// Cursor type producing the query items.
    type Fetch: for<'a> Fetch<'a>;

    /// Adds the required component types to `layout`.
    ///
    /// ## Panics
    /// Panics if a type is already present.
    fn add_to_layout(layout: &mut EntityLayoutBuf);

    /// Adds the `(component, mode)` pairs to `access`.
    ///
    /// ## Panics
    /// Panics if a type is already present.
    fn add_to_access(access: &mut AccessSet);

    /// Returns `true` if any component is accessed mutably.
    fn wants_any_mutable_access() -> bool;

    /// Component types required by the query.
    fn layout() -> EntityLayoutBuf {
        let mut layout = EntityLayoutBuf::new();
        Self::add_to_layout(&mut layout);
        layout
    }

    /// `(component, mode)` pairs of the query, for schedulers.
    fn access_set() -> AccessSet {
        let mut access = AccessSet::new();
        Self::add_to_access(&mut access);
        access
    }
}

/// Item produced by query `Q` for lifetime `'a`.
pub type QueryItem<'a, Q> = <<Q as ComponentQuery>::Fetch as Fetch<'a>>::Item;

/// Cursor over the columns of one archetype.
///
/// ## Safety
/// Implementations must only produce references into the columns they were
/// created from, and `get` must return references to the slot the cursor is
/// currently positioned at.

pub unsafe trait Fetch<'a>: Sized {
    /// Item produced per slot.
    type Item;

    /// Positions a cursor at `slot` of `archetype`.
    ///
    /// Returns `None` if the archetype lacks a required component.
    fn create_at(archetype: &'a Archetype, slot: ArchetypeEntityIndex) -> Option<Self>;

    /// Moves the cursor to the next slot.
    ///
    /// ## Safety
    /// The cursor must not be moved past the end of the reservation.
    unsafe fn advance(&mut self);

    /// Produces the item for the current slot.
    ///
    /// ## Safety
    /// The slot must be live, and the caller must uphold Rust's aliasing rules
    /// for the returned references.
    unsafe fn get(&self) -> Self::Item;
}

/// Fetch for `&T`.
pub struct ComponentRead<T> {
    ptr: NonNull<T>,
}

/// Fetch for `&mut T`.
pub struct ComponentWrite<T> {
    ptr: NonNull<T>,
}

#[inline]
fn column_start<T: Component>(archetype: &Archetype, slot: ArchetypeEntityIndex) -> Option<NonNull<T>> {
    let ptr = archetype.component_ptr(slot, ComponentTypeId::of::<T>())?;
    NonNull::new(typed_ptr::<T>(ptr.as_ptr()))
}

unsafe impl<'a, T: Component> Fetch<'a> for ComponentRead<T> {
    type Item = &'a T;

    #[inline]
    fn create_at(archetype: &'a Archetype, slot: ArchetypeEntityIndex) -> Option<Self> {
        Some(Self { ptr: column_start::<T>(archetype, slot)? })
    }

    #[inline]
    unsafe fn advance(&mut self) {
        // SAFETY: the caller keeps the cursor inside the reservation.
        self.ptr = unsafe { NonNull::new_unchecked(self.ptr.as_ptr().add(1)) };
    }

    #[inline]
    unsafe fn get(&self) -> &'a T {
        // SAFETY: the slot is live and aligned; aliasing is the caller's
        // responsibility.
        unsafe { &*self.ptr.as_ptr() }
    }
}

unsafe impl<'a, T: Component> Fetch<'a> for ComponentWrite<T> {
    type Item = &'a mut T;

    #[inline]
    fn create_at(archetype: &'a Archetype, slot: ArchetypeEntityIndex) -> Option<Self> {
        Some(Self { ptr: column_start::<T>(archetype, slot)? })
    }

    #[inline]
    unsafe fn advance(&mut self) {
        // SAFETY: the caller keeps the cursor inside the reservation.
        self.ptr = unsafe { NonNull::new_unchecked(self.ptr.as_ptr().add(1)) };
    }

    #[inline]
    unsafe fn get(&self) -> &'a mut T {
        // SAFETY: the slot is live and aligned; every slot is handed out at
        // most once per query, and the caller guarantees no other reference
        // to the column exists.
        unsafe { &mut *self.ptr.as_ptr() }
    }
}

fn add_unique(layout: &mut EntityLayoutBuf, id: ComponentTypeId, name: &str) {
    if layout.add_component_type(id) {
        panic!("component `{name}` requested more than once in one query");
    }
}

impl<T: Component> ComponentQuery for &T {
    type Fetch = ComponentRead<T>;

    fn add_to_layout(layout: &mut EntityLayoutBuf) {
        add_unique(layout, ComponentTypeId::of::<T>(), std::any::type_name::<T>());
    }

    fn add_to_access(access: &mut AccessSet) {
        access.insert(ComponentTypeId::of::<T>(), AccessMode::Read);
    }

    #[inline]
    fn wants_any_mutable_access() -> bool {
        false
    }
}

impl<T: Component> ComponentQuery for &mut T {
    type Fetch = ComponentWrite<T>;

    fn add_to_layout(layout: &mut EntityLayoutBuf) {
        add_unique(layout, ComponentTypeId::of::<T>(), std::any::type_name::<T>());
    }

    fn add_to_access(access: &mut AccessSet) {
        access.insert(ComponentTypeId::of::<T>(), AccessMode::Write);
    }

    #[inline]
    fn wants_any_mutable_access() -> bool {
        true
    }
}

macro_rules! impl_component_query_for_tuple {
    ($($name:ident),+) => {
        #[allow(non_snake_case)]
        unsafe impl<'a, $($name: Fetch<'a>),+> Fetch<'a> for ($($name,)+) {
            type Item = ($($name::Item,)+);

            #[inline]
            fn create_at(archetype: &'a Archetype, slot: ArchetypeEntityIndex) -> Option<Self> {
                Some(($($name::create_at(archetype, slot)?,)+))
            }

            #[inline]
            unsafe fn advance(&mut self) {
                let ($($name,)+) = self;
                // SAFETY: forwarded to the caller.
                $( unsafe { $name.advance() }; )+
            }

            #[inline]
            unsafe fn get(&self) -> Self::Item {
                let ($($name,)+) = self;
                // SAFETY: forwarded to the caller.
                ($( unsafe { $name.get() },)+)
            }
        }

        impl<$($name: ComponentQuery),+> ComponentQuery for ($($name,)+) {
            type Fetch = ($($name::Fetch,)+);

            fn add_to_layout(layout: &mut EntityLayoutBuf) {
                $( $name::add_to_layout(layout); )+
            }

            fn add_to_access(access: &mut AccessSet) {
                $( $name::add_to_access(access); )+
            }

            #[inline]
            fn wants_any_mutable_access() -> bool {
                false $( || $name::wants_any_mutable_access() )+
            }
        }
    };
}

impl_component_query_for_tuple!(A);
impl_component_query_for_tuple!(A, B);
impl_component_query_for_tuple!(A, B, C);
impl_component_query_for_tuple!(A, B, C, D);
impl_component_query_for_tuple!(A, B, C, D, E);
impl_component_query_for_tuple!(A, B, C, D, E, F);
impl_component_query_for_tuple!(A, B, C, D, E, F, G);
impl_component_query_for_tuple!(A, B, C, D, E, F, G, H);
impl_component_query_for_tuple!(A, B, C, D, E, F, G, H, I);
impl_component_query_for_tuple!(A, B, C, D, E, F, G, H, I, J);
impl_component_query_for_tuple!(A, B, C, D, E, F, G, H, I, J, K);
impl_component_query_for_tuple!(A, B, C, D, E, F, G, H, I, J, K, L);

struct ArchetypeCursor<'w, F> {
    archetype: &'w Archetype,
    slot: u32,
    fetch: F,
}

/// Lazy iterator over every entity matching `Q`.

pub struct Query<'w, Q: ComponentQuery> {
    archetypes: &'w [Archetype],
    matching: EntityLayoutBuf,
    excluded: EntityLayoutBuf,
    next_archetype: usize,
    cursor: Option<ArchetypeCursor<'w, Q::Fetch>>,
    _query: PhantomData<fn() -> Q>,
}

impl<'w, Q: ComponentQuery> Query<'w, Q> {
    pub(crate) fn new(archetypes: &'w [Archetype]) -> Self {
        Self {
            archetypes,
            matching: Q::layout(),
            excluded: EntityLayoutBuf::new(),
            next_archetype: 0,
            cursor: None,
            _query: PhantomData,
        }
    }

    /// Skips archetypes containing component `T`.
    ///
    /// Has no effect on archetypes already visited.
    pub fn without<T: Component>(mut self) -> Self {
        self.excluded.add_component_type(ComponentTypeId::of::<T>());
        self
    }

    /// `(component, mode)` pairs of the query.
    pub fn access_set(&self) -> AccessSet {
        Q::access_set()
    }

    #[inline]
    fn matches(&self, archetype: &Archetype) -> bool {
        let layout = archetype.entity_layout();
        self.matching.is_subset_of(layout) && self.excluded.is_disjoint_from(layout)
    }
}

impl<'w, Q: ComponentQuery> Query<'w, Q> {
    /// Advances to the next live slot and fetches its item for `'a`.
    ///
    /// ## Safety
    /// Items must not outlive the access that makes them sound: the shared or
    /// exclusive world borrow, or the column borrows of a [`CheckedQuery`].
    unsafe fn next_item<'a>(&mut self) -> Option<(EntityId, QueryItem<'a, Q>)>
    where
        'w: 'a,
    {
        loop {
            if let Some(cursor) = &mut self.cursor {
                if cursor.slot <= cursor.archetype.len() {
                    let id = cursor.archetype.entity_ids()[cursor.slot as usize - 1];
                    // SAFETY: `slot` is live; aliasing is upheld by the caller.
                    let item = unsafe { <Q::Fetch as Fetch<'a>>::get(&cursor.fetch) };
                    // SAFETY: at most one slot past `len`, still inside the
                    // `capacity + 1` slot reservation.
                    unsafe { <Q::Fetch as Fetch<'a>>::advance(&mut cursor.fetch) };
                    cursor.slot += 1;
                    return Some((id, item));
                }
                self.cursor = None;
            }

            let archetype = self.archetypes.get(self.next_archetype)?;
            self.next_archetype += 1;

            if archetype.is_empty() || !self.matches(archetype) {
                continue;
            }
            if let Some(fetch) = <Q::Fetch as Fetch<'w>>::create_at(archetype, ArchetypeEntityIndex::first()) {
                self.cursor = Some(ArchetypeCursor { archetype, slot: 1, fetch });
            }
        }
    }
}

impl<'w, Q: ComponentQuery> Iterator for Query<'w, Q> {
    type Item = (EntityId, QueryItem<'w, Q>);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        // SAFETY: a bare `Query` only exists behind an exclusive world or an
        // unsafe caller contract, both of which last for `'w`.
        unsafe { self.next_item::<'w>() }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let in_cursor = self
            .cursor
            .as_ref()
            .map_or(0, |c| (c.archetype.len() + 1 - c.slot) as usize);
        let remaining: usize = self.archetypes[self.next_archetype.min(self.archetypes.len())..]
            .iter()
            .filter(|a| self.matches(a))
            .map(|a| a.len() as usize)
            .sum();
        let total = in_cursor + remaining;
        (total, Some(total))
    }
}

/// Query over a shared world whose column access is checked at runtime.
///
/// Holds a read or write borrow on every queried column of every matching
/// archetype until dropped. Items are borrowed from the query itself, so none
/// of them can outlive the column borrows:
///
/// ```compile_fail
/// # use strata_ecs::{register_component, World, WorldOptions};
/// struct Health(u32);
/// register_component::<Health>();
/// let mut world = World::new(WorldOptions::default().with_archetype_capacity(16)).unwrap();
/// world.extend((vec![Health(10)],));
///
/// let mut writer = world.query_checked::<&mut Health>();
/// let (_, health) = writer.iter().next().unwrap();
/// drop(writer);
/// health.0 = 0;
/// ```

pub struct CheckedQuery<'w, Q: ComponentQuery> {
    query: Query<'w, Q>,
    _guard: AccessGuard<'w>,
}

impl<'w, Q: ComponentQuery> CheckedQuery<'w, Q> {
    pub(crate) fn new(archetypes: &'w [Archetype]) -> Result<Self, AccessConflictError> {
        let access = Q::access_set();
        let query = Query::<Q>::new(archetypes);
        let mut guard = AccessGuard::new();

        for (index, archetype) in archetypes.iter().enumerate() {
            if !query.matches(archetype) {
                continue;
            }
            for requested in access.iter() {
                let Some(column) = archetype.column(requested.component) else {
                    continue;
                };
                if let Err(held) = guard.acquire(column.borrow_state(), requested.mode) {
                    let error = AccessConflictError {
                        component: requested.component,
                        component_name: column.description().type_name,
                        archetype: ArchetypeIndex(index as u32),
                        requested: requested.mode,
                        held,
                    };
                    trace!(%error, "checked query rejected");
                    // Dropping `guard` releases everything taken so far.
                    return Err(error);
                }
            }
        }

        Ok(Self { query, _guard: guard })
    }

    /// `(component, mode)` pairs of the query.
    pub fn access_set(&self) -> AccessSet {
        Q::access_set()
    }

    /// Iterates the remaining entities.
    ///
    /// The traversal is shared between calls: a second `iter` resumes where
    /// the previous one stopped.
    #[inline]
    pub fn iter(&mut self) -> CheckedIter<'_, 'w, Q> {
        CheckedIter { query: &mut self.query }
    }
}

impl<'q, 'w, Q: ComponentQuery> IntoIterator for &'q mut CheckedQuery<'w, Q> {
    type Item = (EntityId, QueryItem<'q, Q>);
    type IntoIter = CheckedIter<'q, 'w, Q>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over a [`CheckedQuery`], yielding items borrowed from it.

pub struct CheckedIter<'q, 'w, Q: ComponentQuery> {
    query: &'q mut Query<'w, Q>,
}

impl<'q, 'w, Q: ComponentQuery> Iterator for CheckedIter<'q, 'w, Q> {
    type Item = (EntityId, QueryItem<'q, Q>);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        // SAFETY: the column borrows live in the `CheckedQuery`, which stays
        // borrowed for `'q`.
        unsafe { self.query.next_item::<'q>() }
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.query.size_hint()
    }
}
