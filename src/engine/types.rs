//! Core ECS Types and Identifiers
//!
//! This module defines the **fundamental identifiers and access descriptors**
//! shared by every other part of the engine: entity handles, generation
//! counters, component type identifiers, archetype indices and the
//! `(component, mode)` access sets consumed by external schedulers.
//!
//! ## Entity Representation
//!
//! An [`EntityId`] is a pair of a slot index and a [`Generation`]:
//!
//! ```text
//! | generation: u32 | index: Option<NonZeroU32> |
//! ```
//!
//! - **Index** identifies the slot in the entity storage. Slot `0` is
//!   reserved for the free-list head, so a live index is never zero and the
//!   null handle is represented by `None`.
//! - **Generation** is odd while the slot is alive and even while it is dead.
//!   Every state transition increments it, so a handle minted before a slot
//!   was recycled can never resolve to the new occupant.
//!
//! ## Archetype Addressing
//!
//! [`ArchetypeIndex`] selects an archetype inside a world, index `0` being the
//! archetype with the empty layout. [`ArchetypeEntityIndex`] selects a slot in
//! the columns of one archetype; slot `0` of every column is a zeroed sentinel
//! so live slots are `1..=len`.
//!
//! ## Access Sets
//!
//! [`AccessSet`] describes *how* a query touches component types. Two sets
//! conflict when they share a component type and at least one of them writes
//! it (W∩W, W∩R, R∩W).

use std::any::TypeId;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::num::NonZeroU32;

/// Stable identifier of a component type.
///
/// Rust types derive their identifier from [`TypeId`]; types described at
/// runtime (for example from a foreign interface) may pick any raw value via
/// [`ComponentTypeId::from_raw`] as long as it does not collide. Registering
/// two different types under one identifier panics.

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ComponentTypeId(u64);

impl ComponentTypeId {
    /// Returns the identifier for the Rust type `T`.
    #[inline]
    pub fn of<T: 'static>() -> Self {
        let mut hasher = DefaultHasher::new();
        TypeId::of::<T>().hash(&mut hasher);
        Self(hasher.finish())
    }

    /// Wraps a raw identifier value.
    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw identifier value.
    #[inline]
    pub const fn as_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ComponentTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

/// Per-slot generation counter.
///
/// ## Encoding
///
/// | Parity | Meaning |
/// |------:|--------|
/// | even | slot is dead (free list member) |
/// | odd  | slot is alive (holds an entity location) |
///
/// A fresh slot starts at `0` (dead). Incrementing wraps on overflow; the
/// parity encoding survives the wrap because `u32::MAX` is odd.

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Generation(u32);

impl Generation {
    /// Generation of a slot that has never been used.
    pub const DEAD: Generation = Generation(0);

    /// Wraps a raw generation value.
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw generation value.
    #[inline]
    pub const fn as_raw(self) -> u32 {
        self.0
    }

    /// Returns `true` when the generation marks a live slot.
    #[inline]
    pub const fn is_alive(self) -> bool {
        self.0 & 1 == 1
    }

    /// Returns `true` when the generation marks a dead slot.
    #[inline]
    pub const fn is_dead(self) -> bool {
        !self.is_alive()
    }

    /// Advances the generation, flipping its liveness.
    #[inline]
    pub fn increment(&mut self) {
        self.0 = self.0.wrapping_add(1);
    }
}

/// Index of an entity slot. Never zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct EntityIndex(pub NonZeroU32);

impl EntityIndex {
    /// Creates an index from a raw slot number, returning `None` for `0`.
    #[inline]
    pub const fn new(raw: u32) -> Option<Self> {
        match NonZeroU32::new(raw) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Returns the slot number as a `usize` for indexing.
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0.get() as usize
    }
}

/// Generational handle to an entity.
///
/// Two ids are equal only if both the slot index and the generation match.
/// The null id has no index and never resolves.

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId {
    /// Generation of the slot at the time the id was minted.
    pub generation: Generation,

    /// Slot index, `None` for the null id.
    pub index: Option<EntityIndex>,
}

impl EntityId {
    /// Returns the null entity id.
    #[inline]
    pub const fn null() -> Self {
        Self { generation: Generation::DEAD, index: None }
    }

    /// Returns `true` for the null entity id.
    #[inline]
    pub const fn is_null(&self) -> bool {
        self.index.is_none()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(index) => write!(f, "{}:{}", index.0, self.generation.0),
            None => f.write_str("null"),
        }
    }
}

/// Index of an archetype within a world.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ArchetypeIndex(pub u32);

impl ArchetypeIndex {
    /// The archetype holding entities with no components.
    pub const EMPTY: ArchetypeIndex = ArchetypeIndex(0);

    /// Returns the index as a `usize` for indexing.
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ArchetypeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index of a live slot within the columns of an archetype. Never zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ArchetypeEntityIndex(pub NonZeroU32);

impl ArchetypeEntityIndex {
    /// Creates a slot index, returning `None` for the sentinel slot `0`.
    #[inline]
    pub const fn new(raw: u32) -> Option<Self> {
        match NonZeroU32::new(raw) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// The first live slot.
    #[inline]
    pub const fn first() -> Self {
        Self(NonZeroU32::MIN)
    }

    /// Returns the slot number as a `usize` for indexing.
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0.get() as usize
    }
}

/// Access mode for a component.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AccessMode {
    /// Read-only access.
    Read,
    /// Exclusive write access.
    Write,
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessMode::Read => f.write_str("read"),
            AccessMode::Write => f.write_str("write"),
        }
    }
}

/// One `(component, mode)` pair of a query signature.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ComponentAccess {
    /// Component type being accessed.
    pub component: ComponentTypeId,
    /// How the component is accessed.
    pub mode: AccessMode,
}

/// Declares the component access of a query.
///
/// ## Invariants
/// - Entries are sorted by component type.
/// - A component type appears at most once.

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct AccessSet {
    accesses: Vec<ComponentAccess>,
}

impl AccessSet {
    /// Creates an empty access set.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an access.
    ///
    /// ## Panics
    /// Panics if `component` is already part of the set. A query naming the
    /// same component twice would alias its own borrows.

    pub fn insert(&mut self, component: ComponentTypeId, mode: AccessMode) {
        match self.accesses.binary_search_by_key(&component, |a| a.component) {
            Ok(_) => panic!("component type {component} requested more than once in one query"),
            Err(at) => self.accesses.insert(at, ComponentAccess { component, mode }),
        }
    }

    /// Returns the mode requested for `component`, if any.
    #[inline]
    pub fn mode_of(&self, component: ComponentTypeId) -> Option<AccessMode> {
        self.accesses
            .binary_search_by_key(&component, |a| a.component)
            .ok()
            .map(|i| self.accesses[i].mode)
    }

    /// Iterates all accesses in component order.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &ComponentAccess> + '_ {
        self.accesses.iter()
    }

    /// Iterates the component types that are only read.
    pub fn reads(&self) -> impl Iterator<Item = ComponentTypeId> + '_ {
        self.accesses.iter().filter(|a| a.mode == AccessMode::Read).map(|a| a.component)
    }

    /// Iterates the component types that are written.
    pub fn writes(&self) -> impl Iterator<Item = ComponentTypeId> + '_ {
        self.accesses.iter().filter(|a| a.mode == AccessMode::Write).map(|a| a.component)
    }

    /// Number of component types in the set.
    #[inline]
    pub fn len(&self) -> usize {
        self.accesses.len()
    }

    /// Returns `true` if the set names no component type.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.accesses.is_empty()
    }

    /// Returns `true` if no component is written.
    #[inline]
    pub fn is_read_only(&self) -> bool {
        self.accesses.iter().all(|a| a.mode == AccessMode::Read)
    }

    /// Returns `true` if this access set conflicts with another.
    #[inline]
    pub fn conflicts_with(&self, other: &AccessSet) -> bool {
        // Conflicts if: (W ∩ W) or (W ∩ R) or (R ∩ W)
        let (mut a, mut b) = (self.accesses.iter().peekable(), other.accesses.iter().peekable());
        while let (Some(x), Some(y)) = (a.peek(), b.peek()) {
            match x.component.cmp(&y.component) {
                std::cmp::Ordering::Less => { a.next(); }
                std::cmp::Ordering::Greater => { b.next(); }
                std::cmp::Ordering::Equal => {
                    if x.mode == AccessMode::Write || y.mode == AccessMode::Write {
                        return true;
                    }
                    a.next();
                    b.next();
                }
            }
        }
        false
    }
}
