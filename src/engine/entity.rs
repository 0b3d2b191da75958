//! Entity slot allocation with generational handles.
//!
//! [`EntityStorage`] is a single dense array of slots, each holding a
//! [`Generation`] and an [`EntitySlot`] payload. Slots cycle through:
//!
//! ```text
//! Dead (free list, even generation) -> Alive (odd generation, location) -> Dead -> ...
//! ```
//!
//! ## Free list
//!
//! Dead slots form an intrusive singly linked list threaded through their
//! payload. Slot `0` is never handed out: it is the list head, and a head
//! link of `0` means the list is empty. Popping reuses the most recently
//! freed slot; an empty list appends a fresh slot.
//!
//! ## Payload
//!
//! A slot's payload is either the next free-list link or the location of the
//! live entity's component data, never both. The tag of [`EntitySlot`]
//! always agrees with the parity of the slot's generation.
//!
//! ## Stale handles
//!
//! Every lookup compares the id's generation with the slot's and requires it
//! to be alive. A handle that fails the check is simply not found; this is
//! the ordinary "already destroyed" signal, not an error.

use tracing::trace;

use crate::engine::error::{ECSResult, InvalidCapacityError};
use crate::engine::storage::VirtualVec;
use crate::engine::types::{
    ArchetypeEntityIndex, ArchetypeIndex, EntityId, EntityIndex, Generation,
};

/// Largest number of entities a storage can be configured for.
///
/// Slot `0` is the free-list head and `u32::MAX` must stay unused so the slot
/// count fits in a `u32`.
pub const MAX_ENTITY_CAPACITY: u32 = u32::MAX - 2;

/// Position of a live entity's component data.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityLocation {
    /// Archetype holding the entity.
    pub archetype: ArchetypeIndex,

    /// Slot of the entity within that archetype's columns.
    pub entity: ArchetypeEntityIndex,
}

/// Link to the next dead slot; `0` terminates the list.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct EntityFreeListLink(pub u32);

/// Payload of an entity slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntitySlot {
    /// Dead slot, member of the free list.
    Free(EntityFreeListLink),

    /// Live slot.
    Alive(EntityLocation),
}

#[derive(Clone, Copy, Debug)]
struct EntityEntry {
    generation: Generation,
    slot: EntitySlot,
}

impl EntityEntry {
    const HEAD: EntityEntry = EntityEntry {
        generation: Generation::DEAD,
        slot: EntitySlot::Free(EntityFreeListLink(0)),
    };

    #[inline]
    fn next_free(&self) -> EntityFreeListLink {
        match self.slot {
            EntitySlot::Free(link) => link,
            EntitySlot::Alive(_) => {
                unreachable!("free list threaded through a live entity slot")
            }
        }
    }
}

/// Dense free-list allocator of entity ids.

pub struct EntityStorage {
    entries: VirtualVec<EntityEntry>,
    count: u32,
}

impl EntityStorage {

    /// Reserves room for `capacity` live entities.
    ///
    /// ## Errors
    /// * [`InvalidCapacityError`] if `capacity` is zero or exceeds
    ///   [`MAX_ENTITY_CAPACITY`].
    /// * [`crate::ReservationError`] if the address space cannot be reserved.

    pub fn new(capacity: u32) -> ECSResult<EntityStorage> {
        if capacity == 0 || capacity > MAX_ENTITY_CAPACITY {
            return Err(InvalidCapacityError {
                what: "entity",
                requested: capacity as u64,
                max: MAX_ENTITY_CAPACITY as u64,
            }
            .into());
        }

        let mut entries = VirtualVec::new(capacity as usize + 1)?;
        entries.push(EntityEntry::HEAD);

        Ok(Self { entries, count: 0 })
    }

    /// Number of live entities.
    #[inline]
    pub fn len(&self) -> u32 {
        self.count
    }

    /// Returns `true` if no entity is alive.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Maximum number of live entities.
    #[inline]
    pub fn capacity(&self) -> u32 {
        (self.entries.capacity() - 1) as u32
    }

    #[inline]
    fn live_entry(&self, id: EntityId) -> Option<&EntityEntry> {
        let entry = self.entries.get(id.index?.as_usize())?;
        (entry.generation == id.generation && id.generation.is_alive()).then_some(entry)
    }

    /// Returns the location of `id`, or `None` if it is stale or null.
    #[inline]
    pub fn lookup(&self, id: EntityId) -> Option<EntityLocation> {
        match self.live_entry(id)?.slot {
            EntitySlot::Alive(location) => Some(location),
            EntitySlot::Free(_) => None,
        }
    }

    /// Mutable access to the stored location of a live entity.
    #[inline]
    pub fn location_mut(&mut self, id: EntityId) -> Option<&mut EntityLocation> {
        self.live_entry(id)?;
        match &mut self.entries[id.index?.as_usize()].slot {
            EntitySlot::Alive(location) => Some(location),
            EntitySlot::Free(_) => None,
        }
    }

    /// Mints a new id whose slot records `location`.
    ///
    /// Reuses the most recently freed slot when there is one.
    ///
    /// ## Panics
    /// Panics if every slot is alive and the reservation is full.

    pub fn create(&mut self, location: EntityLocation) -> EntityId {
        let head = self.entries[0].next_free();

        let index = if head.0 != 0 {
            let slot = head.0 as usize;
            let next = self.entries[slot].next_free();
            self.entries[0].slot = EntitySlot::Free(next);

            let entry = &mut self.entries[slot];
            debug_assert!(entry.generation.is_dead());
            entry.generation.increment();
            entry.slot = EntitySlot::Alive(location);
            slot
        } else {
            let slot = self.entries.len();
            let mut generation = Generation::DEAD;
            generation.increment();
            self.entries.push(EntityEntry { generation, slot: EntitySlot::Alive(location) });
            slot
        };

        self.count += 1;

        let entry = &self.entries[index];
        EntityId {
            generation: entry.generation,
            index: EntityIndex::new(index as u32),
        }
    }

    /// Frees the slot of `id` and returns the location it held.
    ///
    /// Returns `None`, and changes nothing, if `id` is stale or null.

    pub fn destroy(&mut self, id: EntityId) -> Option<EntityLocation> {
        let location = self.lookup(id)?;
        let slot = id.index?.as_usize();

        let head = self.entries[0].next_free();
        let entry = &mut self.entries[slot];
        entry.slot = EntitySlot::Free(head);
        entry.generation.increment();
        self.entries[0].slot = EntitySlot::Free(EntityFreeListLink(slot as u32));

        self.count -= 1;
        trace!(entity = %id, "freed entity slot");
        Some(location)
    }
}
