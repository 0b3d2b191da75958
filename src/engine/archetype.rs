//! Archetype storage.
//!
//! An [`Archetype`] stores every entity sharing one exact [`EntityLayout`].
//! Storage is columnar and type-erased:
//!
//! - one [`ComponentColumn`] per component type, a `VirtualVec<u8>` whose
//!   stride is the component's size,
//! - one parallel `VirtualVec<EntityId>` recording which entity owns each
//!   slot.
//!
//! ## Slot layout
//!
//! ```text
//! slot:        0          1      2      ...   len
//! entity_ids:  sentinel   e1     e2     ...   eN
//! column[k]:   zeroes     c1     c2     ...   cN
//! ```
//!
//! Slot `0` of every column is a zeroed sentinel that never holds live data,
//! so live slots are exactly `1..=len` and a slot index is never zero.
//!
//! ## Invariants
//!
//! - Every column holds `len + 1` slots, the entity id column included.
//! - For every live slot `i`, `entity_ids[i]` owns the bytes at
//!   `i * type_size` of every column.
//! - Columns are densely packed; removal is a swap-remove, so order is not
//!   preserved.
//!
//! ## Ownership of component values
//!
//! Component bytes are owned by the archetype. They leave storage in one of
//! two ways: **moved** (copied elsewhere, then discarded without drop) or
//! **dropped** (the column's `fn_drop` is invoked). Every removal path picks
//! exactly one of the two for each value.

use std::collections::HashMap;
use std::ptr::{self, NonNull};
use std::slice;

use crate::engine::borrow::{ColumnBorrow, ColumnRef};
use crate::engine::component::{ComponentRegistry, ComponentTypeDescription};
use crate::engine::error::ReservationError;
use crate::engine::layout::{EntityLayout, EntityLayoutBuf};
use crate::engine::source::ComponentSource;
use crate::engine::storage::VirtualVec;
use crate::engine::types::{ArchetypeEntityIndex, ArchetypeIndex, ComponentTypeId, EntityId};

/// Cached archetype transitions for one component type.
///
/// `add` is the archetype reached by adding the type, `remove` the one reached
/// by removing it. `None` means the transition has not been resolved yet.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ArchetypeEdge {
    /// Destination when the component type is added.
    pub add: Option<ArchetypeIndex>,
    /// Destination when the component type is removed.
    pub remove: Option<ArchetypeIndex>,
}

/// Type-erased byte column for one component type.

pub struct ComponentColumn {
    description: ComponentTypeDescription,
    data: VirtualVec<u8>,
    borrow: ColumnBorrow,
}

impl ComponentColumn {
    fn new(description: ComponentTypeDescription, capacity: u32) -> Result<Self, ReservationError> {
        let slots = capacity as usize + 1;
        let bytes = slots
            .checked_mul(description.type_size)
            .ok_or_else(ReservationError::overflow)?;

        let mut data = VirtualVec::new(bytes)?;
        data.resize(description.type_size, 0u8);

        Ok(Self { description, data, borrow: ColumnBorrow::new() })
    }

    /// Description of the stored component type.
    #[inline]
    pub fn description(&self) -> &ComponentTypeDescription {
        &self.description
    }

    /// Runtime borrow state used by checked queries.
    #[inline]
    pub fn borrow_state(&self) -> &ColumnBorrow {
        &self.borrow
    }

    /// Takes a read borrow for a raw view of the data.
    ///
    /// ## Panics
    /// Panics if a checked query writes the column.
    fn acquire_read(&self) -> &ColumnBorrow {
        if !self.borrow.try_acquire_read() {
            panic!("column `{}` is borrowed for writing", self.description.type_name);
        }
        &self.borrow
    }

    #[inline]
    fn stride(&self) -> usize {
        self.description.type_size
    }

    #[inline]
    fn slot_ptr(&self, slot: usize) -> *mut u8 {
        // Zero-sized types have a zero stride and a dangling base pointer.
        self.data.raw_ptr().wrapping_add(slot * self.stride())
    }

    /// Drops the value in `slot` in place.
    ///
    /// ## Safety
    /// `slot` must hold a live value that is never read again.
    unsafe fn drop_in_slot(&mut self, slot: usize) {
        if let Some(fn_drop) = self.description.fn_drop {
            // SAFETY: forwarded to the caller.
            unsafe { fn_drop(self.slot_ptr(slot)) }
        }
    }
}

/// Columnar storage for all entities of one layout.

pub struct Archetype {
    /// Component types stored here, in canonical order.
    entity_layout: EntityLayoutBuf,

    /// Maps a component type to its column.
    storage_indices: HashMap<ComponentTypeId, usize>,

    /// One column per component type, in layout order.
    columns: Vec<ComponentColumn>,

    /// Owner of each slot, slot `0` being the sentinel.
    entity_ids: VirtualVec<EntityId>,

    /// Number of live entities.
    len: u32,

    /// Maximum number of live entities.
    capacity: u32,

    /// Cached add/remove transitions.
    edges: HashMap<ComponentTypeId, ArchetypeEdge>,
}

impl Archetype {

    /// Builds an empty archetype for `layout` able to hold `capacity`
    /// entities.
    ///
    /// ## Panics
    /// Panics if a component type of `layout` is missing from `registry`.
    ///
    /// ## Errors
    /// Returns [`ReservationError`] if a column cannot be reserved.

    pub fn new(
        capacity: u32,
        layout: &EntityLayout,
        registry: &ComponentRegistry,
    ) -> Result<Self, ReservationError> {
        let mut storage_indices = HashMap::with_capacity(layout.len());
        let mut columns = Vec::with_capacity(layout.len());

        for (index, id) in layout.iter().enumerate() {
            let description = match registry.lookup(id) {
                Some(description) => *description,
                None => panic!("component type {id} is used in a layout but was never registered"),
            };
            storage_indices.insert(id, index);
            columns.push(ComponentColumn::new(description, capacity)?);
        }

        let mut entity_ids = VirtualVec::new(capacity as usize + 1)?;
        entity_ids.push(EntityId::null());

        Ok(Self {
            entity_layout: layout.to_owned(),
            storage_indices,
            columns,
            entity_ids,
            len: 0,
            capacity,
            edges: HashMap::new(),
        })
    }

    /// Number of live entities.
    #[inline]
    pub fn len(&self) -> u32 {
        self.len
    }

    /// Returns `true` if the archetype holds no entity.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Maximum number of live entities.
    #[inline]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Component types stored in this archetype.
    #[inline]
    pub fn entity_layout(&self) -> &EntityLayout {
        &self.entity_layout
    }

    /// Ids of the live entities; element `i - 1` owns slot `i`.
    #[inline]
    pub fn entity_ids(&self) -> &[EntityId] {
        &self.entity_ids[1..]
    }

    /// Id of the entity in `slot`.
    #[inline]
    pub fn entity_id_at(&self, slot: ArchetypeEntityIndex) -> Option<EntityId> {
        if slot.0.get() <= self.len {
            Some(self.entity_ids[slot.as_usize()])
        } else {
            None
        }
    }

    /// Column for `component`, if stored here.
    #[inline]
    pub fn column(&self, component: ComponentTypeId) -> Option<&ComponentColumn> {
        let index = self.storage_indices.get(&component).copied()?;
        Some(&self.columns[index])
    }

    /// Iterates the columns in layout order.
    #[inline]
    pub fn columns(&self) -> impl Iterator<Item = &ComponentColumn> + '_ {
        self.columns.iter()
    }

    /// Raw bytes of the live values of `component` (`len * type_size` bytes).
    ///
    /// The column stays read-borrowed while the view lives.
    ///
    /// ## Panics
    /// Panics if a checked query writes the column.
    pub fn component_storage_raw(&self, component: ComponentTypeId) -> Option<ColumnRef<'_, [u8]>> {
        let column = self.column(component)?;
        let stride = column.stride();
        let bytes = &column.data[stride..stride * (self.len as usize + 1)];
        Some(ColumnRef::from_acquired(bytes, column.acquire_read()))
    }

    /// Mutable raw bytes of the live values of `component`.
    pub fn component_storage_mut_raw(&mut self, component: ComponentTypeId) -> Option<&mut [u8]> {
        let index = self.storage_indices.get(&component).copied()?;
        let end = self.len as usize + 1;
        let column = &mut self.columns[index];
        let stride = column.stride();
        Some(&mut column.data[stride..stride * end])
    }

    fn typed_column<T: 'static>(&self) -> Option<&ComponentColumn> {
        let column = self.column(ComponentTypeId::of::<T>())?;
        assert_eq!(
            column.description.type_size,
            std::mem::size_of::<T>(),
            "column `{}` does not hold values of `{}`",
            column.description.type_name,
            std::any::type_name::<T>()
        );
        Some(column)
    }

    /// Live values of component `T`, in slot order.
    ///
    /// The column stays read-borrowed while the view lives.
    ///
    /// ## Panics
    /// Panics if a checked query writes the column.
    pub fn component_slice<T: 'static>(&self) -> Option<ColumnRef<'_, [T]>> {
        let column = self.typed_column::<T>()?;
        let borrow = column.acquire_read();
        let base = typed_ptr::<T>(column.slot_ptr(1));
        // SAFETY: slots `1..=len` hold initialized values of `T` and the base
        // is aligned (page-aligned column, stride a multiple of the alignment).
        // No checked writer exists while `borrow` is held.
        let values = unsafe { slice::from_raw_parts(base, self.len as usize) };
        Some(ColumnRef::from_acquired(values, borrow))
    }

    /// Mutable live values of component `T`, in slot order.
    pub fn component_slice_mut<T: 'static>(&mut self) -> Option<&mut [T]> {
        let column = self.typed_column::<T>()?;
        let base = typed_ptr::<T>(column.slot_ptr(1));
        // SAFETY: as in `component_slice`, with exclusive access via `&mut self`.
        Some(unsafe { slice::from_raw_parts_mut(base, self.len as usize) })
    }

    /// Pointer to the value of `component` in `slot`.
    ///
    /// Returns `None` if the type is not stored here. The pointer is only
    /// meaningful for live slots.
    #[inline]
    pub fn component_ptr(&self, slot: ArchetypeEntityIndex, component: ComponentTypeId) -> Option<NonNull<u8>> {
        let column = self.column(component)?;
        NonNull::new(column.slot_ptr(slot.as_usize()))
    }

    /// Appends `count` zeroed slots and returns the first of them.
    ///
    /// The new slots occupy `base..base + count`. Their bytes are placeholders
    /// the caller must overwrite, and their entity ids are null until set.
    ///
    /// ## Panics
    /// Panics if the archetype would exceed its capacity.

    pub fn allocate_entities(&mut self, count: u32) -> ArchetypeEntityIndex {
        let new_len = match self.len.checked_add(count) {
            Some(new_len) if new_len <= self.capacity => new_len,
            _ => panic!(
                "archetype {:?} capacity exceeded: {} live + {} new > {}",
                self.entity_layout, self.len, count, self.capacity
            ),
        };

        let slots = new_len as usize + 1;
        self.entity_ids.resize(slots, EntityId::null());
        for column in &mut self.columns {
            let bytes = slots * column.stride();
            column.data.resize(bytes, 0u8);
        }

        let base = self.len + 1;
        self.len = new_len;
        ArchetypeEntityIndex::new(base).unwrap_or_else(ArchetypeEntityIndex::first)
    }

    /// Records `id` as the owner of `slot`.
    #[inline]
    pub fn set_entity_id(&mut self, slot: ArchetypeEntityIndex, id: EntityId) {
        self.entity_ids[slot.as_usize()] = id;
    }

    /// Copies every column of `source` into slots starting at `base`.
    ///
    /// `source` must have this archetype's layout and `base..base + count`
    /// must have been allocated. The values are moved: the source must not
    /// drop them afterwards.

    pub fn copy_from_source<S: ComponentSource + ?Sized>(&mut self, base: ArchetypeEntityIndex, source: &S) {
        debug_assert_eq!(source.entity_layout(), &*self.entity_layout);

        for component in source.entity_layout().iter() {
            let bytes = source.data_for(component);
            let index = self.storage_indices[&component];
            let column = &mut self.columns[index];
            let start = base.as_usize() * column.stride();
            column.data[start..start + bytes.len()].copy_from_slice(bytes);
        }
    }

    /// Overwrites the value of `component` in `slot` with `data`.
    ///
    /// ## Panics
    /// Panics if `component` is not stored here or `data` has the wrong size.
    ///
    /// ## Safety
    /// `data` must be a valid value of the component type. Whatever was in the
    /// slot is overwritten without being dropped.

    pub unsafe fn copy_component_data_into_slot(
        &mut self,
        slot: ArchetypeEntityIndex,
        component: ComponentTypeId,
        data: &[u8],
    ) {
        let index = match self.storage_indices.get(&component) {
            Some(&index) => index,
            None => panic!("component type {component} is not stored in archetype {:?}", self.entity_layout),
        };
        let column = &mut self.columns[index];
        let stride = column.stride();
        let start = slot.as_usize() * stride;
        column.data[start..start + stride].copy_from_slice(data);
    }

    /// Drops the value of `component` in `slot`. Does nothing if the type is
    /// not stored here.
    ///
    /// ## Safety
    /// `slot` must be live and its value must not be used or dropped again.

    pub unsafe fn drop_component_in_slot(&mut self, slot: ArchetypeEntityIndex, component: ComponentTypeId) {
        if let Some(&index) = self.storage_indices.get(&component) {
            // SAFETY: forwarded to the caller.
            unsafe { self.columns[index].drop_in_slot(slot.as_usize()) }
        }
    }

    /// Allocates one slot and copies the shared components of `source`'s
    /// `slot` into it, along with the entity id.
    ///
    /// Components this archetype has but `source` lacks are left zeroed for
    /// the caller to fill. Nothing is dropped on either side.

    pub fn copy_from_archetype(&mut self, source: &Archetype, slot: ArchetypeEntityIndex) -> ArchetypeEntityIndex {
        let new_slot = self.allocate_entities(1);
        self.set_entity_id(new_slot, source.entity_ids[slot.as_usize()]);

        for column in &mut self.columns {
            let Some(from) = source.column(column.description.type_id) else {
                continue;
            };
            let stride = column.stride();
            let src = slot.as_usize() * stride;
            let dst = new_slot.as_usize() * stride;
            column.data[dst..dst + stride].copy_from_slice(&from.data[src..src + stride]);
        }

        new_slot
    }

    /// Swap-removes the entity in `slot`.
    ///
    /// The last entity is moved into `slot` and the tail slot is released.
    /// When `DROP` is true the removed entity's components are dropped;
    /// otherwise they are assumed to have been moved out already.
    ///
    /// Returns the id of the entity that now occupies `slot`, if one moved.
    /// The caller must update that entity's location.
    ///
    /// ## Panics
    /// Panics if `slot` is not live.

    pub fn remove_entity<const DROP: bool>(&mut self, slot: ArchetypeEntityIndex) -> Option<EntityId> {
        let index = slot.as_usize();
        let last = self.len as usize;
        assert!(index <= last, "archetype slot {index} is not live (len {last})");

        for column in &mut self.columns {
            if DROP {
                // SAFETY: `index` is live and is overwritten or released below.
                unsafe { column.drop_in_slot(index) };
            }
            let stride = column.stride();
            if index != last && stride != 0 {
                // SAFETY: both slots are live and distinct, so the ranges do
                // not overlap.
                unsafe {
                    ptr::copy_nonoverlapping(column.slot_ptr(last), column.slot_ptr(index), stride);
                }
            }
            column.data.truncate(last * stride);
        }

        self.entity_ids.swap_remove(index);
        self.len -= 1;

        (index != last).then(|| self.entity_ids[index])
    }

    #[inline]
    pub(crate) fn edge(&self, component: ComponentTypeId) -> ArchetypeEdge {
        self.edges.get(&component).copied().unwrap_or_default()
    }

    #[inline]
    pub(crate) fn edge_mut(&mut self, component: ComponentTypeId) -> &mut ArchetypeEdge {
        self.edges.entry(component).or_default()
    }
}

/// Reinterprets a column pointer as `*mut T`, substituting a dangling aligned
/// pointer for zero-sized types.
#[inline]
pub(crate) fn typed_ptr<T>(ptr: *mut u8) -> *mut T {
    if std::mem::size_of::<T>() == 0 {
        NonNull::<T>::dangling().as_ptr()
    } else {
        ptr.cast::<T>()
    }
}

impl Drop for Archetype {
    fn drop(&mut self) {
        let len = self.len as usize;
        for column in &mut self.columns {
            if column.description.fn_drop.is_none() {
                continue;
            }
            for slot in 1..=len {
                // SAFETY: slots `1..=len` are live and the archetype is going away.
                unsafe { column.drop_in_slot(slot) };
            }
        }
    }
}

impl std::fmt::Debug for Archetype {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Archetype")
            .field("layout", &self.entity_layout)
            .field("len", &self.len)
            .field("capacity", &self.capacity)
            .finish()
    }
}
