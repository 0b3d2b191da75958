//! Bulk component input for [`crate::World::extend`].
//!
//! A [`ComponentSource`] presents a batch of entities as one byte column per
//! component type, all of the same length. The world copies those bytes
//! straight into an archetype and then tells the source that the values have
//! been moved, so they are never dropped twice.
//!
//! ## Accepted inputs
//!
//! Anything implementing [`IntoComponentSource`]:
//!
//! - tuples of one to twelve `Vec<T>`, e.g. `(positions, scales)`,
//! - tuples of one to twelve arrays `[T; N]` with a shared `N`,
//! - a [`ComponentBatch`] assembled at runtime, column by column.
//!
//! All columns of one source must have the same length and name distinct
//! component types; both conditions panic otherwise.

use std::mem;
use std::slice;

use crate::engine::component::Component;
use crate::engine::layout::{EntityLayout, EntityLayoutBuf};
use crate::engine::types::ComponentTypeId;

/// Batch of component columns ready to be moved into an archetype.
///
/// ## Safety
/// * `data_for(c)` must return exactly `count() * size_of(c)` bytes holding
///   initialized, properly aligned values of `c` for every `c` in
///   `entity_layout()`.
/// * After [`ComponentSource::mark_moved`] the source must not drop, read or
///   hand out those values again.

pub unsafe trait ComponentSource {
    /// Component types supplied by the batch.
    fn entity_layout(&self) -> &EntityLayout;

    /// Raw bytes of the column for `component`.
    ///
    /// ## Panics
    /// May panic if `component` is not part of the layout.
    fn data_for(&self, component: ComponentTypeId) -> &[u8];

    /// Number of entities in the batch.
    fn count(&self) -> u32;

    /// Called once the world owns the values; the source must forget them.
    fn mark_moved(&mut self);
}

/// Conversion into a [`ComponentSource`].
pub trait IntoComponentSource {
    /// Source produced by the conversion.
    type Source: ComponentSource;

    /// Performs the conversion.
    fn into_component_source(self) -> Self::Source;
}

trait ErasedColumn: Send + Sync {
    fn len(&self) -> usize;
    fn bytes(&self) -> &[u8];
    fn forget_values(&mut self);
}

impl<T: Component> ErasedColumn for Vec<T> {
    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn bytes(&self) -> &[u8] {
        // SAFETY: the vector's first `len` elements are initialized; viewing
        // them as bytes is only used for a bitwise move into storage.
        unsafe { slice::from_raw_parts(self.as_ptr().cast::<u8>(), Vec::len(self) * mem::size_of::<T>()) }
    }

    fn forget_values(&mut self) {
        // SAFETY: the values now live in archetype storage. Shrinking the
        // length to zero releases the allocation without dropping them.
        unsafe { self.set_len(0) }
    }
}

/// Runtime-assembled set of equally long component columns.
///
/// ```ignore
/// let batch = ComponentBatch::new()
///     .with(vec![Position(1.0, 2.0), Position(3.0, 4.0)])
///     .with(vec![Scale(5.0, 6.0), Scale(7.0, 8.0)]);
/// let ids = world.extend(batch);
/// ```
///
/// Values still owned by the batch when it is dropped are dropped normally.

#[derive(Default)]
pub struct ComponentBatch {
    layout: EntityLayoutBuf,
    count: Option<u32>,
    /// Index-aligned with `layout`.
    columns: Vec<Box<dyn ErasedColumn>>,
}

impl ComponentBatch {
    /// Creates an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a column, builder style.
    pub fn with<T: Component>(mut self, values: Vec<T>) -> Self {
        self.push(values);
        self
    }

    /// Adds a column.
    ///
    /// ## Panics
    /// Panics if `T` already has a column, or if `values` differs in length
    /// from the columns added before it.

    pub fn push<T: Component>(&mut self, values: Vec<T>) {
        let len = values.len();
        assert!(
            len < (u32::MAX - 1) as usize,
            "component batch of {len} entities is too large"
        );
        match self.count {
            Some(count) => assert_eq!(
                count as usize,
                len,
                "column `{}` has {len} values but the batch has {count} entities",
                std::any::type_name::<T>()
            ),
            None => self.count = Some(len as u32),
        }

        let id = ComponentTypeId::of::<T>();
        if self.layout.add_component_type(id) {
            panic!("component `{}` appears twice in one batch", std::any::type_name::<T>());
        }
        let at = self.layout.index_of_component_type(id).unwrap_or(self.columns.len());
        self.columns.insert(at, Box::new(values));
    }

    /// Number of entities in the batch.
    #[inline]
    pub fn len(&self) -> u32 {
        self.count.unwrap_or(0)
    }

    /// Returns `true` if the batch has no entities.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// SAFETY: every column is a `Vec<T>` whose bytes are exposed unchanged, and
// `mark_moved` forgets all of them.
unsafe impl ComponentSource for ComponentBatch {
    #[inline]
    fn entity_layout(&self) -> &EntityLayout {
        &self.layout
    }

    fn data_for(&self, component: ComponentTypeId) -> &[u8] {
        match self.layout.index_of_component_type(component) {
            Some(index) => self.columns[index].bytes(),
            None => panic!("component type {component} is not part of this batch"),
        }
    }

    #[inline]
    fn count(&self) -> u32 {
        self.len()
    }

    fn mark_moved(&mut self) {
        for column in &mut self.columns {
            column.forget_values();
        }
    }
}

impl IntoComponentSource for ComponentBatch {
    type Source = ComponentBatch;

    #[inline]
    fn into_component_source(self) -> ComponentBatch {
        self
    }
}

macro_rules! impl_into_component_source {
    ($($name:ident),+) => {
        #[allow(non_snake_case)]
        impl<$($name: Component),+> IntoComponentSource for ($(Vec<$name>,)+) {
            type Source = ComponentBatch;

            fn into_component_source(self) -> ComponentBatch {
                let ($($name,)+) = self;
                let mut batch = ComponentBatch::new();
                $( batch.push($name); )+
                batch
            }
        }

        #[allow(non_snake_case)]
        impl<$($name: Component),+, const N: usize> IntoComponentSource for ($([$name; N],)+) {
            type Source = ComponentBatch;

            fn into_component_source(self) -> ComponentBatch {
                let ($($name,)+) = self;
                let mut batch = ComponentBatch::new();
                $( batch.push(Vec::from($name)); )+
                batch
            }
        }
    };
}

impl_into_component_source!(A);
impl_into_component_source!(A, B);
impl_into_component_source!(A, B, C);
impl_into_component_source!(A, B, C, D);
impl_into_component_source!(A, B, C, D, E);
impl_into_component_source!(A, B, C, D, E, F);
impl_into_component_source!(A, B, C, D, E, F, G);
impl_into_component_source!(A, B, C, D, E, F, G, H);
impl_into_component_source!(A, B, C, D, E, F, G, H, I);
impl_into_component_source!(A, B, C, D, E, F, G, H, I, J);
impl_into_component_source!(A, B, C, D, E, F, G, H, I, J, K);
impl_into_component_source!(A, B, C, D, E, F, G, H, I, J, K, L);
