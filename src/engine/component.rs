//! Component type metadata and the process-wide component registry.
//!
//! Columns in an archetype are untyped byte arrays. Everything the engine
//! needs to know about a component type to store, move and destroy values of
//! it lives in a [`ComponentTypeDescription`]:
//!
//! - size and alignment, used for column strides,
//! - an optional drop shim, invoked manually whenever a value leaves storage
//!   without being moved elsewhere.
//!
//! Descriptions are looked up by [`ComponentTypeId`] from a
//! [`ComponentRegistry`]. The engine keeps one process-wide registry,
//! populated by [`register_component`] before the type is first used in a
//! world. Building an archetype for an unregistered type is a programming
//! error and panics.
//!
//! ## Concurrency
//! The global registry sits behind an `RwLock`. Registration takes the write
//! lock; archetype construction takes the read lock. Neither happens on the
//! iteration path.

use std::any::type_name;
use std::collections::HashMap;
use std::mem;
use std::ptr::{self, NonNull};
use std::sync::{OnceLock, PoisonError, RwLock, RwLockReadGuard};

use tracing::debug;

use crate::engine::storage::PAGE_SIZE;
use crate::engine::types::ComponentTypeId;

/// Marker for types that can be stored as components.
///
/// Every `'static + Send + Sync` type qualifies; the bounds are what allow a
/// world to be shared across worker threads.
pub trait Component: 'static + Send + Sync {}

impl<T: 'static + Send + Sync> Component for T {}

/// Type-erased destructor for a single component value.
pub type DropFn = unsafe fn(*mut u8);

/// Runtime description of a component type.
///
/// ## Invariants
/// - `type_align` is a power of two no larger than [`PAGE_SIZE`].
/// - `type_size` is a multiple of `type_align`.
/// - `fn_drop`, when present, drops exactly one value of the described type
///   in place.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ComponentTypeDescription {

    /// Human readable type name, for diagnostics.
    pub type_name: &'static str,

    /// Identifier of the component type.
    pub type_id: ComponentTypeId,

    /// Size in bytes of one value (the column stride).
    pub type_size: usize,

    /// Alignment in bytes of one value.
    pub type_align: usize,

    /// Destructor shim, `None` for types without drop glue.
    pub fn_drop: Option<DropFn>,
}

unsafe fn drop_shim<T>(value: *mut u8) {
    let value = if mem::size_of::<T>() == 0 {
        NonNull::<T>::dangling().as_ptr()
    } else {
        value.cast::<T>()
    };
    // SAFETY: the caller guarantees `value` points at a live `T` that is not
    // used again.
    unsafe { ptr::drop_in_place(value) }
}

impl ComponentTypeDescription {
    /// Describes the Rust type `T`.
    pub fn of<T: Component>() -> Self {
        Self {
            type_name: type_name::<T>(),
            type_id: ComponentTypeId::of::<T>(),
            type_size: mem::size_of::<T>(),
            type_align: mem::align_of::<T>(),
            fn_drop: if mem::needs_drop::<T>() { Some(drop_shim::<T> as DropFn) } else { None },
        }
    }

    fn validate(&self) {
        assert!(
            self.type_align.is_power_of_two() && self.type_align <= PAGE_SIZE,
            "component `{}` has unsupported alignment {}",
            self.type_name,
            self.type_align
        );
        assert!(
            self.type_size % self.type_align == 0,
            "component `{}` size {} is not a multiple of its alignment {}",
            self.type_name,
            self.type_size,
            self.type_align
        );
    }
}

/// Map from component type identifiers to their descriptions.

#[derive(Debug, Default)]
pub struct ComponentRegistry {
    by_id: HashMap<ComponentTypeId, ComponentTypeDescription>,
}

impl ComponentRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the Rust type `T`, returning its description.
    ///
    /// Registering the same type again is a no-op.
    pub fn register<T: Component>(&mut self) -> ComponentTypeDescription {
        let description = ComponentTypeDescription::of::<T>();
        // SAFETY: the description was derived from `T` itself.
        unsafe { self.register_dynamic(&description) };
        description
    }

    /// Registers an arbitrary description.
    ///
    /// Returns `false` if the identifier was already registered, in which case
    /// the existing description is kept.
    ///
    /// ## Panics
    /// * The alignment is not a power of two, is larger than [`PAGE_SIZE`],
    ///   or does not divide the size.
    /// * The identifier is already registered with a different name, size or
    ///   alignment.
    ///
    /// ## Safety
    /// Size, alignment and drop shim must describe one and the same type, and
    /// every byte pattern later written under this id must be a valid value of
    /// it. Nothing here can verify that.

    pub unsafe fn register_dynamic(&mut self, description: &ComponentTypeDescription) -> bool {
        description.validate();
        if let Some(existing) = self.by_id.get(&description.type_id) {
            assert!(
                existing.type_name == description.type_name
                    && existing.type_size == description.type_size
                    && existing.type_align == description.type_align,
                "component id {} registered as `{}` ({} bytes, align {}) and again as `{}` ({} bytes, align {})",
                description.type_id,
                existing.type_name,
                existing.type_size,
                existing.type_align,
                description.type_name,
                description.type_size,
                description.type_align,
            );
            return false;
        }
        debug!(
            component = description.type_name,
            id = %description.type_id,
            size = description.type_size,
            align = description.type_align,
            "registered component type"
        );
        self.by_id.insert(description.type_id, *description);
        true
    }

    /// Looks up a description.
    #[inline]
    pub fn lookup(&self, id: ComponentTypeId) -> Option<&ComponentTypeDescription> {
        self.by_id.get(&id)
    }

    /// Returns `true` if `id` has been registered.
    #[inline]
    pub fn contains(&self, id: ComponentTypeId) -> bool {
        self.by_id.contains_key(&id)
    }

    /// Number of registered component types.
    #[inline]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Returns `true` if nothing is registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

static REGISTRY: OnceLock<RwLock<ComponentRegistry>> = OnceLock::new();

fn registry() -> &'static RwLock<ComponentRegistry> {
    REGISTRY.get_or_init(|| RwLock::new(ComponentRegistry::new()))
}

/// Registers `T` in the process-wide registry.
///
/// Must be called before `T` is used in any world. Repeated calls are cheap
/// and return the same description.

pub fn register_component<T: Component>() -> ComponentTypeDescription {
    registry().write().unwrap_or_else(PoisonError::into_inner).register::<T>()
}

/// Registers an arbitrary description in the process-wide registry.
///
/// ## Safety
/// See [`ComponentRegistry::register_dynamic`].
pub unsafe fn register_component_dynamic(description: &ComponentTypeDescription) -> bool {
    let mut registry = registry().write().unwrap_or_else(PoisonError::into_inner);
    // SAFETY: forwarded to the caller.
    unsafe { registry.register_dynamic(description) }
}

/// Returns the registered description for `id`, if any.
pub fn component_description(id: ComponentTypeId) -> Option<ComponentTypeDescription> {
    component_registry().lookup(id).copied()
}

/// Read access to the process-wide registry.
///
/// Holds the read lock until the guard is dropped; do not register
/// components while holding it.
pub fn component_registry() -> RwLockReadGuard<'static, ComponentRegistry> {
    registry().read().unwrap_or_else(PoisonError::into_inner)
}
