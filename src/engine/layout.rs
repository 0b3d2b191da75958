//! Canonical component-set keys for archetypes.
//!
//! An archetype is identified by the exact set of component types its
//! entities carry. [`EntityLayout`] is that set in canonical form: a slice of
//! [`ComponentTypeId`] that is strictly ascending (sorted, no duplicates), so
//! two layouts are equal exactly when they name the same types.
//!
//! The pair mirrors `Path`/`PathBuf`:
//!
//! - [`EntityLayout`] is an unsized borrowed view, cheap to pass around and
//!   usable as a `HashMap` lookup key.
//! - [`EntityLayoutBuf`] owns its storage and supports insertion and removal
//!   while keeping the canonical order.
//!
//! `EntityLayoutBuf: Borrow<EntityLayout>` with consistent `Hash`/`Eq`, so a
//! map keyed by `EntityLayoutBuf` can be probed with `&EntityLayout`.

use std::borrow::Borrow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;

use crate::engine::types::ComponentTypeId;

/// Borrowed, canonical set of component types.

#[repr(transparent)]
#[derive(PartialEq, Eq)]
pub struct EntityLayout {
    components: [ComponentTypeId],
}

impl EntityLayout {

    /// Wraps a slice without checking that it is canonical.
    ///
    /// ## Safety
    /// `components` must be strictly ascending. Lookups rely on binary search
    /// and return wrong answers otherwise.
    #[inline]
    pub unsafe fn from_inner_unchecked(components: &[ComponentTypeId]) -> &Self {
        // SAFETY: `EntityLayout` is a transparent wrapper around the slice.
        unsafe { &*(components as *const [ComponentTypeId] as *const EntityLayout) }
    }

    /// Wraps a slice, returning `None` unless it is strictly ascending.
    #[inline]
    pub fn from_inner(components: &[ComponentTypeId]) -> Option<&Self> {
        if components.windows(2).all(|w| w[0] < w[1]) {
            // SAFETY: checked just above.
            Some(unsafe { Self::from_inner_unchecked(components) })
        } else {
            None
        }
    }

    /// The layout with no components.
    #[inline]
    pub fn empty() -> &'static EntityLayout {
        static EMPTY: [ComponentTypeId; 0] = [];
        // SAFETY: an empty slice is trivially ascending.
        unsafe { Self::from_inner_unchecked(&EMPTY) }
    }

    /// Returns `true` if `id` is part of the layout.
    #[inline]
    pub fn contains_component_type(&self, id: ComponentTypeId) -> bool {
        self.components.binary_search(&id).is_ok()
    }

    /// Position of `id` in the canonical order.
    #[inline]
    pub fn index_of_component_type(&self, id: ComponentTypeId) -> Option<usize> {
        self.components.binary_search(&id).ok()
    }

    /// Number of component types.
    #[inline]
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Returns `true` for the empty layout.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Returns `true` if every type of `self` is also in `other`.
    ///
    /// Both sides are sorted, so this is a single merge pass.

    pub fn is_subset_of(&self, other: &EntityLayout) -> bool {
        let mut theirs = other.components.iter();
        'outer: for mine in &self.components {
            for candidate in theirs.by_ref() {
                if candidate == mine {
                    continue 'outer;
                }
                if candidate > mine {
                    return false;
                }
            }
            return false;
        }
        true
    }

    /// Returns `true` if `self` and `other` share no type.
    pub fn is_disjoint_from(&self, other: &EntityLayout) -> bool {
        self.iter().all(|id| !other.contains_component_type(id))
    }

    /// Iterates the component types in canonical order.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = ComponentTypeId> + '_ {
        self.components.iter().copied()
    }

    /// The underlying sorted slice.
    #[inline]
    pub fn as_slice(&self) -> &[ComponentTypeId] {
        &self.components
    }
}

impl Hash for EntityLayout {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.components.hash(state);
    }
}

impl fmt::Debug for EntityLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        for id in &self.components {
            list.entry(&format_args!("{id}"));
        }
        list.finish()
    }
}

impl ToOwned for EntityLayout {
    type Owned = EntityLayoutBuf;

    #[inline]
    fn to_owned(&self) -> EntityLayoutBuf {
        EntityLayoutBuf { components: self.components.to_vec() }
    }
}

/// Owned, canonical set of component types.

#[derive(Clone, Default)]
pub struct EntityLayoutBuf {
    components: Vec<ComponentTypeId>,
}

impl EntityLayoutBuf {
    /// Creates an empty layout.
    #[inline]
    pub const fn new() -> Self {
        Self { components: Vec::new() }
    }

    /// Creates an empty layout with room for `capacity` types.
    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Self { components: Vec::with_capacity(capacity) }
    }

    /// Inserts `id` at its sorted position.
    ///
    /// Returns `true` if `id` was **already present**, in which case the
    /// layout is unchanged.
    #[inline]
    pub fn add_component_type(&mut self, id: ComponentTypeId) -> bool {
        match self.components.binary_search(&id) {
            Ok(_) => true,
            Err(at) => {
                self.components.insert(at, id);
                false
            }
        }
    }

    /// Removes `id`, returning `true` if it was present.
    #[inline]
    pub fn remove_component_type(&mut self, id: ComponentTypeId) -> bool {
        match self.components.binary_search(&id) {
            Ok(at) => {
                self.components.remove(at);
                true
            }
            Err(_) => false,
        }
    }

    /// Removes every type.
    #[inline]
    pub fn clear(&mut self) {
        self.components.clear();
    }
}

impl Deref for EntityLayoutBuf {
    type Target = EntityLayout;

    #[inline]
    fn deref(&self) -> &EntityLayout {
        // SAFETY: every mutation path keeps `components` strictly ascending.
        unsafe { EntityLayout::from_inner_unchecked(&self.components) }
    }
}

impl AsRef<EntityLayout> for EntityLayoutBuf {
    #[inline]
    fn as_ref(&self) -> &EntityLayout {
        self
    }
}

impl Borrow<EntityLayout> for EntityLayoutBuf {
    #[inline]
    fn borrow(&self) -> &EntityLayout {
        self
    }
}

impl PartialEq for EntityLayoutBuf {
    fn eq(&self, other: &Self) -> bool {
        **self == **other
    }
}

impl Eq for EntityLayoutBuf {}

impl Hash for EntityLayoutBuf {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (**self).hash(state);
    }
}

impl fmt::Debug for EntityLayoutBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

impl FromIterator<ComponentTypeId> for EntityLayoutBuf {
    fn from_iter<I: IntoIterator<Item = ComponentTypeId>>(iter: I) -> Self {
        let mut components: Vec<ComponentTypeId> = iter.into_iter().collect();
        components.sort_unstable();
        components.dedup();
        Self { components }
    }
}

impl IntoIterator for EntityLayoutBuf {
    type Item = ComponentTypeId;
    type IntoIter = std::vec::IntoIter<ComponentTypeId>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.components.into_iter()
    }
}
