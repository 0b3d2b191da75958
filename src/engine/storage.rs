//! Fixed-reservation growable arrays with a stable base address.
//!
//! This module implements [`VirtualVec<T>`], the storage primitive under every
//! column in the engine. It behaves like a `Vec<T>` whose capacity is fixed at
//! construction time:
//!
//! - `new(capacity)` reserves `capacity * size_of::<T>()` bytes of address
//!   space with an anonymous private memory map. No physical memory is
//!   committed up front; the operating system backs each page the first time
//!   it is touched, so resident memory tracks `len`, not `capacity`.
//! - The base pointer never changes for the lifetime of the value. Pointers
//!   and references into live elements stay valid across growth, which is
//!   what lets queries hand out column pointers while other columns grow.
//! - Growing past `capacity` **panics**. There is no reallocation path.
//!
//! # Invariants
//!
//! - `len <= capacity`.
//! - Elements `0..len` are initialized; everything past `len` is not.
//! - `ptr` is aligned for `T` (mappings are page aligned and the alignment of
//!   `T` is checked against [`PAGE_SIZE`]).
//! - When the reservation is zero bytes (`capacity == 0` or `T` is zero
//!   sized) no mapping exists and `ptr` is dangling.
//!
//! # Drop behaviour
//!
//! `truncate`, `resize` (when shrinking), `clear` and `Drop` run element
//! destructors for the vacated slots when `T` needs drop. The mapping is
//! released after the elements have been dropped.

use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::ops::{Deref, DerefMut};
use std::ptr::{self, NonNull};
use std::slice;

use memmap2::{MmapMut, MmapOptions};

use crate::engine::error::ReservationError;

/// Alignment guaranteed by the reservation backing a [`VirtualVec`].
pub const PAGE_SIZE: usize = 4096;

/// Contiguous array over a fixed virtual-memory reservation.

pub struct VirtualVec<T> {
    /// Backing reservation, `None` for zero-byte reservations.
    reservation: Option<MmapMut>,

    /// Base pointer. Stable for the lifetime of the value.
    ptr: NonNull<T>,

    /// Number of initialized elements.
    len: usize,

    /// Maximum number of elements.
    capacity: usize,

    _marker: PhantomData<T>,
}

// SAFETY: `VirtualVec<T>` owns its elements exactly like `Vec<T>` does; the
// raw pointer is never shared outside of borrows of `self`.
unsafe impl<T: Send> Send for VirtualVec<T> {}
unsafe impl<T: Sync> Sync for VirtualVec<T> {}

impl<T> VirtualVec<T> {

    /// Reserves address space for `capacity` elements.
    ///
    /// ## Errors
    /// Returns [`ReservationError`] if the byte size overflows, if `T` needs
    /// an alignment larger than [`PAGE_SIZE`], or if the operating system
    /// refuses the mapping.

    pub fn new(capacity: usize) -> Result<Self, ReservationError> {
        if mem::align_of::<T>() > PAGE_SIZE {
            return Err(ReservationError {
                bytes: None,
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "element alignment exceeds the page size",
                ),
            });
        }

        let bytes = capacity
            .checked_mul(mem::size_of::<T>())
            .ok_or_else(ReservationError::overflow)?;

        if bytes == 0 {
            return Ok(Self {
                reservation: None,
                ptr: NonNull::dangling(),
                len: 0,
                capacity,
                _marker: PhantomData,
            });
        }

        let mut reservation = MmapOptions::new()
            .len(bytes)
            .map_anon()
            .map_err(|source| ReservationError { bytes: Some(bytes), source })?;

        let ptr = NonNull::new(reservation.as_mut_ptr().cast::<T>())
            .ok_or_else(|| ReservationError {
                bytes: Some(bytes),
                source: std::io::Error::new(std::io::ErrorKind::Other, "mapping returned a null address"),
            })?;

        Ok(Self {
            reservation: Some(reservation),
            ptr,
            len: 0,
            capacity,
            _marker: PhantomData,
        })
    }

    /// Number of initialized elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if there are no elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Maximum number of elements the reservation can hold.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Size of the address-space reservation in bytes.
    #[inline]
    pub fn reserved_bytes(&self) -> usize {
        self.reservation.as_ref().map_or(0, |r| r.len())
    }

    /// Base pointer of the array.
    #[inline]
    pub fn as_ptr(&self) -> *const T {
        self.ptr.as_ptr()
    }

    /// Mutable base pointer of the array.
    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut T {
        self.ptr.as_ptr()
    }

    /// Base pointer with write provenance, obtainable through a shared borrow.
    ///
    /// The elements live behind a raw pointer, not inside `self`, so writes
    /// through this pointer do not alias the shared borrow. Callers must make
    /// sure no other reference to the written elements is alive.
    #[inline]
    pub(crate) fn raw_ptr(&self) -> *mut T {
        self.ptr.as_ptr()
    }

    #[inline]
    fn assert_fits(&self, new_len: usize) {
        if new_len > self.capacity {
            panic!(
                "VirtualVec capacity exceeded: requested length {new_len}, capacity {}",
                self.capacity
            );
        }
    }

    /// Appends an element.
    ///
    /// ## Panics
    /// Panics if the vector is full.

    pub fn push(&mut self, value: T) {
        self.assert_fits(self.len + 1);
        // SAFETY: `len < capacity`, so the slot lies inside the reservation.
        unsafe { ptr::write(self.ptr.as_ptr().add(self.len), value) };
        self.len += 1;
    }

    /// Removes and returns the last element.
    pub fn pop(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        self.len -= 1;
        // SAFETY: the slot at the old `len - 1` was initialized and is now
        // outside the live range, so it is read exactly once.
        Some(unsafe { ptr::read(self.ptr.as_ptr().add(self.len)) })
    }

    /// Shortens the vector to `new_len`, dropping the vacated elements.
    ///
    /// Has no effect if `new_len >= len`.

    pub fn truncate(&mut self, new_len: usize) {
        if new_len >= self.len {
            return;
        }
        let tail_len = self.len - new_len;
        // Shrink first so a panicking destructor cannot cause a double drop.
        self.len = new_len;
        // SAFETY: `new_len..new_len + tail_len` were initialized and are no
        // longer reachable through `self`.
        unsafe {
            let tail = ptr::slice_from_raw_parts_mut(self.ptr.as_ptr().add(new_len), tail_len);
            ptr::drop_in_place(tail);
        }
    }

    /// Drops every element.
    #[inline]
    pub fn clear(&mut self) {
        self.truncate(0);
    }

    /// Removes the element at `index`, moving the last element into its place.
    ///
    /// ## Panics
    /// Panics if `index >= len`.

    pub fn swap_remove(&mut self, index: usize) -> T {
        let len = self.len;
        assert!(index < len, "swap_remove index {index} out of bounds (len {len})");
        // SAFETY: both `index` and `len - 1` are initialized. The removed
        // value is read out before the hole is refilled.
        unsafe {
            let base = self.ptr.as_ptr();
            let value = ptr::read(base.add(index));
            ptr::copy(base.add(len - 1), base.add(index), 1);
            self.len = len - 1;
            value
        }
    }

    /// Removes the element at `index`, shifting every later element down.
    ///
    /// ## Panics
    /// Panics if `index >= len`.

    pub fn remove(&mut self, index: usize) -> T {
        let len = self.len;
        assert!(index < len, "remove index {index} out of bounds (len {len})");
        // SAFETY: `index < len`; the shifted range stays inside the live range.
        unsafe {
            let at = self.ptr.as_ptr().add(index);
            let value = ptr::read(at);
            ptr::copy(at.add(1), at, len - index - 1);
            self.len = len - 1;
            value
        }
    }
}

impl<T: Clone> VirtualVec<T> {

    /// Resizes the vector in place, cloning `value` into new slots or dropping
    /// the vacated ones.
    ///
    /// ## Panics
    /// Panics if `new_len > capacity`.

    pub fn resize(&mut self, new_len: usize, value: T) {
        if new_len <= self.len {
            self.truncate(new_len);
            return;
        }
        self.assert_fits(new_len);
        for _ in self.len..new_len {
            // Capacity was checked for the whole range above.
            unsafe { ptr::write(self.ptr.as_ptr().add(self.len), value.clone()) };
            self.len += 1;
        }
    }

    /// Clones and appends every element of `values`.
    ///
    /// ## Panics
    /// Panics if the result would exceed the capacity.

    pub fn extend_from_slice(&mut self, values: &[T]) {
        self.assert_fits(self.len + values.len());
        for value in values {
            unsafe { ptr::write(self.ptr.as_ptr().add(self.len), value.clone()) };
            self.len += 1;
        }
    }
}

impl<T> Deref for VirtualVec<T> {
    type Target = [T];

    #[inline]
    fn deref(&self) -> &[T] {
        // SAFETY: `0..len` is initialized and `ptr` is aligned and non-null.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl<T> DerefMut for VirtualVec<T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut [T] {
        // SAFETY: as in `deref`, with exclusive access through `&mut self`.
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl<T> Extend<T> for VirtualVec<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for value in iter {
            self.push(value);
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for VirtualVec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<T> Drop for VirtualVec<T> {
    fn drop(&mut self) {
        // Elements first; the reservation field is unmapped afterwards.
        self.truncate(0);
    }
}
