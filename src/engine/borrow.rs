//! # Column Borrow Tracking
//!
//! This module implements the **per-column read/write borrow state** behind
//! checked queries.
//!
//! ## Purpose
//!
//! Checked queries hand out `&T`/`&mut T` from a shared `&World`, so Rust's
//! static borrow checker cannot see that two of them touch the same column.
//! The rules are enforced at runtime instead, per archetype column:
//!
//! - Any number of queries may **read** a column concurrently.
//! - Only one query may **write** a column, and only while nobody reads it.
//!
//! Unlike a lock, acquisition never waits. A conflicting request fails
//! immediately so that the offending query is reported at construction.
//!
//! ## State Encoding
//!
//! Each column owns one `AtomicUsize`:
//!
//! | State | Meaning |
//! |------:|--------|
//! | `0` | Unborrowed |
//! | `1` | Write-borrowed (exclusive writer) |
//! | `>= 2` | Read-borrowed (`state - 1` active readers) |
//!
//! ## RAII Integration
//!
//! [`AccessGuard`] collects every column borrow taken for one query and
//! releases them when dropped, including on early abandonment of the query
//! and on partially failed acquisition. [`ColumnRef`] does the same for a
//! single read of raw column data.

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::engine::types::AccessMode;

const UNBORROWED: usize = 0;
const WRITING: usize = 1;

/// Runtime borrow state of one column.

#[derive(Debug, Default)]
pub struct ColumnBorrow {
    state: AtomicUsize,
}

impl ColumnBorrow {
    /// Creates an unborrowed state.
    pub const fn new() -> Self {
        Self { state: AtomicUsize::new(UNBORROWED) }
    }

    /// Tries to take a **shared (read) borrow**.
    ///
    /// ## State Transitions
    ///
    /// - `0 → 2` : first reader
    /// - `N → N+1` : additional reader
    /// - `1` : fails, a writer is present

    pub fn try_acquire_read(&self) -> bool {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if current == WRITING {
                return false;
            }
            let next = if current == UNBORROWED { 2 } else { current + 1 };
            match self.state.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Releases a shared borrow taken by [`ColumnBorrow::try_acquire_read`].
    ///
    /// The last reader returns the state straight to `0`, never passing
    /// through the writer encoding.

    pub fn release_read(&self) {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            debug_assert!(current >= 2, "release_read without a matching read borrow");
            let next = if current == 2 { UNBORROWED } else { current - 1 };
            match self.state.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    /// Tries to take an **exclusive (write) borrow**.
    ///
    /// ## State Transition
    ///
    /// - `0 → 1`, fails from any other state.

    pub fn try_acquire_write(&self) -> bool {
        self.state
            .compare_exchange(UNBORROWED, WRITING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Releases an exclusive borrow.
    pub fn release_write(&self) {
        let previous = self.state.swap(UNBORROWED, Ordering::AcqRel);
        debug_assert_eq!(previous, WRITING, "release_write without a matching write borrow");
    }

    /// Tries to take a borrow in `mode`.
    ///
    /// On failure returns the mode currently holding the column.
    pub fn try_acquire(&self, mode: AccessMode) -> Result<(), AccessMode> {
        let acquired = match mode {
            AccessMode::Read => self.try_acquire_read(),
            AccessMode::Write => self.try_acquire_write(),
        };
        if acquired {
            Ok(())
        } else {
            Err(self.held().unwrap_or(AccessMode::Write))
        }
    }

    /// Releases a borrow taken in `mode`.
    #[inline]
    pub fn release(&self, mode: AccessMode) {
        match mode {
            AccessMode::Read => self.release_read(),
            AccessMode::Write => self.release_write(),
        }
    }

    /// Mode currently holding the column, `None` when unborrowed.
    pub fn held(&self) -> Option<AccessMode> {
        match self.state.load(Ordering::Acquire) {
            UNBORROWED => None,
            WRITING => Some(AccessMode::Write),
            _ => Some(AccessMode::Read),
        }
    }

    /// Number of active readers.
    pub fn readers(&self) -> usize {
        match self.state.load(Ordering::Acquire) {
            UNBORROWED | WRITING => 0,
            n => n - 1,
        }
    }
}

/// RAII guard over a set of column borrows.
///
/// Borrows are pushed as they are acquired; dropping the guard releases them
/// in reverse order.

#[derive(Debug, Default)]
pub struct AccessGuard<'a> {
    held: Vec<(&'a ColumnBorrow, AccessMode)>,
}

impl<'a> AccessGuard<'a> {
    /// Creates a guard holding nothing.
    pub fn new() -> Self {
        Self { held: Vec::new() }
    }

    /// Acquires `column` in `mode` and records it for release.
    ///
    /// On failure nothing is recorded and the currently held mode is
    /// returned. Borrows acquired earlier stay held until the guard drops.
    pub fn acquire(&mut self, column: &'a ColumnBorrow, mode: AccessMode) -> Result<(), AccessMode> {
        column.try_acquire(mode)?;
        self.held.push((column, mode));
        Ok(())
    }

    /// Number of column borrows held.
    #[inline]
    pub fn len(&self) -> usize {
        self.held.len()
    }

    /// Returns `true` if no borrow is held.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }
}

impl Drop for AccessGuard<'_> {
    fn drop(&mut self) {
        for &(column, mode) in self.held.iter().rev() {
            column.release(mode);
        }
    }
}

/// Shared view of column data holding a read borrow until dropped.
///
/// Checked writers are rejected while any `ColumnRef` to their column lives.

pub struct ColumnRef<'a, T: ?Sized> {
    value: &'a T,
    borrow: &'a ColumnBorrow,
}

impl<'a, T: ?Sized> ColumnRef<'a, T> {
    /// Wraps `value`, taking over a read borrow already acquired on `borrow`.
    pub(crate) fn from_acquired(value: &'a T, borrow: &'a ColumnBorrow) -> Self {
        Self { value, borrow }
    }
}

impl<T: ?Sized> Deref for ColumnRef<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        self.value
    }
}

impl<T: ?Sized> Drop for ColumnRef<'_, T> {
    fn drop(&mut self) {
        self.borrow.release_read();
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for ColumnRef<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value.fmt(f)
    }
}
