//! Error types for storage construction and checked queries.
//!
//! Each recoverable failure mode of the engine is modelled by a small,
//! dedicated type carrying the values needed to act on it, and every such type
//! converts into the aggregate [`ECSError`] so higher-level code can bubble
//! failures with `?`.
//!
//! ## Recoverable vs. fatal
//! Only construction-time failures and checked-query conflicts are surfaced as
//! values:
//! * [`InvalidCapacityError`]: a capacity of zero, or one that cannot be
//!   addressed because slot `0` is reserved.
//! * [`ReservationError`]: the operating system refused the address-space
//!   reservation backing a column.
//! * [`AccessConflictError`]: a checked query overlaps the access of a query
//!   that is still alive.
//!
//! Everything else the engine treats as a programming error and panics:
//! using an unregistered component type, exceeding a fixed capacity, or (from
//! [`crate::World::query_checked`]) an access conflict. Stale entity ids are not
//! errors at all; lookups simply return `None` or `false`.
//!
//! ## Display vs. Debug
//! * [`fmt::Display`] is short and meant for logs and panic messages.
//! * [`fmt::Debug`] (derived) keeps the full structure.

use std::error::Error;
use std::fmt;
use std::io;

use crate::engine::types::{AccessMode, ArchetypeIndex, ComponentTypeId};

/// Returned when a requested capacity cannot be honoured.
///
/// ### Fields
/// * `what` names the container being configured.
/// * `requested` is the capacity that was asked for.
/// * `max` is the largest accepted capacity (inclusive).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidCapacityError {

    /// Container being configured (`"entity"`, `"archetype"`).
    pub what: &'static str,

    /// Capacity that was asked for.
    pub requested: u64,

    /// Largest capacity accepted.
    pub max: u64,
}

impl fmt::Display for InvalidCapacityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.requested == 0 {
            write!(f, "{} capacity must be non-zero", self.what)
        } else {
            write!(
                f,
                "{} capacity {} exceeds the maximum of {}",
                self.what, self.requested, self.max
            )
        }
    }
}

impl Error for InvalidCapacityError {}

/// Returned when the address-space reservation for a [`crate::VirtualVec`]
/// cannot be made.
///
/// `bytes` is `None` when the requested byte size itself overflowed `usize`.

#[derive(Debug)]
pub struct ReservationError {

    /// Number of bytes that were requested, if representable.
    pub bytes: Option<usize>,

    /// Underlying operating system error.
    pub source: io::Error,
}

impl ReservationError {
    pub(crate) fn overflow() -> Self {
        Self {
            bytes: None,
            source: io::Error::new(io::ErrorKind::InvalidInput, "reservation size overflows usize"),
        }
    }
}

impl fmt::Display for ReservationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.bytes {
            Some(bytes) => write!(f, "failed to reserve {bytes} bytes of address space: {}", self.source),
            None => write!(f, "failed to reserve address space: {}", self.source),
        }
    }
}

impl Error for ReservationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.source)
    }
}

/// Returned when a checked query would alias the columns borrowed by another
/// live checked query.
///
/// ### Fields
/// * `component` / `component_name` identify the contested column.
/// * `archetype` is the first archetype where the overlap was found.
/// * `requested` is the mode the new query asked for; `held` is the mode
///   already holding the column.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessConflictError {

    /// Contested component type.
    pub component: ComponentTypeId,

    /// Human readable name of the contested component type.
    pub component_name: &'static str,

    /// Archetype in which the conflict was detected.
    pub archetype: ArchetypeIndex,

    /// Mode requested by the rejected query.
    pub requested: AccessMode,

    /// Mode currently held on the column.
    pub held: AccessMode,
}

impl fmt::Display for AccessConflictError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "checked query requested {} access to `{}` in archetype {} while {} access is held",
            self.requested, self.component_name, self.archetype, self.held
        )
    }
}

impl Error for AccessConflictError {}

/// Aggregate error for engine operations that report failures as values.

#[derive(Debug)]
pub enum ECSError {

    /// A capacity was zero or too large.
    InvalidCapacity(InvalidCapacityError),

    /// Address-space reservation failed.
    Reservation(ReservationError),

    /// A checked query conflicted with a live one.
    AccessConflict(AccessConflictError),
}

impl fmt::Display for ECSError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ECSError::InvalidCapacity(e) => write!(f, "{e}"),
            ECSError::Reservation(e) => write!(f, "{e}"),
            ECSError::AccessConflict(e) => write!(f, "{e}"),
        }
    }
}

impl Error for ECSError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ECSError::InvalidCapacity(e) => Some(e),
            ECSError::Reservation(e) => Some(e),
            ECSError::AccessConflict(e) => Some(e),
        }
    }
}

impl From<InvalidCapacityError> for ECSError {
    fn from(e: InvalidCapacityError) -> Self { ECSError::InvalidCapacity(e) }
}
impl From<ReservationError> for ECSError {
    fn from(e: ReservationError) -> Self { ECSError::Reservation(e) }
}
impl From<AccessConflictError> for ECSError {
    fn from(e: AccessConflictError) -> Self { ECSError::AccessConflict(e) }
}

/// Result alias used by fallible engine operations.
pub type ECSResult<T> = Result<T, ECSError>;
