//! # Engine Module
//!
//! Internal storage engine implementation.
//!
//! This module contains all core building blocks:
//! - Identifiers and access sets
//! - Virtual-memory backed storage
//! - Component registry and layouts
//! - Entity slot allocation
//! - Archetypes
//! - Component sources and queries
//! - The world that ties them together
//!
//! Public API exposure is controlled by `lib.rs`.

pub mod types;
pub mod error;
pub mod storage;
pub mod component;
pub mod layout;
pub mod entity;
pub mod archetype;
pub mod borrow;
pub mod source;
pub mod query;
pub mod world;
