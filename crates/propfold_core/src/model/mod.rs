//! Domain model for the fact ledger and entity snapshots.
//!
//! # Responsibility
//! - Define the canonical data structures shared by fold, formula and
//!   propagation logic.
//! - Keep one typed shape for ledger values instead of ad hoc field probing.
//!
//! # Invariants
//! - Every entity is identified by a stable `EntityId`.
//! - Facts are immutable once written; deletion is a soft-delete tombstone.

pub mod fact;
pub mod snapshot;
pub mod trigger;
