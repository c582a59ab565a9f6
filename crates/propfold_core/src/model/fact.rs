//! Fact domain model.
//!
//! # Responsibility
//! - Define the ledger entry shape: one typed statement about one entity.
//! - Name the reserved fact types that drive access, deletion and traversal.
//!
//! # Invariants
//! - A fact carries exactly one value from the `FactValue` union.
//! - Facts are never mutated by aggregation; `is_deleted` is the only
//!   lifecycle transition and it is a tombstone, not a removal.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier for a domain entity.
pub type EntityId = Uuid;

/// Ledger-assigned fact identifier; ascending ids define scan order.
pub type FactId = i64;

/// Text format for calendar-date values (`YYYY-MM-DD`).
pub const ISO_DATE_FORMAT: &str = "%Y-%m-%d";

/// Denormalized display-name fact type.
pub const TYPE_NAME: &str = "name";
/// Parent-reference fact type followed by graph traversal.
pub const TYPE_PARENT: &str = "_parent";
/// Entity-kind fact type used as traversal filter.
pub const TYPE_TYPE: &str = "_type";
/// Deletion marker; an active fact of this type removes the snapshot.
pub const TYPE_DELETED: &str = "_deleted";
/// Public-flag fact type; a true boolean grants the `public` sentinel.
pub const TYPE_PUBLIC: &str = "_public";
/// Fact types whose reference value contributes to the access list.
pub const ACCESS_TYPES: [&str; 4] = ["_viewer", "_expander", "_editor", "_owner"];

/// Closed tagged union of ledger value kinds.
///
/// Exactly one variant is persisted per fact; rows violating that are
/// rejected on read as invalid persisted data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactValue {
    String(String),
    Integer(i64),
    Decimal(f64),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
    Boolean(bool),
    Reference(EntityId),
    Formula(String),
}

impl FactValue {
    /// Returns the referenced entity when this value is a reference.
    pub fn reference(&self) -> Option<EntityId> {
        match self {
            Self::Reference(target) => Some(*target),
            _ => None,
        }
    }
}

/// One statement about an owning entity, as stored in the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub id: FactId,
    /// Owning entity reference.
    pub entity: EntityId,
    /// Fact type name; serialized as `type` to match the wire schema.
    #[serde(rename = "type")]
    pub kind: String,
    pub value: FactValue,
    /// Mirrors this fact's records into the snapshot `public` projection.
    pub is_public: bool,
    /// Soft-delete tombstone; deleted facts never contribute to a fold.
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    /// Ledger-only search text, stripped during aggregation.
    pub search_text: Option<String>,
}

impl Fact {
    /// Returns whether this fact participates in aggregation.
    pub fn is_active(&self) -> bool {
        !self.is_deleted
    }

    /// Returns whether this fact's type contributes to the access list.
    pub fn is_access_grant(&self) -> bool {
        ACCESS_TYPES.contains(&self.kind.as_str())
    }
}

/// Ledger entry before insertion; the id is assigned by storage.
#[derive(Debug, Clone, PartialEq)]
pub struct NewFact {
    pub entity: EntityId,
    pub kind: String,
    pub value: FactValue,
    pub is_public: bool,
    pub search_text: Option<String>,
}

impl NewFact {
    pub fn new(entity: EntityId, kind: impl Into<String>, value: FactValue) -> Self {
        Self {
            entity,
            kind: kind.into(),
            value,
            is_public: false,
            search_text: None,
        }
    }

    /// Marks the fact for the public snapshot projection.
    pub fn public(mut self) -> Self {
        self.is_public = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::{FactValue, NewFact, ACCESS_TYPES, TYPE_PUBLIC};
    use uuid::Uuid;

    #[test]
    fn reference_accessor_only_matches_reference_values() {
        let target = Uuid::new_v4();
        assert_eq!(FactValue::Reference(target).reference(), Some(target));
        assert_eq!(FactValue::String("x".to_string()).reference(), None);
    }

    #[test]
    fn access_types_exclude_public_flag() {
        assert!(!ACCESS_TYPES.contains(&TYPE_PUBLIC));
    }

    #[test]
    fn new_fact_defaults_to_private_projection() {
        let fact = NewFact::new(Uuid::new_v4(), "name", FactValue::String("a".to_string()));
        assert!(!fact.is_public);
        assert!(fact.public().is_public);
    }
}
