//! Entity snapshot model.
//!
//! # Responsibility
//! - Define the cached, query-ready state computed from one entity's active
//!   facts: access list, private records, public projection.
//! - Provide the value-record "bag" merged during fold, reference expansion
//!   and formula evaluation.
//!
//! # Invariants
//! - `aggregated` marks the most recent successful fold and only moves
//!   forward under the intake gate.
//! - `access` is append-only within one fold; duplicates are preserved.
//! - `public` holds a subset of `private`, keyed by the same type names.

use super::fact::{EntityId, FactValue, ISO_DATE_FORMAT, TYPE_NAME};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

/// One access-list entry: a grantee entity or the `public` sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Grantee {
    Entity(EntityId),
    Public,
}

impl Display for Grantee {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Entity(id) => write!(f, "{id}"),
            Self::Public => write!(f, "public"),
        }
    }
}

impl From<Grantee> for String {
    fn from(value: Grantee) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for Grantee {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value == "public" {
            return Ok(Self::Public);
        }
        EntityId::parse_str(&value)
            .map(Self::Entity)
            .map_err(|_| format!("invalid grantee `{value}`"))
    }
}

/// Open record of optional value fields, as stored in snapshot projections.
///
/// Fold steps merge into this bag: date normalization attaches a sortable
/// string, reference expansion overlays cached name fields, formula
/// evaluation adds its result next to the expression text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValueRecord {
    /// Entity identifier, set by `_id`-shaped field resolutions.
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub string: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integer: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decimal: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datetime: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boolean: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
}

impl ValueRecord {
    /// Builds the bare record for a ledger value, metadata stripped.
    pub fn from_value(value: &FactValue) -> Self {
        let mut record = Self::default();
        match value {
            FactValue::String(v) => record.string = Some(v.clone()),
            FactValue::Integer(v) => record.integer = Some(*v),
            FactValue::Decimal(v) => record.decimal = Some(*v),
            FactValue::Date(v) => record.date = Some(*v),
            FactValue::DateTime(v) => record.datetime = Some(*v),
            FactValue::Boolean(v) => record.boolean = Some(*v),
            FactValue::Reference(v) => record.reference = Some(*v),
            FactValue::Formula(v) => record.formula = Some(v.clone()),
        }
        record
    }

    pub fn of_string(value: impl Into<String>) -> Self {
        Self {
            string: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn of_decimal(value: f64) -> Self {
        Self {
            decimal: Some(value),
            ..Self::default()
        }
    }

    pub fn of_id(value: EntityId) -> Self {
        Self {
            id: Some(value),
            ..Self::default()
        }
    }

    /// Returns this record overlaid with `other`; fields set in `other` win.
    pub fn merged_with(&self, other: &Self) -> Self {
        Self {
            id: other.id.or(self.id),
            string: other.string.clone().or_else(|| self.string.clone()),
            integer: other.integer.or(self.integer),
            decimal: other.decimal.or(self.decimal),
            date: other.date.or(self.date),
            datetime: other.datetime.or(self.datetime),
            boolean: other.boolean.or(self.boolean),
            reference: other.reference.or(self.reference),
            formula: other.formula.clone().or_else(|| self.formula.clone()),
        }
    }

    /// Returns the `YYYY-MM-DD` text of the date field, when present.
    pub fn date_string(&self) -> Option<String> {
        self.date
            .map(|day| day.format(ISO_DATE_FORMAT).to_string())
    }
}

/// Extracts the display-name strings used for propagation comparison.
///
/// Records without a string field contribute an empty string, so positional
/// gaps still participate in the multiset comparison.
pub fn name_strings(records: &[ValueRecord]) -> Vec<String> {
    records
        .iter()
        .map(|record| record.string.clone().unwrap_or_default())
        .collect()
}

/// Cached, queryable state of one entity, replaced wholesale by each fold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub id: EntityId,
    /// Monotonic marker of the last successful fold.
    pub aggregated: DateTime<Utc>,
    /// Grantees derived from access facts; duplicates preserved.
    pub access: Vec<Grantee>,
    /// Records per fact type, in ascending fact-id scan order.
    pub private: BTreeMap<String, Vec<ValueRecord>>,
    /// Subset of `private` restricted to public-flagged facts.
    pub public: BTreeMap<String, Vec<ValueRecord>>,
}

impl EntitySnapshot {
    /// Creates an empty snapshot stamped with a fold timestamp.
    pub fn new(id: EntityId, aggregated: DateTime<Utc>) -> Self {
        Self {
            id,
            aggregated,
            access: Vec::new(),
            private: BTreeMap::new(),
            public: BTreeMap::new(),
        }
    }

    /// Returns the denormalized name strings of this snapshot.
    pub fn name_strings(&self) -> Vec<String> {
        self.private
            .get(TYPE_NAME)
            .map(|records| name_strings(records))
            .unwrap_or_default()
    }
}
