//! Inbound and outbound trigger messages.
//!
//! # Responsibility
//! - Define the transport-facing message shapes: aggregation triggers and
//!   the reserved health-check probe.
//!
//! # Invariants
//! - Outbound propagation triggers reuse the inbound `TriggerMessage` shape
//!   verbatim.
//! - Probes are acknowledged without touching storage.

use super::fact::EntityId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Request to re-aggregate one entity of one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerMessage {
    /// Tenant account name; resolves to an independent database.
    pub account: String,
    pub entity: EntityId,
    /// Source timestamp; triggers not newer than the snapshot's
    /// `aggregated` marker are skipped by the intake gate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dt: Option<DateTime<Utc>>,
}

impl TriggerMessage {
    pub fn new(account: impl Into<String>, entity: EntityId) -> Self {
        Self {
            account: account.into(),
            entity,
            dt: None,
        }
    }

    /// Attaches a source timestamp.
    pub fn at(mut self, dt: DateTime<Utc>) -> Self {
        self.dt = Some(dt);
        self
    }
}

/// Everything the intake accepts from the transport.
///
/// A probe carries only its scheduler source; an aggregation trigger carries
/// account and entity, so untagged deserialization is unambiguous.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IntakeMessage {
    Probe { source: String },
    Aggregate(TriggerMessage),
}
