//! Entity snapshot contracts and SQLite implementation.
//!
//! # Responsibility
//! - Serve the intake-gate projection (aggregated marker + cached name
//!   records) and the cached name lookup used by reference expansion.
//! - Replace and delete snapshot rows wholesale.
//!
//! # Invariants
//! - `replace_snapshot` is a full overwrite, never a merge; last writer
//!   wins, no compare-and-swap.
//! - JSON columns round-trip through the wire-schema record shapes.

use crate::model::fact::{EntityId, TYPE_NAME};
use crate::model::snapshot::{EntitySnapshot, Grantee, ValueRecord};
use crate::repo::{parse_entity_id, parse_utc, RepoError, RepoResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;

/// Intake-gate projection of one snapshot row.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityHead {
    pub aggregated: Option<DateTime<Utc>>,
    /// Cached denormalized name records at the time of the last fold.
    pub name_records: Vec<ValueRecord>,
}

/// Snapshot storage contract.
pub trait EntityRepository {
    /// Loads the gate projection; `None` when no snapshot row exists.
    fn load_head(&self, id: EntityId) -> RepoResult<Option<EntityHead>>;
    /// Loads the cached name records of a referenced entity.
    ///
    /// Missing entity, missing name entry and empty entry all read as an
    /// empty list; reference expansion falls back to the raw id string.
    fn load_name_records(&self, id: EntityId) -> RepoResult<Vec<ValueRecord>>;
    /// Loads a full snapshot; `None` when no row exists.
    fn load_snapshot(&self, id: EntityId) -> RepoResult<Option<EntitySnapshot>>;
    /// Replaces (or creates) the snapshot row wholesale.
    fn replace_snapshot(&self, snapshot: &EntitySnapshot) -> RepoResult<()>;
    /// Removes the snapshot row; a no-op when none exists.
    fn delete_snapshot(&self, id: EntityId) -> RepoResult<()>;
}

/// SQLite-backed snapshot storage.
pub struct SqliteEntityRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteEntityRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl EntityRepository for SqliteEntityRepository<'_> {
    fn load_head(&self, id: EntityId) -> RepoResult<Option<EntityHead>> {
        let row = self
            .conn
            .query_row(
                "SELECT aggregated, private FROM entities WHERE uuid = ?1;",
                [id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, String>(1)?,
                    ))
                },
            )
            .optional()?;

        let Some((aggregated_text, private_json)) = row else {
            return Ok(None);
        };

        let aggregated = aggregated_text
            .map(|text| parse_utc(&text, "entities.aggregated"))
            .transpose()?;
        let mut private = parse_records_map(&private_json)?;

        Ok(Some(EntityHead {
            aggregated,
            name_records: private.remove(TYPE_NAME).unwrap_or_default(),
        }))
    }

    fn load_name_records(&self, id: EntityId) -> RepoResult<Vec<ValueRecord>> {
        Ok(self
            .load_head(id)?
            .map(|head| head.name_records)
            .unwrap_or_default())
    }

    fn load_snapshot(&self, id: EntityId) -> RepoResult<Option<EntitySnapshot>> {
        let row = self
            .conn
            .query_row(
                "SELECT uuid, aggregated, access, private, public
                 FROM entities WHERE uuid = ?1;",
                [id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;

        let Some((uuid_text, aggregated_text, access_json, private_json, public_json)) = row
        else {
            return Ok(None);
        };

        let aggregated_text = aggregated_text.ok_or_else(|| {
            RepoError::InvalidData(format!("snapshot {uuid_text} has no aggregated marker"))
        })?;

        Ok(Some(EntitySnapshot {
            id: parse_entity_id(&uuid_text, "entities.uuid")?,
            aggregated: parse_utc(&aggregated_text, "entities.aggregated")?,
            access: parse_access(&access_json)?,
            private: parse_records_map(&private_json)?,
            public: parse_records_map(&public_json)?,
        }))
    }

    fn replace_snapshot(&self, snapshot: &EntitySnapshot) -> RepoResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO entities (uuid, aggregated, access, private, public)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                snapshot.id.to_string(),
                snapshot.aggregated.to_rfc3339(),
                to_json(&snapshot.access)?,
                to_json(&snapshot.private)?,
                to_json(&snapshot.public)?,
            ],
        )?;

        Ok(())
    }

    fn delete_snapshot(&self, id: EntityId) -> RepoResult<()> {
        self.conn
            .execute("DELETE FROM entities WHERE uuid = ?1;", [id.to_string()])?;

        Ok(())
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> RepoResult<String> {
    serde_json::to_string(value)
        .map_err(|err| RepoError::InvalidData(format!("snapshot serialization failed: {err}")))
}

fn parse_records_map(json: &str) -> RepoResult<BTreeMap<String, Vec<ValueRecord>>> {
    serde_json::from_str(json)
        .map_err(|err| RepoError::InvalidData(format!("invalid snapshot records column: {err}")))
}

fn parse_access(json: &str) -> RepoResult<Vec<Grantee>> {
    serde_json::from_str(json)
        .map_err(|err| RepoError::InvalidData(format!("invalid snapshot access column: {err}")))
}
