//! One-hop graph traversal over the reference graph.
//!
//! # Responsibility
//! - Resolve parent/child queries for formula field references: ids of
//!   linked entities and their active facts of a property type.
//!
//! # Invariants
//! - Traversal follows active `_parent` reference facts only; kind filters
//!   match the linked entity's active `_type` string fact.
//! - Exactly one hop; multi-hop consistency comes from repeated propagation
//!   triggers, never from recursive traversal here.

use crate::model::fact::{EntityId, TYPE_PARENT, TYPE_TYPE};
use crate::model::snapshot::ValueRecord;
use crate::repo::fact_repo::{parse_fact_row, FACT_SELECT_SQL};
use crate::repo::{parse_entity_id, RepoResult};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};

/// One-hop query contract used by the formula evaluator.
pub trait GraphResolver {
    /// Active string-valued facts of `kind` on the entity itself,
    /// fact-id ascending.
    fn own_string_records(&self, entity: EntityId, kind: &str) -> RepoResult<Vec<ValueRecord>>;
    /// Distinct entities whose active `_parent` fact references `entity`,
    /// optionally filtered by the child's `_type` fact.
    fn child_ids(&self, entity: EntityId, kind_filter: Option<&str>)
        -> RepoResult<Vec<EntityId>>;
    /// Active facts of `property` on each matching child.
    fn child_records(
        &self,
        entity: EntityId,
        kind_filter: Option<&str>,
        property: &str,
    ) -> RepoResult<Vec<ValueRecord>>;
    /// Targets of the entity's own active `_parent` reference facts,
    /// fact-id ascending, optionally filtered by the parent's `_type` fact.
    fn parent_ids(
        &self,
        entity: EntityId,
        kind_filter: Option<&str>,
    ) -> RepoResult<Vec<EntityId>>;
    /// Active facts of `property` on each matching parent.
    fn parent_records(
        &self,
        entity: EntityId,
        kind_filter: Option<&str>,
        property: &str,
    ) -> RepoResult<Vec<ValueRecord>>;
}

/// SQLite-backed traversal over the fact ledger.
pub struct SqliteGraphResolver<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteGraphResolver<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn query_entity_ids(&self, sql: &str, binds: Vec<Value>) -> RepoResult<Vec<EntityId>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params_from_iter(binds))?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next()? {
            let text: String = row.get(0)?;
            ids.push(parse_entity_id(&text, "facts traversal")?);
        }
        Ok(ids)
    }

    fn query_value_records(&self, sql: &str, binds: Vec<Value>) -> RepoResult<Vec<ValueRecord>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params_from_iter(binds))?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let fact = parse_fact_row(row)?;
            records.push(ValueRecord::from_value(&fact.value));
        }
        Ok(records)
    }
}

impl GraphResolver for SqliteGraphResolver<'_> {
    fn own_string_records(&self, entity: EntityId, kind: &str) -> RepoResult<Vec<ValueRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT value_string FROM facts
             WHERE entity = ?1
               AND type = ?2
               AND value_string IS NOT NULL
               AND is_deleted = 0
             ORDER BY id ASC;",
        )?;

        let mut rows = stmt.query(rusqlite::params![entity.to_string(), kind])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(ValueRecord::of_string(row.get::<_, String>(0)?));
        }

        Ok(records)
    }

    fn child_ids(
        &self,
        entity: EntityId,
        kind_filter: Option<&str>,
    ) -> RepoResult<Vec<EntityId>> {
        let (subquery, binds) = child_subquery(entity, kind_filter);
        let sql = format!("SELECT DISTINCT entity FROM ({subquery}) ORDER BY entity ASC;");
        self.query_entity_ids(&sql, binds)
    }

    fn child_records(
        &self,
        entity: EntityId,
        kind_filter: Option<&str>,
        property: &str,
    ) -> RepoResult<Vec<ValueRecord>> {
        let (subquery, mut binds) = child_subquery(entity, kind_filter);
        binds.push(Value::Text(property.to_string()));
        let sql = format!(
            "{FACT_SELECT_SQL}
             WHERE entity IN (SELECT entity FROM ({subquery}))
               AND type = ?{}
               AND is_deleted = 0
             ORDER BY entity ASC, id ASC;",
            binds.len()
        );
        self.query_value_records(&sql, binds)
    }

    fn parent_ids(
        &self,
        entity: EntityId,
        kind_filter: Option<&str>,
    ) -> RepoResult<Vec<EntityId>> {
        let (sql, binds) = parent_subquery(entity, kind_filter);
        self.query_entity_ids(&format!("{sql};"), binds)
    }

    fn parent_records(
        &self,
        entity: EntityId,
        kind_filter: Option<&str>,
        property: &str,
    ) -> RepoResult<Vec<ValueRecord>> {
        let (subquery, mut binds) = parent_subquery(entity, kind_filter);
        binds.push(Value::Text(property.to_string()));
        let sql = format!(
            "{FACT_SELECT_SQL}
             WHERE entity IN ({subquery})
               AND type = ?{}
               AND is_deleted = 0
             ORDER BY entity ASC, id ASC;",
            binds.len()
        );
        self.query_value_records(&sql, binds)
    }
}

/// Builds the child scan: owners of active `_parent` facts referencing the
/// entity, optionally restricted by the child's `_type` fact.
fn child_subquery(entity: EntityId, kind_filter: Option<&str>) -> (String, Vec<Value>) {
    let mut sql = format!(
        "SELECT entity FROM facts
         WHERE type = '{TYPE_PARENT}'
           AND value_reference = ?1
           AND is_deleted = 0"
    );
    let mut binds = vec![Value::Text(entity.to_string())];

    if let Some(kind) = kind_filter {
        sql.push_str(&format!(
            " AND entity IN (SELECT entity FROM facts
                 WHERE type = '{TYPE_TYPE}'
                   AND value_string = ?2
                   AND is_deleted = 0)"
        ));
        binds.push(Value::Text(kind.to_string()));
    }

    (sql, binds)
}

/// Builds the parent scan: targets of the entity's own active `_parent`
/// reference facts, fact-id ascending, optionally restricted by the
/// parent's `_type` fact.
fn parent_subquery(entity: EntityId, kind_filter: Option<&str>) -> (String, Vec<Value>) {
    let mut sql = format!(
        "SELECT value_reference FROM facts
         WHERE entity = ?1
           AND type = '{TYPE_PARENT}'
           AND value_reference IS NOT NULL
           AND is_deleted = 0"
    );
    let mut binds = vec![Value::Text(entity.to_string())];

    if let Some(kind) = kind_filter {
        sql.push_str(&format!(
            " AND value_reference IN (SELECT entity FROM facts
                 WHERE type = '{TYPE_TYPE}'
                   AND value_string = ?2
                   AND is_deleted = 0)"
        ));
        binds.push(Value::Text(kind.to_string()));
    }

    // Scan order of the entity's own parent facts.
    sql.push_str(" ORDER BY id ASC");

    (sql, binds)
}
