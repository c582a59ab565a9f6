//! Fact ledger contracts and SQLite implementation.
//!
//! # Responsibility
//! - Append facts and soft-delete them (the seam used by upstream property
//!   endpoints and by tests).
//! - Serve the aggregation reads: active-fact scans and referrer lookups.
//!
//! # Invariants
//! - A fold never mutates facts; the only write paths are append and
//!   tombstone.
//! - Active-fact scans return ascending fact-id order; that order is
//!   observable in snapshot record sequences and in CONCAT results.

use crate::model::fact::{EntityId, Fact, FactId, FactValue, NewFact, ISO_DATE_FORMAT};
use crate::repo::{bool_from_int, bool_to_int, parse_date, parse_entity_id, parse_utc, RepoError, RepoResult};
use chrono::Utc;
use rusqlite::{params, Connection, Row};

pub(crate) const FACT_SELECT_SQL: &str = "SELECT
    id,
    entity,
    type,
    value_string,
    value_integer,
    value_decimal,
    value_date,
    value_datetime,
    value_boolean,
    value_reference,
    value_formula,
    search_text,
    is_public,
    is_deleted,
    created_at
FROM facts";

/// Ledger access contract.
pub trait FactRepository {
    /// Appends a fact and returns its ledger-assigned id.
    fn create_fact(&self, fact: &NewFact) -> RepoResult<FactId>;
    /// Tombstones a fact; idempotent for already-deleted facts.
    fn soft_delete_fact(&self, id: FactId) -> RepoResult<()>;
    /// Returns all active facts of an entity, fact-id ascending.
    fn list_active_facts(&self, entity: EntityId) -> RepoResult<Vec<Fact>>;
    /// Returns the distinct owners of active facts referencing `entity`.
    fn referrer_ids(&self, entity: EntityId) -> RepoResult<Vec<EntityId>>;
}

/// SQLite-backed fact ledger.
pub struct SqliteFactRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteFactRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl FactRepository for SqliteFactRepository<'_> {
    fn create_fact(&self, fact: &NewFact) -> RepoResult<FactId> {
        let columns = ValueColumns::from_value(&fact.value);

        self.conn.execute(
            "INSERT INTO facts (
                entity,
                type,
                value_string,
                value_integer,
                value_decimal,
                value_date,
                value_datetime,
                value_boolean,
                value_reference,
                value_formula,
                search_text,
                is_public,
                created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13);",
            params![
                fact.entity.to_string(),
                fact.kind.as_str(),
                columns.string,
                columns.integer,
                columns.decimal,
                columns.date,
                columns.datetime,
                columns.boolean,
                columns.reference,
                columns.formula,
                fact.search_text.as_deref(),
                bool_to_int(fact.is_public),
                Utc::now().to_rfc3339(),
            ],
        )?;

        Ok(self.conn.last_insert_rowid())
    }

    fn soft_delete_fact(&self, id: FactId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("UPDATE facts SET is_deleted = 1 WHERE id = ?1;", [id])?;

        if changed == 0 {
            return Err(RepoError::FactNotFound(id));
        }

        Ok(())
    }

    fn list_active_facts(&self, entity: EntityId) -> RepoResult<Vec<Fact>> {
        let mut stmt = self.conn.prepare(&format!(
            "{FACT_SELECT_SQL}
             WHERE entity = ?1
               AND is_deleted = 0
             ORDER BY id ASC;"
        ))?;

        let mut rows = stmt.query([entity.to_string()])?;
        let mut facts = Vec::new();
        while let Some(row) = rows.next()? {
            facts.push(parse_fact_row(row)?);
        }

        Ok(facts)
    }

    fn referrer_ids(&self, entity: EntityId) -> RepoResult<Vec<EntityId>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT entity FROM facts
             WHERE value_reference = ?1
               AND is_deleted = 0
             ORDER BY entity ASC;",
        )?;

        let mut rows = stmt.query([entity.to_string()])?;
        let mut referrers = Vec::new();
        while let Some(row) = rows.next()? {
            let text: String = row.get(0)?;
            referrers.push(parse_entity_id(&text, "facts.entity")?);
        }

        Ok(referrers)
    }
}

/// Exploded value union for binding and reading the eight value columns.
struct ValueColumns {
    string: Option<String>,
    integer: Option<i64>,
    decimal: Option<f64>,
    date: Option<String>,
    datetime: Option<String>,
    boolean: Option<i64>,
    reference: Option<String>,
    formula: Option<String>,
}

impl ValueColumns {
    fn from_value(value: &FactValue) -> Self {
        let mut columns = Self {
            string: None,
            integer: None,
            decimal: None,
            date: None,
            datetime: None,
            boolean: None,
            reference: None,
            formula: None,
        };

        match value {
            FactValue::String(v) => columns.string = Some(v.clone()),
            FactValue::Integer(v) => columns.integer = Some(*v),
            FactValue::Decimal(v) => columns.decimal = Some(*v),
            FactValue::Date(v) => columns.date = Some(v.format(ISO_DATE_FORMAT).to_string()),
            FactValue::DateTime(v) => columns.datetime = Some(v.to_rfc3339()),
            FactValue::Boolean(v) => columns.boolean = Some(bool_to_int(*v)),
            FactValue::Reference(v) => columns.reference = Some(v.to_string()),
            FactValue::Formula(v) => columns.formula = Some(v.clone()),
        }

        columns
    }
}

pub(crate) fn parse_fact_row(row: &Row<'_>) -> RepoResult<Fact> {
    let id: FactId = row.get("id")?;

    let entity_text: String = row.get("entity")?;
    let entity = parse_entity_id(&entity_text, "facts.entity")?;

    let created_text: String = row.get("created_at")?;
    let created_at = parse_utc(&created_text, "facts.created_at")?;

    Ok(Fact {
        id,
        entity,
        kind: row.get("type")?,
        value: parse_value_columns(row, id)?,
        is_public: bool_from_int(row.get("is_public")?, "facts.is_public")?,
        is_deleted: bool_from_int(row.get("is_deleted")?, "facts.is_deleted")?,
        created_at,
        search_text: row.get("search_text")?,
    })
}

/// Reads the exactly-one-value union from a ledger row.
pub(crate) fn parse_value_columns(row: &Row<'_>, id: FactId) -> RepoResult<FactValue> {
    let mut values: Vec<FactValue> = Vec::with_capacity(1);

    if let Some(v) = row.get::<_, Option<String>>("value_string")? {
        values.push(FactValue::String(v));
    }
    if let Some(v) = row.get::<_, Option<i64>>("value_integer")? {
        values.push(FactValue::Integer(v));
    }
    if let Some(v) = row.get::<_, Option<f64>>("value_decimal")? {
        values.push(FactValue::Decimal(v));
    }
    if let Some(v) = row.get::<_, Option<String>>("value_date")? {
        values.push(FactValue::Date(parse_date(&v, "facts.value_date")?));
    }
    if let Some(v) = row.get::<_, Option<String>>("value_datetime")? {
        values.push(FactValue::DateTime(parse_utc(&v, "facts.value_datetime")?));
    }
    if let Some(v) = row.get::<_, Option<i64>>("value_boolean")? {
        values.push(FactValue::Boolean(bool_from_int(v, "facts.value_boolean")?));
    }
    if let Some(v) = row.get::<_, Option<String>>("value_reference")? {
        values.push(FactValue::Reference(parse_entity_id(
            &v,
            "facts.value_reference",
        )?));
    }
    if let Some(v) = row.get::<_, Option<String>>("value_formula")? {
        values.push(FactValue::Formula(v));
    }

    if values.len() != 1 {
        return Err(RepoError::InvalidData(format!(
            "fact {id} has {} value columns set, expected exactly one",
            values.len()
        )));
    }

    Ok(values.remove(0))
}
