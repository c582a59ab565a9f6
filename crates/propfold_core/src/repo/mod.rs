//! Repository layer over the fact ledger and snapshot storage.
//!
//! # Responsibility
//! - Define data access contracts for the ledger, snapshots and one-hop
//!   graph traversal.
//! - Isolate SQLite query details from fold/formula/service orchestration.
//!
//! # Invariants
//! - Read paths reject invalid persisted state instead of masking it.
//! - Ledger reads used by aggregation always exclude soft-deleted facts and
//!   scan in ascending fact-id order.

use crate::db::DbError;
use crate::model::fact::FactId;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod entity_repo;
pub mod fact_repo;
pub mod graph_repo;

pub type RepoResult<T> = Result<T, RepoError>;

/// Error shared by ledger, snapshot and traversal repositories.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    FactNotFound(FactId),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::FactNotFound(id) => write!(f, "fact not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::FactNotFound(_) => None,
            Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

pub(crate) fn parse_entity_id(text: &str, context: &str) -> RepoResult<crate::model::fact::EntityId> {
    crate::model::fact::EntityId::parse_str(text)
        .map_err(|_| RepoError::InvalidData(format!("invalid entity id `{text}` in {context}")))
}

pub(crate) fn parse_utc(text: &str, context: &str) -> RepoResult<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc3339(text)
        .map(|value| value.with_timezone(&chrono::Utc))
        .map_err(|_| RepoError::InvalidData(format!("invalid timestamp `{text}` in {context}")))
}

pub(crate) fn parse_date(text: &str, context: &str) -> RepoResult<chrono::NaiveDate> {
    chrono::NaiveDate::parse_from_str(text, crate::model::fact::ISO_DATE_FORMAT)
        .map_err(|_| RepoError::InvalidData(format!("invalid date `{text}` in {context}")))
}

pub(crate) fn bool_from_int(value: i64, context: &str) -> RepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid boolean value `{other}` in {context}"
        ))),
    }
}

pub(crate) fn bool_to_int(value: bool) -> i64 {
    i64::from(value)
}
