//! Tenant database resolution.
//!
//! # Responsibility
//! - Map validated account names to independently opened SQLite databases.
//! - Carry the engine's construction-time configuration (no environment
//!   reads inside the engine).
//!
//! # Invariants
//! - Each tenant account resolves to its own database file; no cross-tenant
//!   sharing.
//! - Account names are validated before any filesystem path is built.

use crate::db::{open_db, DbError, DbResult};
use log::info;
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::Connection;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

static ACCOUNT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new("^[a-z0-9][a-z0-9_-]{0,63}$").expect("account pattern is valid"));

pub type TenantResult<T> = Result<T, TenantError>;

#[derive(Debug)]
pub enum TenantError {
    /// Account name failed validation; no path was built from it.
    InvalidAccount(String),
    /// Data directory could not be created.
    CreateDataDir {
        path: PathBuf,
        source: std::io::Error,
    },
    Db(DbError),
}

impl Display for TenantError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidAccount(account) => write!(f, "invalid tenant account `{account}`"),
            Self::CreateDataDir { path, source } => write!(
                f,
                "failed to create data directory `{}`: {source}",
                path.display()
            ),
            Self::Db(err) => write!(f, "{err}"),
        }
    }
}

impl Error for TenantError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidAccount(_) => None,
            Self::CreateDataDir { source, .. } => Some(source),
            Self::Db(err) => Some(err),
        }
    }
}

impl From<DbError> for TenantError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

/// Engine construction parameters, passed explicitly by the host.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory holding one SQLite database per tenant account.
    pub data_dir: PathBuf,
}

impl EngineConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }
}

/// Returns the database path for an account under `data_dir`.
///
/// Callers must validate the account first; this helper exists so tests and
/// hosts can open a tenant database directly.
pub fn tenant_db_path(data_dir: &Path, account: &str) -> PathBuf {
    data_dir.join(format!("{account}.db"))
}

/// Lazily opened, cached per-tenant connections.
pub struct TenantDatabases {
    config: EngineConfig,
    connections: HashMap<String, Connection>,
}

impl TenantDatabases {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            connections: HashMap::new(),
        }
    }

    /// Resolves an account to its migrated database connection.
    ///
    /// The first resolution per account opens (and if needed creates) the
    /// database file; later resolutions reuse the cached connection.
    pub fn resolve(&mut self, account: &str) -> TenantResult<&Connection> {
        if !ACCOUNT_PATTERN.is_match(account) {
            return Err(TenantError::InvalidAccount(account.to_string()));
        }

        match self.connections.entry(account.to_string()) {
            Entry::Occupied(entry) => Ok(&*entry.into_mut()),
            Entry::Vacant(entry) => {
                std::fs::create_dir_all(&self.config.data_dir).map_err(|source| {
                    TenantError::CreateDataDir {
                        path: self.config.data_dir.clone(),
                        source,
                    }
                })?;
                let conn = open_tenant(&self.config.data_dir, account)?;
                Ok(&*entry.insert(conn))
            }
        }
    }
}

fn open_tenant(data_dir: &Path, account: &str) -> DbResult<Connection> {
    let conn = open_db(tenant_db_path(data_dir, account))?;
    info!("event=tenant_open module=tenant status=ok account={account}");
    Ok(conn)
}
