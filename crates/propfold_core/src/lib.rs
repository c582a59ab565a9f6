//! Aggregation core for the propfold entity platform.
//! Folds append-only property facts into cached entity snapshots and
//! propagates name changes to referring entities.

pub mod db;
pub mod fold;
pub mod formula;
pub mod logging;
pub mod model;
pub mod queue;
pub mod repo;
pub mod service;
pub mod tenant;

pub use logging::{default_log_level, init_logging, logging_status};
pub use model::fact::{EntityId, Fact, FactId, FactValue, NewFact};
pub use model::snapshot::{EntitySnapshot, Grantee, ValueRecord};
pub use model::trigger::{IntakeMessage, TriggerMessage};
pub use queue::{InMemoryTriggerQueue, QueueError, TriggerQueue};
pub use repo::entity_repo::{EntityRepository, SqliteEntityRepository};
pub use repo::fact_repo::{FactRepository, SqliteFactRepository};
pub use repo::graph_repo::{GraphResolver, SqliteGraphResolver};
pub use repo::{RepoError, RepoResult};
pub use service::aggregate_service::{
    AggregationService, EngineError, EngineResult, MessageOutcome,
};
pub use tenant::{tenant_db_path, EngineConfig, TenantDatabases, TenantError};

/// Minimal health-check API for queue probes.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
