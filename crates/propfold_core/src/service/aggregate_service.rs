//! Aggregation entry point: intake gate, deletion, fold, propagation.
//!
//! # Responsibility
//! - Process trigger batches strictly sequentially, one entity at a time.
//! - Enforce the idempotency gate so redelivered and out-of-order triggers
//!   never regress a newer snapshot.
//! - Compare denormalized names before/after the fold and enqueue one
//!   trigger per referrer on change.
//!
//! # Invariants
//! - A message failure is isolated: it is reported in that message's
//!   outcome and never aborts the rest of the batch.
//! - The probe message is acknowledged without touching storage.
//! - Snapshot writes are wholesale last-writer-wins replacements; two
//!   interleaved folds of the same entity are an accepted race under the
//!   platform's eventual-consistency design.

use crate::fold::build_snapshot;
use crate::model::fact::TYPE_DELETED;
use crate::model::snapshot::name_strings;
use crate::model::trigger::{IntakeMessage, TriggerMessage};
use crate::queue::{QueueError, TriggerQueue};
use crate::repo::entity_repo::{EntityRepository, SqliteEntityRepository};
use crate::repo::fact_repo::{FactRepository, SqliteFactRepository};
use crate::repo::graph_repo::SqliteGraphResolver;
use crate::repo::RepoError;
use crate::tenant::{EngineConfig, TenantDatabases, TenantError};
use log::{error, info};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type EngineResult<T> = Result<T, EngineError>;

/// Fatal (storage/transport) error for one message's processing.
#[derive(Debug)]
pub enum EngineError {
    Tenant(TenantError),
    Repo(RepoError),
    Queue(QueueError),
}

impl Display for EngineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tenant(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::Queue(err) => write!(f, "{err}"),
        }
    }
}

impl Error for EngineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Tenant(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::Queue(err) => Some(err),
        }
    }
}

impl From<TenantError> for EngineError {
    fn from(value: TenantError) -> Self {
        Self::Tenant(value)
    }
}

impl From<RepoError> for EngineError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<QueueError> for EngineError {
    fn from(value: QueueError) -> Self {
        Self::Queue(value)
    }
}

/// Per-message processing result, reported per batch item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Probe answered; storage untouched.
    Acknowledged,
    /// Fold written; `triggers_enqueued` referrer triggers emitted.
    Applied { triggers_enqueued: usize },
    /// Trigger not newer than the snapshot's aggregated marker.
    SkippedStale,
    /// Deletion marker found; snapshot removed.
    Deleted,
    /// Fatal error for this message only; the batch continues.
    Failed { error: String },
}

/// The aggregation engine: per-tenant storage plus an outbound queue.
pub struct AggregationService<Q: TriggerQueue> {
    tenants: TenantDatabases,
    queue: Q,
}

impl<Q: TriggerQueue> AggregationService<Q> {
    /// Creates the engine from explicit configuration.
    pub fn new(config: EngineConfig, queue: Q) -> Self {
        Self {
            tenants: TenantDatabases::new(config),
            queue,
        }
    }

    /// Outbound queue access for hosts that drain buffered triggers.
    pub fn queue_mut(&mut self) -> &mut Q {
        &mut self.queue
    }

    /// Processes a batch strictly sequentially, one outcome per message.
    ///
    /// Failures are isolated per message; the batch never aborts early.
    pub fn process_batch(&mut self, messages: &[IntakeMessage]) -> Vec<MessageOutcome> {
        messages
            .iter()
            .map(|message| self.process_message(message))
            .collect()
    }

    /// Processes one intake message.
    pub fn process_message(&mut self, message: &IntakeMessage) -> MessageOutcome {
        match message {
            IntakeMessage::Probe { source } => {
                info!("event=probe module=service status=ok source={source}");
                MessageOutcome::Acknowledged
            }
            IntakeMessage::Aggregate(trigger) => match self.aggregate_entity(trigger) {
                Ok(outcome) => outcome,
                Err(err) => {
                    error!(
                        "event=entity_fold module=service status=error account={} entity={} error={err}",
                        trigger.account, trigger.entity
                    );
                    MessageOutcome::Failed {
                        error: err.to_string(),
                    }
                }
            },
        }
    }

    fn aggregate_entity(&mut self, trigger: &TriggerMessage) -> EngineResult<MessageOutcome> {
        let conn = self.tenants.resolve(&trigger.account)?;
        let fact_repo = SqliteFactRepository::new(conn);
        let entity_repo = SqliteEntityRepository::new(conn);
        let resolver = SqliteGraphResolver::new(conn);

        let head = entity_repo.load_head(trigger.entity)?;

        // Idempotency gate: a trigger not newer than the snapshot is a no-op.
        if let (Some(head), Some(dt)) = (&head, trigger.dt) {
            if head.aggregated.is_some_and(|aggregated| aggregated >= dt) {
                info!(
                    "event=entity_fold module=service status=skip reason=stale account={} entity={}",
                    trigger.account, trigger.entity
                );
                return Ok(MessageOutcome::SkippedStale);
            }
        }

        let facts = fact_repo.list_active_facts(trigger.entity)?;

        if facts.iter().any(|fact| fact.kind == TYPE_DELETED) {
            entity_repo.delete_snapshot(trigger.entity)?;
            info!(
                "event=entity_fold module=service status=deleted account={} entity={}",
                trigger.account, trigger.entity
            );
            return Ok(MessageOutcome::Deleted);
        }

        let snapshot = build_snapshot(trigger.entity, &facts, &resolver, &entity_repo)?;
        entity_repo.replace_snapshot(&snapshot)?;

        // Propagation: order-insensitive multiset comparison of the
        // denormalized name strings before and after the fold.
        let mut old_names = head
            .map(|h| name_strings(&h.name_records))
            .unwrap_or_default();
        let mut new_names = snapshot.name_strings();
        old_names.sort();
        new_names.sort();

        if old_names == new_names {
            info!(
                "event=entity_fold module=service status=ok account={} entity={} referrers=0",
                trigger.account, trigger.entity
            );
            return Ok(MessageOutcome::Applied {
                triggers_enqueued: 0,
            });
        }

        let referrers = fact_repo.referrer_ids(trigger.entity)?;
        let dt = trigger.dt.unwrap_or(snapshot.aggregated);

        for referrer in &referrers {
            self.queue
                .enqueue(TriggerMessage::new(trigger.account.clone(), *referrer).at(dt))?;
        }

        info!(
            "event=entity_fold module=service status=ok account={} entity={} referrers={}",
            trigger.account,
            trigger.entity,
            referrers.len()
        );

        Ok(MessageOutcome::Applied {
            triggers_enqueued: referrers.len(),
        })
    }
}
