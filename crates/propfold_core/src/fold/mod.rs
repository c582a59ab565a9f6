//! Aggregation builder: folds one entity's active facts into a snapshot.
//!
//! # Responsibility
//! - Shape each active fact into value-records (date normalization,
//!   reference expansion, formula evaluation) and assemble the access list
//!   and the private/public projections.
//!
//! # Invariants
//! - Facts are visited in the ledger's ascending fact-id order; that order
//!   is preserved in `access` and in every record sequence.
//! - The builder only reads; writing the snapshot is the caller's step.
//! - Data-shape problems degrade per record (literal/empty results); only
//!   storage errors abort the fold.

use crate::formula::{evaluate_formula, FormulaValue};
use crate::model::fact::{EntityId, Fact, FactValue, TYPE_PUBLIC};
use crate::model::snapshot::{EntitySnapshot, Grantee, ValueRecord};
use crate::repo::entity_repo::EntityRepository;
use crate::repo::graph_repo::GraphResolver;
use crate::repo::RepoResult;
use chrono::Utc;

/// Folds `facts` into a fresh snapshot for `entity`.
///
/// The caller has already excluded deletion-marked entities; every fact here
/// is active and owned by `entity`.
pub fn build_snapshot<R, E>(
    entity: EntityId,
    facts: &[Fact],
    resolver: &R,
    entities: &E,
) -> RepoResult<EntitySnapshot>
where
    R: GraphResolver,
    E: EntityRepository,
{
    let mut snapshot = EntitySnapshot::new(entity, Utc::now());

    for fact in facts {
        append_access(&mut snapshot.access, fact);

        let records = fact_records(fact, entity, resolver, entities)?;
        snapshot
            .private
            .entry(fact.kind.clone())
            .or_default()
            .extend(records.iter().cloned());
        if fact.is_public {
            snapshot
                .public
                .entry(fact.kind.clone())
                .or_default()
                .extend(records);
        }
    }

    Ok(snapshot)
}

/// Appends this fact's access contribution, preserving scan order and
/// duplicates.
fn append_access(access: &mut Vec<Grantee>, fact: &Fact) {
    match &fact.value {
        FactValue::Reference(target) if fact.is_access_grant() => {
            access.push(Grantee::Entity(*target));
        }
        FactValue::Boolean(true) if fact.kind == TYPE_PUBLIC => {
            access.push(Grantee::Public);
        }
        _ => {}
    }
}

/// Shapes one fact into its value-record(s).
fn fact_records<R, E>(
    fact: &Fact,
    entity: EntityId,
    resolver: &R,
    entities: &E,
) -> RepoResult<Vec<ValueRecord>>
where
    R: GraphResolver,
    E: EntityRepository,
{
    let mut record = ValueRecord::from_value(&fact.value);

    match &fact.value {
        FactValue::Date(_) => {
            // Sortable/searchable ISO form next to the typed date.
            record.string = record.date_string();
        }
        FactValue::Reference(target) => {
            let names = entities.load_name_records(*target)?;
            if names.is_empty() {
                record.string = Some(target.to_string());
            } else {
                // One record per cached name record; name fields win.
                return Ok(names.iter().map(|name| record.merged_with(name)).collect());
            }
        }
        FactValue::Formula(expression) => {
            match evaluate_formula(expression, entity, resolver)? {
                FormulaValue::Text(value) => record.string = Some(value),
                FormulaValue::Count(value) => record.integer = Some(value),
                FormulaValue::Number(value) => record.decimal = Some(value),
                FormulaValue::Empty => {}
            }
        }
        _ => {}
    }

    Ok(vec![record])
}
