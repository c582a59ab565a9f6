//! Formula evaluation: field resolution, scalar coercion, function
//! semantics.
//!
//! # Responsibility
//! - Resolve each parsed field reference through the graph resolver and
//!   reduce the record sequence with the requested function.
//!
//! # Invariants
//! - Fail-soft for data shape: malformed expressions become literal string
//!   results, unresolvable references contribute nothing. Only storage
//!   errors propagate.
//! - SUBTRACT computes `sum(V) - 2 * V[0]`, i.e. `-V[0] + V[1] + ... + V[n]`.
//!   This is the platform's documented arithmetic contract; callers depend
//!   on it and it must not be "corrected" to left-to-right subtraction.

use super::{parse_expression, FieldRef, FormulaFn, TraversalTarget};
use crate::model::fact::{EntityId, ISO_DATE_FORMAT};
use crate::model::snapshot::ValueRecord;
use crate::repo::graph_repo::GraphResolver;
use crate::repo::RepoResult;

/// Result of evaluating one expression, merged into the owning value-record
/// by the fold.
#[derive(Debug, Clone, PartialEq)]
pub enum FormulaValue {
    /// CONCAT result, or the literal expression text on fail-soft.
    Text(String),
    /// COUNT result.
    Count(i64),
    /// SUM / SUBTRACT / AVERAGE / MIN / MAX result.
    Number(f64),
    /// No result field; the record stays as it was.
    Empty,
}

/// Scalar view of one resolved record.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Number(f64),
    Text(String),
}

impl Scalar {
    /// Numeric view; text scalars count when they parse as a number,
    /// otherwise they are skipped by arithmetic functions.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            Self::Text(text) => text.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        }
    }

    /// Text view used by CONCAT.
    pub fn to_text(&self) -> String {
        match self {
            Self::Number(value) => value.to_string(),
            Self::Text(text) => text.clone(),
        }
    }
}

/// Coerces a record to one scalar by field presence, first present wins:
/// decimal > integer > datetime > date > string > identifier.
pub fn scalar_of(record: &ValueRecord) -> Option<Scalar> {
    if let Some(value) = record.decimal {
        return Some(Scalar::Number(value));
    }
    if let Some(value) = record.integer {
        return Some(Scalar::Number(value as f64));
    }
    if let Some(value) = &record.datetime {
        return Some(Scalar::Text(value.to_rfc3339()));
    }
    if let Some(value) = &record.date {
        return Some(Scalar::Text(value.format(ISO_DATE_FORMAT).to_string()));
    }
    if let Some(value) = &record.string {
        return Some(Scalar::Text(value.clone()));
    }
    if let Some(value) = &record.id {
        return Some(Scalar::Text(value.to_string()));
    }
    None
}

/// Evaluates a stored expression for `entity`.
///
/// Returns the literal expression text when the expression does not parse,
/// so a bad formula degrades to visible data instead of failing the fold.
pub fn evaluate_formula<R: GraphResolver>(
    expression: &str,
    entity: EntityId,
    resolver: &R,
) -> RepoResult<FormulaValue> {
    let Some(parsed) = parse_expression(expression) else {
        return Ok(FormulaValue::Text(expression.to_string()));
    };

    let mut records = Vec::new();
    for arg in &parsed.args {
        records.extend(resolve_field(arg, entity, resolver)?);
    }

    Ok(apply_function(parsed.function, &records))
}

/// Resolves one field reference to its record sequence.
pub fn resolve_field<R: GraphResolver>(
    field: &FieldRef,
    entity: EntityId,
    resolver: &R,
) -> RepoResult<Vec<ValueRecord>> {
    match field {
        FieldRef::StringLiteral(text) => Ok(vec![ValueRecord::of_string(text.clone())]),
        FieldRef::NumberLiteral(value) => Ok(vec![ValueRecord::of_decimal(*value)]),
        FieldRef::OwnId => Ok(vec![ValueRecord::of_id(entity)]),
        FieldRef::OwnProperty(kind) => resolver.own_string_records(entity, kind),
        FieldRef::Child { kind, target } => match target {
            TraversalTarget::Id => Ok(id_records(resolver.child_ids(entity, kind.as_deref())?)),
            TraversalTarget::Property(property) => {
                resolver.child_records(entity, kind.as_deref(), property)
            }
        },
        FieldRef::Parent { kind, target } => match target {
            TraversalTarget::Id => Ok(id_records(resolver.parent_ids(entity, kind.as_deref())?)),
            TraversalTarget::Property(property) => {
                resolver.parent_records(entity, kind.as_deref(), property)
            }
        },
        FieldRef::Empty => Ok(Vec::new()),
    }
}

fn id_records(ids: Vec<EntityId>) -> Vec<ValueRecord> {
    ids.into_iter().map(ValueRecord::of_id).collect()
}

fn apply_function(function: FormulaFn, records: &[ValueRecord]) -> FormulaValue {
    let scalars: Vec<Scalar> = records.iter().filter_map(scalar_of).collect();

    match function {
        FormulaFn::Concat => FormulaValue::Text(
            scalars
                .iter()
                .map(Scalar::to_text)
                .collect::<Vec<_>>()
                .concat(),
        ),
        FormulaFn::Count => FormulaValue::Count(records.len() as i64),
        FormulaFn::Sum => FormulaValue::Number(numeric(&scalars).iter().sum()),
        FormulaFn::Subtract => {
            let numbers = numeric(&scalars);
            let total: f64 = numbers.iter().sum();
            match numbers.first() {
                Some(first) => FormulaValue::Number(total - 2.0 * first),
                None => FormulaValue::Number(0.0),
            }
        }
        FormulaFn::Average => {
            let numbers = numeric(&scalars);
            if numbers.is_empty() {
                // Explicit policy: no result over an empty sequence.
                FormulaValue::Empty
            } else {
                FormulaValue::Number(numbers.iter().sum::<f64>() / numbers.len() as f64)
            }
        }
        FormulaFn::Min => numeric(&scalars)
            .into_iter()
            .reduce(f64::min)
            .map_or(FormulaValue::Empty, FormulaValue::Number),
        FormulaFn::Max => numeric(&scalars)
            .into_iter()
            .reduce(f64::max)
            .map_or(FormulaValue::Empty, FormulaValue::Number),
    }
}

fn numeric(scalars: &[Scalar]) -> Vec<f64> {
    scalars.iter().filter_map(Scalar::as_number).collect()
}

#[cfg(test)]
mod tests {
    use super::{evaluate_formula, scalar_of, FormulaValue, Scalar};
    use crate::model::fact::EntityId;
    use crate::model::snapshot::ValueRecord;
    use crate::repo::graph_repo::GraphResolver;
    use crate::repo::RepoResult;
    use chrono::NaiveDate;
    use std::collections::HashMap;
    use uuid::Uuid;

    /// Resolver over fixed in-memory data, keyed by own-property name.
    #[derive(Default)]
    struct FakeResolver {
        own: HashMap<String, Vec<ValueRecord>>,
        children: Vec<EntityId>,
        child_properties: HashMap<String, Vec<ValueRecord>>,
        parents: Vec<EntityId>,
    }

    impl GraphResolver for FakeResolver {
        fn own_string_records(
            &self,
            _entity: EntityId,
            kind: &str,
        ) -> RepoResult<Vec<ValueRecord>> {
            Ok(self.own.get(kind).cloned().unwrap_or_default())
        }

        fn child_ids(
            &self,
            _entity: EntityId,
            _kind_filter: Option<&str>,
        ) -> RepoResult<Vec<EntityId>> {
            Ok(self.children.clone())
        }

        fn child_records(
            &self,
            _entity: EntityId,
            _kind_filter: Option<&str>,
            property: &str,
        ) -> RepoResult<Vec<ValueRecord>> {
            Ok(self
                .child_properties
                .get(property)
                .cloned()
                .unwrap_or_default())
        }

        fn parent_ids(
            &self,
            _entity: EntityId,
            _kind_filter: Option<&str>,
        ) -> RepoResult<Vec<EntityId>> {
            Ok(self.parents.clone())
        }

        fn parent_records(
            &self,
            _entity: EntityId,
            _kind_filter: Option<&str>,
            _property: &str,
        ) -> RepoResult<Vec<ValueRecord>> {
            Ok(Vec::new())
        }
    }

    fn eval(expression: &str, resolver: &FakeResolver) -> FormulaValue {
        evaluate_formula(expression, Uuid::new_v4(), resolver).unwrap()
    }

    #[test]
    fn concat_joins_in_argument_then_fact_order() {
        let mut resolver = FakeResolver::default();
        resolver.own.insert(
            "first".to_string(),
            vec![ValueRecord::of_string("Jane")],
        );
        resolver
            .own
            .insert("last".to_string(), vec![ValueRecord::of_string("Doe")]);

        assert_eq!(
            eval("CONCAT(first,last)", &resolver),
            FormulaValue::Text("JaneDoe".to_string())
        );
    }

    #[test]
    fn concat_of_no_records_is_the_empty_string() {
        assert_eq!(
            eval("CONCAT(missing)", &FakeResolver::default()),
            FormulaValue::Text(String::new())
        );
    }

    #[test]
    fn sum_and_average_over_literals() {
        let resolver = FakeResolver::default();
        assert_eq!(eval("SUM(1,2,3)", &resolver), FormulaValue::Number(6.0));
        assert_eq!(eval("AVERAGE(1,2,3)", &resolver), FormulaValue::Number(2.0));
    }

    #[test]
    fn sum_of_empty_sequence_is_zero() {
        assert_eq!(
            eval("SUM(missing)", &FakeResolver::default()),
            FormulaValue::Number(0.0)
        );
    }

    #[test]
    fn subtract_negates_the_first_value_only() {
        let resolver = FakeResolver::default();
        // -2 + 3 + 5, not 2 - 3 - 5.
        assert_eq!(eval("SUBTRACT(2,3,5)", &resolver), FormulaValue::Number(6.0));
        assert_eq!(eval("SUBTRACT(10)", &resolver), FormulaValue::Number(-10.0));
        assert_eq!(
            eval("SUBTRACT(missing)", &resolver),
            FormulaValue::Number(0.0)
        );
    }

    #[test]
    fn average_min_max_of_empty_sequence_have_no_result() {
        let resolver = FakeResolver::default();
        assert_eq!(eval("AVERAGE(missing)", &resolver), FormulaValue::Empty);
        assert_eq!(eval("MIN(missing)", &resolver), FormulaValue::Empty);
        assert_eq!(eval("MAX(missing)", &resolver), FormulaValue::Empty);
    }

    #[test]
    fn min_and_max_over_mixed_literals() {
        let resolver = FakeResolver::default();
        assert_eq!(eval("MIN(4,1.5,3)", &resolver), FormulaValue::Number(1.5));
        assert_eq!(eval("MAX(4,1.5,3)", &resolver), FormulaValue::Number(4.0));
    }

    #[test]
    fn numeric_string_facts_participate_in_arithmetic() {
        let mut resolver = FakeResolver::default();
        resolver.own.insert(
            "amount".to_string(),
            vec![
                ValueRecord::of_string("1"),
                ValueRecord::of_string("2"),
                ValueRecord::of_string("not a number"),
            ],
        );

        assert_eq!(eval("SUM(amount)", &resolver), FormulaValue::Number(3.0));
    }

    #[test]
    fn count_counts_resolved_records_without_dedup() {
        let mut resolver = FakeResolver::default();
        let child = Uuid::new_v4();
        resolver.children = vec![child, child];

        assert_eq!(eval("COUNT(child.*._id)", &resolver), FormulaValue::Count(2));
    }

    #[test]
    fn unknown_function_degrades_to_the_expression_text() {
        assert_eq!(
            eval("NOPE(first)", &FakeResolver::default()),
            FormulaValue::Text("NOPE(first)".to_string())
        );
        assert_eq!(
            eval("just a note", &FakeResolver::default()),
            FormulaValue::Text("just a note".to_string())
        );
    }

    #[test]
    fn concat_mixes_literals_and_ids() {
        let entity = Uuid::new_v4();
        let result =
            evaluate_formula("CONCAT('id=',_id)", entity, &FakeResolver::default()).unwrap();
        assert_eq!(result, FormulaValue::Text(format!("id={entity}")));
    }

    #[test]
    fn coercion_prefers_decimal_and_falls_back_in_order() {
        let record = ValueRecord {
            decimal: Some(1.5),
            integer: Some(7),
            string: Some("text".to_string()),
            ..ValueRecord::default()
        };
        assert_eq!(scalar_of(&record), Some(Scalar::Number(1.5)));

        let record = ValueRecord {
            date: Some(NaiveDate::from_ymd_opt(2026, 3, 5).unwrap()),
            string: Some("shadowed".to_string()),
            ..ValueRecord::default()
        };
        assert_eq!(
            scalar_of(&record),
            Some(Scalar::Text("2026-03-05".to_string()))
        );

        assert_eq!(scalar_of(&ValueRecord::default()), None);
    }

    #[test]
    fn zero_valued_fields_still_win_by_presence() {
        // Presence, not truthiness: a decimal 0 is a real scalar.
        let record = ValueRecord {
            decimal: Some(0.0),
            string: Some("fallback".to_string()),
            ..ValueRecord::default()
        };
        assert_eq!(scalar_of(&record), Some(Scalar::Number(0.0)));
    }
}
