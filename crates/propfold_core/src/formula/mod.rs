//! Derived-value expression language.
//!
//! # Responsibility
//! - Parse stored `NAME(arg, arg, ...)` expressions into a small AST of
//!   function plus ordered field references.
//! - Keep the documented grammar limits: no nested-parenthesis or
//!   quoted-comma awareness; the function name is everything before the
//!   first `(`, the argument text everything up to the last `)`.
//!
//! # Invariants
//! - Parsing is fail-soft: a malformed or unrecognized expression yields
//!   `None` and the caller degrades to a literal string result.
//! - Argument order is preserved; resolution results concatenate in
//!   argument order.

use std::str::FromStr;

pub mod eval;

pub use eval::{evaluate_formula, FormulaValue, Scalar};

const QUOTE_CHARS: [char; 2] = ['\'', '"'];

/// Recognized formula functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormulaFn {
    Concat,
    Count,
    Sum,
    Subtract,
    Average,
    Min,
    Max,
}

impl FromStr for FormulaFn {
    type Err = ();

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.trim().to_ascii_uppercase().as_str() {
            "CONCAT" => Ok(Self::Concat),
            "COUNT" => Ok(Self::Count),
            "SUM" => Ok(Self::Sum),
            "SUBTRACT" => Ok(Self::Subtract),
            "AVERAGE" => Ok(Self::Average),
            "MIN" => Ok(Self::Min),
            "MAX" => Ok(Self::Max),
            _ => Err(()),
        }
    }
}

/// Tail of a one-hop traversal reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraversalTarget {
    /// `._id`: identifiers of the linked entities.
    Id,
    /// `.<prop>`: the linked entities' active facts of this type.
    Property(String),
}

/// One parsed formula argument.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldRef {
    /// `'text'` or `"text"` — one string record.
    StringLiteral(String),
    /// Bare numeric literal — one decimal record.
    NumberLiteral(f64),
    /// `_id` — the current entity's identifier.
    OwnId,
    /// Bare type name — the entity's own string-valued facts of that type.
    OwnProperty(String),
    /// `child.<kind|*>.<_id|prop>` — one hop down the reference graph.
    Child {
        kind: Option<String>,
        target: TraversalTarget,
    },
    /// `parent.<kind|*>.<_id|prop>` — one hop up the reference graph.
    Parent {
        kind: Option<String>,
        target: TraversalTarget,
    },
    /// Any other shape; resolves to an empty result, never an error.
    Empty,
}

/// One parsed expression: function plus ordered arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub function: FormulaFn,
    pub args: Vec<FieldRef>,
}

/// Parses `NAME(args)`; `None` means the expression must degrade to a
/// literal string result.
pub fn parse_expression(text: &str) -> Option<Expression> {
    let trimmed = text.trim();
    let open = trimmed.find('(')?;
    let close = trimmed.rfind(')')?;
    if close < open {
        return None;
    }

    let function = FormulaFn::from_str(&trimmed[..open]).ok()?;
    let args = trimmed[open + 1..close].split(',').map(parse_field_ref).collect();

    Some(Expression { function, args })
}

/// Classifies one argument into a field reference.
pub fn parse_field_ref(text: &str) -> FieldRef {
    let trimmed = text.trim();

    if trimmed.len() >= 2
        && trimmed.starts_with(QUOTE_CHARS)
        && trimmed.ends_with(QUOTE_CHARS)
    {
        return FieldRef::StringLiteral(trimmed[1..trimmed.len() - 1].to_string());
    }

    if let Ok(value) = trimmed.parse::<f64>() {
        if value.is_finite() {
            return FieldRef::NumberLiteral(value);
        }
    }

    let parts: Vec<&str> = trimmed.split('.').collect();
    match parts.as_slice() {
        ["_id"] => FieldRef::OwnId,
        [name] => FieldRef::OwnProperty((*name).to_string()),
        [axis @ ("child" | "parent"), kind, target] => {
            let kind = (*kind != "*").then(|| (*kind).to_string());
            let target = if *target == "_id" {
                TraversalTarget::Id
            } else {
                TraversalTarget::Property((*target).to_string())
            };
            if *axis == "child" {
                FieldRef::Child { kind, target }
            } else {
                FieldRef::Parent { kind, target }
            }
        }
        _ => FieldRef::Empty,
    }
}
