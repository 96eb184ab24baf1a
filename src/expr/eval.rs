//! Expression values and AST evaluation.

use super::parser::{Ast, BinaryOp};
use super::EvalScope;
use std::collections::BTreeMap;

/// A value flowing through expression evaluation. Unknown or absent fields
/// are `Null` rather than errors.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
    List(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

impl Value {
    #[must_use]
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => n.as_f64().map_or(Self::Null, Self::Num),
            serde_json::Value::String(s) => Self::Str(s),
            serde_json::Value::Array(items) => {
                Self::List(items.into_iter().map(Self::from_json).collect())
            }
            serde_json::Value::Object(map) => Self::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    #[must_use]
    pub fn str_list(items: &[String]) -> Self {
        Self::List(items.iter().cloned().map(Self::Str).collect())
    }

    /// Member access on objects; `Null` everywhere else. Lookup is exact
    /// first, then ASCII-case-insensitive.
    #[must_use]
    pub fn member(&self, name: &str) -> Self {
        let Self::Object(map) = self else {
            return Self::Null;
        };
        if let Some(v) = map.get(name) {
            return v.clone();
        }
        map.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map_or(Self::Null, |(_, v)| v.clone())
    }

    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Num(n) => *n != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::List(items) => !items.is_empty(),
            Self::Object(_) => true,
        }
    }

    /// Semantic equality: numbers numerically, strings case-insensitively,
    /// everything else strictly. Cross-type comparisons are false.
    #[must_use]
    pub fn loose_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Num(a), Self::Num(b)) => (a - b).abs() < f64::EPSILON,
            (Self::Str(a), Self::Str(b)) => a.eq_ignore_ascii_case(b),
            (Self::List(a), Self::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.loose_eq(y))
            }
            _ => false,
        }
    }

    fn compare(&self, other: &Self) -> Option<std::cmp::Ordering> {
        match (self, other) {
            (Self::Num(a), Self::Num(b)) => a.partial_cmp(b),
            (Self::Str(a), Self::Str(b)) => {
                Some(a.to_ascii_lowercase().cmp(&b.to_ascii_lowercase()))
            }
            _ => None,
        }
    }

    /// `in` semantics: list membership, or case-insensitive substring when
    /// both sides are strings.
    #[must_use]
    pub fn contained_in(&self, container: &Self) -> bool {
        match container {
            Self::List(items) => items.iter().any(|item| item.loose_eq(self)),
            Self::Str(haystack) => match self {
                Self::Str(needle) => haystack
                    .to_ascii_lowercase()
                    .contains(&needle.to_ascii_lowercase()),
                _ => false,
            },
            _ => false,
        }
    }
}

pub fn evaluate(ast: &Ast, scope: &EvalScope<'_>) -> Value {
    match ast {
        Ast::Literal(value) => value.clone(),
        Ast::Field(path) => resolve_field(path, scope),
        Ast::Not(inner) => Value::Bool(!evaluate(inner, scope).is_truthy()),
        Ast::Binary { op, lhs, rhs } => evaluate_binary(*op, lhs, rhs, scope),
        Ast::Call { name, args } => evaluate_call(name, args, scope),
    }
}

fn resolve_field(path: &[String], scope: &EvalScope<'_>) -> Value {
    let mut value = scope.root(&path[0]);
    for segment in &path[1..] {
        value = value.member(segment);
    }
    value
}

fn evaluate_binary(op: BinaryOp, lhs: &Ast, rhs: &Ast, scope: &EvalScope<'_>) -> Value {
    // Short-circuit the boolean operators before touching the right side.
    match op {
        BinaryOp::And => {
            return Value::Bool(
                evaluate(lhs, scope).is_truthy() && evaluate(rhs, scope).is_truthy(),
            );
        }
        BinaryOp::Or => {
            return Value::Bool(
                evaluate(lhs, scope).is_truthy() || evaluate(rhs, scope).is_truthy(),
            );
        }
        _ => {}
    }

    let left = evaluate(lhs, scope);
    let right = evaluate(rhs, scope);
    let result = match op {
        BinaryOp::Eq => left.loose_eq(&right),
        BinaryOp::Ne => !left.loose_eq(&right),
        BinaryOp::Lt => left.compare(&right) == Some(std::cmp::Ordering::Less),
        BinaryOp::Le => matches!(
            left.compare(&right),
            Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)
        ),
        BinaryOp::Gt => left.compare(&right) == Some(std::cmp::Ordering::Greater),
        BinaryOp::Ge => matches!(
            left.compare(&right),
            Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)
        ),
        BinaryOp::In => left.contained_in(&right),
        BinaryOp::And | BinaryOp::Or => unreachable!(),
    };
    Value::Bool(result)
}

fn evaluate_call(name: &str, args: &[Ast], scope: &EvalScope<'_>) -> Value {
    match name {
        "exists" => Value::Bool(evaluate(&args[0], scope) != Value::Null),
        "istrue" => Value::Bool(evaluate(&args[0], scope) == Value::Bool(true)),
        "isfalse" => Value::Bool(evaluate(&args[0], scope) == Value::Bool(false)),
        "contains" => {
            let haystack = evaluate(&args[0], scope);
            let needle = evaluate(&args[1], scope);
            Value::Bool(needle.contained_in(&haystack))
        }
        "seadex" => {
            let flag = scope.stream.member("seadex").member("isSeadex");
            Value::Bool(flag.is_truthy())
        }
        // Unknown names are rejected at parse time.
        _ => Value::Null,
    }
}
