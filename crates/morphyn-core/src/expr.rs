//! Expression evaluation
//!
//! Expressions are evaluated against one entity, the local scope of the
//! event being processed, and the entity table for cross-entity reads.
//! Arithmetic over numbers first tries an unboxed `f64` path; anything it
//! cannot settle falls back to the general [`Value`] path. Both paths share
//! [`apply_arith`], so they agree on every input.

use crate::pool::index_from;
use crate::{Entity, EntityTable, Error, Result, Value, ValueMap};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Divisors with a smaller magnitude saturate the result to zero
pub const DIVISION_EPSILON: f64 = 1e-9;

/// Tolerance for numeric `==` and `!=`
pub const COMPARISON_EPSILON: f64 = 1e-7;

/// An expression that evaluates to a [`Value`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// A literal value
    Literal(Value),
    /// A local, else a field of the current entity
    Variable(String),
    /// Arithmetic or comparison
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Short-circuit `and` / `or`
    Logic {
        op: LogicOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `not expr`
    Not(Box<Expr>),
    /// `pool[index]`, 1-based
    Index { pool: String, index: Box<Expr> },
    /// `name.property`: pool `.count`, `self.field`, or another entity's field
    Property { target: String, property: String },
}

/// Arithmetic and comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl BinaryOp {
    /// Source symbol of the operator
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::Le => "<=",
            BinaryOp::Ge => ">=",
        }
    }

    /// Whether the operator produces a number
    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod
        )
    }

    fn is_equality(&self) -> bool {
        matches!(self, BinaryOp::Eq | BinaryOp::Ne)
    }
}

/// Logic operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicOp {
    And,
    Or,
}

impl Expr {
    /// Shorthand for a variable reference
    pub fn var(name: impl Into<String>) -> Self {
        Expr::Variable(name.into())
    }

    /// Shorthand for a literal
    pub fn lit(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    /// Shorthand for a binary expression
    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Shorthand for a logic expression
    pub fn logic(op: LogicOp, left: Expr, right: Expr) -> Self {
        Expr::Logic {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }
}

/// Everything an expression can read
#[derive(Clone, Copy)]
pub struct EvalContext<'a> {
    /// The entity whose event is running
    pub entity: &'a Entity,
    /// Locals: bound parameters and assigned temporaries
    pub scope: &'a ValueMap,
    /// All entities, for cross-entity reads
    pub table: &'a EntityTable,
    /// Name of the running event, for diagnostics
    pub event: &'a str,
}

impl<'a> EvalContext<'a> {
    /// Create a new evaluation context
    pub fn new(entity: &'a Entity, scope: &'a ValueMap, table: &'a EntityTable) -> Self {
        Self {
            entity,
            scope,
            table,
            event: "",
        }
    }

    /// Set the event name reported in faults
    pub fn in_event(mut self, event: &'a str) -> Self {
        self.event = event;
        self
    }

    /// Resolve a variable: locals first, then fields
    pub fn lookup(&self, name: &str) -> Result<&'a Value> {
        self.scope
            .get(name)
            .or_else(|| self.entity.get(name))
            .ok_or_else(|| Error::UnresolvedVariable {
                name: name.to_string(),
                event: self.event.to_string(),
                entity: self.entity.name.clone(),
            })
    }

    /// A field, else a local, by name
    fn field_or_local(&self, name: &str) -> Option<&'a Value> {
        self.entity.get(name).or_else(|| self.scope.get(name))
    }
}

/// Evaluate `expr` for `entity` with the given locals
pub fn evaluate(
    entity: &Entity,
    expr: &Expr,
    scope: &ValueMap,
    table: &EntityTable,
) -> Result<Value> {
    expr.eval(&EvalContext::new(entity, scope, table))
}

impl Expr {
    /// Evaluate this expression
    ///
    /// The unboxed path is tried once, at the root of an arithmetic tree;
    /// if it cannot settle the tree, the whole tree takes the general path.
    pub fn eval(&self, ctx: &EvalContext<'_>) -> Result<Value> {
        if let Expr::Binary { op, .. } = self {
            if op.is_arithmetic() {
                if let Some(n) = self.eval_number(ctx)? {
                    return Ok(Value::Number(n));
                }
            }
        }
        self.eval_general(ctx)
    }

    fn eval_general(&self, ctx: &EvalContext<'_>) -> Result<Value> {
        match self {
            Expr::Literal(v) => Ok(v.clone()),

            Expr::Variable(name) => ctx.lookup(name).cloned(),

            Expr::Binary { op, left, right } => {
                let l = left.eval_general(ctx)?;
                let r = right.eval_general(ctx)?;
                binary(*op, &l, &r)
            }

            Expr::Logic { op, left, right } => {
                let l = left.eval(ctx)?;
                // a null left operand makes the whole expression false
                if l.is_null() {
                    return Ok(Value::Bool(false));
                }
                let l = as_condition(&l)?;
                let result = match op {
                    LogicOp::Or if l => true,
                    LogicOp::And if !l => false,
                    _ => as_condition(&right.eval(ctx)?)?,
                };
                Ok(Value::Bool(result))
            }

            Expr::Not(inner) => match inner.eval(ctx)? {
                Value::Null => Ok(Value::Bool(true)),
                other => Ok(Value::Bool(!as_condition(&other)?)),
            },

            Expr::Index { pool, index } => {
                let target = ctx
                    .field_or_local(pool)
                    .and_then(Value::as_pool)
                    .ok_or_else(|| Error::NotAPool(pool.clone()))?;
                let index = index_from(&index.eval(ctx)?, pool)?;
                target.get(pool, index).cloned()
            }

            Expr::Property { target, property } => property_of(ctx, target, property),
        }
    }

    /// Unboxed evaluation for numeric arithmetic
    ///
    /// Returns `Ok(None)` for anything that is not a number-only arithmetic
    /// tree; the caller then takes the general path, which reaches the same
    /// result or fault.
    pub fn eval_number(&self, ctx: &EvalContext<'_>) -> Result<Option<f64>> {
        match self {
            Expr::Literal(Value::Number(n)) => Ok(Some(*n)),
            Expr::Variable(name) => Ok(ctx.lookup(name)?.as_number()),
            Expr::Binary { op, left, right } if op.is_arithmetic() => {
                let Some(l) = left.eval_number(ctx)? else {
                    return Ok(None);
                };
                let Some(r) = right.eval_number(ctx)? else {
                    return Ok(None);
                };
                Ok(Some(apply_arith(*op, l, r)))
            }
            _ => Ok(None),
        }
    }
}

/// Numeric arithmetic shared by both evaluation paths
///
/// Division and remainder by a divisor under [`DIVISION_EPSILON`] yield 0.0.
pub fn apply_arith(op: BinaryOp, l: f64, r: f64) -> f64 {
    match op {
        BinaryOp::Add => l + r,
        BinaryOp::Sub => l - r,
        BinaryOp::Mul => l * r,
        BinaryOp::Div if r.abs() < DIVISION_EPSILON => 0.0,
        BinaryOp::Div => l / r,
        BinaryOp::Mod if r.abs() < DIVISION_EPSILON => 0.0,
        BinaryOp::Mod => l % r,
        // comparisons never reach here
        _ => f64::NAN,
    }
}

fn compare(op: BinaryOp, ordering: Ordering) -> bool {
    match op {
        BinaryOp::Lt => ordering == Ordering::Less,
        BinaryOp::Gt => ordering == Ordering::Greater,
        BinaryOp::Le => ordering != Ordering::Greater,
        BinaryOp::Ge => ordering != Ordering::Less,
        _ => false,
    }
}

/// Apply a binary operator to two evaluated operands
pub fn binary(op: BinaryOp, l: &Value, r: &Value) -> Result<Value> {
    match (l, r) {
        (Value::Number(a), Value::Number(b)) => Ok(match op {
            BinaryOp::Eq => Value::Bool((a - b).abs() < COMPARISON_EPSILON),
            BinaryOp::Ne => Value::Bool((a - b).abs() >= COMPARISON_EPSILON),
            BinaryOp::Lt => Value::Bool(a < b),
            BinaryOp::Gt => Value::Bool(a > b),
            BinaryOp::Le => Value::Bool(a <= b),
            BinaryOp::Ge => Value::Bool(a >= b),
            _ => Value::Number(apply_arith(op, *a, *b)),
        }),

        (Value::String(a), Value::String(b)) if op.is_equality() => {
            Ok(Value::Bool((a == b) == (op == BinaryOp::Eq)))
        }

        // null or mismatched types compare structurally
        _ if op.is_equality() && (l.is_null() || r.is_null() || l.kind() != r.kind()) => {
            Ok(Value::Bool((l == r) == (op == BinaryOp::Eq)))
        }

        _ if l.is_null() || r.is_null() => Err(Error::NullOperand(op.symbol().to_string())),

        (Value::String(_), _) | (_, Value::String(_)) => {
            let (a, b) = (l.to_string(), r.to_string());
            match op {
                BinaryOp::Add => Ok(Value::String(a + &b)),
                BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge => {
                    Ok(Value::Bool(compare(op, a.as_str().cmp(b.as_str()))))
                }
                _ => Err(unsupported(op, l, r)),
            }
        }

        (Value::Bool(a), Value::Bool(b)) if op.is_equality() => {
            Ok(Value::Bool((a == b) == (op == BinaryOp::Eq)))
        }

        _ if op.is_equality() => Ok(Value::Bool((l == r) == (op == BinaryOp::Eq))),

        _ => Err(unsupported(op, l, r)),
    }
}

fn unsupported(op: BinaryOp, l: &Value, r: &Value) -> Error {
    Error::UnsupportedOperator {
        op: op.symbol().to_string(),
        left: l.type_name().to_string(),
        right: r.type_name().to_string(),
    }
}

/// Interpret a value as a condition
///
/// Booleans are taken as-is, null is false, a number is true when nonzero,
/// and the strings `true`/`false` (any case) parse to their boolean. Other
/// strings, pools and entity references fault.
pub fn as_condition(value: &Value) -> Result<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Null => Ok(false),
        Value::Number(n) => Ok(*n != 0.0),
        Value::String(s) if s.trim().eq_ignore_ascii_case("true") => Ok(true),
        Value::String(s) if s.trim().eq_ignore_ascii_case("false") => Ok(false),
        other => Err(Error::TypeError {
            expected: "bool".to_string(),
            got: other.type_name().to_string(),
        }),
    }
}

fn property_of(ctx: &EvalContext<'_>, target: &str, property: &str) -> Result<Value> {
    if target == "self" {
        return ctx
            .entity
            .get(property)
            .cloned()
            .ok_or_else(|| Error::FieldNotFound {
                field: property.to_string(),
                entity: ctx.entity.name.clone(),
            });
    }

    match ctx.field_or_local(target) {
        Some(Value::Pool(pool)) => {
            if property == "count" {
                return Ok(Value::Number(pool.len() as f64));
            }
            return Err(Error::UnknownProperty {
                property: property.to_string(),
                pool: target.to_string(),
            });
        }
        Some(Value::Entity(id)) => {
            if let Some(other) = ctx.table.get(*id) {
                return field_of(other, property);
            }
        }
        _ => {}
    }

    match ctx.table.by_name(target) {
        Some(other) => field_of(other, property),
        None => Err(Error::UnresolvedTarget(target.to_string())),
    }
}

fn field_of(entity: &Entity, field: &str) -> Result<Value> {
    entity
        .get(field)
        .cloned()
        .ok_or_else(|| Error::FieldNotFound {
            field: field.to_string(),
            entity: entity.name.clone(),
        })
}
