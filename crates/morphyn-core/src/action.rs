//! Actions: the statements that make up an event body

use crate::Expr;
use serde::{Deserialize, Serialize};

/// Who an `emit` is addressed to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum EmitTarget {
    /// `emit event(...)`: the emitting entity, or a builtin
    #[default]
    Implicit,
    /// `emit self.event(...)`
    SelfRef,
    /// `emit name.event(...)`: an own pool field, or a declared entity
    Named(String),
    /// `emit entity.pool.command(...)`: a pool field on another entity
    Remote { entity: String, field: String },
}

impl EmitTarget {
    /// The target as it was written, for diagnostics
    pub fn describe(&self) -> String {
        match self {
            EmitTarget::Implicit => String::new(),
            EmitTarget::SelfRef => "self".to_string(),
            EmitTarget::Named(name) => name.clone(),
            EmitTarget::Remote { entity, field } => format!("{}.{}", entity, field),
        }
    }
}

/// A single statement in an event body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Action {
    /// Queue an event, run a builtin, or run a pool command
    Emit {
        target: EmitTarget,
        event: String,
        args: Vec<Expr>,
    },
    /// Call an event synchronously and assign its result to a field or local
    EmitWithReturn {
        target: EmitTarget,
        event: String,
        args: Vec<Expr>,
        field: String,
    },
    /// Call an event synchronously and assign its result to a pool slot
    EmitWithReturnIndexed {
        target: EmitTarget,
        event: String,
        args: Vec<Expr>,
        pool: String,
        index: Expr,
    },
    /// Guard. Without an inline action a false condition halts the event;
    /// with one, a false condition skips it and execution continues.
    Check {
        condition: Expr,
        then: Option<Box<Action>>,
    },
    /// `expr -> name`: assign to a field if declared, else to a local
    Set { value: Expr, target: String },
    /// `expr -> pool[index]`
    SetIndex {
        pool: String,
        index: Expr,
        value: Expr,
    },
    /// Ordered sequence; the first failing action halts the block
    Block(Vec<Action>),
    /// `when Target.event: handler(args)`
    When {
        target: String,
        event: String,
        handler: String,
        args: Option<Vec<Expr>>,
    },
    /// `unwhen Target.event: handler`
    Unwhen {
        target: String,
        event: String,
        handler: String,
    },
}

impl Action {
    /// Shorthand for an `emit` to the implicit target
    pub fn emit(event: impl Into<String>, args: Vec<Expr>) -> Self {
        Action::Emit {
            target: EmitTarget::Implicit,
            event: event.into(),
            args,
        }
    }

    /// Shorthand for `value -> target`
    pub fn set(value: Expr, target: impl Into<String>) -> Self {
        Action::Set {
            value,
            target: target.into(),
        }
    }
}
