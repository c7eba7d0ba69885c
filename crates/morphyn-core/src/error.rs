//! Error types for morphyn-core

use thiserror::Error;

/// Core error type
///
/// Everything except `SelfSubscription` and `UnknownSubscriptionTarget` is a
/// runtime fault, isolated to the pending event that raised it. Those two are
/// usage faults: the engine reports them and carries on.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Variable '{name}' not found in event '{event}' of entity '{entity}'")]
    UnresolvedVariable {
        name: String,
        event: String,
        entity: String,
    },

    #[error("Target '{0}' is not a pool")]
    NotAPool(String),

    #[error("Index {index} is out of bounds for pool '{pool}'")]
    IndexOutOfBounds { index: i64, pool: String },

    #[error("Index expression evaluated to {got} for pool '{pool}'")]
    InvalidIndex { got: String, pool: String },

    #[error("Cannot perform operation '{0}' with null operand")]
    NullOperand(String),

    #[error("Operator '{op}' not supported for {left} and {right}")]
    UnsupportedOperator {
        op: String,
        left: String,
        right: String,
    },

    #[error("Type error: expected {expected}, got {got}")]
    TypeError { expected: String, got: String },

    #[error("Property '{property}' not supported for pool '{pool}'")]
    UnknownProperty { property: String, pool: String },

    #[error("Field '{field}' not found in entity '{entity}'")]
    FieldNotFound { field: String, entity: String },

    #[error("Entity or pool '{0}' not found")]
    UnresolvedTarget(String),

    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    #[error("Duplicate entity definition: '{0}'")]
    DuplicateEntity(String),

    #[error("Event '{event}' expected {expected} arguments, got {got}")]
    ArgumentCount {
        event: String,
        expected: usize,
        got: usize,
    },

    #[error("Event '{event}' not found in entity '{entity}'")]
    EventNotFound { entity: String, event: String },

    #[error("Nested synchronous call to '{entity}.{event}' while another synchronous call is active")]
    NestedSyncCall { entity: String, event: String },

    #[error("Unknown pool command '{command}' for pool '{pool}'")]
    UnknownPoolCommand { command: String, pool: String },

    #[error("Pool command '{command}' on '{pool}': {reason}")]
    PoolCommand {
        command: String,
        pool: String,
        reason: String,
    },

    #[error("Entity '{0}' cannot subscribe to its own events")]
    SelfSubscription(String),

    #[error("Subscription target entity '{0}' not found")]
    UnknownSubscriptionTarget(String),

    #[error("Invalid engine config: {0}")]
    Config(String),
}

impl Error {
    /// Whether this is a usage fault (reported, treated as a no-op) rather
    /// than a runtime fault
    pub fn is_usage_fault(&self) -> bool {
        matches!(
            self,
            Error::SelfSubscription(_) | Error::UnknownSubscriptionTarget(_)
        )
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
