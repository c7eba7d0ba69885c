//! Pending events: the unit of work in the engine queue

use crate::{EntityId, Value};
use serde::{Deserialize, Serialize};

/// An event addressed to one entity, waiting in the queue
///
/// Two pending events are the same message when target, event name and
/// every argument match under [`Value::same_as`]; the queue keeps only one
/// of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingEvent {
    /// Receiving entity
    pub target: EntityId,
    /// Event name
    pub event: String,
    /// Positional arguments bound to the event's parameters
    pub args: Vec<Value>,
}

impl PendingEvent {
    /// Create a pending event with no arguments
    pub fn new(target: EntityId, event: impl Into<String>) -> Self {
        Self {
            target,
            event: event.into(),
            args: Vec::new(),
        }
    }

    /// Set the arguments
    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    /// Append one argument
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Check if `other` is the same message
    pub fn same_message(&self, other: &PendingEvent) -> bool {
        self.target == other.target
            && self.event == other.event
            && self.args.len() == other.args.len()
            && self.args.iter().zip(&other.args).all(|(a, b)| a.same_as(b))
    }

    /// Key used for the queue's fast duplicate pre-check
    pub(crate) fn key(&self) -> (EntityId, String) {
        (self.target, self.event.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_includes_args() {
        let a = PendingEvent::new(EntityId::new(1), "tick").arg(1.0);
        let b = PendingEvent::new(EntityId::new(1), "tick").arg(1.0);
        let c = PendingEvent::new(EntityId::new(1), "tick").arg(2.0);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.key(), c.key());
        assert!(a.same_message(&b));
        assert!(!a.same_message(&c));
    }

    #[test]
    fn test_nan_arguments_are_the_same_message() {
        let a = PendingEvent::new(EntityId::new(1), "hit").arg(f64::NAN);
        let b = PendingEvent::new(EntityId::new(1), "hit").arg(f64::NAN);
        assert_ne!(a, b);
        assert!(a.same_message(&b));

        let nested = |n: f64| {
            let pool: crate::Pool = vec![Value::Number(n)].into();
            PendingEvent::new(EntityId::new(1), "hit").arg(pool)
        };
        assert!(nested(f64::NAN).same_message(&nested(f64::NAN)));
        assert!(!nested(f64::NAN).same_message(&nested(1.0)));
    }
}
