//! Dynamic value types for entity fields and evaluation results

use crate::identity::EntityId;
use crate::pool::Pool;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A dynamic value held by a field, a local, or produced by an expression
///
/// Numbers and booleans are stored inline; only strings and pools own heap
/// data. Entity references are arena keys, never owning pointers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum Value {
    /// No value / null
    #[default]
    Null,
    /// Double-precision number (integer lexemes are stored as doubles too)
    Number(f64),
    /// Boolean value
    Bool(bool),
    /// String value
    String(String),
    /// Ordered, 1-based collection
    Pool(Pool),
    /// Reference to an entity in the table
    Entity(EntityId),
}

/// Discriminant of a [`Value`]
///
/// Pools and entity references are both reported as `Object`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Number,
    Bool,
    String,
    Object,
}

/// A map of names to dynamic values
///
/// Uses IndexMap to preserve declaration order (fields render back in the
/// order they were written).
pub type ValueMap = IndexMap<String, Value>;

impl Value {
    /// Equality for message identity: like `==`, except a NaN number
    /// matches another NaN, nested pools included
    pub fn same_as(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::Pool(a), Value::Pool(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.same_as(y))
            }
            _ => self == other,
        }
    }

    /// Check if this value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get the discriminant of this value
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Number(_) => ValueKind::Number,
            Value::Bool(_) => ValueKind::Bool,
            Value::String(_) => ValueKind::String,
            Value::Pool(_) | Value::Entity(_) => ValueKind::Object,
        }
    }

    /// Try to get this value as a number
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Try to get this value as a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get this value as a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get this value as a pool
    pub fn as_pool(&self) -> Option<&Pool> {
        match self {
            Value::Pool(pool) => Some(pool),
            _ => None,
        }
    }

    /// Try to get this value as a mutable pool
    pub fn as_pool_mut(&mut self) -> Option<&mut Pool> {
        match self {
            Value::Pool(pool) => Some(pool),
            _ => None,
        }
    }

    /// Try to get this value as an entity reference
    pub fn as_entity(&self) -> Option<EntityId> {
        match self {
            Value::Entity(id) => Some(*id),
            _ => None,
        }
    }

    /// Get the type name of this value
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Number(_) => "number",
            Value::Bool(_) => "bool",
            Value::String(_) => "string",
            Value::Pool(_) => "pool",
            Value::Entity(_) => "entity",
        }
    }
}

/// Renders the value the way `log` prints it: strings unquoted, pools as
/// `pool[a, b]`.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Number(n) => write!(f, "{}", n),
            Value::Bool(b) => write!(f, "{}", b),
            Value::String(s) => write!(f, "{}", s),
            Value::Pool(pool) => write!(f, "{}", pool),
            Value::Entity(id) => write!(f, "{}", id),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<Pool> for Value {
    fn from(pool: Pool) -> Self {
        Value::Pool(pool)
    }
}

impl From<EntityId> for Value {
    fn from(id: EntityId) -> Self {
        Value::Entity(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_types() {
        assert!(Value::Null.is_null());
        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert_eq!(Value::Number(3.5).as_number(), Some(3.5));
        assert_eq!(Value::String("hello".into()).as_str(), Some("hello"));
        assert_eq!(Value::Entity(EntityId::new(4)).as_entity(), Some(EntityId::new(4)));
        assert_eq!(Value::Bool(true).as_number(), None);
    }

    #[test]
    fn test_value_kind() {
        assert_eq!(Value::Null.kind(), ValueKind::Null);
        assert_eq!(Value::from(1.0).kind(), ValueKind::Number);
        assert_eq!(Value::Pool(Pool::new()).kind(), ValueKind::Object);
        assert_eq!(Value::Entity(EntityId::new(0)).kind(), ValueKind::Object);
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Number(2.0).to_string(), "2");
        assert_eq!(Value::Number(0.5).to_string(), "0.5");
        assert_eq!(Value::from("hi").to_string(), "hi");
        let pool = Pool::from(vec![Value::from(1), Value::from("a")]);
        assert_eq!(Value::Pool(pool).to_string(), "pool[1, a]");
    }
}
