//! Pools: ordered, 1-based collections and the built-in commands on them

use crate::{EntityId, Error, Result, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An ordered, mutable sequence of values
///
/// The language surface is 1-based: `p[1]` is the first element. Every
/// indexed access goes through [`Pool::get`] / [`Pool::set`], which
/// bounds-check and fault with the 1-based index and the pool name.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pool {
    values: Vec<Value>,
}

/// Built-in commands addressed to a pool field with `emit pool.command(...)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolCommand {
    /// Append a value (or a fresh clone, when the value names an entity)
    Add,
    /// Prepend a value
    Push,
    /// Insert `(index, value)` at a 1-based position
    Insert,
    /// Remove the first value equal to the argument
    Remove,
    /// Remove the value at a 1-based position
    RemoveAt,
    /// Remove the last value
    Pop,
    /// Remove the first value
    Shift,
    /// Exchange two 1-based positions
    Swap,
    /// Remove everything
    Clear,
    /// Send an event to every entity in the pool
    Each,
}

impl PoolCommand {
    /// Look up a command by its source name
    pub fn parse(name: &str) -> Option<Self> {
        let command = match name {
            "add" => PoolCommand::Add,
            "push" => PoolCommand::Push,
            "insert" => PoolCommand::Insert,
            "remove" => PoolCommand::Remove,
            "remove_at" => PoolCommand::RemoveAt,
            "pop" => PoolCommand::Pop,
            "shift" => PoolCommand::Shift,
            "swap" => PoolCommand::Swap,
            "clear" => PoolCommand::Clear,
            "each" => PoolCommand::Each,
            _ => return None,
        };
        Some(command)
    }

    /// The source name of this command
    pub fn name(&self) -> &'static str {
        match self {
            PoolCommand::Add => "add",
            PoolCommand::Push => "push",
            PoolCommand::Insert => "insert",
            PoolCommand::Remove => "remove",
            PoolCommand::RemoveAt => "remove_at",
            PoolCommand::Pop => "pop",
            PoolCommand::Shift => "shift",
            PoolCommand::Swap => "swap",
            PoolCommand::Clear => "clear",
            PoolCommand::Each => "each",
        }
    }
}

impl Pool {
    /// Create an empty pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the pool is empty
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over the elements in order
    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.values.iter()
    }

    /// The elements as a slice
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Append a value
    pub fn append(&mut self, value: Value) {
        self.values.push(value);
    }

    /// Translate a 1-based index to a slot, if in range
    fn slot(&self, index: i64) -> Option<usize> {
        if index >= 1 && (index as u64) <= self.values.len() as u64 {
            Some(index as usize - 1)
        } else {
            None
        }
    }

    fn out_of_bounds(name: &str, index: i64) -> Error {
        Error::IndexOutOfBounds {
            index,
            pool: name.to_string(),
        }
    }

    /// Read the element at a 1-based index
    pub fn get(&self, name: &str, index: i64) -> Result<&Value> {
        self.slot(index)
            .map(|slot| &self.values[slot])
            .ok_or_else(|| Self::out_of_bounds(name, index))
    }

    /// Overwrite the element at a 1-based index
    pub fn set(&mut self, name: &str, index: i64, value: Value) -> Result<()> {
        let slot = self
            .slot(index)
            .ok_or_else(|| Self::out_of_bounds(name, index))?;
        self.values[slot] = value;
        Ok(())
    }

    /// Run a command that only touches this pool
    ///
    /// `add` here appends its argument verbatim; cloning a named prototype and
    /// `each` fan-out need the entity table and are handled by the engine.
    pub fn apply(&mut self, name: &str, command: PoolCommand, args: &[Value]) -> Result<()> {
        let arg = |n: usize| -> Result<&Value> {
            args.get(n).ok_or_else(|| Error::PoolCommand {
                command: command.name().to_string(),
                pool: name.to_string(),
                reason: format!("missing argument {}", n + 1),
            })
        };

        match command {
            PoolCommand::Add => {
                let value = arg(0)?;
                if value.is_null() {
                    return Err(Error::PoolCommand {
                        command: command.name().to_string(),
                        pool: name.to_string(),
                        reason: "requires a non-null argument".to_string(),
                    });
                }
                self.values.push(value.clone());
            }
            PoolCommand::Push => {
                let value = arg(0)?.clone();
                self.values.insert(0, value);
            }
            PoolCommand::Insert => {
                let index = index_from(arg(0)?, name)?;
                let value = arg(1)?.clone();
                // one past the end appends
                if index < 1 || (index as u64) > self.values.len() as u64 + 1 {
                    return Err(Self::out_of_bounds(name, index));
                }
                self.values.insert(index as usize - 1, value);
            }
            PoolCommand::Remove => {
                let value = arg(0)?;
                if let Some(pos) = self.values.iter().position(|v| v == value) {
                    self.values.remove(pos);
                }
            }
            PoolCommand::RemoveAt => {
                let index = index_from(arg(0)?, name)?;
                let slot = self
                    .slot(index)
                    .ok_or_else(|| Self::out_of_bounds(name, index))?;
                self.values.remove(slot);
            }
            PoolCommand::Pop => {
                self.values.pop();
            }
            PoolCommand::Shift => {
                if !self.values.is_empty() {
                    self.values.remove(0);
                }
            }
            PoolCommand::Swap => {
                let first = index_from(arg(0)?, name)?;
                let second = index_from(arg(1)?, name)?;
                let a = self
                    .slot(first)
                    .ok_or_else(|| Self::out_of_bounds(name, first))?;
                let b = self
                    .slot(second)
                    .ok_or_else(|| Self::out_of_bounds(name, second))?;
                self.values.swap(a, b);
            }
            PoolCommand::Clear => self.values.clear(),
            PoolCommand::Each => {
                return Err(Error::PoolCommand {
                    command: command.name().to_string(),
                    pool: name.to_string(),
                    reason: "needs the engine to deliver events".to_string(),
                })
            }
        }
        Ok(())
    }

    /// Drop entity references for which `keep` returns false, descending into
    /// nested pools. Returns how many references were removed.
    pub fn retain_entities(&mut self, keep: &impl Fn(EntityId) -> bool) -> usize {
        let before = self.values.len();
        self.values.retain(|v| match v {
            Value::Entity(id) => keep(*id),
            _ => true,
        });
        let mut removed = before - self.values.len();
        for value in &mut self.values {
            if let Value::Pool(inner) = value {
                removed += inner.retain_entities(keep);
            }
        }
        removed
    }
}

/// Convert an evaluated index value to a 1-based integer index
///
/// Numbers round half to even, as the scripts' numeric-to-index conversion
/// always has.
pub fn index_from(value: &Value, pool: &str) -> Result<i64> {
    match value {
        Value::Number(n) => Ok(n.round_ties_even() as i64),
        other => Err(Error::InvalidIndex {
            got: other.type_name().to_string(),
            pool: pool.to_string(),
        }),
    }
}

impl From<Vec<Value>> for Pool {
    fn from(values: Vec<Value>) -> Self {
        Self { values }
    }
}

impl FromIterator<Value> for Pool {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pool[")?;
        for (i, v) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", v)?;
        }
        write!(f, "]")
    }
}
