//! Identity types for entities

use serde::{Deserialize, Serialize};
use std::fmt;

/// Arena key of an entity instance in an [`EntityTable`](crate::EntityTable)
///
/// Declared entities and the clones spawned by pool `add` each get their own
/// key; keys are never reused within one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl EntityId {
    /// Wrap a raw arena key
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// The raw arena key
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_order() {
        let ids = [EntityId::new(7), EntityId::new(3)];
        assert_eq!(ids.iter().max().map(EntityId::raw), Some(7));
        assert_eq!(ids[1].to_string(), "entity:3");
    }
}
