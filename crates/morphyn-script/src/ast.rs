//! Program-level syntax tree: entity declarations

use crate::Result;
use morphyn_core::{EntityTable, Event, ValueMap};
use serde::{Deserialize, Serialize};

/// One `entity Name { ... }` declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDecl {
    pub name: String,
    /// Field initializers in declaration order
    pub fields: ValueMap,
    /// Event handlers in declaration order
    pub events: Vec<Event>,
}

/// A parsed program
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub entities: Vec<EntityDecl>,
}

impl Program {
    /// Find a declaration by name
    pub fn entity(&self, name: &str) -> Option<&EntityDecl> {
        self.entities.iter().find(|e| e.name == name)
    }

    /// Declare every entity into a fresh table
    pub fn into_table(self) -> Result<EntityTable> {
        let mut table = EntityTable::new();
        for decl in self.entities {
            table.declare(decl.name, decl.fields, decl.events)?;
        }
        Ok(table)
    }
}
