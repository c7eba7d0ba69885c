//! Entities, their event handlers, and the entity table

use crate::{Action, EntityId, Error, Result, Value, ValueMap};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A named event handler: ordered parameters and an ordered action list
///
/// Immutable once parsed. A hot reload swaps an entity's whole event set
/// rather than editing events in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub name: String,
    pub params: Vec<String>,
    pub actions: Vec<Action>,
}

impl Event {
    /// Create a new event
    pub fn new(name: impl Into<String>, params: Vec<String>, actions: Vec<Action>) -> Self {
        Self {
            name: name.into(),
            params,
            actions,
        }
    }
}

/// An entity's events in declaration order, with a by-name index
///
/// The index is built once in [`EventSet::new`]; the set is never mutated
/// afterwards, so clones can share it behind an `Arc`.
#[derive(Debug, Default)]
pub struct EventSet {
    events: Vec<Arc<Event>>,
    index: IndexMap<String, usize>,
}

impl EventSet {
    /// Build a set from events in declaration order
    ///
    /// If two events share a name the first one wins; the parser rejects
    /// such programs before they get here.
    pub fn new(events: Vec<Event>) -> Self {
        let mut set = Self::default();
        for event in events {
            if set.index.contains_key(&event.name) {
                continue;
            }
            set.index.insert(event.name.clone(), set.events.len());
            set.events.push(Arc::new(event));
        }
        set
    }

    /// Look up an event by name
    pub fn get(&self, name: &str) -> Option<&Arc<Event>> {
        self.index.get(name).map(|&i| &self.events[i])
    }

    /// Iterate over events in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter().map(|e| e.as_ref())
    }

    /// Number of events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Check if there are no events
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// A live entity instance
#[derive(Debug, Clone)]
pub struct Entity {
    /// Arena key
    pub id: EntityId,
    /// Declared name; clones keep their prototype's name
    pub name: String,
    /// Field values in declaration order
    pub fields: ValueMap,
    events: Arc<EventSet>,
    destroyed: bool,
}

impl Entity {
    /// Create a new entity
    pub fn new(id: EntityId, name: impl Into<String>, fields: ValueMap, events: Vec<Event>) -> Self {
        Self {
            id,
            name: name.into(),
            fields,
            events: Arc::new(EventSet::new(events)),
            destroyed: false,
        }
    }

    /// Get a field value
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Get a mutable field value
    pub fn get_mut(&mut self, field: &str) -> Option<&mut Value> {
        self.fields.get_mut(field)
    }

    /// Set a field value, declaring it if absent
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field.into(), value.into());
    }

    /// Check if the entity declares a field
    pub fn has_field(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Look up an event handler by name
    pub fn event(&self, name: &str) -> Option<Arc<Event>> {
        self.events.get(name).cloned()
    }

    /// Check if the entity declares an event
    pub fn has_event(&self, name: &str) -> bool {
        self.events.get(name).is_some()
    }

    /// All event handlers
    pub fn events(&self) -> &EventSet {
        &self.events
    }

    /// Replace the whole event list
    pub fn replace_events(&mut self, events: Vec<Event>) {
        self.events = Arc::new(EventSet::new(events));
    }

    /// Check if the entity has been marked destroyed
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Mark the entity destroyed; it stays in the table until discarded
    pub fn destroy(&mut self) {
        self.destroyed = true;
    }

    /// Copy this entity under a new id
    ///
    /// Field values are cloned (nested pools included); the event set is
    /// shared with the prototype.
    fn clone_as(&self, id: EntityId) -> Self {
        Self {
            id,
            name: self.name.clone(),
            fields: self.fields.clone(),
            events: Arc::clone(&self.events),
            destroyed: false,
        }
    }
}

/// Storage for every entity in a program
///
/// Declared entities are reachable by name; clones spawned at runtime are
/// only reachable through their id.
#[derive(Debug, Clone, Default)]
pub struct EntityTable {
    entities: IndexMap<EntityId, Entity>,
    names: IndexMap<String, EntityId>,
    next_id: u64,
}

impl EntityTable {
    /// Create a new empty table
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&mut self) -> EntityId {
        let id = EntityId::new(self.next_id);
        self.next_id += 1;
        id
    }

    /// Declare a named entity
    pub fn declare(
        &mut self,
        name: impl Into<String>,
        fields: ValueMap,
        events: Vec<Event>,
    ) -> Result<EntityId> {
        let name = name.into();
        if self.names.contains_key(&name) {
            return Err(Error::DuplicateEntity(name));
        }
        let id = self.allocate();
        self.names.insert(name.clone(), id);
        self.entities.insert(id, Entity::new(id, name, fields, events));
        Ok(id)
    }

    /// Spawn an unnamed copy of an existing entity
    pub fn spawn_clone(&mut self, proto: EntityId) -> Result<EntityId> {
        let id = self.allocate();
        let clone = self
            .entities
            .get(&proto)
            .map(|e| e.clone_as(id))
            .ok_or_else(|| Error::EntityNotFound(proto.to_string()))?;
        self.entities.insert(id, clone);
        Ok(id)
    }

    /// Get an entity by id
    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    /// Get a mutable entity by id
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    /// Resolve a declared entity name
    pub fn id_of(&self, name: &str) -> Option<EntityId> {
        self.names.get(name).copied()
    }

    /// Get a declared entity by name
    pub fn by_name(&self, name: &str) -> Option<&Entity> {
        self.id_of(name).and_then(|id| self.get(id))
    }

    /// Get a mutable declared entity by name
    pub fn by_name_mut(&mut self, name: &str) -> Option<&mut Entity> {
        let id = self.id_of(name)?;
        self.get_mut(id)
    }

    /// Resolve a value that refers to an entity: an entity reference, or a
    /// string naming a declared entity
    pub fn resolve(&self, value: &Value) -> Option<EntityId> {
        match value {
            Value::Entity(id) if self.contains(*id) => Some(*id),
            Value::String(name) => self.id_of(name),
            _ => None,
        }
    }

    /// Physically remove an entity
    pub fn discard(&mut self, id: EntityId) -> Option<Entity> {
        let entity = self.entities.shift_remove(&id)?;
        if self.names.get(&entity.name) == Some(&id) {
            self.names.shift_remove(&entity.name);
        }
        Some(entity)
    }

    /// Check if an id is present
    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    /// Check if an id is present and not destroyed
    pub fn is_live(&self, id: EntityId) -> bool {
        self.get(id).is_some_and(|e| !e.is_destroyed())
    }

    /// Declared names in declaration order
    pub fn names(&self) -> impl Iterator<Item = (&str, EntityId)> {
        self.names.iter().map(|(name, id)| (name.as_str(), *id))
    }

    /// All entity ids in creation order
    pub fn ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.keys().copied()
    }

    /// Iterate over all entities
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// Iterate mutably over all entities
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Entity> {
        self.entities.values_mut()
    }

    /// Number of entities, clones included
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Check if the table is empty
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
