//! Host-side driver: load, pulse and hot-reload a program

use crate::error::{Error, Result};
use crate::parser::parse_program;
use crate::persist;
use morphyn_core::{
    CycleReport, Engine, EngineConfig, Entity, EntityId, EntityTable, Fault, Value,
};
use tracing::{info, warn};

/// Outcome of [`Simulation::reload`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReloadReport {
    /// Existing entities whose events were replaced
    pub updated: Vec<String>,
    /// Entities declared for the first time
    pub spawned: Vec<String>,
    /// The drain that ran the new entities' init events
    pub cycle: CycleReport,
}

/// An entity table and the engine that drives it
pub struct Simulation {
    pub table: EntityTable,
    pub engine: Engine,
}

impl Simulation {
    /// Wrap an engine with an empty table
    pub fn new(engine: Engine) -> Self {
        Self {
            table: EntityTable::new(),
            engine,
        }
    }

    /// Parse `source`, run every init event and return the simulation
    pub fn load(source: &str, config: EngineConfig) -> Result<Self> {
        let mut sim = Self::new(Engine::with_config(config));
        sim.load_source(source)?;
        Ok(sim)
    }

    /// Declare the entities of `source` and drain their init events
    ///
    /// Nothing is declared if the source fails to parse or names an entity
    /// already in the table.
    pub fn load_source(&mut self, source: &str) -> Result<CycleReport> {
        let program = parse_program(source)?;
        if let Some(decl) = program
            .entities
            .iter()
            .find(|d| self.table.id_of(&d.name).is_some())
        {
            return Err(Error::DuplicateEntity(decl.name.clone()));
        }

        let mut declared = Vec::with_capacity(program.entities.len());
        for decl in program.entities {
            declared.push(self.table.declare(decl.name, decl.fields, decl.events)?);
        }
        info!(entities = declared.len(), "program loaded");
        let init = self.engine.config().init_event.clone();
        Ok(self.broadcast(&declared, &init, Vec::new()))
    }

    /// Send the tick event with `[dt]` to every live entity handling it,
    /// drain, and sweep if configured
    pub fn pulse(&mut self, dt: f64) -> CycleReport {
        let tick = self.engine.config().tick_event.clone();
        let ids: Vec<EntityId> = self.table.ids().collect();
        let report = self.broadcast(&ids, &tick, vec![Value::Number(dt)]);
        if self.engine.config().gc_after_pulse {
            self.engine.garbage_collect(&mut self.table);
        }
        report
    }

    /// Send `event` to every live entity in `ids` that handles it, then drain
    fn broadcast(&mut self, ids: &[EntityId], event: &str, args: Vec<Value>) -> CycleReport {
        let mut send_faults = Vec::new();
        for &id in ids {
            let Some(entity) = self.table.get(id) else {
                continue;
            };
            if entity.is_destroyed() || !entity.has_event(event) {
                continue;
            }
            let name = entity.name.clone();
            if let Err(error) = self.engine.send(&self.table, id, event, args.clone()) {
                warn!(entity = %name, event, error = %error, "send failed");
                send_faults.push(Fault {
                    entity: name,
                    event: event.to_string(),
                    error,
                });
            }
        }
        let mut report = self.engine.run_full_cycle(&mut self.table);
        send_faults.append(&mut report.faults);
        report.faults = send_faults;
        report
    }

    /// Hot-reload `source`
    ///
    /// Entities already declared keep their field values, gain any field
    /// they did not have, and have their whole event list replaced (clones
    /// included). New entities are declared and sent the init event. A
    /// source that fails to parse leaves the simulation untouched.
    pub fn reload(&mut self, source: &str) -> Result<ReloadReport> {
        let program = parse_program(source)?;
        let mut report = ReloadReport::default();
        let mut fresh = Vec::new();

        for decl in program.entities {
            if self.table.id_of(&decl.name).is_none() {
                fresh.push(self.table.declare(decl.name.clone(), decl.fields, decl.events)?);
                report.spawned.push(decl.name);
                continue;
            }
            for entity in self.table.iter_mut().filter(|e| e.name == decl.name) {
                for (field, value) in &decl.fields {
                    if !entity.has_field(field) {
                        entity.set(field.clone(), value.clone());
                    }
                }
                entity.replace_events(decl.events.clone());
            }
            report.updated.push(decl.name);
        }

        info!(
            updated = report.updated.len(),
            spawned = report.spawned.len(),
            "program reloaded"
        );
        let init = self.engine.config().init_event.clone();
        report.cycle = self.broadcast(&fresh, &init, Vec::new());
        Ok(report)
    }

    /// Enqueue an event for a declared entity
    pub fn send(&mut self, name: &str, event: &str, args: Vec<Value>) -> Result<()> {
        self.engine.send_named(&self.table, name, event, args)?;
        Ok(())
    }

    /// Drain the queue
    pub fn run(&mut self) -> CycleReport {
        self.engine.run_full_cycle(&mut self.table)
    }

    /// A declared entity by name
    pub fn entity(&self, name: &str) -> Option<&Entity> {
        self.table.by_name(name)
    }

    /// A field of a declared entity
    pub fn field(&self, entity: &str, field: &str) -> Option<&Value> {
        self.entity(entity).and_then(|e| e.get(field))
    }

    /// Render every declared entity's fields
    pub fn render(&self) -> String {
        persist::render_table(&self.table)
    }
}
