//! Morphyn Core - value model and event engine for Morphyn scripts
//!
//! This crate provides everything below the text front end:
//! - Dynamic value types (`Value`, `ValueMap`) and 1-based `Pool`s
//! - Entities, their event handlers, and the `EntityTable` arena
//! - The expression/action AST and the expression evaluator
//! - The `Engine`: deduplicating event queue, subscriptions, synchronous
//!   calls, pool commands and the garbage-collection sweep
//! - Host seams: the `Console` sink and named host callbacks
//!
//! ## Driving the engine
//!
//! ```
//! use morphyn_core::{Action, BinaryOp, Engine, EntityTable, Event, Expr, Value, ValueMap};
//!
//! let mut table = EntityTable::new();
//! let mut fields = ValueMap::new();
//! fields.insert("n".into(), Value::from(0));
//! let bump = Action::set(Expr::binary(BinaryOp::Add, Expr::var("n"), Expr::lit(1.0)), "n");
//! let id = table.declare("c", fields, vec![Event::new("tick", vec![], vec![bump])]).unwrap();
//!
//! let mut engine = Engine::new();
//! engine.send(&table, id, "tick", vec![]).unwrap();
//! engine.run_full_cycle(&mut table);
//! engine.garbage_collect(&mut table);
//! assert_eq!(table.get(id).unwrap().get("n"), Some(&Value::Number(1.0)));
//! ```

mod action;
mod config;
pub mod console;
mod entity;
mod error;
pub mod expr;
mod identity;
mod msg;
pub mod pool;
pub mod runtime;
mod value;

pub use action::{Action, EmitTarget};
pub use config::EngineConfig;
pub use console::{BufferConsole, Callbacks, Console, StdConsole};
pub use entity::{Entity, EntityTable, Event, EventSet};
pub use error::{Error, Result};
pub use expr::{evaluate, BinaryOp, EvalContext, Expr, LogicOp};
pub use identity::EntityId;
pub use msg::PendingEvent;
pub use pool::{Pool, PoolCommand};
pub use runtime::{CycleReport, Engine, Fault, SweepReport, Subscription};
pub use value::{Value, ValueKind, ValueMap};
