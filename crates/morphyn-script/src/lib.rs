//! Morphyn Script - text front end and host driver
//!
//! Turns Morphyn source text into an [`EntityTable`] for `morphyn-core`:
//! - Tokenizer and recursive-descent parser with positioned faults
//! - Name-uniqueness checks (entities, fields, events)
//! - Field persistence in the declaration text form
//! - `Simulation`: load, pulse and hot-reload a program
//! - File loading with `import "file";` resolution
//!
//! ```
//! use morphyn_script::{parse, Simulation};
//! use morphyn_core::{EngineConfig, Value};
//!
//! let table = parse("entity c { has n: 0 on tick(dt) { n + 1 -> n } }").unwrap();
//! assert!(table.by_name("c").is_some());
//!
//! let mut sim = Simulation::load(
//!     "entity c { has n: 0 on tick(dt) { n + 1 -> n } }",
//!     EngineConfig::default(),
//! )
//! .unwrap();
//! sim.pulse(0.016);
//! assert_eq!(sim.field("c", "n"), Some(&Value::Number(1.0)));
//! ```

mod ast;
mod error;
pub mod lexer;
pub mod loader;
pub mod parser;
pub mod persist;
mod simulation;


pub use ast::{EntityDecl, Program};
pub use error::{Error, Result};
pub use loader::{load_config, load_file, reload_file, Loader};
pub use parser::{parse_expression, parse_program, Parser};
pub use persist::{merge_fields, render_entity, render_table};
pub use simulation::{ReloadReport, Simulation};

use morphyn_core::EntityTable;

/// Parse a program and declare its entities into a fresh table
///
/// Any lexical, parse or naming fault aborts the whole parse.
pub fn parse(source: &str) -> Result<EntityTable> {
    parse_program(source)?.into_table()
}
