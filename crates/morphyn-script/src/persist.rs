//! Field persistence in the declaration text form
//!
//! Only field values survive a round trip; event definitions are never
//! rendered and never touched by a merge.

use crate::error::{Error, Result};
use crate::parser::parse_program;
use morphyn_core::{Entity, EntityTable, Value};
use std::fmt::Write;

/// Render one value as a field literal
///
/// Entity references become the quoted entity name, or `null` once the
/// entity is gone from the table. Non-finite numbers also render as `null`.
pub fn render_value(value: &Value, table: &EntityTable) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Number(n) if n.is_finite() => n.to_string(),
        Value::Number(_) => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::String(s) => quote(s),
        Value::Pool(pool) => {
            let items: Vec<String> = pool.iter().map(|v| render_value(v, table)).collect();
            format!("pool[{}]", items.join(", "))
        }
        Value::Entity(id) => match table.get(*id) {
            Some(entity) => quote(&entity.name),
            None => "null".to_string(),
        },
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Render an entity's fields as an `entity Name { has ... }` snippet
pub fn render_entity(entity: &Entity, table: &EntityTable) -> String {
    let mut out = format!("entity {} {{\n", entity.name);
    for (field, value) in &entity.fields {
        let _ = writeln!(out, "  has {}: {}", field, render_value(value, table));
    }
    out.push_str("}\n");
    out
}

/// Render every declared entity, in declaration order
pub fn render_table(table: &EntityTable) -> String {
    table
        .names()
        .filter_map(|(_, id)| table.get(id))
        .map(|entity| render_entity(entity, table))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parse a single-entity snippet and copy its fields into `entity`
///
/// Fields the snippet does not mention keep their values. The snippet's
/// entity name is not checked against the target.
pub fn merge_fields(entity: &mut Entity, snippet: &str) -> Result<()> {
    let program = parse_program(snippet)?;
    let count = program.entities.len();
    let Some(decl) = program.entities.into_iter().next().filter(|_| count == 1) else {
        return Err(Error::Snippet(count));
    };
    for (field, value) in decl.fields {
        entity.set(field, value);
    }
    Ok(())
}
