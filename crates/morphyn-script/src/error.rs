//! Error types for morphyn-script

use thiserror::Error;

/// Script loading error type
///
/// Lexical, parse and semantic faults abort a load; no partial table is
/// ever produced. Positions are 1-based; `context` holds the offending
/// source line with a caret under the column.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unrecognized input at line {line}, col {column}\n{context}")]
    Lexical {
        line: usize,
        column: usize,
        context: String,
    },

    #[error("Parse error at line {line}, col {column}: {message}\n{context}")]
    Parse {
        line: usize,
        column: usize,
        message: String,
        context: String,
    },

    #[error("Entity '{entity}' has duplicate field '{field}'")]
    DuplicateField { entity: String, field: String },

    #[error("Entity '{entity}' has duplicate event '{event}'")]
    DuplicateEvent { entity: String, event: String },

    #[error("Duplicate entity definition: '{0}'")]
    DuplicateEntity(String),

    #[error("Expected exactly one entity in snippet, found {0}")]
    Snippet(usize),

    #[error("Unsupported script extension '{0}'")]
    Extension(String),

    #[error(transparent)]
    Core(#[from] morphyn_core::Error),
}

impl Error {
    /// Whether this is a name-uniqueness fault found after parsing succeeded
    pub fn is_semantic(&self) -> bool {
        matches!(
            self,
            Error::DuplicateField { .. } | Error::DuplicateEvent { .. } | Error::DuplicateEntity(_)
        )
    }

    /// Source position of a lexical or parse fault
    pub fn position(&self) -> Option<(usize, usize)> {
        match self {
            Error::Lexical { line, column, .. } | Error::Parse { line, column, .. } => {
                Some((*line, *column))
            }
            _ => None,
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Render the source line at `line` with a caret under `column`
pub(crate) fn source_context(source: &str, line: usize, column: usize) -> String {
    let text = source.lines().nth(line.saturating_sub(1)).unwrap_or("");
    let pad = column.saturating_sub(1).min(text.chars().count());
    format!("{}\n{}^", text, " ".repeat(pad))
}
