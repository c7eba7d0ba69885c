//! Engine configuration

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Tunables for an [`Engine`](crate::Engine) and the simulation driving it
///
/// Every field has a default, so a RON file only needs to name what it
/// changes:
///
/// ```ron
/// (tick_event: "update", strict_arity: false)
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Event sent on load and to every clone spawned by pool `add`
    pub init_event: String,
    /// Event a simulation pulse sends with the frame delta
    pub tick_event: String,
    /// Name of the builtin emit that forwards to host callbacks
    pub host_emit: String,
    /// Argument count must equal the parameter count; when off, extra
    /// arguments are ignored
    pub strict_arity: bool,
    /// Run the garbage-collection sweep after every pulse
    pub gc_after_pulse: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            init_event: "init".to_string(),
            tick_event: "tick".to_string(),
            host_emit: "host".to_string(),
            strict_arity: true,
            gc_after_pulse: true,
        }
    }
}

impl EngineConfig {
    /// Parse a config from RON text
    pub fn from_ron(text: &str) -> Result<Self> {
        ron::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Render the config as pretty RON
    pub fn to_ron(&self) -> Result<String> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| Error::Config(e.to_string()))
    }
}
