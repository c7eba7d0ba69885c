//! Script file loader
//!
//! A script may pull in other scripts with `import "path";` lines. Paths
//! are relative to the importing file; each file is spliced in at most once
//! per load, so circular imports terminate. A missing import is logged and
//! skipped.

use crate::error::{Error, Result};
use crate::simulation::{ReloadReport, Simulation};
use morphyn_core::EngineConfig;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Accepted script file extensions
pub const EXTENSIONS: [&str; 3] = ["mrph", "morph", "morphyn"];

/// Resolves a script file and its imports into one source text
#[derive(Debug, Default)]
pub struct Loader {
    visited: HashSet<PathBuf>,
}

impl Loader {
    /// Create a new loader
    pub fn new() -> Self {
        Self::default()
    }

    /// Files spliced in so far
    pub fn visited(&self) -> impl Iterator<Item = &Path> {
        self.visited.iter().map(PathBuf::as_path)
    }

    /// Read `path` with its imports spliced in place
    pub fn resolve(&mut self, path: impl AsRef<Path>) -> Result<String> {
        let path = path.as_ref();
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        if !EXTENSIONS.contains(&extension) {
            return Err(Error::Extension(extension.to_string()));
        }
        let path = fs::canonicalize(path)?;
        self.splice(&path)
    }

    fn splice(&mut self, path: &Path) -> Result<String> {
        if !self.visited.insert(path.to_path_buf()) {
            debug!(path = %path.display(), "skipping repeated import");
            return Ok(String::new());
        }
        let content = fs::read_to_string(path)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));

        let mut out = String::with_capacity(content.len());
        for line in content.lines() {
            match import_target(line) {
                Some(Some(target)) => {
                    let Ok(resolved) = fs::canonicalize(base.join(target)) else {
                        warn!(import = target, from = %path.display(), "import not found");
                        continue;
                    };
                    out.push_str(&self.splice(&resolved)?);
                }
                Some(None) => {
                    warn!(line = line.trim(), from = %path.display(), "malformed import");
                }
                None => {
                    out.push_str(line);
                    out.push('\n');
                }
            }
        }
        Ok(out)
    }
}

/// `None` for an ordinary line; `Some(None)` for an import without a
/// quoted path
fn import_target(line: &str) -> Option<Option<&str>> {
    let trimmed = line.trim();
    if !trimmed.starts_with("import ") || !trimmed.ends_with(';') {
        return None;
    }
    let first = trimmed.find('"')?;
    let last = trimmed.rfind('"')?;
    Some((last > first + 1).then(|| &trimmed[first + 1..last]))
}

/// Load a script file and its imports into a running simulation
pub fn load_file(path: impl AsRef<Path>, config: EngineConfig) -> Result<Simulation> {
    let source = Loader::new().resolve(path)?;
    Simulation::load(&source, config)
}

/// Re-read a script file and hot-reload it into `sim`
pub fn reload_file(sim: &mut Simulation, path: impl AsRef<Path>) -> Result<ReloadReport> {
    let source = Loader::new().resolve(path)?;
    sim.reload(&source)
}

/// Read an [`EngineConfig`] from a RON file
pub fn load_config(path: impl AsRef<Path>) -> Result<EngineConfig> {
    let text = fs::read_to_string(path)?;
    Ok(EngineConfig::from_ron(&text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use morphyn_core::Value;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("morphyn-loader-{}-{}", std::process::id(), name));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_import_target() {
        assert_eq!(import_target("import \"a.morphyn\";"), Some(Some("a.morphyn")));
        assert_eq!(import_target("  import \"lib/b.mrph\";  "), Some(Some("lib/b.mrph")));
        assert_eq!(import_target("import \"\";"), Some(None));
        assert_eq!(import_target("import a;"), None);
        assert_eq!(import_target("entity importer { }"), None);
    }

    #[test]
    fn test_imports_are_spliced_once() {
        let dir = scratch("splice");
        fs::create_dir_all(dir.join("lib")).unwrap();
        fs::write(
            dir.join("main.morphyn"),
            "import \"lib/enemy.mrph\";\nimport \"missing.morph\";\nentity Game { has n: 1 }\n",
        )
        .unwrap();
        fs::write(
            dir.join("lib/enemy.mrph"),
            "import \"../main.morphyn\";\nentity Enemy { has hp: 3 }\n",
        )
        .unwrap();

        let mut loader = Loader::new();
        let source = loader.resolve(dir.join("main.morphyn")).unwrap();
        assert_eq!(source, "entity Enemy { has hp: 3 }\nentity Game { has n: 1 }\n");
        assert_eq!(loader.visited().count(), 2);
    }

    #[test]
    fn test_load_and_reload_file() {
        let dir = scratch("load");
        let path = dir.join("game.morph");
        fs::write(&path, "entity C { has n: 0 on init { 1 -> n } }").unwrap();
        let mut sim = load_file(&path, EngineConfig::default()).unwrap();
        assert_eq!(sim.field("C", "n"), Some(&Value::Number(1.0)));

        fs::write(&path, "entity C { has n: 0 on bump { n + 10 -> n } }").unwrap();
        let report = reload_file(&mut sim, &path).unwrap();
        assert_eq!(report.updated, vec!["C".to_string()]);
        sim.send("C", "bump", vec![]).unwrap();
        sim.run();
        assert_eq!(sim.field("C", "n"), Some(&Value::Number(11.0)));
    }

    #[test]
    fn test_rejects_unknown_extension() {
        let err = Loader::new().resolve("game.txt").unwrap_err();
        assert!(matches!(err, Error::Extension(ref ext) if ext == "txt"));
        assert!(matches!(Loader::new().resolve("absent.morphyn"), Err(Error::Io(_))));
    }

    #[test]
    fn test_load_config() {
        let dir = scratch("config");
        let path = dir.join("engine.ron");
        fs::write(&path, "(tick_event: \"update\", strict_arity: false)").unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.tick_event, "update");
        assert!(!config.strict_arity);
        assert_eq!(config.init_event, "init");

        fs::write(&path, "(tick_event: 3)").unwrap();
        assert!(matches!(load_config(&path), Err(Error::Core(_))));
    }
}
