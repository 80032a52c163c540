use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

/// One `[compiler.NAME]` entry from `.cbi/config`, or a shipped default.
///
/// Either `alias_of` is set (in which case every other field is ignored
/// and resolution follows the pointer, per `COMPILER EMULATOR`), or the
/// compiler is described directly by its parser rules, modes, and
/// passes.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct CompilerConfig {
    #[serde(default)]
    pub alias_of: Option<String>,
    #[serde(default)]
    pub parser: Vec<ParserRule>,
    #[serde(default)]
    pub modes: Vec<ModeConfig>,
    #[serde(default)]
    pub passes: Vec<PassConfig>,
}

/// A flag pattern and the action it triggers, per `COMPILER EMULATOR`.
#[derive(Debug, Clone, Deserialize)]
pub struct ParserRule {
    pub flag: String,
    pub action: Action,
    /// Destination bucket name (`"defines"`, `"include_paths"`,
    /// `"modes"`, or any name a `mode`/`pass` predicate checks against).
    pub dest: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub separator: Option<String>,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub override_previous: bool,
}

/// A closed tagged-variant of argument actions (`DESIGN NOTES`: model as
/// a closed enum, never runtime introspection).
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    StoreConst,
    AppendConst,
    Store,
    Append,
    StoreSplit,
    StoreTrue,
    StoreFalse,
}

/// A named predicate, turned on by a parser rule, that contributes
/// defines/include paths/include files when active.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ModeConfig {
    pub name: String,
    #[serde(default)]
    pub defines: Vec<String>,
    #[serde(default)]
    pub include_paths: Vec<String>,
    #[serde(default)]
    pub include_files: Vec<String>,
}

/// Like a mode, but gated on a set of active modes (a SYCL "pass" such
/// as `sycl-spir64`).
#[derive(Debug, Clone, Deserialize, Default)]
pub struct PassConfig {
    pub name: String,
    #[serde(default)]
    pub requires_modes: Vec<String>,
    #[serde(default)]
    pub defines: Vec<String>,
    #[serde(default)]
    pub include_paths: Vec<String>,
    #[serde(default)]
    pub include_files: Vec<String>,
}

/// The full set of known compilers: shipped defaults, additively
/// overridden by the project's `.cbi/config`.
#[derive(Debug, Clone, Default)]
pub struct ConfigDatabase {
    compilers: HashMap<String, CompilerConfig>,
}

#[derive(Debug, Deserialize)]
struct RawConfigFile {
    #[serde(default, rename = "compiler")]
    compiler: HashMap<String, CompilerConfig>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read compiler config {path}: {source}")]
    Io { path: std::path::PathBuf, #[source] source: std::io::Error },
    #[error("malformed compiler config {path}: {source}")]
    Parse { path: std::path::PathBuf, #[source] source: toml::de::Error },
    #[error("alias cycle detected starting at '{0}'")]
    AliasCycle(String),
    #[error("unknown compiler '{0}'")]
    UnknownCompiler(String),
}

impl ConfigDatabase {
    /// Shipped defaults for the handful of compiler drivers CBI needs to
    /// understand out of the box, covering the scenario in
    /// `TESTABLE PROPERTIES` #4 (`-fopenmp` on a GCC-like driver).
    pub fn with_shipped_defaults() -> Self {
        let mut db = Self::default();
        db.insert_shipped("gcc");
        db.insert_shipped("g++");
        db.insert_shipped("clang");
        db.insert_shipped("clang++");
        db.insert_shipped("cc");
        db.insert_shipped("c++");
        db.insert_shipped("icx");
        db.insert_alias("icpx", "icx");
        db
    }

    fn insert_shipped(&mut self, name: &str) {
        self.compilers.insert(
            name.to_string(),
            CompilerConfig {
                alias_of: None,
                parser: vec![
                    ParserRule {
                        flag: "-D".into(),
                        action: Action::Append,
                        dest: "defines".into(),
                        value: None,
                        separator: None,
                        template: None,
                        override_previous: false,
                    },
                    ParserRule {
                        flag: "-I".into(),
                        action: Action::Append,
                        dest: "include_paths".into(),
                        value: None,
                        separator: None,
                        template: None,
                        override_previous: false,
                    },
                    ParserRule {
                        flag: "-include".into(),
                        action: Action::Append,
                        dest: "include_files".into(),
                        value: None,
                        separator: None,
                        template: None,
                        override_previous: false,
                    },
                    ParserRule {
                        flag: "-fopenmp".into(),
                        action: Action::AppendConst,
                        dest: "modes".into(),
                        value: Some("openmp".into()),
                        separator: None,
                        template: None,
                        override_previous: false,
                    },
                    ParserRule {
                        flag: "-fsycl".into(),
                        action: Action::AppendConst,
                        dest: "modes".into(),
                        value: Some("sycl".into()),
                        separator: None,
                        template: None,
                        override_previous: false,
                    },
                ],
                modes: vec![
                    ModeConfig {
                        name: "openmp".into(),
                        defines: vec!["_OPENMP".into()],
                        include_paths: vec![],
                        include_files: vec![],
                    },
                    ModeConfig {
                        name: "sycl".into(),
                        defines: vec!["SYCL_LANGUAGE_VERSION".into()],
                        include_paths: vec![],
                        include_files: vec![],
                    },
                ],
                passes: vec![PassConfig {
                    name: "sycl-spir64".into(),
                    requires_modes: vec!["sycl".into()],
                    defines: vec!["__SPIR__".into(), "__SYCL_DEVICE_ONLY__".into()],
                    include_paths: vec![],
                    include_files: vec![],
                }],
            },
        );
    }

    fn insert_alias(&mut self, name: &str, target: &str) {
        self.compilers.insert(
            name.to_string(),
            CompilerConfig { alias_of: Some(target.to_string()), ..Default::default() },
        );
    }

    /// Loads `.cbi/config` (if present) and merges it additively over the
    /// shipped defaults: new compilers are added, compilers with the same
    /// name are replaced wholesale (the project's definition wins).
    pub fn load_additive(path: &Path) -> Result<Self, ConfigError> {
        let mut db = Self::with_shipped_defaults();
        if !path.exists() {
            return Ok(db);
        }
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        let raw: RawConfigFile =
            toml::from_str(&text).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;
        for (name, cfg) in raw.compiler {
            db.compilers.insert(name, cfg);
        }
        Ok(db)
    }

    /// Resolves `name` through `alias_of` chains, detecting cycles.
    pub fn resolve(&self, name: &str) -> Result<&CompilerConfig, ConfigError> {
        let mut seen = vec![name.to_string()];
        let mut current = name;
        loop {
            let cfg = self
                .compilers
                .get(current)
                .ok_or_else(|| ConfigError::UnknownCompiler(current.to_string()))?;
            match &cfg.alias_of {
                Some(target) => {
                    if seen.contains(target) {
                        return Err(ConfigError::AliasCycle(name.to_string()));
                    }
                    seen.push(target.clone());
                    current = target;
                }
                None => return Ok(cfg),
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.compilers.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shipped_gcc_config_resolves_directly() {
        let db = ConfigDatabase::with_shipped_defaults();
        let cfg = db.resolve("gcc").unwrap();
        assert!(cfg.alias_of.is_none());
        assert!(cfg.modes.iter().any(|m| m.name == "openmp"));
    }

    #[test]
    fn alias_resolves_transitively() {
        let db = ConfigDatabase::with_shipped_defaults();
        let cfg = db.resolve("icpx").unwrap();
        assert!(cfg.modes.iter().any(|m| m.name == "sycl"));
    }

    #[test]
    fn alias_cycle_is_detected() {
        let mut db = ConfigDatabase::default();
        db.insert_alias("a", "b");
        db.insert_alias("b", "a");
        assert!(matches!(db.resolve("a"), Err(ConfigError::AliasCycle(_))));
    }

    #[test]
    fn project_config_overrides_additively() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
            [compiler.nvcc]
            parser = [
                { flag = "-D", action = "append", dest = "defines" },
            ]
            "#,
        )
        .unwrap();
        let db = ConfigDatabase::load_additive(&path).unwrap();
        assert!(db.contains("gcc"), "shipped defaults must survive a merge");
        assert!(db.contains("nvcc"));
    }
}
