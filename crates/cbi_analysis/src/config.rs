use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use cbi_span::FatalError;
use serde::Deserialize;

/// The analysis TOML's `[codebase]` table.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CodebaseSection {
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// One `[platform.NAME]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct PlatformSection {
    pub commands: PathBuf,
}

/// The parsed analysis file, per `EXTERNAL INTERFACES`.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub codebase: CodebaseSection,
    #[serde(default, rename = "platform")]
    pub platforms: BTreeMap<String, PlatformSection>,
}

pub fn load_analysis(path: &Path) -> Result<AnalysisConfig, FatalError> {
    if path.extension().and_then(|ext| ext.to_str()) != Some("toml") {
        return Err(FatalError::Config(format!("{}: analysis file must have a .toml extension", path.display())));
    }
    let text =
        std::fs::read_to_string(path).map_err(|source| FatalError::Io { path: path.to_path_buf(), source })?;
    toml::from_str(&text).map_err(|e| FatalError::Config(format!("{}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_codebase_and_platform_tables() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analysis.toml");
        std::fs::write(
            &path,
            r#"
            [codebase]
            exclude = ["vendor/**", "*.generated.c"]

            [platform.cpu]
            commands = "cpu_compile_commands.json"

            [platform.gpu]
            commands = "gpu_compile_commands.json"
            "#,
        )
        .unwrap();
        let cfg = load_analysis(&path).unwrap();
        assert_eq!(cfg.codebase.exclude.len(), 2);
        assert_eq!(cfg.platforms.len(), 2);
        assert_eq!(cfg.platforms["cpu"].commands, PathBuf::from("cpu_compile_commands.json"));
    }

    #[test]
    fn missing_platform_table_is_allowed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analysis.toml");
        std::fs::write(&path, "[codebase]\n").unwrap();
        let cfg = load_analysis(&path).unwrap();
        assert!(cfg.platforms.is_empty());
    }

    #[test]
    fn non_toml_analysis_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analysis.yaml");
        std::fs::write(&path, "[codebase]\n").unwrap();
        let err = load_analysis(&path).unwrap_err();
        assert!(matches!(err, FatalError::Config(_)));
    }
}
