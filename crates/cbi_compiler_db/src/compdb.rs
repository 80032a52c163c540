use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::emulate::split_command;

/// One entry of a JSON compilation database, per `EXTERNAL INTERFACES`.
#[derive(Debug, Clone, Deserialize)]
pub struct CompdbEntryRaw {
    pub file: String,
    pub directory: String,
    #[serde(default)]
    pub arguments: Option<Vec<String>>,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub output: Option<String>,
}

/// A resolved, deduplicated compilation database entry.
#[derive(Debug, Clone)]
pub struct CompdbEntry {
    pub file: PathBuf,
    pub directory: PathBuf,
    pub argv: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum CompdbError {
    #[error("cannot read compilation database {path}: {source}")]
    Io { path: PathBuf, #[source] source: std::io::Error },
    #[error("malformed compilation database {path}: {source}")]
    Parse { path: PathBuf, #[source] source: serde_json::Error },
    #[error("entry for '{file}' in {path} has neither 'arguments' nor 'command'")]
    MissingArguments { path: PathBuf, file: String },
    #[error("entry for '{file}' in {path} has a non-absolute 'directory': {directory}")]
    NonAbsoluteDirectory { path: PathBuf, file: String, directory: String },
}

/// Loads a JSON compilation database, deduplicating entries with the
/// same `file` (last one in the array wins), per `EXTERNAL INTERFACES`.
pub fn load_compdb(path: &Path) -> Result<Vec<CompdbEntry>, CompdbError> {
    let text =
        std::fs::read_to_string(path).map_err(|source| CompdbError::Io { path: path.to_path_buf(), source })?;
    let raw: Vec<CompdbEntryRaw> =
        serde_json::from_str(&text).map_err(|source| CompdbError::Parse { path: path.to_path_buf(), source })?;

    let mut by_file: HashMap<String, CompdbEntry> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    for entry in raw {
        let directory = PathBuf::from(&entry.directory);
        if !directory.is_absolute() {
            return Err(CompdbError::NonAbsoluteDirectory {
                path: path.to_path_buf(),
                file: entry.file,
                directory: entry.directory,
            });
        }
        let argv = match (&entry.arguments, &entry.command) {
            (Some(args), _) => args.clone(),
            (None, Some(cmd)) => split_command(cmd),
            (None, None) => {
                return Err(CompdbError::MissingArguments { path: path.to_path_buf(), file: entry.file })
            }
        };
        if !by_file.contains_key(&entry.file) {
            order.push(entry.file.clone());
        }
        by_file.insert(entry.file.clone(), CompdbEntry { file: resolve(&directory, &entry.file), directory, argv });
    }
    Ok(order.into_iter().map(|f| by_file.remove(&f).unwrap()).collect())
}

fn resolve(directory: &Path, file: &str) -> PathBuf {
    let p = PathBuf::from(file);
    if p.is_absolute() {
        p
    } else {
        directory.join(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_file_entries_keep_the_last() {
        let dir = tempfile::tempdir().unwrap();
        let json_path = dir.path().join("compile_commands.json");
        let abs_dir = dir.path().to_str().unwrap();
        std::fs::write(
            &json_path,
            format!(
                r#"[
                    {{"file": "a.c", "directory": "{abs_dir}", "arguments": ["gcc", "-DFIRST", "-c", "a.c"]}},
                    {{"file": "a.c", "directory": "{abs_dir}", "arguments": ["gcc", "-DSECOND", "-c", "a.c"]}}
                ]"#
            ),
        )
        .unwrap();
        let entries = load_compdb(&json_path).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].argv.contains(&"-DSECOND".to_string()));
    }

    #[test]
    fn command_string_is_split_like_a_shell() {
        let dir = tempfile::tempdir().unwrap();
        let json_path = dir.path().join("compile_commands.json");
        let abs_dir = dir.path().to_str().unwrap();
        std::fs::write(
            &json_path,
            format!(r#"[{{"file": "a.c", "directory": "{abs_dir}", "command": "gcc -DFOO -c a.c"}}]"#),
        )
        .unwrap();
        let entries = load_compdb(&json_path).unwrap();
        assert_eq!(entries[0].argv, vec!["gcc", "-DFOO", "-c", "a.c"]);
    }

    #[test]
    fn relative_directory_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let json_path = dir.path().join("compile_commands.json");
        std::fs::write(
            &json_path,
            r#"[{"file": "a.c", "directory": "relative/path", "command": "gcc -c a.c"}]"#,
        )
        .unwrap();
        assert!(matches!(load_compdb(&json_path), Err(CompdbError::NonAbsoluteDirectory { .. })));
    }
}
