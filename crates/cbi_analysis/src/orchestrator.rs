use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use cbi_compiler_db::{emulate, load_compdb, CompdbEntry, ConfigDatabase};
use cbi_span::{DiagnosticSink, FatalError, FileRegistry};
use cbi_tree::{build_translation_unit, map_platform, BuildConfig, FileNode, PlatformSetMap, SourceCache};
use rayon::prelude::*;

use crate::config::load_analysis;
use crate::exclude::ExcludeSet;

/// The outcome of one full analysis run, before report collaborators (out
/// of scope here) turn it into a summary, clustering, or tree view.
#[derive(Debug)]
pub struct AnalysisResult {
    pub setmap: PlatformSetMap,
    pub diagnostics: DiagnosticSink,
    pub platforms: Vec<String>,
    pub registry: FileRegistry,
}

struct PreparedUnit {
    platform: String,
    file: PathBuf,
    predefines: Vec<String>,
    include_paths: Vec<PathBuf>,
    include_files: Vec<PathBuf>,
}

/// Runs a complete analysis: loads `analysis_path`, resolves each
/// selected platform's compilation database, applies `[codebase]
/// exclude`, and drives the tree builder and platform mapper for every
/// surviving translation unit (`COMPONENT DESIGN` §4.8).
///
/// `platform_filter` mirrors `-p`: `None` analyses every platform in the
/// file, `Some` restricts to the named subset and fails fast if one is
/// unknown.
pub fn run_analysis(
    analysis_path: &Path,
    config_db: &ConfigDatabase,
    platform_filter: Option<&[String]>,
    extra_excludes: &[String],
) -> Result<AnalysisResult, FatalError> {
    let config = load_analysis(analysis_path)?;
    let base_dir = analysis_path.parent().unwrap_or_else(|| Path::new("."));

    let selected: Vec<String> = match platform_filter {
        Some(wanted) => {
            for name in wanted {
                if !config.platforms.contains_key(name) {
                    return Err(FatalError::UnknownPlatform(name.clone()));
                }
            }
            wanted.to_vec()
        }
        None => config.platforms.keys().cloned().collect(),
    };

    let mut excludes = config.codebase.exclude.clone();
    excludes.extend_from_slice(extra_excludes);
    let exclude =
        ExcludeSet::build(&excludes).map_err(|e| FatalError::Config(format!("invalid exclude pattern: {e}")))?;

    let per_platform: Vec<(String, Vec<CompdbEntry>)> = selected
        .iter()
        .map(|name| -> Result<(String, Vec<CompdbEntry>), FatalError> {
            let section = &config.platforms[name];
            let compdb_path = resolve(base_dir, &section.commands);
            let entries = load_compdb(&compdb_path).map_err(|e| FatalError::Compdb(e.to_string()))?;
            Ok((name.clone(), entries))
        })
        .collect::<Result<_, _>>()?;

    // Resolving argv through the compiler emulator touches no shared
    // mutable state and is plain data in, plain data out, so it is safe
    // to fan out across platforms (`CONCURRENCY & RESOURCE MODEL`: the
    // compiler-configuration records are immutable after load).
    let prepared: Vec<PreparedUnit> = per_platform
        .par_iter()
        .map(|(platform, entries)| prepare_platform(platform, entries, &exclude, config_db))
        .flatten()
        .collect();

    let registry = FileRegistry::new();
    let source_cache = SourceCache::new(registry.clone());
    let mut tree_cache: HashMap<u64, Rc<FileNode>> = HashMap::new();
    let mut setmap = PlatformSetMap::new();
    let mut diagnostics = DiagnosticSink::new();

    // The tree itself is keyed by `Rc`, not `Arc`: the preprocessor
    // core's hide sets use `Rc` for cheap structural sharing
    // (`cbi_pp::Token`), so the mapping step below runs sequentially
    // across translation units rather than on rayon's worker pool. Only
    // the argv-resolution step above is parallelized today.
    for unit in &prepared {
        let key = tree_cache_key(&unit.file, &unit.predefines, &unit.include_paths, &unit.include_files);
        let tree = tree_cache.entry(key).or_insert_with(|| {
            let build_config = BuildConfig {
                include_paths: unit.include_paths.clone(),
                predefines: unit.predefines.clone(),
                include_files: unit.include_files.clone(),
                openmp_sentinels: unit.predefines.iter().any(|d| d == "_OPENMP" || d.starts_with("_OPENMP=")),
            };
            let (tree, build_diags) = build_translation_unit(&source_cache, &unit.file, &build_config);
            diagnostics.extend(build_diags);
            Rc::new(tree)
        });
        map_platform(tree, &unit.predefines, &unit.platform, &mut setmap, &mut diagnostics);
    }

    Ok(AnalysisResult { setmap, diagnostics, platforms: selected, registry })
}

fn prepare_platform(
    platform: &str,
    entries: &[CompdbEntry],
    exclude: &ExcludeSet,
    config_db: &ConfigDatabase,
) -> Vec<PreparedUnit> {
    entries
        .iter()
        .filter(|entry| !exclude.is_excluded(&entry.file))
        .filter_map(|entry| {
            let compiler_name = entry
                .argv
                .first()
                .and_then(|a| Path::new(a).file_name())
                .and_then(|n| n.to_str())
                .unwrap_or_default();
            match emulate(config_db, compiler_name, &entry.argv) {
                Ok(args) => Some(PreparedUnit {
                    platform: platform.to_string(),
                    file: entry.file.clone(),
                    predefines: args.predefines,
                    include_paths: args.include_paths,
                    include_files: args.include_files,
                }),
                Err(e) => {
                    tracing::warn!("skipping {}: {e}", entry.file.display());
                    None
                }
            }
        })
        .collect()
}

fn resolve(base_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

fn tree_cache_key(file: &Path, predefines: &[String], include_paths: &[PathBuf], include_files: &[PathBuf]) -> u64 {
    let mut hasher = DefaultHasher::new();
    file.hash(&mut hasher);
    predefines.hash(&mut hasher);
    include_paths.hash(&mut hasher);
    include_files.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write(path: &Path, contents: &str) {
        let mut f = std::fs::File::create(path).unwrap();
        write!(f, "{contents}").unwrap();
    }

    #[test]
    fn two_platforms_sharing_all_code_agree_on_every_line() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("common.c");
        write(&src, "int shared;\n");

        for platform in ["cpu", "gpu"] {
            let compdb = dir.path().join(format!("{platform}.json"));
            write(
                &compdb,
                &format!(
                    r#"[{{"file": "{}", "directory": "{}", "arguments": ["gcc", "-c", "common.c"]}}]"#,
                    src.to_str().unwrap(),
                    dir.path().to_str().unwrap()
                ),
            );
        }
        let analysis = dir.path().join("analysis.toml");
        write(
            &analysis,
            &format!(
                "[codebase]\n[platform.cpu]\ncommands = \"{}\"\n[platform.gpu]\ncommands = \"{}\"\n",
                dir.path().join("cpu.json").to_str().unwrap(),
                dir.path().join("gpu.json").to_str().unwrap(),
            ),
        );

        let config_db = ConfigDatabase::with_shipped_defaults();
        let result = run_analysis(&analysis, &config_db, None, &[]).unwrap();
        let line = result.setmap.iter().next().unwrap();
        assert_eq!(line.1.len(), 2);
    }

    #[test]
    fn unknown_requested_platform_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let analysis = dir.path().join("analysis.toml");
        write(&analysis, "[codebase]\n[platform.cpu]\ncommands = \"cpu.json\"\n");
        let config_db = ConfigDatabase::with_shipped_defaults();
        let err = run_analysis(&analysis, &config_db, Some(&["nonexistent".to_string()]), &[]).unwrap_err();
        assert!(matches!(err, FatalError::UnknownPlatform(_)));
    }

    #[test]
    fn excluded_files_contribute_nothing_to_the_setmap() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("vendor_file.c");
        write(&src, "int skip_me;\n");
        let compdb = dir.path().join("cpu.json");
        write(
            &compdb,
            &format!(
                r#"[{{"file": "{}", "directory": "{}", "arguments": ["gcc", "-c", "vendor_file.c"]}}]"#,
                src.to_str().unwrap(),
                dir.path().to_str().unwrap()
            ),
        );
        let analysis = dir.path().join("analysis.toml");
        write(
            &analysis,
            &format!(
                "[codebase]\nexclude = [\"**/vendor_*\"]\n[platform.cpu]\ncommands = \"{}\"\n",
                compdb.to_str().unwrap()
            ),
        );
        let config_db = ConfigDatabase::with_shipped_defaults();
        let result = run_analysis(&analysis, &config_db, None, &[]).unwrap();
        assert!(result.setmap.is_empty());
    }
}
