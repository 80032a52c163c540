use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "cbi-cov", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compute per-file line coverage from a bare compilation database.
    Compute {
        /// Source root used to resolve relative paths in the database.
        #[arg(short = 'S')]
        src: Option<PathBuf>,

        /// Append a pathspec to the implicit exclude set.
        #[arg(short = 'x')]
        exclude: Vec<String>,

        /// Write JSON output here instead of stdout.
        #[arg(short = 'o')]
        out: Option<PathBuf>,

        compdb: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    cbi_cli::init_tracing(0, 0);
    let Cli { command: Command::Compute { src, exclude, out, compdb } } = Cli::parse();

    let config_db = cbi_cli::load_config_db();
    let exclude_set = cbi_analysis::ExcludeSet::build(&exclude)?;
    let entries = cbi_compiler_db::load_compdb(&compdb)?;
    let _ = src; // relative-path resolution already happens against each entry's `directory`

    let registry = cbi_span::FileRegistry::new();
    let source_cache = cbi_tree::SourceCache::new(registry.clone());
    let mut diagnostics = cbi_span::DiagnosticSink::new();
    let mut rows = Vec::new();

    for entry in &entries {
        if exclude_set.is_excluded(&entry.file) {
            continue;
        }
        let compiler_name =
            entry.argv.first().and_then(|a| std::path::Path::new(a).file_name()).and_then(|n| n.to_str()).unwrap_or("");
        let args = match cbi_compiler_db::emulate(&config_db, compiler_name, &entry.argv) {
            Ok(args) => args,
            Err(e) => {
                tracing::warn!("skipping {}: {e}", entry.file.display());
                continue;
            }
        };
        let build_config = cbi_tree::BuildConfig {
            include_paths: args.include_paths,
            predefines: args.predefines.clone(),
            include_files: args.include_files,
            openmp_sentinels: args.predefines.iter().any(|d| d == "_OPENMP"),
        };
        let (tree, build_diags) = cbi_tree::build_translation_unit(&source_cache, &entry.file, &build_config);
        diagnostics.extend(build_diags);

        let mut setmap = cbi_tree::PlatformSetMap::new();
        cbi_tree::map_platform(&tree, &build_config.predefines, "coverage", &mut setmap, &mut diagnostics);
        let lines_covered = setmap.iter().filter(|(line, _)| line.file == tree.file).count();
        rows.push(serde_json::json!({
            "file": entry.file,
            "lines_covered": lines_covered,
        }));
    }

    let output = serde_json::to_string_pretty(&rows)?;
    match out {
        Some(path) => std::fs::write(path, output)?,
        None => println!("{output}"),
    }
    Ok(())
}
