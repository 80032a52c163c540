//! Shared setup for the CLI binaries: logging and compiler-configuration
//! loading, the bits every front end needs regardless of which report it
//! drives.

use std::path::{Path, PathBuf};

use cbi_compiler_db::ConfigDatabase;
use tracing_subscriber::EnvFilter;

/// Sets up `tracing` the way repeated `-v`/`-q` select a level, matching
/// `codebasin [-v|-q]…` in `EXTERNAL INTERFACES`.
pub fn init_tracing(verbose: u8, quiet: u8) {
    let level = match (verbose as i16) - (quiet as i16) {
        i16::MIN..=-2 => "error",
        -1 => "warn",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(false).try_init();
}

/// Loads compiler configuration: shipped defaults plus an additive
/// `.cbi/config` in the current directory, if present.
pub fn load_config_db() -> ConfigDatabase {
    let path = PathBuf::from(".cbi/config");
    match ConfigDatabase::load_additive(&path) {
        Ok(db) => db,
        Err(e) => {
            tracing::warn!("ignoring .cbi/config: {e}");
            ConfigDatabase::with_shipped_defaults()
        }
    }
}

pub fn platform_filter(platforms: &[String]) -> Option<&[String]> {
    (!platforms.is_empty()).then_some(platforms)
}

pub fn analysis_file_dir(path: &Path) -> PathBuf {
    path.parent().map(Path::to_path_buf).unwrap_or_default()
}
