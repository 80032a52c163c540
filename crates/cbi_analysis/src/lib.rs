//! The Analysis Orchestrator: turns an analysis TOML and a set of
//! compilation databases into one aggregate [`cbi_tree::PlatformSetMap`].
//!
//! Everything downstream of that map — summaries, clustering,
//! directory-tree views, dendrograms — is a report collaborator out of
//! scope here; this crate's job ends at producing the map and the
//! diagnostics gathered while building it.

mod config;
mod exclude;
mod orchestrator;

pub use config::{load_analysis, AnalysisConfig, CodebaseSection, PlatformSection};
pub use exclude::ExcludeSet;
pub use orchestrator::{run_analysis, AnalysisResult};
