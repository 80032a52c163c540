//! Compiler-argument emulation and compilation-database loading.
//!
//! Turns `{compiler, argv}` — sourced from a JSON compilation database —
//! into the predefines/include paths/include files a translation unit
//! actually builds with, per `COMPILER EMULATOR`.

mod compdb;
mod config;
mod emulate;

pub use compdb::{load_compdb, CompdbEntry, CompdbError};
pub use config::{Action, CompilerConfig, ConfigDatabase, ConfigError, ModeConfig, ParserRule, PassConfig};
pub use emulate::{emulate, split_command, EmulatedArgs};
