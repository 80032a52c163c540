//! Source reading and language-aware line classification.
//!
//! This crate owns everything in `SOURCE READER` and `LEXER`: turning
//! bytes on disk into a stream of logical lines tagged `directive` /
//! `code` / `blank`, with physical line identity preserved for
//! attribution. It knows nothing about macros, `#if` expressions, or
//! trees — that is [`cbi_pp`] and the tree builder's job.

mod classify;
mod lang;
mod reader;

pub use classify::{LineKind, LogicalLine, Lexer};
pub use lang::{LexConfig, Language};
pub use reader::{read_source, ReadError, SourceText};
