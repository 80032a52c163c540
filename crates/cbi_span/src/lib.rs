//! Identity and diagnostics primitives shared by every Code Base
//! Investigator crate.
//!
//! [`FileId`] and [`PhysicalLine`] give every crate downstream a cheap,
//! `Copy` way to name "this line of this file" without passing `PathBuf`s
//! around. [`Diagnostics`] is the sink every fallible operation in the
//! preprocessor core reports through instead of aborting: per
//! `ERROR HANDLING DESIGN`, a malformed macro or a missing include is a
//! warning that keeps the setmap consistent, not a process exit.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Interned identity of a source file within one analysis run.
///
/// Cloning a [`FileRegistry`] handle is cheap; `FileId`s from one registry
/// are meaningless against another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(u32);

/// `(file, line)` identity of a physical source line. One-based line
/// numbers, matching the convention readers expect in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PhysicalLine {
    pub file: FileId,
    pub line: u32,
}

impl PhysicalLine {
    pub fn new(file: FileId, line: u32) -> Self {
        Self { file, line }
    }
}

/// Bidirectional interner from filesystem paths to [`FileId`]s.
///
/// Shared (behind an `Arc`) across every translation unit and platform
/// walk in an analysis run so that `FileId`s compare equal regardless of
/// which component resolved the path first.
#[derive(Debug, Default, Clone)]
pub struct FileRegistry {
    inner: Arc<Mutex<FileRegistryInner>>,
}

#[derive(Debug, Default)]
struct FileRegistryInner {
    paths: Vec<PathBuf>,
    by_path: HashMap<PathBuf, FileId>,
}

impl FileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns `path`, returning the same [`FileId`] on repeat calls with
    /// an equal path. Paths are not canonicalised here; callers that care
    /// about two different spellings of the same file resolving to one
    /// `FileId` must canonicalise before calling this.
    pub fn intern(&self, path: &Path) -> FileId {
        let mut inner = self.inner.lock().unwrap();
        if let Some(id) = inner.by_path.get(path) {
            return *id;
        }
        let id = FileId(inner.paths.len() as u32);
        inner.paths.push(path.to_path_buf());
        inner.by_path.insert(path.to_path_buf(), id);
        id
    }

    pub fn path(&self, id: FileId) -> PathBuf {
        self.inner.lock().unwrap().paths[id.0 as usize].clone()
    }
}

/// Non-fatal fault kinds raised by the preprocessor core.
///
/// None of these abort an analysis run; each is downgraded to a warning
/// that is recorded and the affected construct degrades gracefully (see
/// `ERROR HANDLING DESIGN`). Orchestration-level faults use
/// [`FatalError`] instead.
#[derive(Debug, Clone)]
pub enum Diagnostic {
    IncludeNotFound { at: PhysicalLine, spelling: String },
    MacroWarning { at: PhysicalLine, message: String },
    ExpressionError { at: PhysicalLine, message: String },
    GuardCycle { at: PhysicalLine, path: PathBuf },
    UnreadableSource { path: PathBuf, message: String },
    DirectiveWarning { at: PhysicalLine, message: String },
    UserDiagnostic { at: PhysicalLine, is_error: bool, message: String },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::IncludeNotFound { at, spelling } => {
                write!(f, "{}:{}: include not found: {}", at.file.0, at.line, spelling)
            }
            Diagnostic::MacroWarning { at, message } => {
                write!(f, "{}:{}: macro warning: {}", at.file.0, at.line, message)
            }
            Diagnostic::ExpressionError { at, message } => {
                write!(f, "{}:{}: expression error: {}", at.file.0, at.line, message)
            }
            Diagnostic::GuardCycle { at, path } => {
                write!(f, "{}:{}: include cycle at {}", at.file.0, at.line, path.display())
            }
            Diagnostic::UnreadableSource { path, message } => {
                write!(f, "{}: unreadable: {}", path.display(), message)
            }
            Diagnostic::DirectiveWarning { at, message } => {
                write!(f, "{}:{}: {}", at.file.0, at.line, message)
            }
            Diagnostic::UserDiagnostic { at, is_error, message } => {
                let kind = if *is_error { "error" } else { "warning" };
                write!(f, "{}:{}: #{}: {}", at.file.0, at.line, kind, message)
            }
        }
    }
}

/// Collects [`Diagnostic`]s from a single walk (tree build or platform
/// mapping) without ever aborting it.
///
/// `DiagnosticSink` is deliberately not `Sync`-shared across walks: each
/// walk owns one, and the orchestrator merges sinks after the fact. This
/// mirrors the per-walk macro table — mutable state stays local until the
/// walk finishes.
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    records: Vec<Diagnostic>,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diag: Diagnostic) {
        tracing::warn!(target: "cbi::diagnostic", "{diag}");
        self.records.push(diag);
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.records.iter()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.records
    }

    pub fn extend(&mut self, other: DiagnosticSink) {
        self.records.extend(other.records);
    }
}

/// Orchestration-level faults: these abort the run with a non-zero exit.
#[derive(Debug, thiserror::Error)]
pub enum FatalError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("compilation database error: {0}")]
    Compdb(String),
    #[error("I/O error: {path}: {source}")]
    Io { path: PathBuf, #[source] source: std::io::Error },
    #[error("unknown platform requested: {0}")]
    UnknownPlatform(String),
}

pub type FatalResult<T> = Result<T, FatalError>;
