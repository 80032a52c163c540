use std::path::PathBuf;

use cbi_pp::{MacroDefinition, Token};
use cbi_span::{FileId, PhysicalLine};

/// A `#define`/`#undef` encountered while walking a branch body.
///
/// Not one of the five node kinds named in the data model, but required
/// to make `#define`/`#undef` visible to the Platform Mapper's own
/// per-platform macro state: the tree is built with all branches present
/// unconditionally, so only a live-branch replay at mapping time can
/// thread macro edits the way a real preprocessor would.
#[derive(Debug, Clone)]
pub enum MacroEdit {
    Define(MacroDefinition),
    Undef(String),
}

/// The controlling condition of one branch of an `if-group`.
///
/// `#ifdef X` / `#ifndef X` are desugared to `defined(X)` / `!defined(X)`
/// token streams at build time so the mapper only ever evaluates one
/// shape of condition (`DATA MODEL`).
#[derive(Debug, Clone)]
pub enum BranchCondition {
    If(Vec<Token>),
    Else,
}

/// One arm of an `if-group`: `#if`/`#elif`/`#else`, its body built
/// unconditionally regardless of whether the branch could ever be live.
#[derive(Debug, Clone)]
pub struct Branch {
    pub condition: BranchCondition,
    pub at: PhysicalLine,
    pub body: Vec<Node>,
}

/// A complete `#if ... #elif ... #else ... #endif` chain. All branches
/// are present structurally; which one is live is a per-platform,
/// per-walk question answered by the mapper, never decided here.
#[derive(Debug, Clone)]
pub struct IfGroup {
    pub branches: Vec<Branch>,
}

/// A maximal run of contiguous, non-directive, non-blank physical lines.
#[derive(Debug, Clone)]
pub struct CodeRange {
    pub lines: Vec<PhysicalLine>,
}

/// What came of trying to resolve an `#include`.
#[derive(Debug, Clone)]
pub enum IncludeResolution {
    /// The target could not be found on any search path.
    NotFound,
    /// Skipped because its classic include guard is already defined in
    /// the including context — the file is known not to contribute any
    /// new code under this configuration.
    GuardSkipped { path: PathBuf },
    /// The file is already open earlier in this include chain.
    Cycle { path: PathBuf },
    /// Resolved and walked.
    Resolved { path: PathBuf, tree: Box<FileNode> },
}

#[derive(Debug, Clone)]
pub struct IncludeEdge {
    pub at: PhysicalLine,
    pub spelling: String,
    pub angled: bool,
    pub resolution: IncludeResolution,
}

#[derive(Debug, Clone)]
pub enum Node {
    Code(CodeRange),
    If(IfGroup),
    Include(IncludeEdge),
    Macro(MacroEdit, PhysicalLine),
}

/// The root of one file's syntactic structure: its directives and code
/// ranges in textual order, per `DATA MODEL`.
#[derive(Debug, Clone)]
pub struct FileNode {
    pub file: FileId,
    pub children: Vec<Node>,
}

impl FileNode {
    pub fn empty(file: FileId) -> Self {
        Self { file, children: Vec::new() }
    }
}
