use std::fs;
use std::path::{Path, PathBuf};

use cbi_span::{FileId, FileRegistry};

/// A file's content split into physical lines, with original line endings
/// normalised to bare text (no terminator) and line numbers preserved as
/// the one-based index into `lines`.
#[derive(Debug, Clone)]
pub struct SourceText {
    pub file: FileId,
    pub path: PathBuf,
    lines: Vec<String>,
}

impl SourceText {
    pub fn line(&self, one_based: u32) -> Option<&str> {
        self.lines.get(one_based as usize - 1).map(|s| s.as_str())
    }

    pub fn line_count(&self) -> u32 {
        self.lines.len() as u32
    }

    pub fn lines(&self) -> impl Iterator<Item = (u32, &str)> {
        self.lines.iter().enumerate().map(|(i, s)| (i as u32 + 1, s.as_str()))
    }
}

#[derive(Debug, thiserror::Error)]
#[error("cannot read {path}: {source}")]
pub struct ReadError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Reads `path`, decodes as UTF-8 with lossy replacement, and normalises
/// CRLF/CR line endings to LF before splitting into physical lines.
///
/// A missing or unreadable file here is always a hard error for the
/// caller that requested it directly; callers resolving `#include`
/// targets should not call this for files that may legitimately not
/// exist — that path goes through `IncludeNotFound` instead.
pub fn read_source(registry: &FileRegistry, path: &Path) -> Result<SourceText, ReadError> {
    let bytes = fs::read(path).map_err(|source| ReadError { path: path.to_path_buf(), source })?;
    let text = String::from_utf8_lossy(&bytes);
    let normalised = normalise_line_endings(&text);
    let lines = normalised.split('\n').map(|s| s.to_string()).collect::<Vec<_>>();
    // `split('\n')` on a text ending in a trailing newline yields one
    // spurious empty element; drop it so physical line counts match what
    // an editor would show.
    let lines = if lines.last().map(|s| s.is_empty()).unwrap_or(false) && normalised.ends_with('\n') {
        let mut lines = lines;
        lines.pop();
        lines
    } else {
        lines
    };
    let file = registry.intern(path);
    Ok(SourceText { file, path: path.to_path_buf(), lines })
}

fn normalise_line_endings(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                out.push('\n');
            }
            other => out.push(other),
        }
    }
    out
}
