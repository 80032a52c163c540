use std::path::{Path, PathBuf};

/// Resolves an `#include` target to a path on disk.
///
/// Quoted includes search the including file's own directory first, then
/// `-I` paths in order; angle-bracket includes search only `-I` paths,
/// in order (`COMPONENT DESIGN`).
pub fn resolve_include(spelling: &str, angled: bool, including_dir: &Path, include_paths: &[PathBuf]) -> Option<PathBuf> {
    let rel = Path::new(spelling);
    if rel.is_absolute() {
        return rel.exists().then(|| rel.to_path_buf());
    }
    if !angled {
        let candidate = including_dir.join(rel);
        if candidate.exists() {
            return Some(candidate);
        }
    }
    for dir in include_paths {
        let candidate = dir.join(rel);
        if candidate.exists() {
            return Some(candidate);
        }
    }
    None
}

/// Parses `#include <foo.h>` / `#include "foo.h"` / `#include FOO` text
/// (already macro-resolvable text after the keyword) into spelling and
/// bracket kind. Returns `None` if neither quote form is present, which
/// callers should treat as a macro-expanded include and resolve against
/// the re-lexed, macro-expanded token text instead.
pub fn parse_include_literal(rest: &str) -> Option<(String, bool)> {
    let rest = rest.trim();
    if let Some(body) = rest.strip_prefix('"') {
        let end = body.find('"')?;
        return Some((body[..end].to_string(), false));
    }
    if let Some(body) = rest.strip_prefix('<') {
        let end = body.find('>')?;
        return Some((body[..end].to_string(), true));
    }
    None
}
