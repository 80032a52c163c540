use std::path::Path;

use globset::{Glob, GlobSet, GlobSetBuilder};

/// Gitignore-style pathspec matcher for `[codebase] exclude`.
pub struct ExcludeSet {
    set: GlobSet,
}

impl ExcludeSet {
    pub fn build(patterns: &[String]) -> Result<ExcludeSet, globset::Error> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            builder.add(Glob::new(pattern)?);
        }
        Ok(ExcludeSet { set: builder.build()? })
    }

    pub fn empty() -> ExcludeSet {
        ExcludeSet { set: GlobSetBuilder::new().build().unwrap() }
    }

    pub fn is_excluded(&self, path: &Path) -> bool {
        self.set.is_match(path)
    }
}
