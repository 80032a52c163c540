use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use cbi_lexer::{read_source, LexConfig, Lexer, LogicalLine, ReadError};
use cbi_span::FileRegistry;

/// Read-only-after-insertion cache of a file's lexed logical lines,
/// keyed by resolved path and the OpenMP-sentinel setting that affected
/// how it was lexed.
///
/// Shared across every translation unit and platform a file appears in
/// (`CONCURRENCY & RESOURCE MODEL`): reading and lexing a header happens
/// once no matter how many `#include`s reach it.
#[derive(Default)]
pub struct SourceCache {
    registry: FileRegistry,
    entries: Mutex<HashMap<(PathBuf, bool), Arc<(cbi_lexer::SourceText, Vec<LogicalLine>)>>>,
}

impl SourceCache {
    pub fn new(registry: FileRegistry) -> Self {
        Self { registry, entries: Mutex::new(HashMap::new()) }
    }

    pub fn registry(&self) -> &FileRegistry {
        &self.registry
    }

    pub fn get_or_lex(
        &self,
        path: &Path,
        openmp_sentinels: bool,
    ) -> Result<Arc<(cbi_lexer::SourceText, Vec<LogicalLine>)>, ReadError> {
        let key = (path.to_path_buf(), openmp_sentinels);
        if let Some(hit) = self.entries.lock().unwrap().get(&key) {
            return Ok(hit.clone());
        }
        let source = read_source(&self.registry, path)?;
        let config = LexConfig::for_path(path, openmp_sentinels);
        let lines = Lexer::new(config).lex(&source);
        let entry = Arc::new((source, lines));
        self.entries.lock().unwrap().insert(key, entry.clone());
        Ok(entry)
    }
}
