use std::path::Path;

/// The source dialect a file is lexed as.
///
/// Decided per file by extension, with a compiler-config override hook
/// (`DESIGN NOTES`: "Fortran fixed vs. free form").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    C,
    Cxx,
    FortranFixed,
    FortranFree,
}

impl Language {
    pub fn from_extension(path: &Path) -> Language {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase()
            .as_str()
        {
            "f" | "for" | "ftn" => Language::FortranFixed,
            "f90" | "f95" | "f03" | "f08" => Language::FortranFree,
            "cc" | "cpp" | "cxx" | "c++" | "hpp" | "hh" | "hxx" => Language::Cxx,
            _ => Language::C,
        }
    }

    pub fn is_fortran(self) -> bool {
        matches!(self, Language::FortranFixed | Language::FortranFree)
    }
}

/// Per-translation-unit lexing configuration.
///
/// `openmp_sentinels` follows from the Compiler Emulator's `openmp` mode:
/// when active, `!$`/`!$omp`/`c$` prefixes in Fortran are lexed as
/// directive introducers rather than comments.
#[derive(Debug, Clone, Copy)]
pub struct LexConfig {
    pub language: Language,
    pub openmp_sentinels: bool,
}

impl LexConfig {
    pub fn for_path(path: &Path, openmp_sentinels: bool) -> Self {
        Self { language: Language::from_extension(path), openmp_sentinels }
    }
}
