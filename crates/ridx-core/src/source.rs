//! Compilation unit descriptors

use std::path::Path;

use crate::error::{IndexError, Result};
use crate::location::FileId;

/// Language of a compilation unit, as inferred from the compile command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Language {
    C = 0,
    Cpp = 1,
    Header = 2,
}

impl Language {
    pub fn from_path(path: &Path) -> Language {
        match path.extension().and_then(|e| e.to_str()) {
            Some("c") => Language::C,
            Some("h") | Some("hh") | Some("hpp") | Some("hxx") => Language::Header,
            _ => Language::Cpp,
        }
    }

    pub fn from_u8(code: u8) -> Result<Language> {
        Ok(match code {
            0 => Language::C,
            1 => Language::Cpp,
            2 => Language::Header,
            other => {
                return Err(IndexError::DatabaseCorrupt(format!(
                    "unknown language code {other}"
                )))
            }
        })
    }
}

/// One entry of the compilation database: what to parse and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    /// Primary source file of the translation unit.
    pub file_id: FileId,
    /// Compiler argument list, minus the compiler itself.
    pub args: Vec<String>,
    pub language: Language,
    pub flags: u32,
}

impl Source {
    pub fn new(file_id: FileId, language: Language) -> Self {
        Source {
            file_id,
            args: Vec::new(),
            language,
            flags: 0,
        }
    }
}
