//! Error taxonomy for the index engine

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexError>;

#[derive(Error, Debug)]
pub enum IndexError {
    /// I/O errors from the persistence layer
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// User supplied a malformed or unresolvable location
    #[error("invalid location: {0}")]
    InvalidLocation(String),

    /// The index blob does not start with the RIDX magic
    #[error("not an index file: bad magic bytes")]
    InvalidMagic,

    /// The index blob was written by an incompatible version
    #[error("index out of date, re-index required (found version {found}, expected {expected})")]
    VersionMismatch { found: u32, expected: u32 },

    /// The index blob is structurally broken
    #[error("index file is corrupt: {0}")]
    DatabaseCorrupt(String),

    /// A cursor kind byte outside the fixed set
    #[error("unknown cursor kind code {0}")]
    UnknownCursorKind(u8),

    /// A source file disappeared between enqueue and parse
    #[error("source is unreadable: {}", .0.display())]
    UnreadableSource(PathBuf),

    /// Metadata (project.meta) failed to parse
    #[error("project metadata error: {0}")]
    Meta(#[from] serde_json::Error),
}

impl IndexError {
    /// Load-time errors that should fall through to an empty store
    /// instead of aborting the engine.
    pub fn is_recoverable_load_error(&self) -> bool {
        matches!(
            self,
            IndexError::InvalidMagic
                | IndexError::VersionMismatch { .. }
                | IndexError::DatabaseCorrupt(_)
                | IndexError::UnknownCursorKind(_)
        )
    }
}
