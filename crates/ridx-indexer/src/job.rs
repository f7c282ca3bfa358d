//! Parse job contracts between the coordinator and the external parser

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

use thiserror::Error;

use ridx_core::{CursorInfo, FileId, FixItMap, Location, Source};

/// Why a unit is being (re-)indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexType {
    /// A watched file changed.
    Dirty,
    /// Diagnostic dump requested; results are not merged.
    Dump,
    /// Explicit re-index request.
    Reindex,
}

/// Everything one translation unit produced. The symbol map spans every
/// file the unit visited, not just the primary source.
#[derive(Debug, Clone, Default)]
pub struct IndexData {
    /// Primary source of the translation unit.
    pub file_id: FileId,
    pub symbols: BTreeMap<Location, CursorInfo>,
    /// Files the primary source transitively includes.
    pub dependencies: HashSet<FileId>,
    pub fixits: FixItMap,
    /// Every file the parser actually touched.
    pub visited: HashSet<FileId>,
}

impl IndexData {
    pub fn new(file_id: FileId) -> Self {
        let mut data = IndexData {
            file_id,
            ..IndexData::default()
        };
        data.visited.insert(file_id);
        data
    }
}

/// Worker-side failures. These never propagate out of the coordinator;
/// crashes are retried, unreadable sources are dropped.
#[derive(Error, Debug)]
pub enum JobError {
    #[error("source disappeared: {}", .0.display())]
    Unreadable(PathBuf),

    #[error("parser failed: {0}")]
    Crashed(String),
}

/// The external C/C++ parser. Implementations block; the coordinator runs
/// them on blocking worker threads.
pub trait SourceParser: Send + Sync + 'static {
    fn parse(&self, source: &Source) -> Result<IndexData, JobError>;
}
