//! File interning and source locations

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use dashmap::DashMap;

/// An interned identifier for a canonical absolute path.
///
/// `FileId(0)` is the invalid sentinel. IDs are handed out sequentially and
/// never reused within a project lifetime; the id/path bijection is part of
/// the persisted index so ids survive restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct FileId(pub u32);

impl FileId {
    pub const INVALID: FileId = FileId(0);

    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "file#{}", self.0)
    }
}

/// A (file, line, column) triple. Line and column are 1-based.
///
/// The derived ordering is (file, line, column), so a `BTreeMap` keyed by
/// `Location` keeps every file's entries contiguous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Location {
    pub file_id: FileId,
    pub line: u32,
    pub column: u32,
}

/// Size of the fixed-width location encoding.
pub const ENCODED_LOCATION_LEN: usize = 12;

impl Location {
    pub const INVALID: Location = Location {
        file_id: FileId::INVALID,
        line: 0,
        column: 0,
    };

    pub const fn new(file_id: FileId, line: u32, column: u32) -> Self {
        Location {
            file_id,
            line,
            column,
        }
    }

    #[inline]
    pub const fn is_valid(&self) -> bool {
        self.file_id.is_valid()
    }

    /// The smallest location inside `file_id`; used as a range-scan anchor.
    pub const fn file_start(file_id: FileId) -> Self {
        Location {
            file_id,
            line: 0,
            column: 0,
        }
    }

    /// Fixed-width 12-byte little-endian encoding: file, line, column.
    pub fn encode(&self) -> [u8; ENCODED_LOCATION_LEN] {
        let mut out = [0u8; ENCODED_LOCATION_LEN];
        out[0..4].copy_from_slice(&self.file_id.0.to_le_bytes());
        out[4..8].copy_from_slice(&self.line.to_le_bytes());
        out[8..12].copy_from_slice(&self.column.to_le_bytes());
        out
    }

    /// Decode a 12-byte encoding. Returns `None` when `bytes` is short.
    pub fn decode(bytes: &[u8]) -> Option<Location> {
        if bytes.len() < ENCODED_LOCATION_LEN {
            return None;
        }
        let file = u32::from_le_bytes(bytes[0..4].try_into().ok()?);
        let line = u32::from_le_bytes(bytes[4..8].try_into().ok()?);
        let column = u32::from_le_bytes(bytes[8..12].try_into().ok()?);
        Some(Location::new(FileId(file), line, column))
    }
}

/// Process-wide bijection between canonical paths and `FileId`s.
/// Thread-safe; interning is append-only.
pub struct PathTable {
    by_path: DashMap<PathBuf, FileId>,
    // Slot 0 is reserved for the invalid sentinel.
    by_id: RwLock<Vec<PathBuf>>,
}

impl PathTable {
    pub fn new() -> Self {
        PathTable {
            by_path: DashMap::new(),
            by_id: RwLock::new(vec![PathBuf::new()]),
        }
    }

    /// Intern `path`, which must already be canonical. Returns the existing
    /// id if the path has been seen before.
    pub fn intern(&self, path: &Path) -> FileId {
        if let Some(id) = self.by_path.get(path) {
            return *id;
        }
        let mut ids = self.by_id.write().unwrap();
        // Racing interner may have won while we waited for the lock.
        if let Some(id) = self.by_path.get(path) {
            return *id;
        }
        let id = FileId(ids.len() as u32);
        ids.push(path.to_path_buf());
        self.by_path.insert(path.to_path_buf(), id);
        id
    }

    /// Look up an already-interned canonical path.
    pub fn get(&self, path: &Path) -> Option<FileId> {
        self.by_path.get(path).map(|r| *r)
    }

    /// Resolve a `FileId` back to its path. Dead slots (ids from a
    /// restored table whose entry was dropped) resolve to nothing.
    pub fn lookup(&self, id: FileId) -> Option<PathBuf> {
        if !id.is_valid() {
            return None;
        }
        let ids = self.by_id.read().unwrap();
        ids.get(id.0 as usize)
            .filter(|p| !p.as_os_str().is_empty())
            .cloned()
    }

    /// Number of interned paths (the sentinel slot does not count).
    pub fn len(&self) -> usize {
        self.by_id.read().unwrap().len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the bijection, ordered by id. Dead slots are skipped.
    pub fn entries(&self) -> Vec<(FileId, PathBuf)> {
        let ids = self.by_id.read().unwrap();
        ids.iter()
            .enumerate()
            .skip(1)
            .filter(|(_, p)| !p.as_os_str().is_empty())
            .map(|(i, p)| (FileId(i as u32), p.clone()))
            .collect()
    }

    /// Populate the table from persisted (id, path) pairs. Gaps between
    /// ids are kept as dead slots so surviving ids stay stable. Intended
    /// for a freshly created table, before anything else interns.
    pub fn fill(&self, entries: impl IntoIterator<Item = (FileId, PathBuf)>) {
        let mut ids = self.by_id.write().unwrap();
        for (id, path) in entries {
            let idx = id.0 as usize;
            if idx == 0 {
                continue;
            }
            if ids.len() <= idx {
                ids.resize(idx + 1, PathBuf::new());
            }
            ids[idx] = path.clone();
            self.by_path.insert(path, id);
        }
    }

    /// Rebuild a table from persisted (id, path) pairs.
    pub fn restore(entries: impl IntoIterator<Item = (FileId, PathBuf)>) -> Self {
        let table = PathTable::new();
        table.fill(entries);
        table
    }
}

impl Default for PathTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Canonicalize a user-supplied path: absolute, symlinks resolved.
pub fn canonical_path(path: &Path) -> std::io::Result<PathBuf> {
    std::fs::canonicalize(path)
}

/// Parse a user-supplied `path:line:column` or `path:line` string.
///
/// The column defaults to 1 when omitted. The path is canonicalized and
/// interned. Malformed strings and paths that cannot be canonicalized yield
/// the invalid sentinel; the caller decides whether to fall back to
/// name-based resolution.
pub fn parse_user_location(input: &str, paths: &PathTable) -> Location {
    let mut tail: Vec<u32> = Vec::with_capacity(2);
    let mut rest = input;

    // Peel up to two numeric suffixes off the right-hand side.
    while tail.len() < 2 {
        match rest.rfind(':') {
            Some(idx) => match rest[idx + 1..].parse::<u32>() {
                Ok(n) => {
                    tail.push(n);
                    rest = &rest[..idx];
                }
                Err(_) => break,
            },
            None => break,
        }
    }

    let (line, column) = match tail.as_slice() {
        [line] => (*line, 1),
        [column, line] => (*line, *column),
        _ => return Location::INVALID,
    };
    if line == 0 || column == 0 || rest.is_empty() {
        return Location::INVALID;
    }

    match canonical_path(Path::new(rest)) {
        Ok(canonical) => Location::new(paths.intern(&canonical), line, column),
        Err(_) => Location::INVALID,
    }
}
