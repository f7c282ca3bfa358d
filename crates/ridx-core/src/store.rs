//! The in-memory symbol store: four maps and their invariants

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::time::{SystemTime, UNIX_EPOCH};

use regex::Regex;

use crate::cursor::CursorInfo;
use crate::location::{FileId, Location};

/// Per-file bookkeeping. The two location sets record this file's
/// cross-file out-links (`targets`) and in-links (`references`) so a purge
/// can repair inverse links in other files without a full scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileInfo {
    /// Milliseconds since the epoch at the time of the last merge.
    pub last_indexed: u64,
    /// Symbol names declared or defined in this file.
    pub symbol_names: HashSet<String>,
    /// Locations outside this file that cursors in it point at.
    pub targets: BTreeSet<Location>,
    /// Locations outside this file whose cursors point into it.
    pub references: BTreeSet<Location>,
}

/// A symbol-name lookup pattern, detected from the query syntax.
#[derive(Debug, Clone)]
pub enum Pattern {
    Exact(String),
    Prefix(String),
    Regex(Regex),
}

const REGEX_META: &[char] = &['[', ']', '{', '}', '|', '^', '$', '+', '?', '\\', '.', '*'];

impl Pattern {
    /// `symbol*` is a prefix pattern; anything containing regex
    /// metacharacters that compiles is a regex; everything else is exact.
    pub fn parse(input: &str) -> Pattern {
        if let Some(prefix) = input.strip_suffix('*') {
            if !prefix.contains(REGEX_META) {
                return Pattern::Prefix(prefix.to_string());
            }
        }
        if input.contains(REGEX_META) {
            if let Ok(re) = Regex::new(input) {
                return Pattern::Regex(re);
            }
        }
        Pattern::Exact(input.to_string())
    }

    fn matches(&self, name: &str) -> bool {
        match self {
            Pattern::Exact(s) => name == s,
            Pattern::Prefix(p) => name.starts_with(p.as_str()),
            Pattern::Regex(re) => re.is_match(name),
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// The symbol store. Mutated only under the engine's write lock; all
/// lookups return empty values rather than errors.
///
/// After any `insert_batch` or `remove`, targets and references are
/// symmetric for every stored cursor (a targets b exactly when b lists a
/// as a reference), and no cursor targets a location that is gone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SymbolStore {
    pub(crate) symbols: BTreeMap<Location, CursorInfo>,
    pub(crate) symbol_names: BTreeMap<String, BTreeSet<Location>>,
    pub(crate) usrs: HashMap<String, BTreeSet<Location>>,
    pub(crate) files: HashMap<FileId, FileInfo>,
}

impl SymbolStore {
    pub fn new() -> Self {
        SymbolStore::default()
    }

    pub fn get(&self, loc: Location) -> Option<&CursorInfo> {
        self.symbols.get(&loc)
    }

    pub fn by_usr(&self, usr: &str) -> Option<&BTreeSet<Location>> {
        self.usrs.get(usr)
    }

    /// All cursors of one file, in (line, column) order. A contiguous range
    /// scan thanks to the location ordering.
    pub fn file_symbols(
        &self,
        file: FileId,
    ) -> impl Iterator<Item = (&Location, &CursorInfo)> {
        self.symbols
            .range(Location::file_start(file)..)
            .take_while(move |(loc, _)| loc.file_id == file)
    }

    /// Locations declaring or defining names matching `pattern`.
    pub fn find(&self, pattern: &Pattern) -> BTreeSet<Location> {
        let mut out = BTreeSet::new();
        match pattern {
            Pattern::Exact(name) => {
                if let Some(locs) = self.symbol_names.get(name) {
                    out.extend(locs.iter().copied());
                }
            }
            Pattern::Prefix(prefix) => {
                for (_, locs) in self
                    .symbol_names
                    .range(prefix.clone()..)
                    .take_while(|(name, _)| name.starts_with(prefix.as_str()))
                {
                    out.extend(locs.iter().copied());
                }
            }
            Pattern::Regex(_) => {
                for (name, locs) in &self.symbol_names {
                    if pattern.matches(name) {
                        out.extend(locs.iter().copied());
                    }
                }
            }
        }
        out
    }

    pub fn symbol_names(&self) -> &BTreeMap<String, BTreeSet<Location>> {
        &self.symbol_names
    }

    pub fn files(&self) -> &HashMap<FileId, FileInfo> {
        &self.files
    }

    pub fn is_indexed(&self, file: FileId) -> bool {
        self.files.contains_key(&file)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Atomically replace every entry for `file` with `batch`.
    ///
    /// Prior entries for the file are purged first (repairing inverse links
    /// in other files), then the batch is inserted and its cross-file links
    /// are wired up in both directions.
    pub fn insert_batch(&mut self, file: FileId, batch: BTreeMap<Location, CursorInfo>) {
        self.purge(file);

        let mut info = FileInfo {
            last_indexed: now_millis(),
            ..FileInfo::default()
        };

        for (loc, cursor) in &batch {
            debug_assert_eq!(loc.file_id, file);
            if !cursor.symbol_name.is_empty() && !cursor.kind.is_reference() {
                self.symbol_names
                    .entry(cursor.symbol_name.clone())
                    .or_default()
                    .insert(*loc);
                info.symbol_names.insert(cursor.symbol_name.clone());
            }
            if !cursor.usr.is_empty() {
                self.usrs.entry(cursor.usr.clone()).or_default().insert(*loc);
            }
            for target in &cursor.targets {
                if target.file_id != file {
                    info.targets.insert(*target);
                    if let Some(other) = self.symbols.get_mut(target) {
                        other.references.insert(*loc);
                        if let Some(fi) = self.files.get_mut(&target.file_id) {
                            fi.references.insert(*loc);
                        }
                    }
                }
            }
            for referer in &cursor.references {
                if referer.file_id != file {
                    info.references.insert(*referer);
                    if let Some(other) = self.symbols.get_mut(referer) {
                        other.targets.insert(*loc);
                        if let Some(fi) = self.files.get_mut(&referer.file_id) {
                            fi.targets.insert(*loc);
                        }
                    }
                }
            }
        }

        self.symbols.extend(batch);
        self.files.insert(file, info);
    }

    /// Purge every entry for `file` and drop the inverse links other files
    /// held into it.
    pub fn remove(&mut self, file: FileId) {
        self.purge(file);
    }

    fn purge(&mut self, file: FileId) {
        let locs: Vec<Location> = self
            .file_symbols(file)
            .map(|(loc, _)| *loc)
            .collect();
        for loc in locs {
            if let Some(cursor) = self.symbols.remove(&loc) {
                if !cursor.symbol_name.is_empty() {
                    if let Some(set) = self.symbol_names.get_mut(&cursor.symbol_name) {
                        set.remove(&loc);
                        if set.is_empty() {
                            self.symbol_names.remove(&cursor.symbol_name);
                        }
                    }
                }
                if !cursor.usr.is_empty() {
                    if let Some(set) = self.usrs.get_mut(&cursor.usr) {
                        set.remove(&loc);
                        if set.is_empty() {
                            self.usrs.remove(&cursor.usr);
                        }
                    }
                }
            }
        }

        let Some(info) = self.files.remove(&file) else {
            return;
        };
        // Cursors we pointed at lose their back-references to us.
        for target in info.targets {
            if let Some(other) = self.symbols.get_mut(&target) {
                other.references.retain(|l| l.file_id != file);
            }
            if let Some(fi) = self.files.get_mut(&target.file_id) {
                fi.references.retain(|l| l.file_id != file);
            }
        }
        // Cursors that pointed at us would dangle; strip those targets.
        for referer in info.references {
            if let Some(other) = self.symbols.get_mut(&referer) {
                other.targets.retain(|l| l.file_id != file);
            }
            if let Some(fi) = self.files.get_mut(&referer.file_id) {
                fi.targets.retain(|l| l.file_id != file);
            }
        }
    }
}
