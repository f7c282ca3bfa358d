//! Read-only queries against the symbol store

use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::cursor::CursorInfo;
use crate::location::{Location, PathTable};
use crate::store::{Pattern, SymbolStore};

/// Default cap for `list_symbols` with an empty prefix.
pub const LIST_SYMBOLS_CAP: usize = 10_000;

/// Ordering tweaks applied to query results. The default is the stable
/// (file, line, column) order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SortFlags {
    /// Keep only declaration/definition cursors.
    pub declaration_only: bool,
    pub reverse: bool,
}

/// A borrowed view over the store and path table; the caller holds the
/// read lock for the lifetime of the engine.
pub struct QueryEngine<'a> {
    store: &'a SymbolStore,
    paths: &'a PathTable,
}

impl<'a> QueryEngine<'a> {
    pub fn new(store: &'a SymbolStore, paths: &'a PathTable) -> Self {
        QueryEngine { store, paths }
    }

    /// Resolve `loc` to the location its cursor points at.
    ///
    /// References follow their first target. Definitions jump through the
    /// USR map to the canonical declaration and vice versa. Ties prefer a
    /// location in the same file, then the smallest (file, line, column).
    pub fn follow(&self, loc: Location) -> Option<Location> {
        let info = self.store.get(loc)?;
        let jumped = if info.kind.is_definition() {
            self.usr_counterpart(loc, info, |c: &CursorInfo| c.kind.is_declaration())
        } else if info.kind.is_declaration() {
            self.usr_counterpart(loc, info, |c: &CursorInfo| c.kind.is_definition())
        } else {
            None
        };
        jumped.or_else(|| pick_best(loc, info.targets.iter().copied()))
    }

    fn usr_counterpart(
        &self,
        loc: Location,
        info: &CursorInfo,
        want: impl Fn(&CursorInfo) -> bool,
    ) -> Option<Location> {
        if info.usr.is_empty() {
            return None;
        }
        let group = self.store.by_usr(&info.usr)?;
        let candidates = group
            .iter()
            .copied()
            .filter(|l| *l != loc)
            .filter(|l| self.store.get(*l).map(&want).unwrap_or(false));
        pick_best(loc, candidates)
    }

    /// Locations referring to the entity at `loc`, unified over its USR,
    /// plus the entity's declarations. Definitions are folded in only by
    /// `all_references`.
    pub fn references(&self, loc: Location) -> BTreeSet<Location> {
        let mut out = BTreeSet::new();
        let Some(info) = self.store.get(loc) else {
            return out;
        };
        for member in self.usr_group(loc, info) {
            if let Some(cursor) = self.store.get(member) {
                out.extend(cursor.references.iter().copied());
                if cursor.kind.is_declaration() || cursor.kind.is_reference() {
                    out.insert(member);
                }
            }
        }
        out
    }

    /// Every reference, declaration and definition of the entity at `loc`.
    pub fn all_references(&self, loc: Location) -> BTreeSet<Location> {
        let mut out = BTreeSet::new();
        let Some(info) = self.store.get(loc) else {
            return out;
        };
        for member in self.usr_group(loc, info) {
            out.insert(member);
            if let Some(cursor) = self.store.get(member) {
                out.extend(cursor.references.iter().copied());
            }
        }
        out
    }

    fn usr_group(&self, loc: Location, info: &CursorInfo) -> Vec<Location> {
        if info.usr.is_empty() {
            return vec![loc];
        }
        match self.store.by_usr(&info.usr) {
            Some(group) => {
                let mut members: Vec<Location> = group.iter().copied().collect();
                if !members.contains(&loc) {
                    members.push(loc);
                }
                members
            }
            None => vec![loc],
        }
    }

    /// Exact name lookup first. A bare name also matches the signature
    /// keys of its overloads (`foo` finds `foo()` and `foo(int)`).
    /// Failing both, the argument is re-read as a prefix or regex pattern.
    pub fn find_symbol(&self, name: &str) -> BTreeSet<Location> {
        let exact = self.store.find(&Pattern::Exact(name.to_string()));
        if !exact.is_empty() {
            return exact;
        }
        let mut overloads = BTreeSet::new();
        for (key, locs) in self
            .store
            .symbol_names()
            .range(name.to_string()..)
            .take_while(|(key, _)| key.starts_with(name))
        {
            if key[name.len()..].starts_with('(') {
                overloads.extend(locs.iter().copied());
            }
        }
        if !overloads.is_empty() {
            return overloads;
        }
        match Pattern::parse(name) {
            Pattern::Exact(_) => BTreeSet::new(),
            pattern => self.store.find(&pattern),
        }
    }

    /// Symbol names starting with `prefix` (empty prefix lists all), capped.
    pub fn list_symbols(&self, prefix: &str, limit: usize) -> Vec<String> {
        self.store
            .symbol_names()
            .range(prefix.to_string()..)
            .take_while(|(name, _)| name.starts_with(prefix))
            .take(limit)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// The declaration of a base class of the class cursor at `loc`.
    pub fn find_super(&self, loc: Location) -> Option<Location> {
        let info = self.store.get(loc)?;
        if !info.kind.is_class() {
            return None;
        }
        let mut candidates = BTreeSet::new();
        for base in &info.base_classes {
            if let Some(group) = self.store.by_usr(base) {
                candidates.extend(
                    group
                        .iter()
                        .copied()
                        .filter(|l| self.store.get(*l).map(|c| c.kind.is_class()).unwrap_or(false)),
                );
            }
        }
        let declarations: Vec<Location> = candidates
            .iter()
            .copied()
            .filter(|l| {
                self.store
                    .get(*l)
                    .map(|c| c.kind.is_declaration())
                    .unwrap_or(false)
            })
            .collect();
        if !declarations.is_empty() {
            return pick_best(loc, declarations.into_iter());
        }
        pick_best(loc, candidates.into_iter())
    }

    /// Classes whose base set contains the USR of the class at `loc`.
    /// Served by a scan; subclass queries are rare.
    pub fn find_subs(&self, loc: Location) -> BTreeSet<Location> {
        let mut out = BTreeSet::new();
        let Some(info) = self.store.get(loc) else {
            return out;
        };
        if !info.kind.is_class() || info.usr.is_empty() {
            return out;
        }
        for (candidate, cursor) in self.store.symbols.iter() {
            if cursor.kind.is_class() && cursor.base_classes.contains(&info.usr) {
                out.insert(*candidate);
            }
        }
        out
    }

    /// Paths in the file id bijection containing `substring` (empty matches
    /// everything), ordered.
    pub fn files(&self, substring: &str) -> Vec<PathBuf> {
        let mut out: Vec<PathBuf> = self
            .paths
            .entries()
            .into_iter()
            .map(|(_, path)| path)
            .filter(|p| substring.is_empty() || p.to_string_lossy().contains(substring))
            .collect();
        out.sort();
        out
    }

    /// Order a result set: stable (file, line, column), optionally filtered
    /// to declarations/definitions, optionally reversed.
    pub fn sort(&self, locations: &BTreeSet<Location>, flags: SortFlags) -> Vec<Location> {
        let mut out: Vec<Location> = locations
            .iter()
            .copied()
            .filter(|l| {
                if !flags.declaration_only {
                    return true;
                }
                self.store
                    .get(*l)
                    .map(|c| c.kind.is_declaration() || c.kind.is_definition())
                    .unwrap_or(false)
            })
            .collect();
        if flags.reverse {
            out.reverse();
        }
        out
    }
}

/// Prefer a candidate in the same file as `from`; otherwise the smallest
/// (file, line, column). `from` itself never wins.
fn pick_best(from: Location, candidates: impl Iterator<Item = Location>) -> Option<Location> {
    let mut best: Option<Location> = None;
    for candidate in candidates {
        if candidate == from || !candidate.is_valid() {
            continue;
        }
        best = Some(match best {
            None => candidate,
            Some(current) => {
                let candidate_same = candidate.file_id == from.file_id;
                let current_same = current.file_id == from.file_id;
                if candidate_same != current_same {
                    if candidate_same {
                        candidate
                    } else {
                        current
                    }
                } else if candidate < current {
                    candidate
                } else {
                    current
                }
            }
        });
    }
    best
}
