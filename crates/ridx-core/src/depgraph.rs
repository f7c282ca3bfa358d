//! File-to-file dependency relation

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use petgraph::graphmap::DiGraphMap;
use petgraph::Direction;

use crate::location::FileId;

/// Which way to walk the relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyMode {
    /// Files the argument depends on (forward closure).
    DependsOnArg,
    /// Files that depend on the argument (reverse closure; the slower
    /// direction, asked rarely).
    ArgDependsOn,
}

/// The include/use relation between files. An edge a → b means
/// "a depends on b" (a includes b, directly).
#[derive(Debug, Default)]
pub struct DependencyGraph {
    inner: DiGraphMap<u32, ()>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        DependencyGraph::default()
    }

    pub fn add_dependency(&mut self, file: FileId, on: FileId) {
        if file == on {
            return;
        }
        self.inner.add_edge(file.0, on.0, ());
    }

    /// Replace the direct forward set of `file`.
    pub fn set_dependencies(&mut self, file: FileId, deps: impl IntoIterator<Item = FileId>) {
        if self.inner.contains_node(file.0) {
            let old: Vec<u32> = self
                .inner
                .neighbors_directed(file.0, Direction::Outgoing)
                .collect();
            for dep in old {
                self.inner.remove_edge(file.0, dep);
            }
        } else {
            self.inner.add_node(file.0);
        }
        for dep in deps {
            self.add_dependency(file, dep);
        }
    }

    /// Transitive closure in the requested direction, excluding `file`
    /// itself.
    pub fn dependencies(&self, file: FileId, mode: DependencyMode) -> HashSet<FileId> {
        let direction = match mode {
            DependencyMode::DependsOnArg => Direction::Outgoing,
            DependencyMode::ArgDependsOn => Direction::Incoming,
        };
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([file.0]);
        while let Some(current) = queue.pop_front() {
            for next in self.inner.neighbors_directed(current, direction) {
                if seen.insert(FileId(next)) {
                    queue.push_back(next);
                }
            }
        }
        seen.remove(&file);
        seen
    }

    /// Files that must be re-indexed when `file` changes: the file itself
    /// plus everything that transitively includes it.
    pub fn dirty(&self, file: FileId) -> HashSet<FileId> {
        let mut out = self.dependencies(file, DependencyMode::ArgDependsOn);
        out.insert(file);
        out
    }

    pub fn remove_file(&mut self, file: FileId) {
        self.inner.remove_node(file.0);
    }

    pub fn contains(&self, file: FileId) -> bool {
        self.inner.contains_node(file.0)
    }

    /// Direct forward edges, for persistence.
    pub fn forward_map(&self) -> BTreeMap<u32, BTreeSet<u32>> {
        let mut out: BTreeMap<u32, BTreeSet<u32>> = BTreeMap::new();
        for node in self.inner.nodes() {
            let deps: BTreeSet<u32> = self
                .inner
                .neighbors_directed(node, Direction::Outgoing)
                .collect();
            if !deps.is_empty() {
                out.insert(node, deps);
            }
        }
        out
    }

    pub fn from_forward_map(map: &BTreeMap<u32, BTreeSet<u32>>) -> Self {
        let mut graph = DependencyGraph::new();
        for (file, deps) in map {
            for dep in deps {
                graph.add_dependency(FileId(*file), FileId(*dep));
            }
        }
        graph
    }
}
