//! The project: single owner of the index and its workers

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::{info, warn};

use ridx_core::{
    find_project_dir, parse_user_location, persist, DependencyGraph, Environment, FileId,
    FixItMap, IndexSnapshot, Location, PathTable, ProjectMeta, QueryEngine, Result, SortFlags,
    Source, StorageBackend, SymbolStore, INDEX_KEY, PROJECT_DIR_NAME,
};

use crate::coordinator::{CoordinatorConfig, CoordinatorHandle};
use crate::job::{IndexType, SourceParser};
use crate::sync::{SyncConfig, SyncEngine, SyncHandle};

/// Shared engine state handed to the sync task. The store is behind a
/// readers-writer lock: queries read, the sync pass writes.
#[derive(Clone)]
pub(crate) struct EngineState {
    pub paths: Arc<PathTable>,
    pub store: Arc<RwLock<SymbolStore>>,
    pub deps: Arc<RwLock<DependencyGraph>>,
    pub sources: Arc<RwLock<HashMap<FileId, Source>>>,
    pub fixits: Arc<RwLock<FixItMap>>,
    pub backend: Arc<dyn StorageBackend>,
}

#[derive(Debug, Clone, Default)]
pub struct ProjectOptions {
    pub coordinator: CoordinatorConfig,
    pub sync: SyncConfig,
}

/// One indexed source tree. Owns the store, path table, dependency graph,
/// source map and fix-its, and drives the coordinator and sync tasks;
/// collaborators only ever get handles.
pub struct Project {
    root: PathBuf,
    data_dir: PathBuf,
    state: EngineState,
    coordinator: CoordinatorHandle,
    sync: SyncHandle,
    watch_rx: Option<mpsc::UnboundedReceiver<FileId>>,
}

impl Project {
    /// Open (or create) the project for `root`. The data directory is
    /// found by walking upward from the environment's cwd; when none
    /// exists one is created under `root`. The caller provides the path
    /// table so the parser can share it; it must be freshly created.
    /// Must be called inside a tokio runtime: the sync and coordinator
    /// tasks are spawned here.
    pub fn open(
        root: impl Into<PathBuf>,
        env: &Environment,
        paths: Arc<PathTable>,
        parser: Arc<dyn SourceParser>,
        options: ProjectOptions,
    ) -> Result<Project> {
        let root = root.into();
        let data_dir = find_project_dir(&env.cwd)
            .unwrap_or_else(|| root.join(PROJECT_DIR_NAME));
        let backend: Arc<dyn StorageBackend> = Arc::from(env.backend.open(&data_dir)?);

        let snapshot = match backend.read(INDEX_KEY)? {
            Some(blob) => match persist::decode(&blob) {
                Ok(snapshot) => {
                    info!(
                        symbols = snapshot.store.len(),
                        files = snapshot.paths.len(),
                        "restored index"
                    );
                    snapshot
                }
                Err(e) if e.is_recoverable_load_error() => {
                    warn!(error = %e, "index out of date, re-index required");
                    IndexSnapshot::default()
                }
                Err(e) => return Err(e),
            },
            None => IndexSnapshot::default(),
        };

        if ProjectMeta::load(backend.as_ref())?.is_none() {
            let meta = ProjectMeta {
                root: root.clone(),
                compilation_database: None,
            };
            meta.store(backend.as_ref())?;
        }

        let sources: HashMap<FileId, Source> = snapshot
            .sources
            .iter()
            .map(|(id, source)| (FileId(*id), source.clone()))
            .collect();
        paths.fill(snapshot.paths);
        let state = EngineState {
            paths,
            store: Arc::new(RwLock::new(snapshot.store)),
            deps: Arc::new(RwLock::new(DependencyGraph::from_forward_map(
                &snapshot.dependencies,
            ))),
            sources: Arc::new(RwLock::new(sources)),
            fixits: Arc::new(RwLock::new(FixItMap::new())),
            backend,
        };

        let (watch_tx, watch_rx) = mpsc::unbounded_channel();
        let sync = SyncEngine::spawn(options.sync, state.clone(), Some(watch_tx));
        let coordinator =
            CoordinatorHandle::spawn(options.coordinator, parser, sync.clone());

        Ok(Project {
            root,
            data_dir,
            state,
            coordinator,
            sync,
            watch_rx: Some(watch_rx),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn paths(&self) -> &Arc<PathTable> {
        &self.state.paths
    }

    /// Newly discovered files (dependencies, visited headers) the daemon
    /// should start watching. Takeable once.
    pub fn take_watch_events(&mut self) -> Option<mpsc::UnboundedReceiver<FileId>> {
        self.watch_rx.take()
    }

    // ── indexing ────────────────────────────────────────────────────────

    /// Enqueue a compilation unit. Remembers the source so dirty
    /// re-indexing after a restart still has its arguments.
    pub async fn index(&self, source: Source, index_type: IndexType) -> bool {
        self.state
            .sources
            .write()
            .await
            .insert(source.file_id, source.clone());
        self.coordinator.index(source, index_type).await
    }

    /// A watched file changed: re-index it and everything that includes
    /// it. Returns how many units were scheduled.
    pub async fn dirty(&self, path: &Path) -> usize {
        let Some(file) = ridx_core::canonical_path(path)
            .ok()
            .and_then(|canonical| self.state.paths.get(&canonical))
        else {
            return 0;
        };
        let dirty = self.state.deps.read().await.dirty(file);
        let sources = self.state.sources.read().await.clone();
        let mut scheduled = 0;
        let mut dirty: Vec<FileId> = dirty.into_iter().collect();
        dirty.sort();
        for file in dirty {
            // Headers carry no compile command; their units re-index them.
            if let Some(source) = sources.get(&file) {
                self.coordinator
                    .index(source.clone(), IndexType::Dirty)
                    .await;
                scheduled += 1;
            }
        }
        scheduled
    }

    /// Re-index every known source whose path contains `pattern` (empty
    /// matches all). Returns the number of scheduled units.
    pub async fn reindex(&self, pattern: &str) -> usize {
        let sources = self.state.sources.read().await.clone();
        let mut scheduled = 0;
        for (file, source) in sources {
            if self.matches_path(file, pattern) {
                self.coordinator
                    .index(source, IndexType::Reindex)
                    .await;
                scheduled += 1;
            }
        }
        scheduled
    }

    /// Schedule dirty re-indexing for every indexed file whose on-disk
    /// mtime is newer than its last merge. Run once after restore.
    pub async fn reindex_modified(&self) -> usize {
        let files = self.state.store.read().await.files().clone();
        let sources = self.state.sources.read().await.clone();
        let mut stale: Vec<FileId> = Vec::new();
        {
            let deps = self.state.deps.read().await;
            for (file, info) in &files {
                let Some(path) = self.state.paths.lookup(*file) else {
                    continue;
                };
                let modified = std::fs::metadata(&path)
                    .and_then(|m| m.modified())
                    .ok()
                    .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                    .map(|d| d.as_millis() as u64);
                if modified.map(|m| m > info.last_indexed).unwrap_or(false) {
                    stale.extend(deps.dirty(*file));
                }
            }
        }
        stale.sort();
        stale.dedup();
        let mut scheduled = 0;
        for file in stale {
            if let Some(source) = sources.get(&file) {
                self.coordinator
                    .index(source.clone(), IndexType::Dirty)
                    .await;
                scheduled += 1;
            }
        }
        scheduled
    }

    /// Drop every indexed file whose path contains `pattern` from the
    /// store. Returns the number of removed files.
    pub async fn remove_files(&self, pattern: &str) -> usize {
        let files: Vec<FileId> = {
            let store = self.state.store.read().await;
            store
                .files()
                .keys()
                .copied()
                .filter(|file| self.matches_path(*file, pattern))
                .collect()
        };
        if files.is_empty() {
            return 0;
        }
        let mut store = self.state.store.write().await;
        let mut deps = self.state.deps.write().await;
        let mut sources = self.state.sources.write().await;
        let mut fixits = self.state.fixits.write().await;
        for file in &files {
            store.remove(*file);
            deps.remove_file(*file);
            sources.remove(file);
            fixits.remove(file);
        }
        files.len()
    }

    fn matches_path(&self, file: FileId, pattern: &str) -> bool {
        if pattern.is_empty() {
            return true;
        }
        self.state
            .paths
            .lookup(file)
            .map(|p| p.to_string_lossy().contains(pattern))
            .unwrap_or(false)
    }

    pub async fn is_indexed(&self, file: FileId) -> bool {
        self.state.store.read().await.is_indexed(file)
    }

    pub async fn is_indexing(&self) -> bool {
        self.coordinator.is_indexing().await
    }

    pub async fn toggle_suspend(&self, file: FileId) -> bool {
        self.coordinator.toggle_suspend(file).await
    }

    pub async fn is_suspended(&self, file: FileId) -> bool {
        self.coordinator.is_suspended(file).await
    }

    pub async fn suspended_files(&self) -> BTreeSet<FileId> {
        self.coordinator.suspended_files().await
    }

    pub fn clear_suspended(&self) {
        self.coordinator.clear_suspended();
    }

    pub async fn dump_jobs(&self) -> String {
        self.coordinator.dump_jobs().await
    }

    /// Compiler fix-its recorded for `file`, one `start-end text` line per
    /// edit.
    pub async fn fix_its(&self, file: FileId) -> String {
        let fixits = self.state.fixits.read().await;
        match fixits.get(&file) {
            Some(fixes) => fixes
                .iter()
                .map(|f| format!("{}-{} {}", f.start, f.end, f.text))
                .collect::<Vec<_>>()
                .join("\n"),
            None => String::new(),
        }
    }

    /// Force a sync pass and save now.
    pub async fn save(&self) {
        self.sync.flush().await;
    }

    /// Stop accepting work, drain in-flight jobs within the grace period,
    /// then flush the final save.
    pub async fn shutdown(&self) {
        self.coordinator.shutdown().await;
        self.sync.flush().await;
    }

    // ── queries ─────────────────────────────────────────────────────────

    /// Parse a user-supplied `path:line[:column]` argument.
    pub fn parse_location(&self, arg: &str) -> Location {
        parse_user_location(arg, &self.state.paths)
    }

    pub async fn follow(&self, loc: Location) -> Option<Location> {
        let store = self.state.store.read().await;
        QueryEngine::new(&store, &self.state.paths).follow(loc)
    }

    pub async fn references(&self, loc: Location) -> BTreeSet<Location> {
        let store = self.state.store.read().await;
        QueryEngine::new(&store, &self.state.paths).references(loc)
    }

    pub async fn all_references(&self, loc: Location) -> BTreeSet<Location> {
        let store = self.state.store.read().await;
        QueryEngine::new(&store, &self.state.paths).all_references(loc)
    }

    pub async fn find_symbol(&self, name: &str) -> BTreeSet<Location> {
        let store = self.state.store.read().await;
        QueryEngine::new(&store, &self.state.paths).find_symbol(name)
    }

    pub async fn list_symbols(&self, prefix: &str, limit: usize) -> Vec<String> {
        let store = self.state.store.read().await;
        QueryEngine::new(&store, &self.state.paths).list_symbols(prefix, limit)
    }

    pub async fn find_super(&self, loc: Location) -> Option<Location> {
        let store = self.state.store.read().await;
        QueryEngine::new(&store, &self.state.paths).find_super(loc)
    }

    pub async fn find_subs(&self, loc: Location) -> BTreeSet<Location> {
        let store = self.state.store.read().await;
        QueryEngine::new(&store, &self.state.paths).find_subs(loc)
    }

    pub async fn files(&self, pattern: &str) -> Vec<PathBuf> {
        let store = self.state.store.read().await;
        QueryEngine::new(&store, &self.state.paths).files(pattern)
    }

    pub async fn sort(&self, locations: &BTreeSet<Location>, flags: SortFlags) -> Vec<Location> {
        let store = self.state.store.read().await;
        QueryEngine::new(&store, &self.state.paths).sort(locations, flags)
    }

    /// Transitive dependencies of `file` in the requested direction.
    pub async fn dependencies(
        &self,
        file: FileId,
        mode: ridx_core::DependencyMode,
    ) -> std::collections::HashSet<FileId> {
        self.state.deps.read().await.dependencies(file, mode)
    }
}
