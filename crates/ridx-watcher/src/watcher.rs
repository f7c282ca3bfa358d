//! Filesystem watcher implementation

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::Result;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Events emitted by the file watcher. This is the whole contract the
/// engine consumes; scheduling decisions happen on the other side.
#[derive(Debug, Clone)]
pub enum WatchEvent {
    /// File created
    Created(PathBuf),
    /// File modified
    Modified(PathBuf),
    /// File removed
    Removed(PathBuf),
}

/// File system watcher for the indexed source tree.
pub struct FileWatcher {
    watcher: RecommendedWatcher,
    event_rx: mpsc::UnboundedReceiver<WatchEvent>,
    watched_paths: HashSet<PathBuf>,
}

impl FileWatcher {
    pub fn new() -> Result<Self> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let watcher =
            notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
                match res {
                    Ok(event) => {
                        debug!("file system event: {:?}", event);
                        Self::handle_notify_event(event, &event_tx);
                    }
                    Err(e) => {
                        error!("file system watch error: {}", e);
                    }
                }
            })?;

        Ok(Self {
            watcher,
            event_rx,
            watched_paths: HashSet::new(),
        })
    }

    fn handle_notify_event(event: notify::Event, event_tx: &mpsc::UnboundedSender<WatchEvent>) {
        let build: fn(PathBuf) -> WatchEvent = match event.kind {
            notify::EventKind::Create(_) => WatchEvent::Created,
            notify::EventKind::Modify(_) => WatchEvent::Modified,
            notify::EventKind::Remove(_) => WatchEvent::Removed,
            _ => return,
        };
        for path in event.paths {
            if !is_source_file(&path) || should_ignore_path(&path) {
                continue;
            }
            if let Err(e) = event_tx.send(build(path)) {
                warn!("failed to forward watch event: {}", e);
            }
        }
    }

    /// Watch a directory recursively.
    pub fn watch_directory(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        info!("watching directory: {:?}", path);

        self.watcher.watch(path, RecursiveMode::Recursive)?;
        self.watched_paths.insert(path.to_path_buf());
        Ok(())
    }

    /// Watch a single file (headers discovered as dependencies).
    pub fn watch_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if self.watched_paths.contains(path) {
            return Ok(());
        }
        debug!("watching file: {:?}", path);

        self.watcher.watch(path, RecursiveMode::NonRecursive)?;
        self.watched_paths.insert(path.to_path_buf());
        Ok(())
    }

    /// Stop watching a path.
    pub fn unwatch(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        info!("stopping watch for: {:?}", path);

        self.watcher.unwatch(path)?;
        self.watched_paths.remove(path);
        Ok(())
    }

    /// Get the event receiver.
    pub fn event_receiver(&mut self) -> &mut mpsc::UnboundedReceiver<WatchEvent> {
        &mut self.event_rx
    }

    /// Detach the event receiver so the caller can select on it while
    /// still adding watches. Takeable once.
    pub fn take_event_receiver(&mut self) -> mpsc::UnboundedReceiver<WatchEvent> {
        let (_, empty) = mpsc::unbounded_channel();
        std::mem::replace(&mut self.event_rx, empty)
    }

    pub fn is_watching(&self, path: &Path) -> bool {
        self.watched_paths.contains(path)
    }

    pub fn watched_paths(&self) -> &HashSet<PathBuf> {
        &self.watched_paths
    }
}

/// C/C++ sources and headers are the only files the index cares about.
pub fn is_source_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|s| s.to_str()),
        Some("c") | Some("cc") | Some("cpp") | Some("cxx") | Some("h") | Some("hh")
            | Some("hpp") | Some("hxx") | Some("inl")
    )
}

/// Build trees and the index's own data directory never trigger reindexing.
fn should_ignore_path(path: &Path) -> bool {
    for component in path.components() {
        if let Some(name) = component.as_os_str().to_str() {
            if name == ".git" || name == ".rtags.db" || name == "build" {
                return true;
            }
        }
    }
    false
}
