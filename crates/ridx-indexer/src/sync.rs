//! Debounced merging of finished jobs into the store
//!
//! Results pile up in `pending` keyed by primary file; a one-shot timer
//! re-arms on every arrival and a pass runs once results stop coming.
//! Passes are serialized by construction: this task is the only writer.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use ridx_core::{persist, CursorInfo, FileId, IndexSnapshot, Location, StorageBackend, INDEX_KEY};

use crate::job::IndexData;
use crate::project::EngineState;

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Quiet period after the last finished job before a pass runs.
    pub debounce: Duration,
    /// Files merged since the last save that force a save.
    pub save_threshold: usize,
    /// Maximum age of the on-disk blob while merges keep arriving.
    pub save_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            debounce: Duration::from_millis(2000),
            save_threshold: 32,
            save_interval: Duration::from_secs(300),
        }
    }
}

enum SyncMessage {
    Result(Box<IndexData>),
    Flush(oneshot::Sender<()>),
}

/// Cheap cloneable handle to the sync task.
#[derive(Clone)]
pub struct SyncHandle {
    tx: mpsc::UnboundedSender<SyncMessage>,
}

impl SyncHandle {
    /// Queue a finished job for the next pass.
    pub fn submit(&self, data: Box<IndexData>) {
        let _ = self.tx.send(SyncMessage::Result(data));
    }

    /// Run a pass over whatever is queued and save, synchronously.
    pub async fn flush(&self) {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(SyncMessage::Flush(reply)).is_ok() {
            let _ = rx.await;
        }
    }
}

pub(crate) struct SyncEngine {
    config: SyncConfig,
    state: EngineState,
    rx: mpsc::UnboundedReceiver<SyncMessage>,
    /// Newly discovered files are reported here so the daemon can watch
    /// them.
    watch_tx: Option<mpsc::UnboundedSender<FileId>>,
    pending: HashMap<FileId, IndexData>,
    deadline: Option<tokio::time::Instant>,
    synced_since_save: usize,
    last_save: Instant,
}

impl SyncEngine {
    /// Spawn the sync task. Must run inside a tokio runtime.
    pub(crate) fn spawn(
        config: SyncConfig,
        state: EngineState,
        watch_tx: Option<mpsc::UnboundedSender<FileId>>,
    ) -> SyncHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let engine = SyncEngine {
            config,
            state,
            rx,
            watch_tx,
            pending: HashMap::new(),
            deadline: None,
            synced_since_save: 0,
            last_save: Instant::now(),
        };
        tokio::spawn(engine.run());
        SyncHandle { tx }
    }

    async fn run(mut self) {
        loop {
            let msg = match self.deadline {
                Some(deadline) => tokio::select! {
                    msg = self.rx.recv() => msg,
                    _ = tokio::time::sleep_until(deadline) => {
                        self.deadline = None;
                        self.sync_pass().await;
                        self.maybe_save().await;
                        continue;
                    }
                },
                None => self.rx.recv().await,
            };
            match msg {
                None => break,
                Some(SyncMessage::Result(data)) => {
                    debug!(file = %data.file_id, "job result queued for sync");
                    self.pending.insert(data.file_id, *data);
                    self.deadline =
                        Some(tokio::time::Instant::now() + self.config.debounce);
                }
                Some(SyncMessage::Flush(reply)) => {
                    self.deadline = None;
                    self.sync_pass().await;
                    self.save().await;
                    let _ = reply.send(());
                }
            }
        }
    }

    /// One pass: split each unit's bundle into per-file batches and merge
    /// them under the store's write lock.
    async fn sync_pass(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let pending = std::mem::take(&mut self.pending);
        let started = Instant::now();
        let mut synced = 0usize;
        {
            let mut store = self.state.store.write().await;
            let mut deps = self.state.deps.write().await;
            let mut fixits = self.state.fixits.write().await;

            for (primary, data) in pending {
                let mut by_file: HashMap<FileId, BTreeMap<Location, CursorInfo>> =
                    HashMap::new();
                by_file.insert(primary, BTreeMap::new());
                for (loc, cursor) in data.symbols {
                    by_file.entry(loc.file_id).or_default().insert(loc, cursor);
                }
                for (file, batch) in by_file {
                    store.insert_batch(file, batch);
                    synced += 1;
                }

                deps.set_dependencies(primary, data.dependencies.iter().copied());

                for (file, fixes) in data.fixits {
                    if fixes.is_empty() {
                        fixits.remove(&file);
                    } else {
                        fixits.insert(file, fixes);
                    }
                }

                if let Some(tx) = &self.watch_tx {
                    for file in data.visited.iter().chain(data.dependencies.iter()) {
                        let _ = tx.send(*file);
                    }
                }
            }
        }
        self.synced_since_save += synced;
        info!(
            files = synced,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "sync pass complete"
        );
    }

    async fn maybe_save(&mut self) {
        if self.synced_since_save >= self.config.save_threshold
            || (self.synced_since_save > 0
                && self.last_save.elapsed() >= self.config.save_interval)
        {
            self.save().await;
        }
    }

    async fn save(&mut self) {
        let snapshot = build_snapshot(&self.state).await;
        match write_snapshot(self.state.backend.as_ref(), &snapshot) {
            Ok(()) => {
                debug!(symbols = snapshot.store.len(), "index saved");
                self.synced_since_save = 0;
                self.last_save = Instant::now();
            }
            // Keep the counter so the next pass retries.
            Err(e) => warn!(error = %e, "saving index failed"),
        }
    }
}

/// Collect a value snapshot of the live engine under read locks.
pub(crate) async fn build_snapshot(state: &EngineState) -> IndexSnapshot {
    let store = state.store.read().await.clone();
    let dependencies = state.deps.read().await.forward_map();
    let sources = state
        .sources
        .read()
        .await
        .iter()
        .map(|(id, source)| (id.0, source.clone()))
        .collect();
    IndexSnapshot {
        paths: state.paths.entries(),
        store,
        dependencies,
        sources,
    }
}

pub(crate) fn write_snapshot(
    backend: &dyn StorageBackend,
    snapshot: &IndexSnapshot,
) -> ridx_core::Result<()> {
    backend.write(INDEX_KEY, &persist::encode(snapshot))
}
