//! The indexing coordinator: one task owns every queue
//!
//! All scheduling state (`pending`, `jobs`, the suspended set) lives on a
//! single task; everything else talks to it through messages. Workers run
//! the external parser on blocking threads and report back on the same
//! channel, so completions interleave with requests in arrival order.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use ridx_core::{FileId, Source};

use crate::job::{IndexData, IndexType, JobError, SourceParser};
use crate::sync::SyncHandle;

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Parallel worker slots. Defaults to hardware parallelism.
    pub slots: usize,
    /// Crashes (including timeouts) tolerated per file before giving up.
    pub crash_threshold: u32,
    /// Soft per-job timeout; exceeded jobs count as crashes.
    pub job_timeout: Duration,
    /// How long shutdown waits for in-flight jobs.
    pub shutdown_grace: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        CoordinatorConfig {
            slots: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            crash_threshold: 3,
            job_timeout: Duration::from_secs(300),
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

enum JobOutcome {
    Data(Box<IndexData>),
    Crashed(String),
    TimedOut,
    Unreadable(PathBuf),
}

enum Message {
    Index {
        source: Source,
        index_type: IndexType,
        reply: oneshot::Sender<bool>,
    },
    Finished {
        file: FileId,
        job_id: u64,
        outcome: JobOutcome,
    },
    ToggleSuspend {
        file: FileId,
        reply: oneshot::Sender<bool>,
    },
    IsSuspended {
        file: FileId,
        reply: oneshot::Sender<bool>,
    },
    SuspendedFiles {
        reply: oneshot::Sender<BTreeSet<FileId>>,
    },
    ClearSuspended,
    IsIndexing {
        reply: oneshot::Sender<bool>,
    },
    DumpJobs {
        reply: oneshot::Sender<String>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

struct JobData {
    job_id: u64,
    source: Source,
    index_type: IndexType,
    /// Newest request that arrived while this job was running; started
    /// when the job finishes.
    pending: Option<(Source, IndexType)>,
    crash_count: u32,
    started: Instant,
}

struct Coordinator {
    config: CoordinatorConfig,
    parser: Arc<dyn SourceParser>,
    sync: SyncHandle,
    rx: mpsc::UnboundedReceiver<Message>,
    tx: mpsc::UnboundedSender<Message>,
    pending: VecDeque<(Source, IndexType)>,
    jobs: HashMap<FileId, JobData>,
    suspended: BTreeSet<FileId>,
    next_job_id: u64,
    shutting_down: bool,
}

impl Coordinator {
    async fn run(mut self) {
        while let Some(msg) = self.rx.recv().await {
            match msg {
                Message::Index {
                    source,
                    index_type,
                    reply,
                } => {
                    let started = self.index(source, index_type);
                    let _ = reply.send(started);
                }
                Message::Finished {
                    file,
                    job_id,
                    outcome,
                } => self.on_job_finished(file, job_id, outcome),
                Message::ToggleSuspend { file, reply } => {
                    let now_suspended = if self.suspended.remove(&file) {
                        false
                    } else {
                        self.suspended.insert(file);
                        true
                    };
                    info!(%file, suspended = now_suspended, "suspension toggled");
                    let _ = reply.send(now_suspended);
                }
                Message::IsSuspended { file, reply } => {
                    let _ = reply.send(self.suspended.contains(&file));
                }
                Message::SuspendedFiles { reply } => {
                    let _ = reply.send(self.suspended.clone());
                }
                Message::ClearSuspended => self.suspended.clear(),
                Message::IsIndexing { reply } => {
                    let _ = reply.send(!self.jobs.is_empty() || !self.pending.is_empty());
                }
                Message::DumpJobs { reply } => {
                    let _ = reply.send(self.dump_jobs());
                }
                Message::Shutdown { reply } => {
                    self.shutdown().await;
                    let _ = reply.send(());
                    break;
                }
            }
        }
    }

    /// Returns true iff the request moved the file from idle towards busy.
    /// Requests for suspended files are dropped silently; requests for
    /// files with a running job replace that job's `pending` slot.
    fn index(&mut self, source: Source, index_type: IndexType) -> bool {
        let file = source.file_id;
        if self.shutting_down {
            return false;
        }
        if self.suspended.contains(&file) {
            debug!(%file, "request dropped, file is suspended");
            return false;
        }
        if let Some(job) = self.jobs.get_mut(&file) {
            job.pending = Some((source, index_type));
            return false;
        }
        if self.jobs.len() < self.config.slots {
            self.spawn_job(source, index_type, 0, None);
        } else {
            self.pending.push_back((source, index_type));
        }
        true
    }

    fn spawn_job(
        &mut self,
        source: Source,
        index_type: IndexType,
        crash_count: u32,
        carried_pending: Option<(Source, IndexType)>,
    ) {
        let file = source.file_id;
        self.next_job_id += 1;
        let job_id = self.next_job_id;
        self.jobs.insert(
            file,
            JobData {
                job_id,
                source: source.clone(),
                index_type,
                pending: carried_pending,
                crash_count,
                started: Instant::now(),
            },
        );

        let parser = Arc::clone(&self.parser);
        let tx = self.tx.clone();
        let timeout = self.config.job_timeout;
        tokio::spawn(async move {
            let worker = tokio::task::spawn_blocking(move || parser.parse(&source));
            let outcome = match tokio::time::timeout(timeout, worker).await {
                Err(_) => JobOutcome::TimedOut,
                Ok(Err(join_error)) => JobOutcome::Crashed(join_error.to_string()),
                Ok(Ok(Ok(data))) => JobOutcome::Data(Box::new(data)),
                Ok(Ok(Err(JobError::Unreadable(path)))) => JobOutcome::Unreadable(path),
                Ok(Ok(Err(JobError::Crashed(message)))) => JobOutcome::Crashed(message),
            };
            let _ = tx.send(Message::Finished {
                file,
                job_id,
                outcome,
            });
        });
    }

    fn on_job_finished(&mut self, file: FileId, job_id: u64, outcome: JobOutcome) {
        // A timed-out job's real result can still trickle in later; the
        // job id mismatch identifies it as stale.
        match self.jobs.get(&file) {
            Some(job) if job.job_id == job_id => {}
            _ => {
                debug!(%file, job_id, "ignoring stale job result");
                return;
            }
        }
        let mut job = self.jobs.remove(&file).expect("job checked above");

        match outcome {
            JobOutcome::Data(data) => {
                debug!(
                    %file,
                    symbols = data.symbols.len(),
                    elapsed_ms = job.started.elapsed().as_millis() as u64,
                    "job finished"
                );
                if job.index_type != IndexType::Dump {
                    self.sync.submit(data);
                }
                self.start_next(file, job.pending.take());
            }
            JobOutcome::Crashed(_) | JobOutcome::TimedOut => {
                let timed_out = matches!(outcome, JobOutcome::TimedOut);
                job.crash_count += 1;
                if job.crash_count < self.config.crash_threshold && !self.shutting_down {
                    warn!(
                        %file,
                        crash_count = job.crash_count,
                        timed_out,
                        "job failed, retrying"
                    );
                    self.spawn_job(job.source, job.index_type, job.crash_count, job.pending);
                } else {
                    error!(%file, crashes = job.crash_count, "file repeatedly failing, giving up");
                    self.start_next(file, job.pending.take());
                }
            }
            JobOutcome::Unreadable(path) => {
                warn!(path = %path.display(), "source unreadable, dropping job");
                self.start_next(file, job.pending.take());
            }
        }
    }

    fn start_next(&mut self, _finished: FileId, held: Option<(Source, IndexType)>) {
        if let Some((source, index_type)) = held {
            if !self.shutting_down && !self.suspended.contains(&source.file_id) {
                self.spawn_job(source, index_type, 0, None);
            }
        }
        self.fill_slots();
    }

    fn fill_slots(&mut self) {
        while !self.shutting_down && self.jobs.len() < self.config.slots {
            let Some((source, index_type)) = self.pending.pop_front() else {
                break;
            };
            if self.suspended.contains(&source.file_id)
                || self.jobs.contains_key(&source.file_id)
            {
                continue;
            }
            self.spawn_job(source, index_type, 0, None);
        }
    }

    fn dump_jobs(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{} active, {} queued, {} suspended",
            self.jobs.len(),
            self.pending.len(),
            self.suspended.len()
        );
        for (file, job) in &self.jobs {
            let _ = writeln!(
                out,
                "  {}: job {} ({:?}), crashes {}, running {}s{}",
                file,
                job.job_id,
                job.index_type,
                job.crash_count,
                job.started.elapsed().as_secs(),
                if job.pending.is_some() { ", pending" } else { "" }
            );
        }
        out
    }

    /// Stop accepting requests, drain in-flight jobs within the grace
    /// period and discard whatever did not finish.
    async fn shutdown(&mut self) {
        self.shutting_down = true;
        self.pending.clear();
        let deadline = Instant::now() + self.config.shutdown_grace;
        while !self.jobs.is_empty() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!(jobs = self.jobs.len(), "grace period over, discarding unfinished jobs");
                break;
            }
            match tokio::time::timeout(remaining, self.rx.recv()).await {
                Ok(Some(Message::Finished {
                    file,
                    job_id,
                    outcome,
                })) => self.on_job_finished(file, job_id, outcome),
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(_) => {
                    warn!(jobs = self.jobs.len(), "grace period over, discarding unfinished jobs");
                    break;
                }
            }
        }
        self.jobs.clear();
    }
}

/// Cheap cloneable handle to the coordinator task.
#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::UnboundedSender<Message>,
}

impl CoordinatorHandle {
    /// Spawn the coordinator task. Must run inside a tokio runtime.
    pub fn spawn(
        config: CoordinatorConfig,
        parser: Arc<dyn SourceParser>,
        sync: SyncHandle,
    ) -> CoordinatorHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let coordinator = Coordinator {
            config,
            parser,
            sync,
            rx,
            tx: tx.clone(),
            pending: VecDeque::new(),
            jobs: HashMap::new(),
            suspended: BTreeSet::new(),
            next_job_id: 0,
            shutting_down: false,
        };
        tokio::spawn(coordinator.run());
        CoordinatorHandle { tx }
    }

    pub async fn index(&self, source: Source, index_type: IndexType) -> bool {
        let (reply, rx) = oneshot::channel();
        if self
            .tx
            .send(Message::Index {
                source,
                index_type,
                reply,
            })
            .is_err()
        {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    pub async fn toggle_suspend(&self, file: FileId) -> bool {
        self.request(|reply| Message::ToggleSuspend { file, reply })
            .await
            .unwrap_or(false)
    }

    pub async fn is_suspended(&self, file: FileId) -> bool {
        self.request(|reply| Message::IsSuspended { file, reply })
            .await
            .unwrap_or(false)
    }

    pub async fn suspended_files(&self) -> BTreeSet<FileId> {
        self.request(|reply| Message::SuspendedFiles { reply })
            .await
            .unwrap_or_default()
    }

    pub fn clear_suspended(&self) {
        let _ = self.tx.send(Message::ClearSuspended);
    }

    pub async fn is_indexing(&self) -> bool {
        self.request(|reply| Message::IsIndexing { reply })
            .await
            .unwrap_or(false)
    }

    pub async fn dump_jobs(&self) -> String {
        self.request(|reply| Message::DumpJobs { reply })
            .await
            .unwrap_or_default()
    }

    pub async fn shutdown(&self) {
        let _ = self.request(|reply| Message::Shutdown { reply }).await;
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Message) -> Option<T> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(build(reply)).ok()?;
        rx.await.ok()
    }
}
