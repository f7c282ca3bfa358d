//! Daemon wiring: project, watcher and query channel

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;

use ridx_core::{canonical_path, Environment, FileId, PathTable};
use ridx_indexer::{ProcessParser, Project, ProjectOptions};
use ridx_server::serve_tcp;
use ridx_watcher::{FileWatcher, WatchEvent};

/// Run the indexing daemon: restore the project, re-index what changed
/// while we were down, watch the tree and serve queries until ctrl-c.
pub async fn daemon(
    path: PathBuf,
    host: String,
    port: u16,
    parser_cmd: PathBuf,
) -> anyhow::Result<()> {
    let mut project = open_project(&path, parser_cmd)?;
    let watch_additions = project
        .take_watch_events()
        .expect("watch events taken once");
    let project = Arc::new(project);

    let stale = project.reindex_modified().await;
    if stale > 0 {
        tracing::info!(units = stale, "re-indexing files modified while down");
    }

    let mut watcher = FileWatcher::new()?;
    watcher.watch_directory(project.root())?;
    // Dependencies outside the tree (system headers the project patched,
    // generated files) are watched individually.
    for (_, file_path) in project.paths().entries() {
        if !file_path.as_os_str().is_empty() && !file_path.starts_with(project.root()) {
            let _ = watcher.watch_file(&file_path);
        }
    }
    let events = watcher.take_event_receiver();
    tokio::spawn(watch_loop(
        Arc::clone(&project),
        watcher,
        events,
        watch_additions,
    ));

    let addr = format!("{}:{}", host, port);
    tokio::select! {
        result = serve_tcp(Arc::clone(&project), &addr) => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
            project.shutdown().await;
        }
    }
    Ok(())
}

/// Translate filesystem events into dirty scheduling and keep the watch
/// set growing as the sync engine discovers new dependencies.
async fn watch_loop(
    project: Arc<Project>,
    mut watcher: FileWatcher,
    mut events: mpsc::UnboundedReceiver<WatchEvent>,
    mut additions: mpsc::UnboundedReceiver<FileId>,
) {
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    WatchEvent::Created(path) | WatchEvent::Modified(path) => {
                        let scheduled = project.dirty(&path).await;
                        if scheduled > 0 {
                            tracing::debug!(path = %path.display(), scheduled, "dirty files scheduled");
                        }
                    }
                    WatchEvent::Removed(path) => {
                        let _ = watcher.unwatch(&path);
                        let removed = project
                            .remove_files(&path.to_string_lossy())
                            .await;
                        if removed > 0 {
                            tracing::info!(path = %path.display(), "removed from index");
                        }
                    }
                }
            }
            file = additions.recv() => {
                let Some(file) = file else { break };
                if let Some(path) = project.paths().lookup(file) {
                    if !path.as_os_str().is_empty() && !path.starts_with(project.root()) {
                        let _ = watcher.watch_file(&path);
                    }
                }
            }
        }
    }
}

/// One-shot query mode: a single request on stdin, results on stdout.
pub async fn query_stdio(path: PathBuf, parser_cmd: PathBuf) -> anyhow::Result<i32> {
    let project = open_project(&path, parser_cmd)?;
    Ok(ridx_server::run_stdio(&project).await)
}

fn open_project(path: &Path, parser_cmd: PathBuf) -> anyhow::Result<Project> {
    let env = Environment::from_process()?;
    let root = canonical_path(path)?;
    let paths = Arc::new(PathTable::new());
    let parser = Arc::new(ProcessParser::new(parser_cmd, Arc::clone(&paths)));
    let project = Project::open(root, &env, paths, parser, ProjectOptions::default())?;
    Ok(project)
}
