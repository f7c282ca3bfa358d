//! The query channel: request in, lines out
//!
//! Serves the same request shape over a local TCP socket (long-lived, one
//! response per line-delimited request, blank-line terminated) and over
//! stdin/stdout (single request, exit code semantics).

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use ridx_core::{Location, LIST_SYMBOLS_CAP};
use ridx_indexer::Project;

use crate::output::{format_location, render};
use crate::protocol::{QueryMode, Request};

/// Resolve one request against the project. Location-shaped arguments are
/// used directly; anything else resolves through `find_symbol` and the
/// query is broadcast over every hit.
pub async fn execute(project: &Project, request: &Request) -> Vec<String> {
    let arg = request.arg.as_str();
    let loc = project.parse_location(arg);

    let locations: Vec<Location> = match request.mode {
        QueryMode::Follow => {
            if loc.is_valid() {
                project.follow(loc).await.into_iter().collect()
            } else {
                let mut out = Vec::new();
                for hit in project.find_symbol(arg).await {
                    if let Some(followed) = project.follow(hit).await {
                        out.push(followed);
                    }
                }
                out
            }
        }
        QueryMode::References => {
            if loc.is_valid() {
                project.references(loc).await.into_iter().collect()
            } else {
                let mut out = BTreeSet::new();
                for hit in project.find_symbol(arg).await {
                    out.extend(project.references(hit).await);
                }
                out.into_iter().collect()
            }
        }
        QueryMode::AllReferences => {
            if loc.is_valid() {
                project.all_references(loc).await.into_iter().collect()
            } else {
                warn!(arg, "all-references needs a location argument");
                Vec::new()
            }
        }
        QueryMode::FindSymbols => project.find_symbol(arg).await.into_iter().collect(),
        QueryMode::ListSymbols => {
            return project.list_symbols(arg, LIST_SYMBOLS_CAP).await;
        }
        QueryMode::Files => {
            let root = project.root().to_path_buf();
            return project
                .files(arg)
                .await
                .into_iter()
                .map(|path| {
                    if request.flags.paths_relative_to_root {
                        path.strip_prefix(&root).unwrap_or(&path).display().to_string()
                    } else {
                        path.display().to_string()
                    }
                })
                .collect();
        }
        QueryMode::FindSuper => {
            if loc.is_valid() {
                project.find_super(loc).await.into_iter().collect()
            } else {
                let mut out = Vec::new();
                for hit in project.find_symbol(arg).await {
                    if let Some(base) = project.find_super(hit).await {
                        out.push(base);
                    }
                }
                out
            }
        }
        QueryMode::FindSubs => {
            if loc.is_valid() {
                project.find_subs(loc).await.into_iter().collect()
            } else {
                let mut out = BTreeSet::new();
                for hit in project.find_symbol(arg).await {
                    out.extend(project.find_subs(hit).await);
                }
                out.into_iter().collect()
            }
        }
    };

    locations
        .into_iter()
        .filter_map(|l| format_location(l, project.paths(), project.root(), request.flags))
        .collect()
}

/// Accept loop for the local socket. Each connection may issue any number
/// of requests; every response ends with one blank line.
pub async fn serve_tcp(project: Arc<Project>, addr: &str) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr, "query channel listening");
    loop {
        let (stream, peer) = listener.accept().await?;
        debug!(%peer, "query connection accepted");
        let project = Arc::clone(&project);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(project, stream).await {
                debug!(error = %e, "query connection closed");
            }
        });
    }
}

async fn handle_connection(project: Arc<Project>, stream: TcpStream) -> Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let payload = match Request::parse(&line) {
            Ok(request) => {
                let result_lines = execute(&project, &request).await;
                render(result_lines, request.flags)
            }
            Err(e) => format!("error: {e}\n"),
        };
        write_half.write_all(payload.as_bytes()).await?;
        write_half.write_all(b"\n").await?;
        write_half.flush().await?;
    }
    Ok(())
}

/// One-shot mode: read a single request from stdin, print the response to
/// stdout. Returns the channel wrapper's exit status: 0 for results
/// (possibly empty), 1 for a usage error.
pub async fn run_stdio(project: &Project) -> i32 {
    let mut line = String::new();
    let mut reader = BufReader::new(tokio::io::stdin());
    if reader.read_line(&mut line).await.is_err() {
        return 1;
    }
    match Request::parse(&line) {
        Ok(request) => {
            let result_lines = execute(project, &request).await;
            let payload = render(result_lines, request.flags);
            let mut stdout = tokio::io::stdout();
            let _ = stdout.write_all(payload.as_bytes()).await;
            let _ = stdout.flush().await;
            0
        }
        Err(e) => {
            eprintln!("ridx: {e}");
            1
        }
    }
}
