//! Driving the external parser as a child process

use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;

use ridx_core::{PathTable, Source};

use crate::events::parse_event_stream;
use crate::job::{IndexData, JobError, SourceParser};

/// Runs the external parser command once per translation unit and decodes
/// its stdout as a cursor event stream. The command is invoked as
/// `<command> <source-path> <args...>`.
pub struct ProcessParser {
    command: PathBuf,
    paths: Arc<PathTable>,
}

impl ProcessParser {
    pub fn new(command: impl Into<PathBuf>, paths: Arc<PathTable>) -> Self {
        ProcessParser {
            command: command.into(),
            paths,
        }
    }
}

impl SourceParser for ProcessParser {
    fn parse(&self, source: &Source) -> Result<IndexData, JobError> {
        let path = self
            .paths
            .lookup(source.file_id)
            .ok_or_else(|| JobError::Crashed(format!("unknown file id {}", source.file_id)))?;
        if !path.exists() {
            return Err(JobError::Unreadable(path));
        }

        let output = Command::new(&self.command)
            .arg(&path)
            .args(&source.args)
            .output()
            .map_err(|e| JobError::Crashed(format!("failed to spawn parser: {e}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(JobError::Crashed(format!(
                "parser exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_event_stream(&stdout, source, &self.paths)
    }
}
