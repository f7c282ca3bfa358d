//! Rendering query results as response lines

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use ridx_core::{Location, PathTable};

use crate::protocol::OutputFlags;

/// Format one location as `path:line:column[\tcontext]`. Returns `None`
/// for locations whose file id is unknown; the sole source of truth for
/// paths is the file id bijection.
pub fn format_location(
    loc: Location,
    paths: &PathTable,
    root: &Path,
    flags: OutputFlags,
) -> Option<String> {
    let path = paths.lookup(loc.file_id)?;
    if path.as_os_str().is_empty() {
        return None;
    }
    let shown = if flags.paths_relative_to_root {
        path.strip_prefix(root).unwrap_or(&path)
    } else {
        path.as_path()
    };
    let mut out = format!("{}:{}:{}", shown.display(), loc.line, loc.column);
    if !flags.no_context {
        if let Some(context) = read_context_line(&path, loc.line) {
            out.push('\t');
            out.push_str(&context);
        }
    }
    Some(out)
}

/// The source line a location points at, for context output. Missing or
/// unreadable files simply yield no context.
fn read_context_line(path: &Path, line: u32) -> Option<String> {
    if line == 0 {
        return None;
    }
    let file = File::open(path).ok()?;
    let reader = BufReader::new(file);
    reader
        .lines()
        .nth(line as usize - 1)?
        .ok()
        .map(|l| l.trim_end().to_string())
}

/// Assemble response lines into the final payload: optionally sorted,
/// separated by newlines or (on request) spaces.
pub fn render(mut lines: Vec<String>, flags: OutputFlags) -> String {
    if flags.sort_output {
        lines.sort();
    }
    if lines.is_empty() {
        return String::new();
    }
    if flags.separate_by_space {
        let mut out = lines.join(" ");
        out.push('\n');
        out
    } else {
        let mut out = lines.join("\n");
        out.push('\n');
        out
    }
}
