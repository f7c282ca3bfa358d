//! Decoding the parser's cursor event stream
//!
//! The external parser reports one event per line:
//!
//! ```text
//! cursor <kind> <path>:<line>:<col> <start>-<end> <usr> <name...>
//! target <path>:<line>:<col>
//! ref <path>:<line>:<col>
//! base <usr>
//! enclosing <path>:<line>:<col>
//! dep <path>
//! visited <path>
//! fixit <path> <start> <end> <text...>
//! ```
//!
//! `target`, `ref`, `base` and `enclosing` attach to the most recent
//! `cursor`. A `-` stands for an absent usr or name. Paths are the
//! parser's canonical absolute paths and are interned as-is. Unknown
//! event verbs and unknown cursor kinds fail the whole unit.

use std::collections::BTreeSet;
use std::path::Path;

use ridx_core::{CursorInfo, CursorKind, FixIt, Location, PathTable, Source};

use crate::job::{IndexData, JobError};

fn bad(lineno: usize, msg: &str) -> JobError {
    JobError::Crashed(format!("event stream line {}: {}", lineno + 1, msg))
}

fn parse_location(token: &str, paths: &PathTable) -> Option<Location> {
    let (rest, column) = token.rsplit_once(':')?;
    let (path, line) = rest.rsplit_once(':')?;
    let line: u32 = line.parse().ok()?;
    let column: u32 = column.parse().ok()?;
    if path.is_empty() || line == 0 || column == 0 {
        return None;
    }
    Some(Location::new(paths.intern(Path::new(path)), line, column))
}

/// Build an `IndexData` bundle from the parser's textual event stream.
pub fn parse_event_stream(
    input: &str,
    source: &Source,
    paths: &PathTable,
) -> Result<IndexData, JobError> {
    let mut data = IndexData::new(source.file_id);
    let mut current: Option<Location> = None;

    for (lineno, raw) in input.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((v, r)) => (v, r.trim()),
            None => (line, ""),
        };
        match verb {
            "cursor" => {
                let mut fields = rest.splitn(5, char::is_whitespace);
                let kind_token = fields.next().ok_or_else(|| bad(lineno, "missing kind"))?;
                let loc_token = fields.next().ok_or_else(|| bad(lineno, "missing location"))?;
                let range_token = fields.next().ok_or_else(|| bad(lineno, "missing extent"))?;
                let usr_token = fields.next().ok_or_else(|| bad(lineno, "missing usr"))?;
                let name = fields.next().unwrap_or("").trim();

                let kind = CursorKind::parse(kind_token)
                    .map_err(|e| bad(lineno, &e.to_string()))?;
                let loc = parse_location(loc_token, paths)
                    .ok_or_else(|| bad(lineno, "bad location"))?;
                let (start, end) = range_token
                    .split_once('-')
                    .and_then(|(s, e)| Some((s.parse::<u32>().ok()?, e.parse::<u32>().ok()?)))
                    .ok_or_else(|| bad(lineno, "bad extent"))?;

                let mut info = CursorInfo::new(kind);
                info.start = start;
                info.end = end;
                if usr_token != "-" {
                    info.usr = usr_token.to_string();
                }
                if !name.is_empty() && name != "-" {
                    info.symbol_name = name.to_string();
                }
                data.visited.insert(loc.file_id);
                data.symbols.insert(loc, info);
                current = Some(loc);
            }
            "target" | "ref" | "enclosing" => {
                let owner = current.ok_or_else(|| bad(lineno, "no current cursor"))?;
                let loc = parse_location(rest, paths)
                    .ok_or_else(|| bad(lineno, "bad location"))?;
                let info = data
                    .symbols
                    .get_mut(&owner)
                    .ok_or_else(|| bad(lineno, "no current cursor"))?;
                match verb {
                    "target" => {
                        info.targets.insert(loc);
                    }
                    "ref" => {
                        info.references.insert(loc);
                    }
                    _ => info.enclosing_class = Some(loc),
                }
            }
            "base" => {
                let owner = current.ok_or_else(|| bad(lineno, "no current cursor"))?;
                if rest.is_empty() {
                    return Err(bad(lineno, "missing usr"));
                }
                if let Some(info) = data.symbols.get_mut(&owner) {
                    info.base_classes.insert(rest.to_string());
                }
            }
            "dep" => {
                if rest.is_empty() {
                    return Err(bad(lineno, "missing path"));
                }
                data.dependencies.insert(paths.intern(Path::new(rest)));
            }
            "visited" => {
                if rest.is_empty() {
                    return Err(bad(lineno, "missing path"));
                }
                data.visited.insert(paths.intern(Path::new(rest)));
            }
            "fixit" => {
                let mut fields = rest.splitn(4, char::is_whitespace);
                let path = fields.next().ok_or_else(|| bad(lineno, "missing path"))?;
                let start: u32 = fields
                    .next()
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(|| bad(lineno, "bad start offset"))?;
                let end: u32 = fields
                    .next()
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(|| bad(lineno, "bad end offset"))?;
                let text = fields.next().unwrap_or("").to_string();
                let file = paths.intern(Path::new(path));
                data.fixits
                    .entry(file)
                    .or_insert_with(BTreeSet::new)
                    .insert(FixIt { start, end, text });
            }
            other => return Err(bad(lineno, &format!("unknown event `{other}`"))),
        }
    }

    Ok(data)
}
