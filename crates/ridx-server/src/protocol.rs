//! Request syntax of the query channel
//!
//! One request per line: a mode token, optional `--` display flags, then
//! the argument (which may itself contain spaces):
//!
//! ```text
//! follow /t/a.cpp:1:29
//! references --no-context foo
//! find-symbols --sort-output Foo::bar(int, char)
//! ```

use std::str::FromStr;

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("empty request")]
    Empty,

    #[error("unknown mode `{0}`")]
    UnknownMode(String),

    #[error("unknown flag `{0}`")]
    UnknownFlag(String),
}

/// The fixed set of query modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
    Follow,
    References,
    AllReferences,
    FindSymbols,
    ListSymbols,
    Files,
    FindSuper,
    FindSubs,
}

impl FromStr for QueryMode {
    type Err = ProtocolError;

    fn from_str(token: &str) -> Result<QueryMode, ProtocolError> {
        Ok(match token {
            "follow" => QueryMode::Follow,
            "references" => QueryMode::References,
            "all-references" => QueryMode::AllReferences,
            "find-symbols" => QueryMode::FindSymbols,
            "list-symbols" => QueryMode::ListSymbols,
            "files" => QueryMode::Files,
            "find-super" => QueryMode::FindSuper,
            "find-subs" => QueryMode::FindSubs,
            other => return Err(ProtocolError::UnknownMode(other.to_string())),
        })
    }
}

/// Display flags carried by a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputFlags {
    pub paths_relative_to_root: bool,
    pub no_context: bool,
    pub separate_by_space: bool,
    pub sort_output: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub mode: QueryMode,
    pub flags: OutputFlags,
    pub arg: String,
}

impl Request {
    pub fn parse(line: &str) -> Result<Request, ProtocolError> {
        let line = line.trim();
        if line.is_empty() {
            return Err(ProtocolError::Empty);
        }
        let (mode_token, mut rest) = match line.split_once(char::is_whitespace) {
            Some((m, r)) => (m, r.trim_start()),
            None => (line, ""),
        };
        let mode = mode_token.parse()?;

        let mut flags = OutputFlags::default();
        while rest.starts_with("--") {
            let (flag, tail) = match rest.split_once(char::is_whitespace) {
                Some((f, t)) => (f, t.trim_start()),
                None => (rest, ""),
            };
            match flag {
                "--paths-relative-to-root" => flags.paths_relative_to_root = true,
                "--no-context" => flags.no_context = true,
                "--separate-by-space" => flags.separate_by_space = true,
                "--sort-output" => flags.sort_output = true,
                other => return Err(ProtocolError::UnknownFlag(other.to_string())),
            }
            rest = tail;
        }

        Ok(Request {
            mode,
            flags,
            arg: rest.trim_end().to_string(),
        })
    }
}
