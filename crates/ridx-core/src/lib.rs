//! Ridx Core — data model, symbol store, persistence and query engine

pub mod backend;
pub mod cursor;
pub mod depgraph;
pub mod error;
pub mod location;
pub mod persist;
pub mod query;
pub mod source;
pub mod store;

#[cfg(test)]
mod tests;

pub use backend::{
    find_project_dir, BackendKind, Blob, Environment, FileBackend, ProjectMeta, StorageBackend,
    INDEX_KEY, META_KEY, PROJECT_DIR_NAME,
};
pub use cursor::{CursorInfo, CursorKind, FixIt, FixItMap};
pub use depgraph::{DependencyGraph, DependencyMode};
pub use error::{IndexError, Result};
pub use location::{
    canonical_path, parse_user_location, FileId, Location, PathTable, ENCODED_LOCATION_LEN,
};
pub use persist::IndexSnapshot;
pub use query::{QueryEngine, SortFlags, LIST_SYMBOLS_CAP};
pub use source::{Language, Source};
pub use store::{FileInfo, Pattern, SymbolStore};
