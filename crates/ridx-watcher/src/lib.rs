//! Ridx Watcher — filesystem change events for the dirty set

pub mod watcher;

pub use watcher::{is_source_file, FileWatcher, WatchEvent};
