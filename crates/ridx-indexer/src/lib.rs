//! Ridx Indexer — parse job scheduling, result merging, project facade

pub mod coordinator;
pub mod events;
pub mod job;
pub mod process;
pub mod project;
pub mod sync;


pub use coordinator::{CoordinatorConfig, CoordinatorHandle};
pub use events::parse_event_stream;
pub use job::{IndexData, IndexType, JobError, SourceParser};
pub use process::ProcessParser;
pub use project::{Project, ProjectOptions};
pub use sync::{SyncConfig, SyncHandle};
