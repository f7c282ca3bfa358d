//! Storage backends and the process environment

use std::fs::File;
use std::io::Write;
use std::ops::Deref;
use std::path::{Path, PathBuf};

use memmap2::{Mmap, MmapOptions};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::Result;

/// Name of the per-project data directory, searched for by walking upward.
pub const PROJECT_DIR_NAME: &str = ".rtags.db";
/// Blob file inside the project directory.
pub const INDEX_KEY: &str = "index.db";
/// Metadata file inside the project directory.
pub const META_KEY: &str = "project.meta";

/// Bytes handed back by a backend read. File-backed reads stay
/// memory-mapped; other backends hand over owned buffers.
pub enum Blob {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl Deref for Blob {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Blob::Mapped(map) => map,
            Blob::Owned(vec) => vec,
        }
    }
}

/// Minimal storage capability the engine needs from a backend.
pub trait StorageBackend: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<Blob>>;
    fn write(&self, key: &str, bytes: &[u8]) -> Result<()>;
    fn sync(&self) -> Result<()>;
}

/// The default backend: one file per key inside the project directory,
/// written atomically via a temp file renamed over the target.
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(FileBackend { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl StorageBackend for FileBackend {
    fn read(&self, key: &str) -> Result<Option<Blob>> {
        let path = self.dir.join(key);
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match unsafe { MmapOptions::new().map(&file) } {
            Ok(map) => Ok(Some(Blob::Mapped(map))),
            // Platforms or filesystems without mmap fall back to a copy.
            Err(e) => {
                tracing::debug!(error = %e, "mmap unavailable, reading blob");
                Ok(Some(Blob::Owned(std::fs::read(&path)?)))
            }
        }
    }

    fn write(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(bytes)?;
        tmp.flush()?;
        tmp.persist(self.dir.join(key))
            .map_err(|e| std::io::Error::from(e.error))?;
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }
}

/// Which built-in backend to construct. `RTAGS_DB_TYPE` is honored for
/// forward compatibility; every current value maps to the file backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    #[default]
    File,
}

impl BackendKind {
    pub fn from_env_value(value: Option<&str>) -> BackendKind {
        match value {
            None | Some("") | Some("filedb") | Some("file") => BackendKind::File,
            Some(other) => {
                tracing::warn!(db_type = other, "unknown RTAGS_DB_TYPE, using file backend");
                BackendKind::File
            }
        }
    }

    pub fn open(self, dir: &Path) -> Result<Box<dyn StorageBackend>> {
        match self {
            BackendKind::File => Ok(Box::new(FileBackend::new(dir)?)),
        }
    }
}

/// Everything the engine takes from the process environment, captured once
/// at construction so no component reads globals.
#[derive(Debug, Clone)]
pub struct Environment {
    pub cwd: PathBuf,
    pub backend: BackendKind,
}

impl Environment {
    pub fn from_process() -> Result<Environment> {
        let cwd = std::env::current_dir()?;
        let db_type = std::env::var("RTAGS_DB_TYPE").ok();
        Ok(Environment {
            cwd,
            backend: BackendKind::from_env_value(db_type.as_deref()),
        })
    }

    pub fn with_cwd(cwd: impl Into<PathBuf>) -> Environment {
        Environment {
            cwd: cwd.into(),
            backend: BackendKind::File,
        }
    }
}

/// Small sidecar naming the project root and its compilation database.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectMeta {
    pub root: PathBuf,
    pub compilation_database: Option<PathBuf>,
}

impl ProjectMeta {
    pub fn load(backend: &dyn StorageBackend) -> Result<Option<ProjectMeta>> {
        match backend.read(META_KEY)? {
            Some(blob) => Ok(Some(serde_json::from_slice(&blob)?)),
            None => Ok(None),
        }
    }

    pub fn store(&self, backend: &dyn StorageBackend) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(self)?;
        backend.write(META_KEY, &bytes)
    }
}

/// Walk upward from `start` looking for an existing project directory.
pub fn find_project_dir(start: &Path) -> Option<PathBuf> {
    let mut current = Some(start);
    while let Some(dir) = current {
        let candidate = dir.join(PROJECT_DIR_NAME);
        if candidate.is_dir() {
            return Some(candidate);
        }
        current = dir.parent();
    }
    None
}
