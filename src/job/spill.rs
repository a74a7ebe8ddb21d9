//! Job payload spilling (spec §4.2, §9 "spillable job"): a job's bytes
//! may be written to a temp file and reloaded just before running, to
//! reduce resident memory for a deep backlog. Mirrors the legacy
//! `job::save`/`job::load`/`job::destroy` trio, keyed by priority and a
//! random id.

use std::fs;
use std::path::PathBuf;
use uuid::Uuid;

/// A loaded-or-spilled job payload. `load` consumes `self` and returns
/// the bytes, cleaning up any backing file.
pub trait SpillPolicy: Send {
    fn load(self: Box<Self>) -> Vec<u8>;
}

/// No-op policy: bytes stay resident.
pub struct InMemory {
    data: Vec<u8>,
}

impl InMemory {
    pub fn new(data: Vec<u8>) -> Self {
        InMemory { data }
    }
}

impl SpillPolicy for InMemory {
    fn load(self: Box<Self>) -> Vec<u8> {
        self.data
    }
}

/// Writes the payload under `std::env::temp_dir()/messaging-core-spill/
/// <priority>/<uuid>`, named by a fresh v4 UUID, and removes the file
/// once loaded.
pub struct TempDirSpill {
    path: PathBuf,
}

impl TempDirSpill {
    /// Spills `data` to a fresh temp file under a priority-scoped
    /// directory, returning a handle that reloads (and deletes) it.
    pub fn save(priority_label: &str, data: Vec<u8>) -> std::io::Result<TempDirSpill> {
        let dir = std::env::temp_dir()
            .join("messaging-core-spill")
            .join(priority_label);
        fs::create_dir_all(&dir)?;
        let path = dir.join(Uuid::new_v4().to_string());
        fs::write(&path, &data)?;
        Ok(TempDirSpill { path })
    }
}

impl SpillPolicy for TempDirSpill {
    fn load(self: Box<Self>) -> Vec<u8> {
        let data = fs::read(&self.path).unwrap_or_default();
        let _ = fs::remove_file(&self.path);
        data
    }
}
