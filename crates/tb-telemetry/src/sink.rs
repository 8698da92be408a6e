//! Persistence sinks for the poll log

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Local};
use serde::Serialize;

use tb_core::{BackendKind, Role, TelemetryError};

use crate::record::PollEvent;

/// Receives the poll log once per session
pub trait PollSink: Send + Sync {
    /// Persist one ordered batch
    fn write(&self, events: &[PollEvent]) -> Result<(), TelemetryError>;
}

#[derive(Serialize)]
struct PollLog<'a> {
    data: &'a [PollEvent],
}

/// Writes the poll log as pretty-printed JSON to a single file
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    /// Write to exactly `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Write to `<data_dir>/<role>-<backend>_<started>.json`
    pub fn for_session(data_dir: &Path, role: Role, backend: BackendKind, started: DateTime<Local>) -> Self {
        Self::new(data_dir.join(session_file_name(role, backend, started)))
    }

    /// Target file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// File name of a session's poll log. Colons are replaced so the name is
/// valid on every filesystem.
pub fn session_file_name(role: Role, backend: BackendKind, started: DateTime<Local>) -> String {
    let stamp = started.format("%Y-%m-%dT%H:%M:%S").to_string().replace(':', "_");
    format!("{}-{}_{}.json", role.file_tag(), backend, stamp)
}

impl PollSink for JsonFileSink {
    fn write(&self, events: &[PollEvent]) -> Result<(), TelemetryError> {
        let json = serde_json::to_string_pretty(&PollLog { data: events })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| TelemetryError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(&self.path, json).map_err(|source| TelemetryError::Write {
            path: self.path.clone(),
            source,
        })?;

        tracing::info!("Wrote {} poll records to {}", events.len(), self.path.display());
        Ok(())
    }
}

/// Keeps every batch in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    batches: Mutex<Vec<Vec<PollEvent>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All batches written so far, oldest first
    pub fn batches(&self) -> Vec<Vec<PollEvent>> {
        self.batches
            .lock()
            .map(|b| b.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

impl PollSink for MemorySink {
    fn write(&self, events: &[PollEvent]) -> Result<(), TelemetryError> {
        let mut batches = self.batches.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        batches.push(events.to_vec());
        Ok(())
    }
}
