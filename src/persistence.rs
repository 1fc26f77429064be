// ============================================================================
// SNAPSHOT PERSISTENCE
// ============================================================================
// The whole store as one JSON document:
//
//   {"cpu": [{"timestamp": 1700000000000, "value": 12.5}, ...],
//    "ram": [...], "disk": [...], "diskGrowth": 0.4}
//
// No version field. A document that does not parse is treated as absent.
// ============================================================================

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{StorageError, StorageResult};
use crate::store::MetricStore;
use crate::types::{MetricKind, Sample, Timestamp};

// ----------------------------------------------------------------------------
// Snapshot Record
// ----------------------------------------------------------------------------

/// Serialized form of a `MetricStore`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub cpu: Vec<Sample>,
    pub ram: Vec<Sample>,
    pub disk: Vec<Sample>,
    #[serde(rename = "diskGrowth")]
    pub disk_growth: f64,
}

impl StoreSnapshot {
    pub fn capture(store: &MetricStore) -> Self {
        Self {
            cpu: store.series(MetricKind::Cpu).to_vec(),
            ram: store.series(MetricKind::Ram).to_vec(),
            disk: store.series(MetricKind::Disk).to_vec(),
            disk_growth: store.disk_growth_rate(),
        }
    }

    /// Rebuild a store, dropping samples outside the window ending at `now`
    pub fn into_store(self, retention: Duration, now: Timestamp) -> MetricStore {
        MetricStore::restore(
            retention,
            self.cpu.into_iter().collect(),
            self.ram.into_iter().collect(),
            self.disk.into_iter().collect(),
            self.disk_growth,
            now,
        )
    }

    pub fn sample_count(&self) -> usize {
        self.cpu.len() + self.ram.len() + self.disk.len()
    }
}

// ----------------------------------------------------------------------------
// Snapshot File
// ----------------------------------------------------------------------------

/// Owner of the snapshot file on disk.
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Write the snapshot, replacing any previous one.
    ///
    /// The document is written to a sibling temp file and renamed into place.
    pub fn save(&self, snapshot: &StoreSnapshot) -> StorageResult<()> {
        let bytes = serde_json::to_vec(snapshot).map_err(|e| StorageError::SerializationFailed {
            message: e.to_string(),
        })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| StorageError::WriteFailed {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let temp = self.temp_path();
        fs::write(&temp, &bytes).map_err(|source| StorageError::WriteFailed {
            path: temp.clone(),
            source,
        })?;
        fs::rename(&temp, &self.path).map_err(|source| StorageError::WriteFailed {
            path: self.path.clone(),
            source,
        })?;

        debug!(
            target: "pulse::persistence",
            path = %self.path.display(),
            bytes = bytes.len(),
            samples = snapshot.sample_count(),
            "snapshot saved"
        );
        Ok(())
    }

    /// Read and decode the snapshot. `Ok(None)` when the file does not exist.
    pub fn read(&self) -> StorageResult<Option<StoreSnapshot>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StorageError::ReadFailed {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StorageError::DeserializationFailed { message: e.to_string() })
    }

    /// Restore a store purged against `now`; any failure yields `None`.
    pub fn load(&self, retention: Duration, now: Timestamp) -> Option<MetricStore> {
        match self.read() {
            Ok(Some(snapshot)) => {
                let store = snapshot.into_store(retention, now);
                info!(
                    target: "pulse::persistence",
                    path = %self.path.display(),
                    cpu = store.len(MetricKind::Cpu),
                    ram = store.len(MetricKind::Ram),
                    disk = store.len(MetricKind::Disk),
                    "restored snapshot"
                );
                Some(store)
            }
            Ok(None) => {
                debug!(target: "pulse::persistence", path = %self.path.display(), "no snapshot found");
                None
            }
            Err(e) => {
                warn!(
                    target: "pulse::persistence",
                    path = %self.path.display(),
                    error = %e,
                    "ignoring unreadable snapshot"
                );
                None
            }
        }
    }
}
