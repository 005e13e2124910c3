// candor/src/state/snapshot.rs
//
// Checkpoint persistence for the record store.
//
// On a timer (and on shutdown) the store is written to a single JSON file so
// fraud records survive process restarts. On startup the file is restored
// through the service before any ingest command is accepted, so every
// restored record is range-checked and rescored under the running config.
//
// Writes go to `<path>.tmp` and are renamed over the target, so a crash
// mid-write never leaves a truncated checkpoint behind.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::engine::ingest::AntifraudService;
use crate::error::{AntifraudError, Result};
use crate::state::record::FraudRecord;

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
pub struct SnapshotFile {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub records: Vec<FraudRecord>,
}

pub struct Checkpointer {
    path: PathBuf,
    interval: Duration,
    service: Arc<AntifraudService>,
}

impl Checkpointer {
    pub fn new(path: impl Into<PathBuf>, interval: Duration, service: Arc<AntifraudService>) -> Self {
        Self { path: path.into(), interval, service }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Background loop — periodically persists the store.
    pub async fn checkpoint_loop(self: Arc<Self>) {
        loop {
            tokio::time::sleep(self.interval).await;
            if let Err(e) = self.save_checkpoint().await {
                error!("checkpoint failed: {}", e);
            }
        }
    }

    /// Writes every record. Returns how many were saved.
    pub async fn save_checkpoint(&self) -> Result<usize> {
        let snapshot = SnapshotFile {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            records: self.service.store().snapshot_all(),
        };
        let n = snapshot.records.len();
        let body = serde_json::to_vec(&snapshot)?;

        let tmp = self.path.with_extension("tmp");
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!(records = n, path = %self.path.display(), "checkpoint written");
        Ok(n)
    }

    /// Loads the checkpoint into the store. A missing file is a cold start.
    pub async fn restore(&self) -> Result<usize> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("no checkpoint at {}, starting empty", self.path.display());
                return Ok(0);
            }
            Err(e) => return Err(e.into()),
        };

        let snapshot: SnapshotFile = serde_json::from_slice(&raw)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(AntifraudError::Validation(format!(
                "checkpoint version {} is not supported (expected {})",
                snapshot.version, SNAPSHOT_VERSION
            )));
        }
        let n = self.service.restore(snapshot.records);
        info!(records = n, saved_at = %snapshot.saved_at, "checkpoint restored");
        Ok(n)
    }
}
