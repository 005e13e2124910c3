// candor/src/state/store.rs
//
// Concurrent fraud-record store.
// DashMap = sharded concurrent HashMap; each record sits behind its own
// RwLock so writers to one interview never wait on another interview.
//
// Update discipline:
//   - the map shard guard is dropped before the record lock is taken
//   - updates run against a draft copy and are committed only on success,
//     so a failed update leaves the record exactly as it was

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::debug;

use crate::error::{AntifraudError, Result};
use crate::events::InterviewId;
use crate::state::record::FraudRecord;

pub type RecordHandle = Arc<RwLock<FraudRecord>>;

pub struct RecordStore {
    records: DashMap<InterviewId, RecordHandle>,

    // Global counters
    pub total_updates: AtomicU64,
    pub total_rejected: AtomicU64,
}

impl RecordStore {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            total_updates: AtomicU64::new(0),
            total_rejected: AtomicU64::new(0),
        }
    }

    /// Inserts a fresh record unless one exists. Returns the current record and
    /// whether it was created by this call.
    pub fn create(&self, interview_id: &str, now: DateTime<Utc>) -> (FraudRecord, bool) {
        let mut created = false;
        let handle = self
            .records
            .entry(interview_id.to_string())
            .or_insert_with(|| {
                created = true;
                Arc::new(RwLock::new(FraudRecord::new(interview_id, now)))
            })
            .clone();
        if created {
            debug!(interview_id, "fraud record created");
        }
        let snapshot = handle.read().clone();
        (snapshot, created)
    }

    pub fn handle(&self, interview_id: &str) -> Option<RecordHandle> {
        self.records.get(interview_id).map(|r| r.clone())
    }

    pub fn get(&self, interview_id: &str) -> Option<FraudRecord> {
        self.handle(interview_id).map(|h| h.read().clone())
    }

    pub fn contains(&self, interview_id: &str) -> bool {
        self.records.contains_key(interview_id)
    }

    /// Applies `f` to a draft of the record under its write lock and commits
    /// the draft only if `f` succeeds.
    pub fn update<T, F>(&self, interview_id: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut FraudRecord) -> Result<T>,
    {
        let handle = self
            .handle(interview_id)
            .ok_or_else(|| AntifraudError::not_found(interview_id))?;

        let mut guard = handle.write();
        let mut draft = guard.clone();
        match f(&mut draft) {
            Ok(out) => {
                *guard = draft;
                self.total_updates.fetch_add(1, Ordering::Relaxed);
                Ok(out)
            }
            Err(e) => {
                self.total_rejected.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    /// Removes a record as a unit.
    pub fn remove(&self, interview_id: &str) -> Option<FraudRecord> {
        self.records
            .remove(interview_id)
            .map(|(_, handle)| handle.read().clone())
    }

    /// Point-in-time copy of every record, each consistent on its own.
    pub fn snapshot_all(&self) -> Vec<FraudRecord> {
        let handles: Vec<RecordHandle> = self.records.iter().map(|e| e.value().clone()).collect();
        handles.iter().map(|h| h.read().clone()).collect()
    }

    /// Loads records from a checkpoint. Records already live in the store win.
    /// Returns the ids actually inserted.
    pub fn restore(&self, records: Vec<FraudRecord>) -> Vec<InterviewId> {
        let mut restored = Vec::new();
        for record in records {
            let id = record.interview_id.clone();
            if let Entry::Vacant(slot) = self.records.entry(id.clone()) {
                slot.insert(Arc::new(RwLock::new(record)));
                restored.push(id);
            }
        }
        restored
    }

    pub fn n_records(&self) -> usize {
        self.records.len()
    }
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new()
    }
}
