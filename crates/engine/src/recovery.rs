//! Open-time recovery.
//!
//! Opening a storage directory runs this sequence:
//!
//! 1. Acquire the exclusive advisory lock (`engine.lock`); fail fast if
//!    another engine instance holds the directory.
//! 2. Create the manifest on first open, or validate the supplied config
//!    against the persisted one (schema extension is the only allowed
//!    change).
//! 3. Load the snapshot, if any, then replay the WAL on top of it.
//! 4. Hand the merged record table back to the engine, which rebuilds the
//!    heap, attribute columns, and proximity graph from it.
//!
//! Recovery never writes to the WAL; it only reads.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::path::Path;

use cairn_core::{EngineConfig, Error, Result, VectorId};
use fs2::FileExt;
use tracing::{info, warn};

use crate::docs::DocumentRecord;
use crate::snapshot::{self, Manifest};
use crate::wal::{self, WalEntry};

/// Lock file name inside the storage directory
pub const LOCK_FILE: &str = "engine.lock";

/// Statistics from an engine open
#[derive(Debug, Default, Clone)]
pub struct RecoveryStats {
    /// Records loaded from the snapshot
    pub snapshot_records: usize,
    /// WAL entries applied on top of the snapshot
    pub wal_entries_applied: usize,
    /// Whether a torn or corrupt WAL tail was discarded
    pub wal_tail_discarded: bool,
}

/// Recovered engine state, ready for in-memory structure rebuild
pub struct RecoveredState {
    /// Effective configuration (persisted, possibly schema-extended)
    pub config: EngineConfig,
    /// Merged record table: snapshot plus WAL replay
    pub records: BTreeMap<String, DocumentRecord>,
    /// Restored vector id counter lower bound
    pub next_vector_id: u64,
    /// What recovery observed
    pub stats: RecoveryStats,
}

/// Acquire the exclusive lock on a storage directory.
///
/// The returned file must be kept alive for the lifetime of the engine; the
/// advisory lock is released when it is dropped.
pub fn acquire_lock(dir: &Path) -> Result<File> {
    let path = dir.join(LOCK_FILE);
    let lock_file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(&path)?;
    lock_file
        .try_lock_exclusive()
        .map_err(|_| Error::StorageLocked {
            path: dir.to_path_buf(),
        })?;
    Ok(lock_file)
}

/// Run the recovery sequence for a storage directory.
///
/// Does not acquire the lock; callers hold it already.
pub fn recover(dir: &Path, supplied: &EngineConfig) -> Result<RecoveredState> {
    supplied.validate()?;
    fs::create_dir_all(dir)?;

    // Manifest: create on first open, validate on reopen
    let config = match snapshot::read_manifest(dir)? {
        None => {
            snapshot::write_manifest(dir, supplied)?;
            supplied.clone()
        }
        Some(Manifest { config: persisted, .. }) => {
            supplied.check_reopen(&persisted)?;
            if supplied.columns.len() > persisted.columns.len() {
                // Schema extension: persist the widened column list
                snapshot::write_manifest(dir, supplied)?;
            }
            supplied.clone()
        }
    };

    let mut stats = RecoveryStats::default();

    // Snapshot first, then WAL on top
    let mut records: BTreeMap<String, DocumentRecord> = BTreeMap::new();
    let mut next_vector_id: u64 = 1;

    if let Some(body) = snapshot::read_snapshot(dir)? {
        stats.snapshot_records = body.records.len();
        next_vector_id = next_vector_id.max(body.next_vector_id);
        for (id, record) in body.records {
            if record.embedding.len() != config.dimension {
                warn!(
                    target: "cairn::recovery",
                    id = %id,
                    "snapshot record has wrong dimension, skipping"
                );
                continue;
            }
            next_vector_id = next_vector_id.max(record.vector_id.as_u64() + 1);
            records.insert(id, record);
        }
    }

    let (entries, wal_stats) = wal::read_entries(dir)?;
    stats.wal_entries_applied = wal_stats.applied;
    stats.wal_tail_discarded = wal_stats.truncated;

    for entry in entries {
        match entry {
            WalEntry::Upsert {
                id,
                vector_id,
                embedding,
                attributes,
                payload,
                timestamp,
            } => {
                next_vector_id = next_vector_id.max(vector_id + 1);
                let created_at = records
                    .get(&id)
                    .map(|existing| existing.created_at)
                    .unwrap_or(timestamp);
                records.insert(
                    id,
                    DocumentRecord {
                        vector_id: VectorId::new(vector_id),
                        embedding,
                        attributes,
                        payload,
                        created_at,
                        updated_at: timestamp,
                    },
                );
            }
            WalEntry::Delete { id, .. } => {
                records.remove(&id);
            }
            WalEntry::Clear { .. } => {
                records.clear();
            }
        }
    }

    info!(
        target: "cairn::recovery",
        records = records.len(),
        snapshot_records = stats.snapshot_records,
        wal_entries = stats.wal_entries_applied,
        "storage recovered"
    );

    Ok(RecoveredState {
        config,
        records,
        next_vector_id,
        stats,
    })
}
