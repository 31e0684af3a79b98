//! Write-ahead log.
//!
//! Every mutation is appended to the WAL and fsynced before it is applied in
//! memory, so completed calls survive a crash. Entries are MessagePack
//! payloads framed as `[u32 length BE][u32 CRC32 BE][payload]`.
//!
//! Replay reads frames sequentially and stops cleanly at a truncated tail or
//! CRC mismatch: a torn final write is discarded, everything before it is
//! kept. An entry with a valid CRC that fails to decode is skipped with a
//! warning rather than aborting recovery.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use cairn_core::{AttrValue, Error, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// WAL file name inside the storage directory
pub const WAL_FILE: &str = "wal.bin";

/// A single mutation entry in the write-ahead log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WalEntry {
    /// Insert or overwrite a document (the effective post-merge record)
    Upsert {
        /// Document id
        id: String,
        /// Internal vector id
        vector_id: u64,
        /// Full embedding
        embedding: Vec<f32>,
        /// Declared attribute values
        attributes: BTreeMap<String, AttrValue>,
        /// Opaque payload
        payload: Option<serde_json::Value>,
        /// Timestamp of the operation (microseconds since epoch)
        timestamp: u64,
    },
    /// Delete a document
    Delete {
        /// Document id
        id: String,
        /// Internal vector id
        vector_id: u64,
        /// Timestamp of the operation (microseconds since epoch)
        timestamp: u64,
    },
    /// Drop every document, keeping the configuration
    Clear {
        /// Timestamp of the operation (microseconds since epoch)
        timestamp: u64,
    },
}

impl WalEntry {
    /// Serialize to bytes (MessagePack)
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        rmp_serde::to_vec(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize from bytes (MessagePack)
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        rmp_serde::from_slice(data).map_err(|e| Error::Serialization(e.to_string()))
    }
}

/// Diagnostic statistics from a WAL replay
#[derive(Debug, Default)]
pub struct WalReplayStats {
    /// Entries successfully decoded and returned
    pub applied: usize,
    /// Entries skipped (valid CRC, undecodable payload)
    pub skipped: usize,
    /// Whether replay was ended by a truncated or corrupt tail
    pub truncated: bool,
}

/// Append-only write-ahead log with CRC32 integrity framing.
///
/// Thread-safe via `parking_lot::Mutex`; each append serializes, writes,
/// flushes, and fsyncs before returning.
pub struct WalWriter {
    writer: Mutex<BufWriter<File>>,
    path: PathBuf,
}

impl WalWriter {
    /// Open or create the WAL file in append mode
    pub fn open(dir: &Path) -> Result<Self> {
        let path = dir.join(WAL_FILE);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(WalWriter {
            writer: Mutex::new(BufWriter::new(file)),
            path,
        })
    }

    /// Append an entry durably.
    ///
    /// The entry is on disk (fsynced) when this returns `Ok`.
    pub fn append(&self, entry: &WalEntry) -> Result<()> {
        let payload = entry.to_bytes()?;
        let mut framed = Vec::with_capacity(payload.len() + 8);
        framed.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        framed.extend_from_slice(&crc32fast::hash(&payload).to_be_bytes());
        framed.extend_from_slice(&payload);

        let mut writer = self.writer.lock();
        writer.write_all(&framed)?;
        writer.flush()?;
        writer.get_mut().sync_all()?;
        Ok(())
    }

    /// Discard all entries (after a successful checkpoint)
    pub fn truncate(&self) -> Result<()> {
        let mut writer = self.writer.lock();
        writer.flush()?;
        let file = writer.get_mut();
        file.set_len(0)?;
        file.sync_all()?;
        Ok(())
    }
}

/// Read all entries from a WAL file, verifying CRC32 checksums.
///
/// Returns the decoded entries plus replay statistics. A missing file is an
/// empty log.
pub fn read_entries(dir: &Path) -> Result<(Vec<WalEntry>, WalReplayStats)> {
    let path = dir.join(WAL_FILE);
    let mut stats = WalReplayStats::default();

    let mut file = match File::open(&path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok((Vec::new(), stats));
        }
        Err(e) => return Err(e.into()),
    };

    let mut data = Vec::new();
    file.read_to_end(&mut data)?;

    let mut entries = Vec::new();
    let mut pos = 0usize;

    while pos + 8 <= data.len() {
        let len = u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]])
            as usize;
        let expected_crc =
            u32::from_be_bytes([data[pos + 4], data[pos + 5], data[pos + 6], data[pos + 7]]);

        if pos + 8 + len > data.len() {
            // Torn final write; everything before it is intact
            tracing::warn!(
                target: "cairn::wal",
                offset = pos,
                "truncated WAL tail, discarding partial entry"
            );
            stats.truncated = true;
            break;
        }

        let payload = &data[pos + 8..pos + 8 + len];
        if crc32fast::hash(payload) != expected_crc {
            tracing::warn!(
                target: "cairn::wal",
                offset = pos,
                "WAL CRC mismatch, stopping replay at corrupt entry"
            );
            stats.truncated = true;
            break;
        }

        match WalEntry::from_bytes(payload) {
            Ok(entry) => {
                entries.push(entry);
                stats.applied += 1;
            }
            Err(e) => {
                tracing::warn!(
                    target: "cairn::wal",
                    offset = pos,
                    error = %e,
                    "undecodable WAL entry with valid CRC, skipping"
                );
                stats.skipped += 1;
            }
        }

        pos += 8 + len;
    }

    Ok((entries, stats))
}

/// Current time in microseconds since the Unix epoch.
///
/// Returns 0 if the system clock is before the epoch.
pub fn now_micros() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}
