//! Snapshot and manifest persistence.
//!
//! The manifest (`manifest.json`) makes a storage directory self-describing:
//! it records the collection configuration and is validated against the
//! caller-supplied config on every reopen.
//!
//! The snapshot (`snapshot.bin`) is the checkpointed document table,
//! serialized with bincode and protected by a magic + CRC32 footer. Writes
//! go through a temp file and an atomic rename so a crash mid-checkpoint
//! leaves the previous snapshot intact.

use std::fs;
use std::path::Path;

use cairn_core::{EngineConfig, Error, Result};
use serde::{Deserialize, Serialize};

use crate::docs::DocumentRecord;

/// Manifest file name inside the storage directory
pub const MANIFEST_FILE: &str = "manifest.json";
/// Snapshot file name inside the storage directory
pub const SNAPSHOT_FILE: &str = "snapshot.bin";

/// Magic bytes preceding the CRC32 snapshot footer
const SNAPSHOT_CRC_MAGIC: &[u8; 4] = b"CRN1";

/// Current manifest format version
pub const MANIFEST_VERSION: u32 = 1;

/// Storage directory manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// On-disk format version
    pub format_version: u32,
    /// Collection configuration at last open
    pub config: EngineConfig,
}

/// Checkpointed engine state
#[derive(Debug, Serialize, Deserialize)]
pub struct SnapshotBody {
    /// Vector id counter; restored so ids are never reused after reload
    pub next_vector_id: u64,
    /// All document records, keyed by document id
    pub records: Vec<(String, DocumentRecord)>,
}

/// Write the manifest atomically (temp file + rename)
pub fn write_manifest(dir: &Path, config: &EngineConfig) -> Result<()> {
    let manifest = Manifest {
        format_version: MANIFEST_VERSION,
        config: config.clone(),
    };
    let bytes = serde_json::to_vec_pretty(&manifest)
        .map_err(|e| Error::Serialization(e.to_string()))?;

    let path = dir.join(MANIFEST_FILE);
    let tmp_path = dir.join(format!("{MANIFEST_FILE}.tmp"));
    fs::write(&tmp_path, &bytes)?;
    fs::rename(&tmp_path, &path)?;
    Ok(())
}

/// Read the manifest; `None` if the directory was never initialized
pub fn read_manifest(dir: &Path) -> Result<Option<Manifest>> {
    let path = dir.join(MANIFEST_FILE);
    let bytes = match fs::read(&path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let manifest: Manifest = serde_json::from_slice(&bytes)
        .map_err(|e| Error::Corruption(format!("undecodable manifest: {e}")))?;
    if manifest.format_version != MANIFEST_VERSION {
        return Err(Error::Corruption(format!(
            "unsupported manifest format version {}",
            manifest.format_version
        )));
    }
    Ok(Some(manifest))
}

/// Write a snapshot atomically with a CRC32 footer.
///
/// Layout: `[bincode body][magic "CRN1"][u32 CRC32 BE]`.
pub fn write_snapshot(dir: &Path, body: &SnapshotBody) -> Result<()> {
    let bytes = bincode::serialize(body).map_err(|e| Error::Serialization(e.to_string()))?;
    let crc = crc32fast::hash(&bytes);

    let mut output = Vec::with_capacity(bytes.len() + 8);
    output.extend_from_slice(&bytes);
    output.extend_from_slice(SNAPSHOT_CRC_MAGIC);
    output.extend_from_slice(&crc.to_be_bytes());

    let path = dir.join(SNAPSHOT_FILE);
    let tmp_path = dir.join(format!("{SNAPSHOT_FILE}.tmp"));
    fs::write(&tmp_path, &output)?;
    fs::rename(&tmp_path, &path)?;

    tracing::debug!(
        target: "cairn::snapshot",
        records = body.records.len(),
        bytes = bytes.len(),
        "snapshot written"
    );
    Ok(())
}

/// Load a snapshot, verifying the CRC32 footer.
///
/// `None` if no snapshot has been checkpointed yet; `Corruption` if the
/// footer is missing, the CRC disagrees, or the body fails to decode.
pub fn read_snapshot(dir: &Path) -> Result<Option<SnapshotBody>> {
    let path = dir.join(SNAPSHOT_FILE);
    let raw = match fs::read(&path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    if raw.len() < 8 || &raw[raw.len() - 8..raw.len() - 4] != SNAPSHOT_CRC_MAGIC {
        return Err(Error::Corruption(format!(
            "snapshot missing CRC footer: {path:?}"
        )));
    }

    let payload = &raw[..raw.len() - 8];
    let stored_crc = u32::from_be_bytes([
        raw[raw.len() - 4],
        raw[raw.len() - 3],
        raw[raw.len() - 2],
        raw[raw.len() - 1],
    ]);
    let computed_crc = crc32fast::hash(payload);
    if computed_crc != stored_crc {
        return Err(Error::Corruption(format!(
            "snapshot CRC32 mismatch: stored {stored_crc:#010x}, computed {computed_crc:#010x}"
        )));
    }

    let body: SnapshotBody = bincode::deserialize(payload)
        .map_err(|e| Error::Corruption(format!("undecodable snapshot body: {e}")))?;
    Ok(Some(body))
}
