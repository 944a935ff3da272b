//! # StateStore: Persistent Snapshots
//!
//! Persistence for the node, built on sled's embedded key-value store.
//!
//! ## Tree Layout
//!
//! | Tree        | Key            | Value                        |
//! |-------------|----------------|------------------------------|
//! | `snapshots` | name (UTF-8)   | `bincode(T)`                 |
//! | `metadata`  | key (UTF-8)    | value (bytes)                |
//!
//! The node keeps one snapshot (`"state"`) holding the chain and the
//! contract. Each save writes the snapshot and the metadata describing it,
//! then flushes. Loading checks the schema version first and refuses
//! snapshots written by an incompatible build.

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::{Db, Tree};
use std::path::Path;

use crate::config::STATE_SCHEMA_VERSION;

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    /// The snapshot on disk was written under another schema.
    #[error("snapshot schema version {found} does not match expected {expected}")]
    SchemaMismatch { expected: u32, found: u32 },

    #[error("corrupt metadata entry: {0}")]
    CorruptMetadata(&'static str),
}

pub type StoreResult<T> = Result<T, StoreError>;

// ---------------------------------------------------------------------------
// Metadata Keys
// ---------------------------------------------------------------------------

const META_SCHEMA_VERSION: &[u8] = b"schema_version";
const META_SAVED_AT_HEIGHT: &[u8] = b"saved_at_height";

/// Snapshot metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotMeta {
    pub schema_version: u32,
    pub saved_at_height: u64,
}

// ---------------------------------------------------------------------------
// StateStore
// ---------------------------------------------------------------------------

/// sled-backed snapshot store.
///
/// sled is thread-safe, so `StateStore` is cheap to clone and share.
#[derive(Debug, Clone)]
pub struct StateStore {
    db: Db,
    snapshots: Tree,
    metadata: Tree,
}

impl StateStore {
    /// Open or create a store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// A temporary store, removed when dropped. For tests.
    pub fn open_temporary() -> StoreResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> StoreResult<Self> {
        let snapshots = db.open_tree("snapshots")?;
        let metadata = db.open_tree("metadata")?;
        Ok(Self {
            db,
            snapshots,
            metadata,
        })
    }

    /// Writes `value` under `name` together with its metadata, then flushes.
    pub fn save<T: Serialize>(&self, name: &str, value: &T, height: u64) -> StoreResult<()> {
        let bytes = bincode::serialize(value).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.snapshots.insert(name.as_bytes(), bytes)?;
        self.metadata
            .insert(META_SCHEMA_VERSION, &STATE_SCHEMA_VERSION.to_be_bytes())?;
        self.metadata
            .insert(META_SAVED_AT_HEIGHT, &height.to_be_bytes())?;
        self.db.flush()?;
        Ok(())
    }

    /// Loads the snapshot under `name`. `Ok(None)` on a fresh store.
    pub fn load<T: DeserializeOwned>(&self, name: &str) -> StoreResult<Option<T>> {
        let Some(bytes) = self.snapshots.get(name.as_bytes())? else {
            return Ok(None);
        };
        if let Some(meta) = self.meta()? {
            if meta.schema_version != STATE_SCHEMA_VERSION {
                return Err(StoreError::SchemaMismatch {
                    expected: STATE_SCHEMA_VERSION,
                    found: meta.schema_version,
                });
            }
        }
        let value = bincode::deserialize(&bytes).map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(Some(value))
    }

    /// Metadata of the last save, if any.
    pub fn meta(&self) -> StoreResult<Option<SnapshotMeta>> {
        let Some(version) = self.metadata.get(META_SCHEMA_VERSION)? else {
            return Ok(None);
        };
        let version: [u8; 4] = version
            .as_ref()
            .try_into()
            .map_err(|_| StoreError::CorruptMetadata("schema_version"))?;
        let height = match self.metadata.get(META_SAVED_AT_HEIGHT)? {
            Some(bytes) => {
                let arr: [u8; 8] = bytes
                    .as_ref()
                    .try_into()
                    .map_err(|_| StoreError::CorruptMetadata("saved_at_height"))?;
                u64::from_be_bytes(arr)
            }
            None => 0,
        };
        Ok(Some(SnapshotMeta {
            schema_version: u32::from_be_bytes(version),
            saved_at_height: height,
        }))
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> StoreResult<()> {
        self.db.flush()?;
        Ok(())
    }

    /// Approximate on-disk size in bytes.
    pub fn size_on_disk(&self) -> StoreResult<u64> {
        Ok(self.db.size_on_disk()?)
    }
}
