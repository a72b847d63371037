//! Delta and checkpoint storage.
//!
//! Both stores are plain key-value stores with last-write-wins semantics.
//! Staleness is not their concern: the engine validates every hit against
//! the current [`LogChain`](crate::LogChain).

pub mod memory;
pub mod sqlite;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use chronicle_core::{Delta, EngineState};

use crate::errors::Result;
use crate::log::EntryId;

pub use memory::{MemoryCheckpointStore, MemoryDeltaStore};
pub use sqlite::SqliteStore;

/// A delta cached for one log entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredDelta {
    /// The delta.
    pub delta: Delta,
    /// Content hash of the owning entry when the delta was derived.
    pub content_hash: String,
    /// Identity of the entry that preceded it.
    pub prev_entry_id: Option<EntryId>,
    /// When it was stored.
    pub timestamp: DateTime<Utc>,
}

/// A folded state at a log position.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    /// Position folded through; `-1` is before any entry.
    pub log_position: i64,
    /// State after folding.
    pub state: EngineState,
    /// Chain lineage at `log_position` when the checkpoint was written.
    pub lineage: String,
}

/// Per-entry delta storage, keyed by [`EntryId`].
pub trait DeltaStore {
    /// Stored delta for an entry.
    fn get(&self, id: &EntryId) -> Result<Option<StoredDelta>>;

    /// Store a delta, replacing any previous one.
    fn put(&mut self, id: &EntryId, delta: StoredDelta) -> Result<()>;

    /// Remove a delta. Returns whether one was present.
    fn remove(&mut self, id: &EntryId) -> Result<bool>;

    /// Every stored delta, ordered by entry id.
    fn entries(&self) -> Result<Vec<(EntryId, StoredDelta)>>;
}

/// Checkpoint storage, keyed by log position.
pub trait CheckpointStore {
    /// Checkpoint at a position.
    fn get(&self, position: i64) -> Result<Option<Checkpoint>>;

    /// Store a checkpoint, replacing any at the same position.
    fn put(&mut self, checkpoint: Checkpoint) -> Result<()>;

    /// Remove a checkpoint. Returns whether one was present.
    fn remove(&mut self, position: i64) -> Result<bool>;

    /// Positions `<= position`, latest first.
    fn positions_at_or_before(&self, position: i64) -> Result<Vec<i64>>;

    /// Drop every checkpoint after `position`. Returns how many were dropped.
    fn truncate_after(&mut self, position: i64) -> Result<usize>;
}
