//! In-memory stores.

use std::collections::BTreeMap;

use tracing::debug;

use super::{Checkpoint, CheckpointStore, DeltaStore, StoredDelta};
use crate::errors::Result;
use crate::log::EntryId;

/// Delta store backed by a map.
#[derive(Clone, Debug, Default)]
pub struct MemoryDeltaStore {
    deltas: BTreeMap<EntryId, StoredDelta>,
}

impl MemoryDeltaStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored deltas.
    pub fn len(&self) -> usize {
        self.deltas.len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }
}

impl DeltaStore for MemoryDeltaStore {
    fn get(&self, id: &EntryId) -> Result<Option<StoredDelta>> {
        Ok(self.deltas.get(id).cloned())
    }

    fn put(&mut self, id: &EntryId, delta: StoredDelta) -> Result<()> {
        let _ = self.deltas.insert(id.clone(), delta);
        Ok(())
    }

    fn remove(&mut self, id: &EntryId) -> Result<bool> {
        Ok(self.deltas.remove(id).is_some())
    }

    fn entries(&self) -> Result<Vec<(EntryId, StoredDelta)>> {
        Ok(self
            .deltas
            .iter()
            .map(|(id, d)| (id.clone(), d.clone()))
            .collect())
    }
}

/// Bounded checkpoint store. Evicts the lowest positions first.
#[derive(Clone, Debug)]
pub struct MemoryCheckpointStore {
    checkpoints: BTreeMap<i64, Checkpoint>,
    capacity: usize,
}

impl MemoryCheckpointStore {
    /// Store holding at most `capacity` checkpoints (at least one).
    pub fn new(capacity: usize) -> Self {
        Self {
            checkpoints: BTreeMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Number of stored checkpoints.
    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }

    /// Capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for MemoryCheckpointStore {
    fn default() -> Self {
        Self::new(chronicle_settings::ReplaySettings::default().max_checkpoints)
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn get(&self, position: i64) -> Result<Option<Checkpoint>> {
        Ok(self.checkpoints.get(&position).cloned())
    }

    fn put(&mut self, checkpoint: Checkpoint) -> Result<()> {
        let _ = self.checkpoints.insert(checkpoint.log_position, checkpoint);
        while self.checkpoints.len() > self.capacity {
            if let Some((evicted, _)) = self.checkpoints.pop_first() {
                debug!(position = evicted, "evicted checkpoint");
            }
        }
        Ok(())
    }

    fn remove(&mut self, position: i64) -> Result<bool> {
        Ok(self.checkpoints.remove(&position).is_some())
    }

    fn positions_at_or_before(&self, position: i64) -> Result<Vec<i64>> {
        Ok(self.checkpoints.range(..=position).rev().map(|(p, _)| *p).collect())
    }

    fn truncate_after(&mut self, position: i64) -> Result<usize> {
        let Some(start) = position.checked_add(1) else {
            return Ok(0);
        };
        let dropped = self.checkpoints.split_off(&start);
        Ok(dropped.len())
    }
}
