//! Persisted session layout.
//!
//! ```json
//! {
//!   "initialState": { ... },
//!   "runtimeMeta": { "lastComputedPosition": 3, "lastComputedCheckpoint": { ... } },
//!   "deltasByEntryId": { "<entryId>": { "delta": ..., "contentHash": ..., "prevEntryId": ..., "timestamp": ... } }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use chronicle_core::{EngineState, WorldConfig};
use chronicle_settings::EngineSettings;

use crate::engine::ReplayEngine;
use crate::errors::Result;
use crate::log::EntryId;
use crate::store::{
    Checkpoint, CheckpointStore, DeltaStore, MemoryCheckpointStore, MemoryDeltaStore, StoredDelta,
};

/// Bookkeeping about the last computed position.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeMeta {
    /// Last position a state was computed for; `-1` when none.
    pub last_computed_position: i64,
    /// Checkpoint written for that position, if any.
    pub last_computed_checkpoint: Option<Checkpoint>,
}

impl Default for RuntimeMeta {
    fn default() -> Self {
        Self {
            last_computed_position: -1,
            last_computed_checkpoint: None,
        }
    }
}

/// Everything the host persists for one conversation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersistedSession {
    /// State at position `-1`.
    pub initial_state: EngineState,
    /// Last computed position and checkpoint.
    pub runtime_meta: RuntimeMeta,
    /// Cached deltas keyed by entry identity.
    pub deltas_by_entry_id: BTreeMap<EntryId, StoredDelta>,
}

impl Default for PersistedSession {
    fn default() -> Self {
        Self {
            initial_state: EngineState::initial(),
            runtime_meta: RuntimeMeta::default(),
            deltas_by_entry_id: BTreeMap::new(),
        }
    }
}

impl PersistedSession {
    /// Read a session from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let session: Self = serde_json::from_str(&content)?;
        debug!(path = %path.display(), deltas = session.deltas_by_entry_id.len(), "loaded session");
        Ok(session)
    }

    /// Write the session as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Fill in-memory stores. The last computed checkpoint, if any, seeds
    /// the checkpoint store.
    pub fn into_stores(self, max_checkpoints: usize) -> Result<(EngineState, MemoryDeltaStore, MemoryCheckpointStore)> {
        let mut deltas = MemoryDeltaStore::new();
        for (id, stored) in self.deltas_by_entry_id {
            deltas.put(&id, stored)?;
        }
        let mut checkpoints = MemoryCheckpointStore::new(max_checkpoints);
        if let Some(checkpoint) = self.runtime_meta.last_computed_checkpoint {
            checkpoints.put(checkpoint)?;
        }
        Ok((self.initial_state, deltas, checkpoints))
    }

    /// Build an in-memory engine for this session.
    pub fn into_engine(
        self,
        world: WorldConfig,
        settings: EngineSettings,
    ) -> Result<ReplayEngine<MemoryDeltaStore, MemoryCheckpointStore>> {
        let (initial, deltas, checkpoints) = self.into_stores(settings.replay.max_checkpoints)?;
        Ok(ReplayEngine::new(world, settings, deltas, checkpoints).with_initial_state(initial))
    }

    /// Capture an engine's stores. `last_position` is the position the host
    /// last computed; its checkpoint is included when the store has one.
    pub fn snapshot<D: DeltaStore, C: CheckpointStore>(
        engine: &ReplayEngine<D, C>,
        last_position: i64,
    ) -> Result<Self> {
        let deltas_by_entry_id = engine.deltas().entries()?.into_iter().collect();
        let last_computed_checkpoint = if last_position >= 0 {
            engine.checkpoints().get(last_position)?
        } else {
            None
        };
        Ok(Self {
            initial_state: engine.initial_state().clone(),
            runtime_meta: RuntimeMeta {
                last_computed_position: last_position,
                last_computed_checkpoint,
            },
            deltas_by_entry_id,
        })
    }
}
