//! # chronicle-replay
//!
//! Reconstruct the state engine's [`EngineState`](chronicle_core::EngineState)
//! at any position of a branching, editable log.
//!
//! - **Log chain**: [`LogEntry`] identity, content hashes and per-position
//!   lineage via [`LogChain`]
//! - **Stores**: [`DeltaStore`] / [`CheckpointStore`] traits with in-memory
//!   and `SQLite` backends
//! - **Engine**: [`ReplayEngine::rebuild`] folds cached deltas from the
//!   latest valid checkpoint; [`ReplayEngine::advance`] derives a missing
//!   delta through a [`DeltaProducer`] and folds it
//! - **Persistence**: [`PersistedSession`] JSON layout
//!
//! ## Crate Position
//!
//! Depends on: chronicle-core, chronicle-settings.
//! Depended on by: chronicle-cli.

#![deny(unsafe_code)]

pub mod engine;
pub mod errors;
pub mod log;
pub mod persist;
pub mod store;

pub use engine::{DeltaLookup, DeltaProducer, DeriveRequest, ReplayEngine};
pub use errors::{ProducerError, ReplayError, Result};
pub use log::{ChainLink, EntryId, EntryRole, LogChain, LogEntry, ROOT_LINEAGE};
pub use persist::{PersistedSession, RuntimeMeta};
pub use store::{
    Checkpoint, CheckpointStore, DeltaStore, MemoryCheckpointStore, MemoryDeltaStore, SqliteStore,
    StoredDelta,
};
