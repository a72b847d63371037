//! `SQLite`-backed delta and checkpoint storage.
//!
//! One [`Connection`] shared behind a mutex, so a single handle can serve as
//! both the [`DeltaStore`] and the [`CheckpointStore`] of an engine
//! (clone it). Deltas and states are stored as JSON text columns; writes use
//! `INSERT OR REPLACE` for last-write-wins.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use super::{Checkpoint, CheckpointStore, DeltaStore, StoredDelta};
use crate::errors::{ReplayError, Result};
use crate::log::EntryId;

const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS deltas (
    entry_id      TEXT PRIMARY KEY,
    delta         TEXT NOT NULL,
    content_hash  TEXT NOT NULL,
    prev_entry_id TEXT,
    created_at    TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS checkpoints (
    log_position  INTEGER PRIMARY KEY,
    state         TEXT NOT NULL,
    lineage       TEXT NOT NULL
);
";

/// Delta and checkpoint store on a single `SQLite` connection.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    max_checkpoints: usize,
}

impl SqliteStore {
    /// Open (or create) a database file.
    pub fn open(path: &Path, max_checkpoints: usize) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")?;
        Self::init(conn, max_checkpoints)
    }

    /// In-memory database.
    pub fn open_in_memory(max_checkpoints: usize) -> Result<Self> {
        Self::init(Connection::open_in_memory()?, max_checkpoints)
    }

    fn init(conn: Connection, max_checkpoints: usize) -> Result<Self> {
        let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if version < SCHEMA_VERSION {
            debug!(from = version, to = SCHEMA_VERSION, "creating replay schema");
            conn.execute_batch(SCHEMA)?;
            conn.execute_batch(&format!("PRAGMA user_version = {SCHEMA_VERSION};"))?;
        }
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            max_checkpoints: max_checkpoints.max(1),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| ReplayError::Internal("sqlite connection lock poisoned".into()))
    }

    fn decode_delta(
        delta: &str,
        content_hash: String,
        prev_entry_id: Option<String>,
        created_at: &str,
    ) -> Result<StoredDelta> {
        let timestamp = DateTime::parse_from_rfc3339(created_at)
            .map_err(|e| ReplayError::Internal(format!("bad delta timestamp {created_at:?}: {e}")))?
            .with_timezone(&Utc);
        Ok(StoredDelta {
            delta: serde_json::from_str(delta)?,
            content_hash,
            prev_entry_id: prev_entry_id.map(EntryId::new),
            timestamp,
        })
    }
}

impl DeltaStore for SqliteStore {
    fn get(&self, id: &EntryId) -> Result<Option<StoredDelta>> {
        let conn = self.lock()?;
        let row: Option<(String, String, Option<String>, String)> = conn
            .query_row(
                "SELECT delta, content_hash, prev_entry_id, created_at FROM deltas WHERE entry_id = ?1",
                params![id.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;
        row.map(|(delta, hash, prev, at)| Self::decode_delta(&delta, hash, prev, &at))
            .transpose()
    }

    fn put(&mut self, id: &EntryId, delta: StoredDelta) -> Result<()> {
        let json = serde_json::to_string(&delta.delta)?;
        let conn = self.lock()?;
        let _ = conn.execute(
            "INSERT OR REPLACE INTO deltas (entry_id, delta, content_hash, prev_entry_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id.as_str(),
                json,
                delta.content_hash,
                delta.prev_entry_id.as_ref().map(EntryId::as_str),
                delta.timestamp.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn remove(&mut self, id: &EntryId) -> Result<bool> {
        let conn = self.lock()?;
        let changed = conn.execute("DELETE FROM deltas WHERE entry_id = ?1", params![id.as_str()])?;
        Ok(changed > 0)
    }

    fn entries(&self) -> Result<Vec<(EntryId, StoredDelta)>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT entry_id, delta, content_hash, prev_entry_id, created_at FROM deltas ORDER BY entry_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (id, delta, hash, prev, at) = row?;
            out.push((EntryId::new(id), Self::decode_delta(&delta, hash, prev, &at)?));
        }
        Ok(out)
    }
}

impl CheckpointStore for SqliteStore {
    fn get(&self, position: i64) -> Result<Option<Checkpoint>> {
        let conn = self.lock()?;
        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT state, lineage FROM checkpoints WHERE log_position = ?1",
                params![position],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        row.map(|(state, lineage)| {
            Ok(Checkpoint {
                log_position: position,
                state: serde_json::from_str(&state)?,
                lineage,
            })
        })
        .transpose()
    }

    fn put(&mut self, checkpoint: Checkpoint) -> Result<()> {
        let state = serde_json::to_string(&checkpoint.state)?;
        let limit = i64::try_from(self.max_checkpoints).unwrap_or(i64::MAX);
        let conn = self.lock()?;
        let _ = conn.execute(
            "INSERT OR REPLACE INTO checkpoints (log_position, state, lineage) VALUES (?1, ?2, ?3)",
            params![checkpoint.log_position, state, checkpoint.lineage],
        )?;
        let evicted = conn.execute(
            "DELETE FROM checkpoints WHERE log_position NOT IN
             (SELECT log_position FROM checkpoints ORDER BY log_position DESC LIMIT ?1)",
            params![limit],
        )?;
        if evicted > 0 {
            debug!(evicted, "evicted checkpoints");
        }
        Ok(())
    }

    fn remove(&mut self, position: i64) -> Result<bool> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "DELETE FROM checkpoints WHERE log_position = ?1",
            params![position],
        )?;
        Ok(changed > 0)
    }

    fn positions_at_or_before(&self, position: i64) -> Result<Vec<i64>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT log_position FROM checkpoints WHERE log_position <= ?1 ORDER BY log_position DESC",
        )?;
        let positions = stmt
            .query_map(params![position], |row| row.get::<_, i64>(0))?
            .collect::<std::result::Result<Vec<i64>, _>>()?;
        Ok(positions)
    }

    fn truncate_after(&mut self, position: i64) -> Result<usize> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "DELETE FROM checkpoints WHERE log_position > ?1",
            params![position],
        )?;
        Ok(changed)
    }
}
