//! The checkpoint and replay engine.
//!
//! [`ReplayEngine::rebuild`] reconstructs the state at a log position by
//! starting from the latest valid checkpoint at or before it and folding the
//! cached delta of every eligible entry after it. A cached delta only counts
//! when its owning entry still has the same content and the same
//! predecessor; a checkpoint only counts when the chain lineage at its
//! position is unchanged. Everything else is treated as absent.
//!
//! The engine takes `&mut self` for every fold, so at most one fold per log
//! is in flight at a time.

use async_trait::async_trait;
use chrono::Utc;
use metrics::counter;
use tracing::{debug, instrument};

use chronicle_core::{Delta, EngineState, EntityDefinition, WorldConfig, apply};
use chronicle_settings::EngineSettings;

use crate::errors::{ProducerError, ReplayError, Result};
use crate::log::{ChainLink, EntryRole, LogChain, LogEntry};
use crate::store::{Checkpoint, CheckpointStore, DeltaStore, StoredDelta};

/// Result of looking up the cached delta for a position.
#[derive(Clone, Debug, PartialEq)]
pub enum DeltaLookup {
    /// A delta that still matches its entry.
    Hit(Delta),
    /// Nothing stored for this entry.
    Miss,
    /// The entry's content changed since the delta was derived.
    StaleContent,
    /// The entry's predecessor changed (branch switch).
    StaleParent,
}

impl DeltaLookup {
    fn outcome(&self) -> &'static str {
        match self {
            Self::Hit(_) => "hit",
            Self::Miss => "miss",
            Self::StaleContent => "stale_content",
            Self::StaleParent => "stale_parent",
        }
    }
}

/// Everything a [`DeltaProducer`] gets to derive a delta for one entry.
#[derive(Clone, Debug)]
pub struct DeriveRequest {
    /// Log position being derived.
    pub position: usize,
    /// The entry itself.
    pub entry: LogEntry,
    /// State folded through the previous position.
    pub base_state: EngineState,
}

/// Upstream collaborator that turns a log entry into a [`Delta`].
#[async_trait]
pub trait DeltaProducer: Send + Sync {
    /// Derive the delta for `request.entry`.
    async fn produce(&self, request: DeriveRequest) -> std::result::Result<Delta, ProducerError>;
}

/// Checkpoint and replay engine over a delta store and a checkpoint store.
pub struct ReplayEngine<D, C> {
    world: WorldConfig,
    settings: EngineSettings,
    initial: EngineState,
    deltas: D,
    checkpoints: C,
}

impl<D: DeltaStore, C: CheckpointStore> ReplayEngine<D, C> {
    /// Create an engine starting from [`EngineState::initial`].
    pub fn new(world: WorldConfig, settings: EngineSettings, deltas: D, checkpoints: C) -> Self {
        Self {
            world,
            settings,
            initial: EngineState::initial(),
            deltas,
            checkpoints,
        }
    }

    /// Use a different state for position `-1`.
    #[must_use]
    pub fn with_initial_state(mut self, initial: EngineState) -> Self {
        self.initial = initial;
        self
    }

    /// World configuration.
    pub fn world(&self) -> &WorldConfig {
        &self.world
    }

    /// Engine settings.
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// State at position `-1`.
    pub fn initial_state(&self) -> &EngineState {
        &self.initial
    }

    /// Delta store.
    pub fn deltas(&self) -> &D {
        &self.deltas
    }

    /// Checkpoint store.
    pub fn checkpoints(&self) -> &C {
        &self.checkpoints
    }

    /// Normalized entity view for a state.
    pub fn entity_view(&self, state: &EngineState) -> Vec<EntityDefinition> {
        self.world.entity_view(state)
    }

    /// Whether deltas apply at this link at all.
    pub fn is_eligible(&self, link: &ChainLink) -> bool {
        !(self.settings.replay.skip_user_entries && link.role == EntryRole::User)
    }

    // ── deltas ───────────────────────────────────────────────────────────

    /// Look up and validate the cached delta for a chain position.
    pub fn lookup_delta(&self, chain: &LogChain, position: usize) -> Result<DeltaLookup> {
        let Some(link) = chain.link(position) else {
            return Ok(DeltaLookup::Miss);
        };
        let lookup = match self.deltas.get(&link.entry_id)? {
            None => DeltaLookup::Miss,
            Some(stored) if stored.content_hash != link.content_hash => DeltaLookup::StaleContent,
            Some(stored) if stored.prev_entry_id != link.parent => DeltaLookup::StaleParent,
            Some(stored) => DeltaLookup::Hit(stored.delta),
        };
        counter!("chronicle_delta_lookups_total", "outcome" => lookup.outcome()).increment(1);
        if matches!(lookup, DeltaLookup::StaleContent | DeltaLookup::StaleParent) {
            debug!(position, entry_id = %link.entry_id, outcome = lookup.outcome(), "cached delta is stale");
        }
        Ok(lookup)
    }

    /// Store the delta for a chain position, keyed by its entry identity.
    ///
    /// Checkpoints at or after `position` were folded without this delta and
    /// are dropped.
    pub fn record_delta(&mut self, chain: &LogChain, position: usize, delta: Delta) -> Result<()> {
        let link = chain.link(position).ok_or(ReplayError::InvalidPosition {
            position: position as i64,
            len: chain.len(),
        })?;
        self.deltas.put(
            &link.entry_id,
            StoredDelta {
                delta,
                content_hash: link.content_hash.clone(),
                prev_entry_id: link.parent.clone(),
                timestamp: Utc::now(),
            },
        )?;
        let dropped = self.checkpoints.truncate_after(position as i64 - 1)?;
        if dropped > 0 {
            counter!("chronicle_checkpoints_total", "outcome" => "superseded").increment(dropped as u64);
            debug!(position, dropped, "dropped checkpoints folded without the new delta");
        }
        Ok(())
    }

    // ── checkpoints ──────────────────────────────────────────────────────

    /// Latest valid checkpoint at or before `target`; invalid ones are removed.
    fn start_checkpoint(&mut self, chain: &LogChain, target: i64) -> Result<Option<Checkpoint>> {
        for position in self.checkpoints.positions_at_or_before(target)? {
            let Some(checkpoint) = self.checkpoints.get(position)? else {
                continue;
            };
            if chain.lineage_at(position) == Some(checkpoint.lineage.as_str()) {
                counter!("chronicle_checkpoints_total", "outcome" => "hit").increment(1);
                return Ok(Some(checkpoint));
            }
            counter!("chronicle_checkpoints_total", "outcome" => "invalid").increment(1);
            debug!(position, "discarding checkpoint from another branch");
            let _ = self.checkpoints.remove(position)?;
        }
        Ok(None)
    }

    fn write_checkpoint(&mut self, chain: &LogChain, position: i64, state: &EngineState) -> Result<()> {
        if !self.settings.replay.persist_checkpoints || position < 0 {
            return Ok(());
        }
        let Some(lineage) = chain.lineage_at(position) else {
            return Ok(());
        };
        self.checkpoints.put(Checkpoint {
            log_position: position,
            state: state.clone(),
            lineage: lineage.to_string(),
        })?;
        counter!("chronicle_checkpoints_total", "outcome" => "written").increment(1);
        Ok(())
    }

    /// Drop every checkpoint after `position`, e.g. after the host truncates
    /// the log.
    pub fn discard_checkpoints_after(&mut self, position: i64) -> Result<usize> {
        self.checkpoints.truncate_after(position)
    }

    // ── folding ──────────────────────────────────────────────────────────

    /// Fold cached deltas over `(from, to]` starting at `state`.
    fn fold_range(&self, chain: &LogChain, mut state: EngineState, from: i64, to: i64) -> Result<EngineState> {
        let start = usize::try_from(from + 1).unwrap_or(0);
        let Ok(end) = usize::try_from(to) else {
            return Ok(state);
        };
        for position in start..=end {
            let Some(link) = chain.link(position) else {
                break;
            };
            if !self.is_eligible(link) {
                continue;
            }
            if let DeltaLookup::Hit(delta) = self.lookup_delta(chain, position)? {
                state = apply(&state, &delta, &self.world, &self.settings.reducer);
                counter!("chronicle_deltas_folded_total").increment(1);
            }
        }
        Ok(state)
    }

    fn clamp_target(chain: &LogChain, target: i64) -> i64 {
        target.min(chain.last_position())
    }

    fn rebuild_chain(&mut self, chain: &LogChain, target: i64, persist: bool) -> Result<EngineState> {
        let target = Self::clamp_target(chain, target);
        if target < 0 {
            return Ok(self.initial.clone());
        }
        let (from, base) = match self.start_checkpoint(chain, target)? {
            Some(checkpoint) => (checkpoint.log_position, checkpoint.state),
            None => (-1, self.initial.clone()),
        };
        if from == target {
            return Ok(base);
        }
        let state = self.fold_range(chain, base, from, target)?;
        if persist {
            self.write_checkpoint(chain, target, &state)?;
        }
        Ok(state)
    }

    /// State visible at `target`.
    ///
    /// A target beyond the log clamps to the last entry; a negative target
    /// (or an empty log) yields the initial state.
    #[instrument(skip_all, fields(target_position = target, entries = log.len()))]
    pub fn rebuild(&mut self, log: &[LogEntry], target: i64) -> Result<EngineState> {
        let chain = LogChain::build(log);
        self.rebuild_chain(&chain, target, true)
    }

    /// State at `target` folded from the initial state, ignoring checkpoints.
    pub fn replay_from_initial(&self, log: &[LogEntry], target: i64) -> Result<EngineState> {
        let chain = LogChain::build(log);
        let target = Self::clamp_target(&chain, target);
        self.fold_range(&chain, self.initial.clone(), -1, target)
    }

    /// Derive (if needed) and fold the delta for `position`.
    ///
    /// Uses the cached delta when it is still valid; otherwise awaits the
    /// producer. Nothing is stored unless the producer succeeds, so a failed
    /// or dropped derivation leaves both stores untouched.
    #[instrument(skip_all, fields(position = position, entries = log.len()))]
    pub async fn advance<P>(&mut self, log: &[LogEntry], position: usize, producer: &P) -> Result<EngineState>
    where
        P: DeltaProducer + ?Sized,
    {
        let chain = LogChain::build(log);
        let Some(link) = chain.link(position) else {
            return Err(ReplayError::InvalidPosition {
                position: position as i64,
                len: chain.len(),
            });
        };
        let eligible = self.is_eligible(link);
        let base = self.rebuild_chain(&chain, position as i64 - 1, false)?;
        if !eligible {
            self.write_checkpoint(&chain, position as i64, &base)?;
            return Ok(base);
        }

        let delta = match self.lookup_delta(&chain, position)? {
            DeltaLookup::Hit(delta) => delta,
            _ => {
                let request = DeriveRequest {
                    position,
                    entry: log[position].clone(),
                    base_state: base.clone(),
                };
                let delta = producer.produce(request).await?;
                self.record_delta(&chain, position, delta.clone())?;
                delta
            }
        };

        let next = apply(&base, &delta, &self.world, &self.settings.reducer);
        counter!("chronicle_deltas_folded_total").increment(1);
        self.write_checkpoint(&chain, position as i64, &next)?;
        Ok(next)
    }

    /// Split the engine back into its parts.
    pub fn into_parts(self) -> (WorldConfig, EngineSettings, EngineState, D, C) {
        (self.world, self.settings, self.initial, self.deltas, self.checkpoints)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryCheckpointStore, MemoryDeltaStore};
    use assert_matches::assert_matches;
    use chronicle_core::{Scalar, VariableOp, VariableScope};

    type Engine = ReplayEngine<MemoryDeltaStore, MemoryCheckpointStore>;

    fn engine() -> Engine {
        ReplayEngine::new(
            WorldConfig::default(),
            EngineSettings::default(),
            MemoryDeltaStore::new(),
            MemoryCheckpointStore::new(8),
        )
    }

    fn gold(amount: f64) -> Delta {
        Delta::compose(vec![VariableOp::add("Gold", amount)], None, Vec::new(), None)
    }

    fn log() -> Vec<LogEntry> {
        vec![
            LogEntry::user("hello").with_id("u0"),
            LogEntry::assistant("you find 5 gold").with_id("a1"),
            LogEntry::user("spend 2").with_id("u2"),
            LogEntry::assistant("you spend 2 gold").with_id("a3"),
        ]
    }

    fn gold_of(state: &EngineState) -> Option<f64> {
        state.variable(VariableScope::Global, &["Gold"]).and_then(Scalar::as_f64)
    }

    fn seeded() -> (Engine, Vec<LogEntry>) {
        let mut engine = engine();
        let log = log();
        let chain = LogChain::build(&log);
        engine.record_delta(&chain, 1, gold(5.0)).unwrap();
        engine.record_delta(&chain, 3, gold(-2.0)).unwrap();
        (engine, log)
    }

    #[test]
    fn lookup_outcomes() {
        let (engine, log) = seeded();
        let chain = LogChain::build(&log);
        assert_matches!(engine.lookup_delta(&chain, 1).unwrap(), DeltaLookup::Hit(_));
        assert_eq!(engine.lookup_delta(&chain, 0).unwrap(), DeltaLookup::Miss);
        assert_eq!(engine.lookup_delta(&chain, 99).unwrap(), DeltaLookup::Miss);

        let mut edited = log.clone();
        edited[1].content = "you find 6 gold".into();
        let chain = LogChain::build(&edited);
        assert_eq!(engine.lookup_delta(&chain, 1).unwrap(), DeltaLookup::StaleContent);

        let mut branched = log;
        branched[2] = LogEntry::user("spend 3").with_id("u2b");
        let chain = LogChain::build(&branched);
        assert_eq!(engine.lookup_delta(&chain, 3).unwrap(), DeltaLookup::StaleParent);
    }

    #[test]
    fn rebuild_folds_and_checkpoints() {
        let (mut engine, log) = seeded();
        let state = engine.rebuild(&log, 3).unwrap();
        assert_eq!(gold_of(&state), Some(3.0));
        assert_eq!(engine.checkpoints().positions_at_or_before(10).unwrap(), vec![3]);

        let again = engine.rebuild(&log, 3).unwrap();
        assert_eq!(again, state);
    }

    #[test]
    fn rebuild_bounds() {
        let (mut engine, log) = seeded();
        assert_eq!(engine.rebuild(&log, -5).unwrap(), EngineState::initial());
        assert_eq!(gold_of(&engine.rebuild(&log, 100).unwrap()), Some(3.0));
        assert_eq!(engine.rebuild(&[], 2).unwrap(), EngineState::initial());
    }

    #[test]
    fn user_entries_are_skipped_unless_configured() {
        let mut engine = engine();
        let log = log();
        let chain = LogChain::build(&log);
        engine.record_delta(&chain, 0, gold(100.0)).unwrap();
        assert_eq!(gold_of(&engine.rebuild(&log, 0).unwrap()), None);

        let mut settings = EngineSettings::default();
        settings.replay.skip_user_entries = false;
        let (world, _, _, deltas, _) = engine.into_parts();
        let mut engine = ReplayEngine::new(world, settings, deltas, MemoryCheckpointStore::new(8));
        assert_eq!(gold_of(&engine.rebuild(&log, 0).unwrap()), Some(100.0));
    }

    #[test]
    fn checkpoints_from_other_branches_are_discarded() {
        let (mut engine, log) = seeded();
        let _ = engine.rebuild(&log, 3).unwrap();

        let mut edited = log.clone();
        edited[1].content = "you find nothing".into();
        let state = engine.rebuild(&edited, 3).unwrap();
        assert_eq!(gold_of(&state), Some(-2.0));
        let cp = engine.checkpoints().get(3).unwrap().unwrap();
        assert_eq!(Some(cp.lineage.as_str()), LogChain::build(&edited).lineage_at(3));
    }

    #[test]
    fn persistence_can_be_disabled() {
        let mut settings = EngineSettings::default();
        settings.replay.persist_checkpoints = false;
        let (engine, log) = seeded();
        let (world, _, _, deltas, checkpoints) = engine.into_parts();
        let mut engine = ReplayEngine::new(world, settings, deltas, checkpoints);
        let _ = engine.rebuild(&log, 3).unwrap();
        assert!(engine.checkpoints().is_empty());
    }

    #[test]
    fn custom_initial_state() {
        let (engine, log) = seeded();
        let mut initial = EngineState::initial();
        initial.variables.global.set(&["Gold"], Scalar::Number(10.0));
        let mut engine = engine.with_initial_state(initial.clone());
        assert_eq!(engine.rebuild(&log, -1).unwrap(), initial);
        assert_eq!(gold_of(&engine.rebuild(&log, 3).unwrap()), Some(13.0));
    }

    #[test]
    fn discard_after_truncation() {
        let (mut engine, log) = seeded();
        let _ = engine.rebuild(&log, 1).unwrap();
        let _ = engine.rebuild(&log, 3).unwrap();
        assert_eq!(engine.discard_checkpoints_after(1).unwrap(), 1);
        assert_eq!(engine.checkpoints().positions_at_or_before(10).unwrap(), vec![1]);
    }

    #[test]
    fn replay_from_initial_ignores_checkpoints() {
        let (mut engine, log) = seeded();
        let _ = engine.rebuild(&log, 3).unwrap();
        assert_eq!(gold_of(&engine.replay_from_initial(&log, 2).unwrap()), Some(5.0));
    }
}
