//! `chronicle`: inspect persisted chronicle sessions.
//!
//! - `rebuild`: state at a log position, folded from cached deltas
//! - `entities`: normalized entity view and cast at a log position
//! - `normalize`: strict parse of a raw change set

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;

use chronicle_core::{EngineState, NormalizedDelta, WorldConfig, normalize_raw};
use chronicle_replay::{LogEntry, MemoryCheckpointStore, MemoryDeltaStore, PersistedSession, ReplayEngine};
use chronicle_settings::{EngineSettings, apply_env_overrides, load_settings_from_path};

#[derive(Debug, Parser)]
#[command(name = "chronicle", about = "Rebuild and inspect branching conversation state")]
struct Args {
    /// Settings file (JSON). Defaults plus `CHRONICLE_*` overrides when absent.
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the state at a log position.
    Rebuild {
        /// Session file: `world`, `log` and the persisted session fields.
        session: PathBuf,
        /// Log position; defaults to the last entry.
        #[arg(long, allow_negative_numbers = true)]
        position: Option<i64>,
        /// Write the updated session (runtime meta, checkpoint) back to the file.
        #[arg(long, default_value_t = false)]
        save: bool,
    },
    /// Print the normalized entity view and cast at a log position.
    Entities {
        /// Session file.
        session: PathBuf,
        /// Log position; defaults to the last entry.
        #[arg(long, allow_negative_numbers = true)]
        position: Option<i64>,
    },
    /// Parse a raw change set and report accepted and rejected entries.
    Normalize {
        /// Input file, or `-` for stdin.
        #[arg(default_value = "-")]
        input: PathBuf,
    },
}

/// On-disk session: world configuration, the log, and persisted replay data.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct SessionFile {
    world: WorldConfig,
    log: Vec<LogEntry>,
    #[serde(flatten)]
    persisted: PersistedSession,
}

type MemoryEngine = ReplayEngine<MemoryDeltaStore, MemoryCheckpointStore>;

fn main() -> Result<()> {
    let args = Args::parse();
    let settings = load_settings(args.settings.as_deref())?;
    chronicle_core::logging::init_subscriber(&settings.logging.level);

    let output = match args.command {
        Command::Rebuild {
            session,
            position,
            save,
        } => rebuild(&session, position, save, settings)?,
        Command::Entities { session, position } => entities(&session, position, settings)?,
        Command::Normalize { input } => normalize(&read_input(&input)?)?,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn load_settings(path: Option<&Path>) -> Result<EngineSettings> {
    match path {
        Some(path) => load_settings_from_path(path)
            .with_context(|| format!("failed to load settings: {}", path.display())),
        None => {
            let mut settings = EngineSettings::default();
            apply_env_overrides(&mut settings);
            settings.validate();
            Ok(settings)
        }
    }
}

fn read_input(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        return std::io::read_to_string(std::io::stdin()).context("failed to read stdin");
    }
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn load_session(path: &Path) -> Result<SessionFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read session: {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("invalid session file: {}", path.display()))
}

/// Rebuild the state at `position` (or the last entry).
fn rebuild_state(
    file: SessionFile,
    position: Option<i64>,
    settings: EngineSettings,
) -> Result<(MemoryEngine, Vec<LogEntry>, WorldConfig, i64, EngineState)> {
    let SessionFile {
        world,
        log,
        persisted,
    } = file;
    let target = position.unwrap_or(log.len() as i64 - 1);
    let mut engine = persisted.into_engine(world.clone(), settings)?;
    let state = engine.rebuild(&log, target).context("rebuild failed")?;
    Ok((engine, log, world, target, state))
}

fn rebuild(path: &Path, position: Option<i64>, save: bool, settings: EngineSettings) -> Result<Value> {
    let file = load_session(path)?;
    let (engine, log, world, target, state) = rebuild_state(file, position, settings)?;
    let resolved = target.min(log.len() as i64 - 1).max(-1);
    if save {
        let persisted = PersistedSession::snapshot(&engine, resolved)?;
        let out = SessionFile { world, log, persisted };
        std::fs::write(path, serde_json::to_string_pretty(&out)?)
            .with_context(|| format!("failed to write session: {}", path.display()))?;
        info!(path = %path.display(), position = resolved, "session saved");
    }
    Ok(json!({ "position": resolved, "state": state }))
}

fn entities(path: &Path, position: Option<i64>, settings: EngineSettings) -> Result<Value> {
    let file = load_session(path)?;
    let (engine, _, _, _, state) = rebuild_state(file, position, settings)?;
    let cast: Vec<Value> = state
        .cast
        .members()
        .into_iter()
        .map(|(name, tier)| json!({ "name": name, "tier": tier }))
        .collect();
    Ok(json!({
        "entities": engine.entity_view(&state),
        "cast": cast,
    }))
}

fn normalize(raw: &str) -> Result<Value> {
    let value: Value = serde_json::from_str(raw).context("change set is not valid JSON")?;
    Ok(render_normalized(&normalize_raw(&value)))
}

fn render_normalized(normalized: &NormalizedDelta) -> Value {
    let rejected: Vec<Value> = normalized
        .rejected
        .iter()
        .map(|entry| {
            json!({
                "section": entry.section,
                "index": entry.index,
                "reason": entry.reason.to_string(),
            })
        })
        .collect();
    json!({ "delta": normalized.delta, "rejected": rejected })
}
