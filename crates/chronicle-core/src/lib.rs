//! # chronicle-core
//!
//! Pure building blocks of the chronicle state engine:
//!
//! - [`delta`]: the ChangeSet model and strict parsing of raw ChangeSet JSON
//! - [`symbolic`]: resolution of qualitative intents (`up_small`, `next`)
//! - [`entities`]: entity definitions and the entity graph normalizer
//! - [`cast`]: the three-tier cast state machine
//! - [`state`]: the [`EngineState`] snapshot
//! - [`reducer`]: `apply(state, delta) -> state'`
//!
//! Nothing here performs I/O. Checkpointing and replay live in
//! `chronicle-replay`.

#![deny(unsafe_code)]

pub mod cast;
pub mod delta;
pub mod entities;
pub mod errors;
pub mod logging;
pub mod params;
pub mod reducer;
pub mod state;
pub mod symbolic;
pub mod value;
pub mod world;

pub use cast::{CastState, CastTier, apply_cast_intent};
pub use delta::{
    CastEntry, CastIntent, Delta, EntityOp, EntityPatch, LocationHintChange, NormalizedDelta,
    RejectedEntry, SceneOp, SceneTagDelta, VariableOp, VariableOperation, VariableScope,
    normalize_raw,
};
pub use entities::{EntityDefinition, EntityKind, EntityRuntime, SpecialEntity, normalize_entities};
pub use errors::DeltaError;
pub use params::{ParameterDefinition, ParameterType, ValueRange};
pub use reducer::{DropReason, OpOutcome, apply, apply_variable_op};
pub use state::{EngineState, SceneState, VariableBucket, VariableBuckets, VariableNode};
pub use symbolic::{Resolution, ResolvedOperation, resolve};
pub use value::Scalar;
pub use world::WorldConfig;
