//! The ChangeSet model.
//!
//! A [`Delta`] bundles independent sub-deltas: variable ops, a scene op,
//! entity ops, a cast intent, and an opaque retrieval payload. Every field is
//! optional and [`Delta::compose`] never stores an empty part, so a no-op
//! delta is structurally recognisable via [`Delta::is_empty`].
//!
//! Loosely shaped upstream JSON is turned into a `Delta` by
//! [`normalize_raw`](normalize::normalize_raw).

pub mod normalize;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cast::CastTier;
use crate::entities::EntityKind;
use crate::value::Scalar;

pub use normalize::{NormalizedDelta, RejectedEntry, normalize_raw};

// ─────────────────────────────────────────────────────────────────────────────
// Variable ops
// ─────────────────────────────────────────────────────────────────────────────

/// The bucket a variable lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableScope {
    /// Per-character values, keyed by subject.
    Character,
    /// Directed values between a subject and a target.
    Relationship,
    /// Values tied to the current scene.
    Scene,
    /// Session-wide values.
    Global,
}

impl VariableScope {
    /// All scopes in bucket order.
    pub const ALL: [Self; 4] = [
        Self::Character,
        Self::Relationship,
        Self::Scene,
        Self::Global,
    ];

    /// Parse a scope name, ignoring case and a few common spellings.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "character" | "char" | "self" => Some(Self::Character),
            "relationship" | "relation" | "rel" => Some(Self::Relationship),
            "scene" => Some(Self::Scene),
            "global" | "world" => Some(Self::Global),
            _ => None,
        }
    }

    /// Lowercase name, as serialized.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Character => "character",
            Self::Relationship => "relationship",
            Self::Scene => "scene",
            Self::Global => "global",
        }
    }
}

/// How a [`VariableOp`] changes its value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableOperation {
    /// Overwrite with `value`.
    Set,
    /// Add numeric `value` to the current number.
    Add,
    /// Resolve `symbol` against the parameter definition.
    Symbolic,
}

/// One variable change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableOp {
    /// Explicit bucket; inferred by the reducer when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<VariableScope>,
    /// Owning entity name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_name: Option<String>,
    /// Parameter name or id.
    pub parameter_name: String,
    /// Other side of a relationship value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_name: Option<String>,
    /// Operation kind.
    pub operation: VariableOperation,
    /// Operand for `Set` / `Add`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Scalar>,
    /// Symbol for `Symbolic`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
}

impl VariableOp {
    fn bare(parameter_name: impl Into<String>, operation: VariableOperation) -> Self {
        Self {
            scope: None,
            subject_name: None,
            parameter_name: parameter_name.into(),
            target_name: None,
            operation,
            value: None,
            symbol: None,
        }
    }

    /// `Set` op.
    pub fn set(parameter_name: impl Into<String>, value: impl Into<Scalar>) -> Self {
        Self {
            value: Some(value.into()),
            ..Self::bare(parameter_name, VariableOperation::Set)
        }
    }

    /// `Add` op.
    pub fn add(parameter_name: impl Into<String>, amount: f64) -> Self {
        Self {
            value: Some(Scalar::Number(amount)),
            ..Self::bare(parameter_name, VariableOperation::Add)
        }
    }

    /// `Symbolic` op.
    pub fn symbolic(parameter_name: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            symbol: Some(symbol.into()),
            ..Self::bare(parameter_name, VariableOperation::Symbolic)
        }
    }

    /// Set the explicit scope.
    #[must_use]
    pub fn in_scope(mut self, scope: VariableScope) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Set the subject.
    #[must_use]
    pub fn for_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject_name = Some(subject.into());
        self
    }

    /// Set the relationship target.
    #[must_use]
    pub fn toward(mut self, target: impl Into<String>) -> Self {
        self.target_name = Some(target.into());
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Scene op
// ─────────────────────────────────────────────────────────────────────────────

/// Overwrite of the scene's location hint. `value: None` clears it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationHintChange {
    /// New hint.
    pub value: Option<String>,
}

/// A change to the scene tag set.
///
/// The two semantics are separate variants so they can never be mixed: an
/// overwrite replaces the whole set (possibly with nothing), an incremental
/// change merges into it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SceneTagDelta {
    /// Replace all tags.
    Overwrite(Vec<String>),
    /// Merge into the existing tags.
    Incremental {
        /// Tags to add.
        #[serde(default)]
        add: Vec<String>,
        /// Tags to remove.
        #[serde(default)]
        remove: Vec<String>,
    },
}

impl SceneTagDelta {
    /// Build a tag delta from optional `set` / `add` / `remove` lists.
    ///
    /// A present `set` wins and the other two are discarded.
    pub fn from_parts(
        set: Option<Vec<String>>,
        add: Vec<String>,
        remove: Vec<String>,
    ) -> Option<Self> {
        if let Some(set) = set {
            return Some(Self::Overwrite(set));
        }
        if add.is_empty() && remove.is_empty() {
            None
        } else {
            Some(Self::Incremental { add, remove })
        }
    }

    /// Whether applying this changes nothing.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Overwrite(_) => false,
            Self::Incremental { add, remove } => add.is_empty() && remove.is_empty(),
        }
    }
}

/// Location and tag changes for the scene.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneOp {
    /// Location hint overwrite.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_hint: Option<LocationHintChange>,
    /// Tag change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<SceneTagDelta>,
}

impl SceneOp {
    /// Whether applying this changes nothing.
    pub fn is_empty(&self) -> bool {
        self.location_hint.is_none() && self.tags.as_ref().is_none_or(SceneTagDelta::is_empty)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Entity ops
// ─────────────────────────────────────────────────────────────────────────────

/// Fields carried by an entity add/update.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityPatch {
    /// Primary key.
    pub name: String,
    /// New kind, if given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<EntityKind>,
    /// New base info, if given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_info: Option<String>,
    /// Child locations to union in.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children_names: Vec<String>,
    /// Characters to union in.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub characters: Vec<String>,
    /// Locations to union in.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<String>,
    /// Bound parameters to union in.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<String>,
}

impl EntityPatch {
    /// Patch with only a name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// A change to the runtime entity map.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum EntityOp {
    /// Create, or merge into an existing runtime entity.
    Add(EntityPatch),
    /// Merge into an existing runtime entity; never creates.
    Update(EntityPatch),
    /// Delete the runtime entity.
    Remove {
        /// Primary key.
        name: String,
    },
}

impl EntityOp {
    /// Name of the entity this op targets.
    pub fn name(&self) -> &str {
        match self {
            Self::Add(p) | Self::Update(p) => &p.name,
            Self::Remove { name } => name,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Cast intent
// ─────────────────────────────────────────────────────────────────────────────

/// A proposal for a name to enter the cast.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CastEntry {
    /// Entity name.
    pub name: String,
    /// Requested tier; `Focus` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_layer: Option<CastTier>,
}

impl CastEntry {
    /// Entry with no tier preference.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            preferred_layer: None,
        }
    }

    /// Entry at a specific tier.
    pub fn at(name: impl Into<String>, tier: CastTier) -> Self {
        Self {
            name: name.into(),
            preferred_layer: Some(tier),
        }
    }
}

/// Enter/leave proposals for the cast.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CastIntent {
    /// Names entering.
    #[serde(default)]
    pub enter: Vec<CastEntry>,
    /// Names leaving.
    #[serde(default)]
    pub leave: Vec<String>,
}

impl CastIntent {
    /// Whether this intent proposes nothing.
    pub fn is_empty(&self) -> bool {
        self.enter.is_empty() && self.leave.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Delta
// ─────────────────────────────────────────────────────────────────────────────

/// An immutable bundle of intended state changes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delta {
    /// Variable changes, applied in order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variable_ops: Option<Vec<VariableOp>>,
    /// Scene changes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene_op: Option<SceneOp>,
    /// Runtime entity changes, applied in order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_ops: Option<Vec<EntityOp>>,
    /// Cast enter/leave proposals.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cast_intent: Option<CastIntent>,
    /// Opaque retrieval payload; replaces the state's payload wholesale.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retrieval_intent: Option<Value>,
}

impl Delta {
    /// The no-op delta.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a delta from parts, omitting every empty part.
    pub fn compose(
        variable_ops: Vec<VariableOp>,
        scene_op: Option<SceneOp>,
        entity_ops: Vec<EntityOp>,
        retrieval_intent: Option<Value>,
    ) -> Self {
        Self {
            variable_ops: Some(variable_ops).filter(|ops| !ops.is_empty()),
            scene_op: scene_op.filter(|op| !op.is_empty()),
            entity_ops: Some(entity_ops).filter(|ops| !ops.is_empty()),
            cast_intent: None,
            retrieval_intent: retrieval_intent.filter(|v| !v.is_null()),
        }
    }

    /// Attach a cast intent, dropping it if it proposes nothing.
    #[must_use]
    pub fn with_cast_intent(mut self, intent: CastIntent) -> Self {
        self.cast_intent = Some(intent).filter(|i| !i.is_empty());
        self
    }

    /// Whether applying this delta changes nothing.
    pub fn is_empty(&self) -> bool {
        self.variable_ops.as_ref().is_none_or(Vec::is_empty)
            && self.scene_op.as_ref().is_none_or(SceneOp::is_empty)
            && self.entity_ops.as_ref().is_none_or(Vec::is_empty)
            && self.cast_intent.as_ref().is_none_or(CastIntent::is_empty)
            && self.retrieval_intent.as_ref().is_none_or(Value::is_null)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn compose_omits_empty_parts() {
        let delta = Delta::compose(Vec::new(), Some(SceneOp::default()), Vec::new(), None);
        assert_eq!(delta, Delta::empty());
        assert!(delta.is_empty());
    }

    #[test]
    fn compose_keeps_populated_parts() {
        let delta = Delta::compose(
            vec![VariableOp::set("Mood", "calm")],
            None,
            vec![EntityOp::Remove { name: "Bob".into() }],
            Some(json!({"query": "tavern"})),
        );
        assert!(!delta.is_empty());
        assert_eq!(delta.variable_ops.as_ref().map(Vec::len), Some(1));
        assert!(delta.scene_op.is_none());
        assert_eq!(delta.entity_ops.as_ref().map(Vec::len), Some(1));
        assert!(delta.retrieval_intent.is_some());
    }

    #[test]
    fn empty_cast_intent_is_dropped() {
        let delta = Delta::empty().with_cast_intent(CastIntent::default());
        assert!(delta.cast_intent.is_none());
        let delta = Delta::empty().with_cast_intent(CastIntent {
            enter: vec![CastEntry::new("Aria")],
            leave: Vec::new(),
        });
        assert!(!delta.is_empty());
    }

    #[test]
    fn hand_built_empty_parts_count_as_empty() {
        let delta = Delta {
            variable_ops: Some(Vec::new()),
            entity_ops: Some(Vec::new()),
            retrieval_intent: Some(Value::Null),
            ..Delta::default()
        };
        assert!(delta.is_empty());
    }

    #[test]
    fn overwrite_with_no_tags_is_not_empty() {
        let op = SceneOp {
            location_hint: None,
            tags: Some(SceneTagDelta::Overwrite(Vec::new())),
        };
        assert!(!op.is_empty());
    }

    #[test]
    fn tag_set_wins_over_add_and_remove() {
        let tags = SceneTagDelta::from_parts(
            Some(vec!["a".into()]),
            vec!["b".into()],
            vec!["c".into()],
        );
        assert_eq!(tags, Some(SceneTagDelta::Overwrite(vec!["a".into()])));
        assert_eq!(SceneTagDelta::from_parts(None, Vec::new(), Vec::new()), None);
    }

    #[test]
    fn serde_roundtrip_full_delta() {
        let delta = Delta::compose(
            vec![
                VariableOp::symbolic("Affection", "up_small")
                    .in_scope(VariableScope::Relationship)
                    .for_subject("Aria")
                    .toward("Player"),
            ],
            Some(SceneOp {
                location_hint: Some(LocationHintChange {
                    value: Some("Tavern".into()),
                }),
                tags: Some(SceneTagDelta::Incremental {
                    add: vec!["night".into()],
                    remove: Vec::new(),
                }),
            }),
            vec![EntityOp::Add(EntityPatch {
                kind: Some(EntityKind::Location),
                ..EntityPatch::named("Tavern")
            })],
            None,
        )
        .with_cast_intent(CastIntent {
            enter: vec![CastEntry::at("Aria", CastTier::PresentSupporting)],
            leave: vec!["Bob".into()],
        });

        let json = serde_json::to_value(&delta).unwrap();
        assert_eq!(json["variableOps"][0]["operation"], "symbolic");
        assert_eq!(json["variableOps"][0]["scope"], "relationship");
        assert_eq!(json["entityOps"][0]["op"], "add");
        assert_eq!(json["castIntent"]["enter"][0]["preferredLayer"], "presentSupporting");
        assert!(json.get("retrievalIntent").is_none());

        let back: Delta = serde_json::from_value(json).unwrap();
        assert_eq!(back, delta);
    }

    #[test]
    fn scope_parse_aliases() {
        assert_eq!(VariableScope::parse("Character"), Some(VariableScope::Character));
        assert_eq!(VariableScope::parse(" rel "), Some(VariableScope::Relationship));
        assert_eq!(VariableScope::parse("world"), Some(VariableScope::Global));
        assert_eq!(VariableScope::parse("galaxy"), None);
    }
}
