//! The engine state snapshot.
//!
//! [`EngineState`] is a plain value: it owns all of its data, holds no
//! references to the log or configuration, and `clone()` is a deep copy.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cast::CastState;
use crate::delta::VariableScope;
use crate::entities::EntityRuntime;
use crate::value::Scalar;

/// A node in a variable bucket: either a stored value or a nested map.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariableNode {
    /// Leaf value.
    Value(Scalar),
    /// Nested level keyed by subject, parameter or target.
    Branch(BTreeMap<String, VariableNode>),
}

/// One variable bucket: a nested map addressed by a path of keys.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariableBucket(BTreeMap<String, VariableNode>);

impl VariableBucket {
    /// Value stored at `path`, if the path ends on a leaf.
    pub fn get(&self, path: &[&str]) -> Option<&Scalar> {
        let (last, parents) = path.split_last()?;
        let mut level = &self.0;
        for key in parents {
            match level.get(*key)? {
                VariableNode::Branch(children) => level = children,
                VariableNode::Value(_) => return None,
            }
        }
        match level.get(*last)? {
            VariableNode::Value(v) => Some(v),
            VariableNode::Branch(_) => None,
        }
    }

    /// Store `value` at `path`, creating intermediate maps.
    ///
    /// A leaf sitting where an intermediate map is needed is replaced.
    pub fn set(&mut self, path: &[&str], value: Scalar) {
        let Some((last, parents)) = path.split_last() else {
            return;
        };
        let mut level = &mut self.0;
        for key in parents {
            let node = level
                .entry((*key).to_string())
                .or_insert_with(|| VariableNode::Branch(BTreeMap::new()));
            if matches!(node, VariableNode::Value(_)) {
                *node = VariableNode::Branch(BTreeMap::new());
            }
            let VariableNode::Branch(children) = node else {
                return;
            };
            level = children;
        }
        let _ = level.insert((*last).to_string(), VariableNode::Value(value));
    }

    /// Whether the bucket holds nothing.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Top-level entries.
    pub fn entries(&self) -> &BTreeMap<String, VariableNode> {
        &self.0
    }
}

/// The four variable buckets.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VariableBuckets {
    /// subject → parameter → value
    pub character: VariableBucket,
    /// subject → parameter → target → value
    pub relationship: VariableBucket,
    /// parameter → value
    pub scene: VariableBucket,
    /// parameter → value
    pub global: VariableBucket,
}

impl VariableBuckets {
    /// Bucket for a scope.
    pub fn bucket(&self, scope: VariableScope) -> &VariableBucket {
        match scope {
            VariableScope::Character => &self.character,
            VariableScope::Relationship => &self.relationship,
            VariableScope::Scene => &self.scene,
            VariableScope::Global => &self.global,
        }
    }

    /// Mutable bucket for a scope.
    pub fn bucket_mut(&mut self, scope: VariableScope) -> &mut VariableBucket {
        match scope {
            VariableScope::Character => &mut self.character,
            VariableScope::Relationship => &mut self.relationship,
            VariableScope::Scene => &mut self.scene,
            VariableScope::Global => &mut self.global,
        }
    }
}

/// Scene record.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SceneState {
    /// Free-form location hint.
    pub location_hint: Option<String>,
    /// Scene tags, deduplicated and kept in lexicographic order.
    pub scene_tags: BTreeSet<String>,
}

/// The authoritative snapshot at one log position.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineState {
    /// Variable buckets.
    pub variables: VariableBuckets,
    /// Scene record.
    pub scene: SceneState,
    /// Cast membership.
    pub cast: CastState,
    /// Entities created or overridden at runtime, by name.
    pub runtime_entities: BTreeMap<String, EntityRuntime>,
    /// Opaque retrieval payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retrieval_intent: Option<Value>,
}

impl EngineState {
    /// State before any log entry.
    pub fn initial() -> Self {
        Self::default()
    }

    /// Shorthand for reading a variable.
    pub fn variable(&self, scope: VariableScope, path: &[&str]) -> Option<&Scalar> {
        self.variables.bucket(scope).get(path)
    }
}
