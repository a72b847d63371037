//! Strict parsing of loosely shaped ChangeSet JSON.
//!
//! Upstream producers emit JSON with inconsistent field names. Each entry is
//! parsed on its own into a closed raw shape with a finite alias table;
//! anything that does not fit is quarantined as a [`RejectedEntry`] instead of
//! being passed through.

use serde::Deserialize;
use serde::de::IgnoredAny;
use serde_json::{Map, Value};
use tracing::warn;

use super::{
    CastEntry, CastIntent, Delta, EntityOp, EntityPatch, LocationHintChange, SceneOp,
    SceneTagDelta, VariableOp, VariableOperation, VariableScope,
};
use crate::cast::CastTier;
use crate::entities::EntityKind;
use crate::errors::{DeltaError, Result};
use crate::value::Scalar;

/// Output of [`normalize_raw`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NormalizedDelta {
    /// Everything that parsed cleanly.
    pub delta: Delta,
    /// Entries that were quarantined.
    pub rejected: Vec<RejectedEntry>,
}

/// A raw entry that did not make it into the [`Delta`].
#[derive(Clone, Debug, PartialEq)]
pub struct RejectedEntry {
    /// Section the entry came from (`variableOps`, `sceneOp`, ..., or `root`).
    pub section: String,
    /// Position within the section's list, for list sections.
    pub index: Option<usize>,
    /// Why it was rejected.
    pub reason: DeltaError,
}

// ─────────────────────────────────────────────────────────────────────────────
// Raw shapes
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawVariableOp {
    #[serde(default, alias = "parameter", alias = "param", alias = "key")]
    parameter_name: Option<String>,
    #[serde(default, alias = "subject", alias = "character", alias = "owner")]
    subject_name: Option<String>,
    #[serde(default, alias = "target", alias = "toward")]
    target_name: Option<String>,
    #[serde(default, alias = "op")]
    operation: Option<String>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    value: Option<Value>,
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default, rename = "reason", alias = "note")]
    _reason: Option<IgnoredAny>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawSceneOp {
    #[serde(default, alias = "location", deserialize_with = "present_or_null")]
    location_hint: Option<Option<String>>,
    #[serde(default, alias = "tags")]
    scene_tags: Option<RawTags>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTags {
    List(Vec<String>),
    Parts(RawTagParts),
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTagParts {
    #[serde(default, alias = "replace")]
    set: Option<Vec<String>>,
    #[serde(default)]
    add: Vec<String>,
    #[serde(default)]
    remove: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawEntityOp {
    #[serde(default, alias = "action")]
    op: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default, alias = "type")]
    kind: Option<String>,
    #[serde(default, alias = "info", alias = "description")]
    base_info: Option<String>,
    #[serde(default, alias = "children")]
    children_names: Vec<String>,
    #[serde(default)]
    characters: Vec<String>,
    #[serde(default)]
    locations: Vec<String>,
    #[serde(default)]
    parameters: Vec<String>,
    #[serde(default, rename = "reason", alias = "note")]
    _reason: Option<IgnoredAny>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawCastEntry {
    #[serde(default)]
    name: Option<String>,
    #[serde(default, alias = "layer", alias = "tier")]
    preferred_layer: Option<String>,
}

/// Distinguishes an explicit `null` from an absent field.
fn present_or_null<'de, D>(deserializer: D) -> std::result::Result<Option<Option<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

// ─────────────────────────────────────────────────────────────────────────────
// Sections
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    Variables,
    Scene,
    Entities,
    Cast,
    Retrieval,
}

impl Section {
    fn from_key(key: &str) -> Option<Self> {
        match key {
            "variableOps" | "variables" | "vars" => Some(Self::Variables),
            "sceneOp" | "scene" => Some(Self::Scene),
            "entityOps" | "entities" => Some(Self::Entities),
            "castIntent" | "cast" => Some(Self::Cast),
            "retrievalIntent" | "retrieval" => Some(Self::Retrieval),
            _ => None,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Variables => "variableOps",
            Self::Scene => "sceneOp",
            Self::Entities => "entityOps",
            Self::Cast => "castIntent",
            Self::Retrieval => "retrievalIntent",
        }
    }
}

#[derive(Default)]
struct Collector {
    variable_ops: Vec<VariableOp>,
    scene_op: Option<SceneOp>,
    entity_ops: Vec<EntityOp>,
    cast: CastIntent,
    retrieval: Option<Value>,
    rejected: Vec<RejectedEntry>,
}

impl Collector {
    fn reject(&mut self, section: &str, index: Option<usize>, reason: DeltaError) {
        warn!(section, ?index, reason = %reason, "quarantined raw delta entry");
        self.rejected.push(RejectedEntry {
            section: section.to_string(),
            index,
            reason,
        });
    }

    fn list<'a>(&mut self, section: Section, value: &'a Value) -> Option<&'a Vec<Value>> {
        match value {
            Value::Array(items) => Some(items),
            Value::Null => None,
            other => {
                self.reject(
                    section.label(),
                    None,
                    DeltaError::Malformed(format!("expected a list, got {}", type_name(other))),
                );
                None
            }
        }
    }

    fn take(&mut self, section: Section, value: &Value) {
        match section {
            Section::Variables => {
                let Some(items) = self.list(section, value) else {
                    return;
                };
                for (index, item) in items.iter().enumerate() {
                    match parse_variable_op(item) {
                        Ok(op) => self.variable_ops.push(op),
                        Err(reason) => self.reject(section.label(), Some(index), reason),
                    }
                }
            }
            Section::Entities => {
                let Some(items) = self.list(section, value) else {
                    return;
                };
                for (index, item) in items.iter().enumerate() {
                    match parse_entity_op(item) {
                        Ok(op) => self.entity_ops.push(op),
                        Err(reason) => self.reject(section.label(), Some(index), reason),
                    }
                }
            }
            Section::Scene => {
                if value.is_null() {
                    return;
                }
                match parse_scene_op(value) {
                    Ok(op) => self.scene_op = Some(op),
                    Err(reason) => self.reject(section.label(), None, reason),
                }
            }
            Section::Cast => self.take_cast(value),
            Section::Retrieval => {
                if !value.is_null() {
                    self.retrieval = Some(value.clone());
                }
            }
        }
    }

    fn take_cast(&mut self, value: &Value) {
        let label = Section::Cast.label();
        let obj = match value {
            Value::Null => return,
            Value::Object(obj) => obj,
            other => {
                self.reject(
                    label,
                    None,
                    DeltaError::Malformed(format!("expected an object, got {}", type_name(other))),
                );
                return;
            }
        };
        for key in obj.keys().filter(|k| *k != "enter" && *k != "leave") {
            self.reject(label, None, DeltaError::Malformed(format!("unknown field `{key}`")));
        }
        if let Some(enter) = obj.get("enter").and_then(|v| self.list(Section::Cast, v)) {
            for (index, item) in enter.iter().enumerate() {
                match parse_cast_entry(item) {
                    Ok(entry) => self.cast.enter.push(entry),
                    Err(reason) => self.reject(label, Some(index), reason),
                }
            }
        }
        if let Some(leave) = obj.get("leave").and_then(|v| self.list(Section::Cast, v)) {
            for (index, item) in leave.iter().enumerate() {
                match item.as_str().map(str::trim) {
                    Some(name) if !name.is_empty() => self.cast.leave.push(name.to_string()),
                    Some(_) => self.reject(label, Some(index), DeltaError::MissingName),
                    None => self.reject(
                        label,
                        Some(index),
                        DeltaError::Malformed("leave entries must be names".into()),
                    ),
                }
            }
        }
    }

    fn finish(self) -> NormalizedDelta {
        let delta = Delta::compose(
            self.variable_ops,
            self.scene_op,
            self.entity_ops,
            self.retrieval,
        )
        .with_cast_intent(self.cast);
        NormalizedDelta {
            delta,
            rejected: self.rejected,
        }
    }
}

/// Parse a raw ChangeSet into a [`Delta`], quarantining bad entries.
///
/// `null` yields an empty delta. Anything other than an object at the top
/// level is rejected as a whole.
pub fn normalize_raw(raw: &Value) -> NormalizedDelta {
    let mut collector = Collector::default();
    let obj: &Map<String, Value> = match raw {
        Value::Null => return NormalizedDelta::default(),
        Value::Object(obj) => obj,
        other => {
            collector.reject(
                "root",
                None,
                DeltaError::Malformed(format!("expected an object, got {}", type_name(other))),
            );
            return collector.finish();
        }
    };

    for (key, value) in obj {
        match Section::from_key(key) {
            Some(section) => collector.take(section, value),
            None => collector.reject("root", None, DeltaError::UnknownSection(key.clone())),
        }
    }
    collector.finish()
}

// ─────────────────────────────────────────────────────────────────────────────
// Entry parsers
// ─────────────────────────────────────────────────────────────────────────────

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn non_blank(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn malformed(err: &serde_json::Error) -> DeltaError {
    DeltaError::Malformed(err.to_string())
}

/// Operation keyword, and whether the value must be negated.
fn parse_operation(raw: &str) -> Result<(VariableOperation, bool)> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "set" | "assign" => Ok((VariableOperation::Set, false)),
        "add" | "inc" | "increment" => Ok((VariableOperation::Add, false)),
        "sub" | "subtract" | "dec" | "decrement" => Ok((VariableOperation::Add, true)),
        "symbolic" => Ok((VariableOperation::Symbolic, false)),
        _ => Err(DeltaError::UnknownOperation(raw.to_string())),
    }
}

fn scalar(value: Option<&Value>) -> Result<Option<Scalar>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(v) => Scalar::from_json(v)
            .map(Some)
            .ok_or_else(|| DeltaError::InvalidValue(type_name(v).to_string())),
    }
}

fn numeric(value: Option<&Value>) -> Result<f64> {
    match value {
        None | Some(Value::Null) => Err(DeltaError::MissingValue { operation: "add" }),
        Some(Value::Number(n)) => n.as_f64().ok_or(DeltaError::NonNumericValue),
        Some(Value::String(s)) => {
            let n: f64 = s.trim().parse().map_err(|_| DeltaError::NonNumericValue)?;
            if n.is_finite() {
                Ok(n)
            } else {
                Err(DeltaError::NonFiniteValue(s.trim().to_string()))
            }
        }
        Some(_) => Err(DeltaError::NonNumericValue),
    }
}

fn parse_variable_op(raw: &Value) -> Result<VariableOp> {
    let raw = RawVariableOp::deserialize(raw).map_err(|e| malformed(&e))?;

    let mut subject = non_blank(raw.subject_name);
    let mut target = non_blank(raw.target_name);
    let parameter = match non_blank(raw.parameter_name) {
        Some(name) => name,
        None => {
            let path = non_blank(raw.path).ok_or(DeltaError::MissingParameter)?;
            let segments: Vec<&str> = path.split('.').map(str::trim).collect();
            if segments.iter().any(|s| s.is_empty()) {
                return Err(DeltaError::Malformed(format!("bad path `{path}`")));
            }
            match segments.as_slice() {
                [param] => (*param).to_string(),
                [subj, param] => {
                    let _ = subject.get_or_insert_with(|| (*subj).to_string());
                    (*param).to_string()
                }
                [subj, param, tgt] => {
                    let _ = subject.get_or_insert_with(|| (*subj).to_string());
                    let _ = target.get_or_insert_with(|| (*tgt).to_string());
                    (*param).to_string()
                }
                _ => return Err(DeltaError::Malformed(format!("bad path `{path}`"))),
            }
        }
    };

    let scope = match non_blank(raw.scope) {
        Some(s) => Some(VariableScope::parse(&s).ok_or(DeltaError::UnknownScope(s))?),
        None => None,
    };

    let symbol = non_blank(raw.symbol);
    let (operation, negate) = match raw.operation.as_deref().map(str::trim) {
        Some(op) if !op.is_empty() => parse_operation(op)?,
        _ if symbol.is_some() => (VariableOperation::Symbolic, false),
        _ => (VariableOperation::Set, false),
    };

    let mut op = match operation {
        VariableOperation::Set => {
            let value = scalar(raw.value.as_ref())?.ok_or(DeltaError::MissingValue { operation: "set" })?;
            VariableOp::set(parameter, value)
        }
        VariableOperation::Add => {
            let amount = numeric(raw.value.as_ref())?;
            VariableOp::add(parameter, if negate { -amount } else { amount })
        }
        VariableOperation::Symbolic => {
            VariableOp::symbolic(parameter, symbol.ok_or(DeltaError::MissingSymbol)?)
        }
    };
    op.scope = scope;
    op.subject_name = subject;
    op.target_name = target;
    Ok(op)
}

fn clean_tags(tags: Vec<String>) -> Vec<String> {
    tags.into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

fn parse_scene_op(raw: &Value) -> Result<SceneOp> {
    let raw = RawSceneOp::deserialize(raw).map_err(|e| malformed(&e))?;
    let location_hint = raw.location_hint.map(|hint| LocationHintChange {
        value: non_blank(hint),
    });
    let tags = match raw.scene_tags {
        None => None,
        Some(RawTags::List(add)) => SceneTagDelta::from_parts(None, clean_tags(add), Vec::new()),
        Some(RawTags::Parts(parts)) => SceneTagDelta::from_parts(
            parts.set.map(clean_tags),
            clean_tags(parts.add),
            clean_tags(parts.remove),
        ),
    };
    Ok(SceneOp { location_hint, tags })
}

fn parse_entity_op(raw: &Value) -> Result<EntityOp> {
    let raw = RawEntityOp::deserialize(raw).map_err(|e| malformed(&e))?;
    let name = non_blank(raw.name).ok_or(DeltaError::MissingName)?;
    let kind = match non_blank(raw.kind) {
        Some(k) => Some(EntityKind::parse(&k).ok_or(DeltaError::UnknownEntityKind(k))?),
        None => None,
    };
    let patch = EntityPatch {
        name,
        kind,
        base_info: raw.base_info,
        children_names: raw.children_names,
        characters: raw.characters,
        locations: raw.locations,
        parameters: raw.parameters,
    };
    let action = non_blank(raw.op).map(|a| a.to_ascii_lowercase());
    match action.as_deref() {
        None | Some("add" | "create") => Ok(EntityOp::Add(patch)),
        Some("update") => Ok(EntityOp::Update(patch)),
        Some("remove" | "delete") => Ok(EntityOp::Remove { name: patch.name }),
        Some(other) => Err(DeltaError::UnknownEntityAction(other.to_string())),
    }
}

fn parse_cast_entry(raw: &Value) -> Result<CastEntry> {
    if let Value::String(name) = raw {
        let name = name.trim();
        if name.is_empty() {
            return Err(DeltaError::MissingName);
        }
        return Ok(CastEntry::new(name));
    }
    let raw = RawCastEntry::deserialize(raw).map_err(|e| malformed(&e))?;
    let name = non_blank(raw.name).ok_or(DeltaError::MissingName)?;
    match non_blank(raw.preferred_layer) {
        Some(tier) => {
            let parsed = CastTier::parse(&tier).ok_or(DeltaError::UnknownCastTier(tier))?;
            Ok(CastEntry::at(name, parsed))
        }
        None => Ok(CastEntry::new(name)),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
