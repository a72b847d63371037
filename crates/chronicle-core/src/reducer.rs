//! The state reducer: `apply(state, delta) -> state'`.
//!
//! Pure and total. Within one delta the parts are applied in a fixed order:
//! variable ops, scene op, entity ops, cast intent, retrieval payload. Entity
//! ops precede the cast so that an entity added in the same delta can enter
//! the cast. Anything malformed is dropped with a diagnostic.

use chronicle_settings::ReducerSettings;
use metrics::counter;
use tracing::{debug, warn};

use crate::cast::apply_cast_intent;
use crate::delta::{Delta, EntityOp, EntityPatch, SceneOp, SceneTagDelta, VariableOp, VariableOperation, VariableScope};
use crate::entities::{EntityRuntime, union_into};
use crate::params::ParameterDefinition;
use crate::state::EngineState;
use crate::symbolic::{self, ResolvedOperation};
use crate::value::Scalar;
use crate::world::WorldConfig;

/// Why a variable op was not applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropReason {
    /// Blank parameter name.
    MissingParameter,
    /// Short-term parameters are disabled.
    ShortTermDisabled,
    /// Character or Relationship scope without a subject.
    MissingSubject,
    /// Relationship scope without a target.
    MissingTarget,
    /// Set/Add without a value.
    MissingValue,
    /// Add with a non-numeric operand.
    NonNumericValue,
    /// Add onto a non-numeric stored value.
    NonNumericCurrent,
    /// Symbolic op without a symbol.
    MissingSymbol,
    /// Symbolic op on a parameter with no definition.
    UnknownParameter,
    /// Set or Add that would store NaN or an infinity.
    NonFiniteResult,
}

impl DropReason {
    /// Stable snake_case name, used as a metrics label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingParameter => "missing_parameter",
            Self::ShortTermDisabled => "short_term_disabled",
            Self::MissingSubject => "missing_subject",
            Self::MissingTarget => "missing_target",
            Self::MissingValue => "missing_value",
            Self::NonNumericValue => "non_numeric_value",
            Self::NonNumericCurrent => "non_numeric_current",
            Self::MissingSymbol => "missing_symbol",
            Self::UnknownParameter => "unknown_parameter",
            Self::NonFiniteResult => "non_finite_result",
        }
    }
}

/// Result of applying one variable op.
#[derive(Clone, Debug, PartialEq)]
pub enum OpOutcome {
    /// Value written at `path` in the `scope` bucket.
    Applied {
        /// Bucket written to.
        scope: VariableScope,
        /// Storage path within the bucket.
        path: Vec<String>,
        /// Stored value.
        value: Scalar,
    },
    /// Resolved to a no-op.
    Unchanged,
    /// Not applied.
    Dropped(DropReason),
}

/// Apply `delta` to `state`, returning a new state.
///
/// The input is never modified. An empty delta returns an equal copy.
/// Dropped variable ops are counted in `chronicle_variable_ops_dropped_total`
/// by reason.
pub fn apply(
    state: &EngineState,
    delta: &Delta,
    world: &WorldConfig,
    settings: &ReducerSettings,
) -> EngineState {
    let mut next = state.clone();
    if delta.is_empty() {
        return next;
    }

    for op in delta.variable_ops.iter().flatten() {
        if let OpOutcome::Dropped(reason) = apply_variable_op(&mut next, op, world, settings) {
            counter!("chronicle_variable_ops_dropped_total", "reason" => reason.as_str()).increment(1);
        }
    }

    if let Some(scene) = &delta.scene_op {
        apply_scene_op(&mut next, scene);
    }

    for op in delta.entity_ops.iter().flatten() {
        apply_entity_op(&mut next, op);
    }

    if let Some(intent) = delta.cast_intent.as_ref().filter(|i| !i.is_empty()) {
        let view = world.entity_view(&next);
        next.cast = apply_cast_intent(&next.cast, intent, &view);
    }

    if let Some(payload) = delta.retrieval_intent.as_ref().filter(|v| !v.is_null()) {
        next.retrieval_intent = Some(payload.clone());
    }

    next
}

// ─────────────────────────────────────────────────────────────────────────────
// Variable ops
// ─────────────────────────────────────────────────────────────────────────────

fn non_blank(value: Option<&String>) -> Option<&str> {
    value.map(|s| s.trim()).filter(|s| !s.is_empty())
}

fn resolve_scope(op: &VariableOp, def: Option<&ParameterDefinition>) -> VariableScope {
    if let Some(scope) = op.scope {
        return scope;
    }
    if let Some(def) = def {
        if def.is_short_term {
            return VariableScope::Character;
        }
        if let Some(scope) = def.scope {
            return scope;
        }
    }
    if non_blank(op.subject_name.as_ref()).is_some() {
        VariableScope::Character
    } else {
        VariableScope::Global
    }
}

/// Apply a single variable op in place.
pub fn apply_variable_op(
    state: &mut EngineState,
    op: &VariableOp,
    world: &WorldConfig,
    settings: &ReducerSettings,
) -> OpOutcome {
    let requested = op.parameter_name.trim();
    if requested.is_empty() {
        warn!("dropping variable op without a parameter name");
        return OpOutcome::Dropped(DropReason::MissingParameter);
    }
    let def = world.parameter(requested);
    if def.is_some_and(|d| d.is_short_term) && !settings.short_term_enabled {
        debug!(parameter = requested, "short-term parameters disabled, dropping op");
        return OpOutcome::Dropped(DropReason::ShortTermDisabled);
    }
    let parameter = def.map_or(requested, |d| d.name.as_str());

    let scope = resolve_scope(op, def);
    let subject = non_blank(op.subject_name.as_ref());
    let target = non_blank(op.target_name.as_ref());
    match scope {
        VariableScope::Character | VariableScope::Relationship if subject.is_none() => {
            debug!(parameter, scope = scope.as_str(), "dropping op without a subject");
            return OpOutcome::Dropped(DropReason::MissingSubject);
        }
        VariableScope::Relationship if target.is_none() => {
            debug!(parameter, "dropping relationship op without a target");
            return OpOutcome::Dropped(DropReason::MissingTarget);
        }
        _ => {}
    }

    let path: Vec<&str> = subject.into_iter().chain([parameter]).chain(target).collect();
    let bucket = state.variables.bucket_mut(scope);
    let current = bucket.get(&path);

    let value = match op.operation {
        VariableOperation::Set => match &op.value {
            Some(Scalar::Number(n)) if !n.is_finite() => {
                warn!(parameter, value = *n, "dropping set op with a non-finite number");
                return OpOutcome::Dropped(DropReason::NonFiniteResult);
            }
            Some(value) => value.clone(),
            None => {
                debug!(parameter, "dropping set op without a value");
                return OpOutcome::Dropped(DropReason::MissingValue);
            }
        },
        VariableOperation::Add => {
            let Some(amount) = op.value.as_ref().map(Scalar::as_f64) else {
                debug!(parameter, "dropping add op without a value");
                return OpOutcome::Dropped(DropReason::MissingValue);
            };
            let Some(amount) = amount else {
                warn!(parameter, "dropping add op with a non-numeric operand");
                return OpOutcome::Dropped(DropReason::NonNumericValue);
            };
            let base = match current {
                None => 0.0,
                Some(Scalar::Number(n)) => *n,
                Some(other) => {
                    warn!(parameter, current = %other, "dropping add onto a non-numeric value");
                    return OpOutcome::Dropped(DropReason::NonNumericCurrent);
                }
            };
            let sum = base + amount;
            if !sum.is_finite() {
                warn!(parameter, base, amount, "dropping add with a non-finite result");
                return OpOutcome::Dropped(DropReason::NonFiniteResult);
            }
            Scalar::Number(sum)
        }
        VariableOperation::Symbolic => {
            let Some(symbol) = non_blank(op.symbol.as_ref()) else {
                debug!(parameter, "dropping symbolic op without a symbol");
                return OpOutcome::Dropped(DropReason::MissingSymbol);
            };
            let Some(def) = def else {
                debug!(parameter, symbol, "dropping symbolic op on an undefined parameter");
                return OpOutcome::Dropped(DropReason::UnknownParameter);
            };
            let resolution = symbolic::resolve(symbol, current, def);
            if resolution.clamped {
                debug!(parameter, symbol, "symbolic result clamped to range");
            }
            match resolution.value {
                Some(value) if resolution.operation != ResolvedOperation::Keep => value,
                _ => return OpOutcome::Unchanged,
            }
        }
    };

    bucket.set(&path, value.clone());
    OpOutcome::Applied {
        scope,
        path: path.into_iter().map(String::from).collect(),
        value,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Scene, entities
// ─────────────────────────────────────────────────────────────────────────────

fn clean(tag: &str) -> Option<String> {
    let tag = tag.trim();
    (!tag.is_empty()).then(|| tag.to_string())
}

fn apply_scene_op(state: &mut EngineState, op: &SceneOp) {
    if let Some(change) = &op.location_hint {
        state.scene.location_hint = change.value.as_deref().and_then(clean);
    }
    match &op.tags {
        Some(SceneTagDelta::Overwrite(tags)) => {
            state.scene.scene_tags = tags.iter().filter_map(|t| clean(t)).collect();
        }
        Some(SceneTagDelta::Incremental { add, remove }) => {
            state.scene.scene_tags.extend(add.iter().filter_map(|t| clean(t)));
            for tag in remove.iter().filter_map(|t| clean(t)) {
                let _ = state.scene.scene_tags.remove(&tag);
            }
        }
        None => {}
    }
}

fn merge_patch(entity: &mut EntityRuntime, patch: &EntityPatch) {
    if let Some(kind) = patch.kind {
        entity.kind = kind;
    }
    if let Some(info) = &patch.base_info {
        entity.base_info = Some(info.clone());
    }
    union_into(&mut entity.children_names, &patch.children_names);
    union_into(&mut entity.characters, &patch.characters);
    union_into(&mut entity.locations, &patch.locations);
    union_into(&mut entity.parameters, &patch.parameters);
}

fn apply_entity_op(state: &mut EngineState, op: &EntityOp) {
    let name = op.name().trim();
    if name.is_empty() {
        debug!("dropping entity op without a name");
        return;
    }
    match op {
        EntityOp::Add(patch) => {
            let entity = state
                .runtime_entities
                .entry(name.to_string())
                .or_insert_with(|| EntityRuntime {
                    name: name.to_string(),
                    ..EntityRuntime::default()
                });
            merge_patch(entity, patch);
        }
        EntityOp::Update(patch) => match state.runtime_entities.get_mut(name) {
            Some(entity) => merge_patch(entity, patch),
            None => debug!(name, "entity update for a missing runtime entity"),
        },
        EntityOp::Remove { .. } => {
            if state.runtime_entities.remove(name).is_none() {
                debug!(name, "entity remove for a missing runtime entity");
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cast::{CastState, CastTier};
    use crate::delta::{CastEntry, CastIntent, LocationHintChange};
    use crate::entities::{EntityDefinition, EntityKind};
    use crate::params::ParameterType;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn world() -> WorldConfig {
        WorldConfig {
            parameters: vec![
                ParameterDefinition::new("Affection", ParameterType::Number)
                    .with_scope(VariableScope::Relationship)
                    .with_range(0.0, 100.0),
                ParameterDefinition::new("Mood", ParameterType::Enum)
                    .with_enum_values(["calm", "tense", "angry"])
                    .short_term(),
                ParameterDefinition::new("Weather", ParameterType::Text).with_scope(VariableScope::Scene),
                ParameterDefinition::new("Gold", ParameterType::Number),
            ],
            entities: vec![
                EntityDefinition::character("Aria"),
                EntityDefinition::character("Bob"),
                EntityDefinition::location("Tavern"),
            ],
            ..WorldConfig::default()
        }
    }

    fn settings() -> ReducerSettings {
        ReducerSettings::default()
    }

    fn vars(ops: Vec<VariableOp>) -> Delta {
        Delta::compose(ops, None, Vec::new(), None)
    }

    fn num(n: f64) -> Scalar {
        Scalar::Number(n)
    }

    // ── variable ops ─────────────────────────────────────────────────────

    #[test]
    fn symbolic_up_small_on_ranged_relationship_value() {
        let mut state = EngineState::initial();
        state
            .variables
            .character
            .set(&["Aria", "Affection", "Player"], num(40.0));
        let op = VariableOp::symbolic("Affection", "up_small")
            .in_scope(VariableScope::Character)
            .for_subject("Aria")
            .toward("Player");
        let next = apply(&state, &vars(vec![op]), &world(), &settings());
        assert_eq!(
            next.variable(VariableScope::Character, &["Aria", "Affection", "Player"]),
            Some(&num(45.0))
        );
        assert_eq!(
            state.variable(VariableScope::Character, &["Aria", "Affection", "Player"]),
            Some(&num(40.0))
        );
    }

    #[test]
    fn scope_comes_from_definition() {
        let mut state = EngineState::initial();
        let op = VariableOp::set("affection", 10.0).for_subject("Aria").toward("Bob");
        let outcome = apply_variable_op(&mut state, &op, &world(), &settings());
        assert_eq!(
            outcome,
            OpOutcome::Applied {
                scope: VariableScope::Relationship,
                path: vec!["Aria".into(), "Affection".into(), "Bob".into()],
                value: num(10.0),
            }
        );
    }

    #[test]
    fn short_term_forces_character_scope() {
        let mut state = EngineState::initial();
        let op = VariableOp::set("Mood", "tense").in_scope(VariableScope::Character).for_subject("Aria");
        let outcome = apply_variable_op(&mut state, &op, &world(), &settings());
        assert_matches!(outcome, OpOutcome::Applied { scope: VariableScope::Character, .. });

        let op = VariableOp::set("Mood", "calm").for_subject("Bob");
        let outcome = apply_variable_op(&mut state, &op, &world(), &settings());
        assert_matches!(outcome, OpOutcome::Applied { scope: VariableScope::Character, .. });
    }

    #[test]
    fn short_term_disabled_drops() {
        let mut state = EngineState::initial();
        let op = VariableOp::set("Mood", "tense").for_subject("Aria");
        let disabled = ReducerSettings {
            short_term_enabled: false,
        };
        let outcome = apply_variable_op(&mut state, &op, &world(), &disabled);
        assert_eq!(outcome, OpOutcome::Dropped(DropReason::ShortTermDisabled));
        assert_eq!(state, EngineState::initial());
    }

    #[test]
    fn inferred_scopes() {
        let mut state = EngineState::initial();
        let outcome = apply_variable_op(&mut state, &VariableOp::add("Gold", 5.0), &world(), &settings());
        assert_matches!(outcome, OpOutcome::Applied { scope: VariableScope::Global, .. });

        let op = VariableOp::add("Stamina", 2.0).for_subject("Bob");
        let outcome = apply_variable_op(&mut state, &op, &world(), &settings());
        assert_matches!(outcome, OpOutcome::Applied { scope: VariableScope::Character, .. });
        assert_eq!(state.variable(VariableScope::Character, &["Bob", "Stamina"]), Some(&num(2.0)));
    }

    #[test]
    fn add_accumulates_from_zero() {
        let delta = vars(vec![VariableOp::add("Gold", 5.0), VariableOp::add("Gold", -2.0)]);
        let next = apply(&EngineState::initial(), &delta, &world(), &settings());
        assert_eq!(next.variable(VariableScope::Global, &["Gold"]), Some(&num(3.0)));
    }

    #[test]
    fn add_onto_text_is_dropped() {
        let mut state = EngineState::initial();
        state.variables.global.set(&["Gold"], Scalar::from("plenty"));
        let outcome = apply_variable_op(&mut state, &VariableOp::add("Gold", 1.0), &world(), &settings());
        assert_eq!(outcome, OpOutcome::Dropped(DropReason::NonNumericCurrent));
        let op = VariableOp {
            value: Some(Scalar::from("x")),
            ..VariableOp::add("Gold", 0.0)
        };
        let outcome = apply_variable_op(&mut state, &op, &world(), &settings());
        assert_eq!(outcome, OpOutcome::Dropped(DropReason::NonNumericValue));
    }

    #[test]
    fn non_finite_results_are_dropped() {
        let mut state = EngineState::initial();
        let big = VariableOp::add("Gold", f64::MAX);
        assert_matches!(apply_variable_op(&mut state, &big, &world(), &settings()), OpOutcome::Applied { .. });
        let outcome = apply_variable_op(&mut state, &big, &world(), &settings());
        assert_eq!(outcome, OpOutcome::Dropped(DropReason::NonFiniteResult));
        assert_eq!(state.variable(VariableScope::Global, &["Gold"]), Some(&num(f64::MAX)));

        for op in [VariableOp::add("Gold", f64::NAN), VariableOp::set("Gold", f64::INFINITY)] {
            let outcome = apply_variable_op(&mut state, &op, &world(), &settings());
            assert_eq!(outcome, OpOutcome::Dropped(DropReason::NonFiniteResult));
        }
        let next = apply(&state, &vars(vec![VariableOp::add("Gold", f64::NAN)]), &world(), &settings());
        assert_eq!(next, state);
    }

    #[test]
    fn drop_reason_labels_are_distinct() {
        let reasons = [
            DropReason::MissingParameter,
            DropReason::ShortTermDisabled,
            DropReason::MissingSubject,
            DropReason::MissingTarget,
            DropReason::MissingValue,
            DropReason::NonNumericValue,
            DropReason::NonNumericCurrent,
            DropReason::MissingSymbol,
            DropReason::UnknownParameter,
            DropReason::NonFiniteResult,
        ];
        let labels: std::collections::BTreeSet<&str> = reasons.iter().copied().map(DropReason::as_str).collect();
        assert_eq!(labels.len(), reasons.len());
        assert_eq!(DropReason::NonFiniteResult.as_str(), "non_finite_result");
    }

    #[test]
    fn path_requirements() {
        let mut state = EngineState::initial();
        let op = VariableOp::set("Trust", 1.0).in_scope(VariableScope::Character);
        assert_eq!(
            apply_variable_op(&mut state, &op, &world(), &settings()),
            OpOutcome::Dropped(DropReason::MissingSubject)
        );
        let op = VariableOp::set("Affection", 1.0).for_subject("Aria");
        assert_eq!(
            apply_variable_op(&mut state, &op, &world(), &settings()),
            OpOutcome::Dropped(DropReason::MissingTarget)
        );
        let op = VariableOp::set("  ", 1.0);
        assert_eq!(
            apply_variable_op(&mut state, &op, &world(), &settings()),
            OpOutcome::Dropped(DropReason::MissingParameter)
        );
    }

    #[test]
    fn symbolic_edge_cases() {
        let mut state = EngineState::initial();
        let op = VariableOp::symbolic("Unknown", "up_small");
        assert_eq!(
            apply_variable_op(&mut state, &op, &world(), &settings()),
            OpOutcome::Dropped(DropReason::UnknownParameter)
        );
        let op = VariableOp::symbolic("Weather", "set_rain");
        assert_eq!(apply_variable_op(&mut state, &op, &world(), &settings()), OpOutcome::Unchanged);
        assert!(state.variables.scene.is_empty());
    }

    #[test]
    fn enum_next_walks_from_unset() {
        let op = VariableOp::symbolic("Mood", "next").for_subject("Aria");
        let once = apply(&EngineState::initial(), &vars(vec![op.clone()]), &world(), &settings());
        let twice = apply(&once, &vars(vec![op]), &world(), &settings());
        assert_eq!(
            twice.variable(VariableScope::Character, &["Aria", "Mood"]),
            Some(&Scalar::from("tense"))
        );
    }

    // ── scene ────────────────────────────────────────────────────────────

    #[test]
    fn tag_overwrite_wins() {
        let mut state = EngineState::initial();
        let _ = state.scene.scene_tags.insert("old".into());
        let scene = SceneOp {
            location_hint: None,
            tags: SceneTagDelta::from_parts(Some(vec!["a".into()]), vec!["b".into()], Vec::new()),
        };
        let delta = Delta::compose(Vec::new(), Some(scene), Vec::new(), None);
        let next = apply(&state, &delta, &world(), &settings());
        assert_eq!(next.scene.scene_tags.iter().collect::<Vec<_>>(), vec!["a"]);
    }

    #[test]
    fn tag_overwrite_to_empty_and_incremental() {
        let mut state = EngineState::initial();
        state.scene.scene_tags = ["rain", "night"].into_iter().map(String::from).collect();

        let inc = SceneOp {
            location_hint: Some(LocationHintChange {
                value: Some(" Tavern ".into()),
            }),
            tags: Some(SceneTagDelta::Incremental {
                add: vec!["crowded".into(), " ".into()],
                remove: vec!["rain".into()],
            }),
        };
        let next = apply(&state, &Delta::compose(Vec::new(), Some(inc), Vec::new(), None), &world(), &settings());
        assert_eq!(next.scene.location_hint.as_deref(), Some("Tavern"));
        assert_eq!(next.scene.scene_tags.iter().collect::<Vec<_>>(), vec!["crowded", "night"]);

        let clear = SceneOp {
            location_hint: Some(LocationHintChange { value: None }),
            tags: Some(SceneTagDelta::Overwrite(Vec::new())),
        };
        let next = apply(&next, &Delta::compose(Vec::new(), Some(clear), Vec::new(), None), &world(), &settings());
        assert!(next.scene.location_hint.is_none());
        assert!(next.scene.scene_tags.is_empty());
    }

    // ── entities ─────────────────────────────────────────────────────────

    #[test]
    fn entity_add_update_remove() {
        let add = EntityOp::Add(EntityPatch {
            kind: Some(EntityKind::Character),
            locations: vec!["Tavern".into()],
            ..EntityPatch::named("Cy")
        });
        let update_missing = EntityOp::Update(EntityPatch {
            base_info: Some("ghost".into()),
            ..EntityPatch::named("Ghost")
        });
        let update = EntityOp::Update(EntityPatch {
            base_info: Some("bard".into()),
            locations: vec!["Tavern".into(), "Docks".into()],
            ..EntityPatch::named("Cy")
        });
        let delta = Delta::compose(Vec::new(), None, vec![add, update_missing, update], None);
        let next = apply(&EngineState::initial(), &delta, &world(), &settings());
        assert_eq!(next.runtime_entities.len(), 1);
        let cy = &next.runtime_entities["Cy"];
        assert_eq!(cy.base_info.as_deref(), Some("bard"));
        assert_eq!(cy.locations, vec!["Tavern".to_string(), "Docks".to_string()]);

        let remove = Delta::compose(Vec::new(), None, vec![EntityOp::Remove { name: "Cy".into() }], None);
        let next = apply(&next, &remove, &world(), &settings());
        assert!(next.runtime_entities.is_empty());
    }

    // ── cast ─────────────────────────────────────────────────────────────

    #[test]
    fn entity_added_in_same_delta_can_enter_cast() {
        let delta = Delta::compose(
            Vec::new(),
            None,
            vec![EntityOp::Add(EntityPatch {
                kind: Some(EntityKind::Character),
                ..EntityPatch::named("Cy")
            })],
            None,
        )
        .with_cast_intent(CastIntent {
            enter: vec![
                CastEntry::new("Cy"),
                CastEntry::at("Aria", CastTier::PresentSupporting),
                CastEntry::new("Tavern"),
            ],
            leave: Vec::new(),
        });
        let next = apply(&EngineState::initial(), &delta, &world(), &settings());
        assert_eq!(
            next.cast,
            CastState {
                focus: vec!["Cy".into()],
                present_supporting: vec!["Aria".into()],
                offstage_related: Vec::new(),
            }
        );
    }

    // ── payload ──────────────────────────────────────────────────────────

    #[test]
    fn retrieval_payload_replaces() {
        let mut state = EngineState::initial();
        state.retrieval_intent = Some(json!({"query": "old", "k": 3}));
        let delta = Delta::compose(Vec::new(), None, Vec::new(), Some(json!({"query": "new"})));
        let next = apply(&state, &delta, &world(), &settings());
        assert_eq!(next.retrieval_intent, Some(json!({"query": "new"})));
    }

    // ── properties ───────────────────────────────────────────────────────

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn arb_key() -> impl Strategy<Value = String> {
            proptest::sample::select(vec!["Aria", "Bob", "Mood", "Gold", "Player"]).prop_map(String::from)
        }

        fn arb_scalar() -> impl Strategy<Value = Scalar> {
            prop_oneof![
                any::<bool>().prop_map(Scalar::Bool),
                (-1000i32..1000).prop_map(|n| Scalar::Number(f64::from(n))),
                "[a-z]{1,6}".prop_map(Scalar::Text),
            ]
        }

        fn arb_state() -> impl Strategy<Value = EngineState> {
            (
                proptest::collection::vec((0usize..4, proptest::collection::vec(arb_key(), 1..4), arb_scalar()), 0..8),
                proptest::option::of("[a-z]{1,8}"),
                proptest::collection::btree_set("[a-z]{1,5}", 0..4),
                proptest::collection::vec(arb_key(), 0..3),
                proptest::option::of(any::<i32>()),
            )
                .prop_map(|(writes, hint, tags, focus, payload)| {
                    let mut state = EngineState::initial();
                    for (scope, path, value) in writes {
                        let path: Vec<&str> = path.iter().map(String::as_str).collect();
                        state.variables.bucket_mut(VariableScope::ALL[scope]).set(&path, value);
                    }
                    state.scene.location_hint = hint;
                    state.scene.scene_tags = tags;
                    for name in focus {
                        state.cast.insert(&name, CastTier::Focus);
                    }
                    let _ = state
                        .runtime_entities
                        .insert("Cy".into(), EntityDefinition::character("Cy"));
                    state.retrieval_intent = payload.map(|p| json!({ "seed": p }));
                    state
                })
        }

        proptest! {
            #[test]
            fn empty_delta_is_identity(state in arb_state()) {
                let w = world();
                prop_assert_eq!(&apply(&state, &Delta::empty(), &w, &settings()), &state);
                let hollow = Delta {
                    variable_ops: Some(Vec::new()),
                    cast_intent: Some(CastIntent::default()),
                    ..Delta::default()
                };
                prop_assert_eq!(&apply(&state, &hollow, &w, &settings()), &state);
            }
        }
    }
}
