//! External configuration consumed by the reducer.

use serde::{Deserialize, Serialize};

use crate::entities::{EntityDefinition, SpecialEntity, normalize_entities};
use crate::params::{ParameterDefinition, find_parameter};
use crate::state::EngineState;

/// Parameters and entities for the current context.
///
/// Owned by the host. The reducer borrows it; [`EngineState`] never holds a
/// reference to it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorldConfig {
    /// Parameter definitions.
    pub parameters: Vec<ParameterDefinition>,
    /// Static entity definitions.
    pub entities: Vec<EntityDefinition>,
    /// Names declared as owning variables; each gets at least a placeholder entity.
    pub owner_names: Vec<String>,
    /// The addressed user, forced to a Character with fixed identity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub special_entity: Option<SpecialEntity>,
}

impl WorldConfig {
    /// Look up a parameter by name or id.
    pub fn parameter(&self, key: &str) -> Option<&ParameterDefinition> {
        find_parameter(&self.parameters, key)
    }

    /// Normalized entity list for a state: configuration merged with the
    /// state's runtime entities.
    pub fn entity_view(&self, state: &EngineState) -> Vec<EntityDefinition> {
        normalize_entities(
            &self.entities,
            state.runtime_entities.values(),
            &self.owner_names,
            self.special_entity.as_ref(),
            &self.parameters,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::EntityKind;
    use serde_json::json;

    #[test]
    fn deserializes_camel_case_config() {
        let world: WorldConfig = serde_json::from_value(json!({
            "parameters": [{"name": "Mood", "type": "enum", "enumValues": ["calm", "tense"]}],
            "entities": [{"name": "Tavern", "kind": "location", "characters": ["Bob"]}],
            "ownerNames": ["Narrator"],
            "specialEntity": {"name": "Player", "baseInfo": "the user"}
        }))
        .unwrap();
        assert_eq!(world.parameter("mood").unwrap().enum_values.len(), 2);
        assert_eq!(world.special_entity.as_ref().unwrap().name, "Player");
    }

    #[test]
    fn entity_view_includes_runtime_entities() {
        let world = WorldConfig {
            entities: vec![EntityDefinition::location("Tavern")],
            ..WorldConfig::default()
        };
        let mut state = EngineState::initial();
        let _ = state.runtime_entities.insert(
            "Bob".into(),
            EntityDefinition::character("Bob").with_locations(["Tavern"]),
        );
        let view = world.entity_view(&state);
        let tavern = view.iter().find(|e| e.name == "Tavern").unwrap();
        assert_eq!(tavern.characters, vec!["Bob".to_string()]);
        assert!(view.iter().any(|e| e.name == "Bob" && e.kind == EntityKind::Character));
    }
}
