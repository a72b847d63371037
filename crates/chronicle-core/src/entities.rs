//! Entity definitions and the entity graph normalizer.
//!
//! [`normalize_entities`] merges configuration-defined and runtime entities
//! into one consistent list. The passes run strictly in order, each over the
//! cumulative result of the previous one:
//!
//! 1. Merge by name (config wins scalars, list fields are unioned)
//! 2. Strip fields that are illegal for the entity's kind
//! 3. Forward-propagate `Location.characters` into `Character.locations`
//! 4. Backward-propagate `Character.locations` into `Location.characters`
//! 5. Synthesize `Other` placeholders for owner names
//! 6. Force-inject the special (self) entity as a `Character`
//! 7. Attach auto-bind parameters to every other `Character`
//!
//! After pass 4 the Location/Character relation is symmetric. The normalizer
//! never fails; entries without a usable name are skipped.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::params::ParameterDefinition;

/// Kind of an entity. Governs which relational fields it may carry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// A person; may list `locations`.
    Character,
    /// A place; may list `children_names` and `characters`.
    Location,
    /// Anything else; carries no relational fields.
    #[default]
    Other,
}

impl EntityKind {
    /// Parse a kind name, ignoring case and a few common spellings.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "character" | "char" | "npc" | "person" => Some(Self::Character),
            "location" | "place" | "area" => Some(Self::Location),
            "other" | "item" | "object" | "faction" => Some(Self::Other),
            _ => None,
        }
    }
}

/// A named Character, Location or Other record.
///
/// Used both for static configuration and for runtime entities
/// ([`EntityRuntime`]).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityDefinition {
    /// Primary key.
    pub name: String,
    /// Kind.
    #[serde(default)]
    pub kind: EntityKind,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_info: Option<String>,
    /// Child locations (Location only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children_names: Vec<String>,
    /// Characters commonly present here (Location only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub characters: Vec<String>,
    /// Locations this character is commonly found in (Character only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<String>,
    /// Names of parameters bound to this entity.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<String>,
}

/// Entities created or overridden at runtime share the definition shape.
pub type EntityRuntime = EntityDefinition;

impl EntityDefinition {
    /// Entity with a name and kind and nothing else.
    pub fn new(name: impl Into<String>, kind: EntityKind) -> Self {
        Self {
            name: name.into(),
            kind,
            ..Self::default()
        }
    }

    /// Character entity.
    pub fn character(name: impl Into<String>) -> Self {
        Self::new(name, EntityKind::Character)
    }

    /// Location entity.
    pub fn location(name: impl Into<String>) -> Self {
        Self::new(name, EntityKind::Location)
    }

    /// Set the base info.
    #[must_use]
    pub fn with_info(mut self, info: impl Into<String>) -> Self {
        self.base_info = Some(info.into());
        self
    }

    /// Add characters (Location).
    #[must_use]
    pub fn with_characters<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.characters.extend(names.into_iter().map(Into::into));
        self
    }

    /// Add locations (Character).
    #[must_use]
    pub fn with_locations<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.locations.extend(names.into_iter().map(Into::into));
        self
    }

    /// Add child locations (Location).
    #[must_use]
    pub fn with_children<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.children_names.extend(names.into_iter().map(Into::into));
        self
    }

    /// Union another entity's list fields into this one.
    pub fn union_lists(&mut self, other: &Self) {
        union_into(&mut self.children_names, &other.children_names);
        union_into(&mut self.characters, &other.characters);
        union_into(&mut self.locations, &other.locations);
        union_into(&mut self.parameters, &other.parameters);
    }

    fn strip_for_kind(&mut self) {
        match self.kind {
            EntityKind::Character => {
                self.children_names.clear();
                self.characters.clear();
            }
            EntityKind::Location => self.locations.clear(),
            EntityKind::Other => {
                self.children_names.clear();
                self.characters.clear();
                self.locations.clear();
            }
        }
    }

    fn clean_lists(&mut self) {
        let own = self.name.clone();
        for list in [
            &mut self.children_names,
            &mut self.characters,
            &mut self.locations,
            &mut self.parameters,
        ] {
            let mut cleaned = Vec::with_capacity(list.len());
            for item in list.drain(..) {
                let item = item.trim();
                if !item.is_empty() && item != own && !cleaned.iter().any(|c: &String| c == item) {
                    cleaned.push(item.to_string());
                }
            }
            *list = cleaned;
        }
    }
}

/// The addressed user (or other "self" entity) whose identity is fixed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecialEntity {
    /// Name.
    pub name: String,
    /// Fixed base info.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_info: Option<String>,
}

/// Union `extra` into `list`, skipping duplicates and blanks.
pub(crate) fn union_into(list: &mut Vec<String>, extra: &[String]) {
    for item in extra {
        let item = item.trim();
        if !item.is_empty() && !list.iter().any(|existing| existing == item) {
            list.push(item.to_string());
        }
    }
}

/// Look up an entity by name, exact first, then ignoring case.
pub fn find_entity<'a>(entities: &'a [EntityDefinition], name: &str) -> Option<&'a EntityDefinition> {
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    entities
        .iter()
        .find(|e| e.name == name)
        .or_else(|| entities.iter().find(|e| e.name.eq_ignore_ascii_case(name)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Normalizer
// ─────────────────────────────────────────────────────────────────────────────

/// Working set keyed by name, preserving first-seen order.
#[derive(Default)]
struct EntityGraph {
    entities: Vec<EntityDefinition>,
    index: HashMap<String, usize>,
}

impl EntityGraph {
    fn get(&self, name: &str) -> Option<&EntityDefinition> {
        self.index.get(name).map(|&i| &self.entities[i])
    }

    fn get_mut(&mut self, name: &str) -> Option<&mut EntityDefinition> {
        self.index.get(name).map(|&i| &mut self.entities[i])
    }

    fn push(&mut self, entity: EntityDefinition) {
        let _ = self.index.insert(entity.name.clone(), self.entities.len());
        self.entities.push(entity);
    }

    fn names_of_kind(&self, kind: EntityKind) -> Vec<String> {
        self.entities
            .iter()
            .filter(|e| e.kind == kind)
            .map(|e| e.name.clone())
            .collect()
    }

    /// Make sure `name` exists with kind `kind`.
    ///
    /// Absent names are created; `Other` entities are promoted. Returns
    /// `false` when the name already belongs to an entity of a different,
    /// non-`Other` kind.
    fn ensure_kind(&mut self, name: &str, kind: EntityKind) -> bool {
        match self.get_mut(name) {
            Some(existing) if existing.kind == kind => true,
            Some(existing) if existing.kind == EntityKind::Other => {
                debug!(name, ?kind, "promoting entity from other");
                existing.kind = kind;
                true
            }
            Some(_) => false,
            None => {
                debug!(name, ?kind, "auto-creating linked entity");
                self.push(EntityDefinition::new(name, kind));
                true
            }
        }
    }

    /// Pass 1: merge one source entry.
    fn merge(&mut self, entry: &EntityDefinition, from_config: bool) {
        let name = entry.name.trim();
        if name.is_empty() {
            debug!("skipping entity without a name");
            return;
        }
        let mut incoming = entry.clone();
        name.clone_into(&mut incoming.name);
        incoming.clean_lists();

        match self.get_mut(name) {
            Some(existing) => {
                // Config entries arrive first, so an existing entry's scalars
                // already hold the highest-precedence values.
                let fill_info = existing.base_info.as_deref().is_none_or(str::is_empty);
                if fill_info && incoming.base_info.is_some() {
                    existing.base_info = incoming.base_info.clone();
                }
                if !from_config && existing.kind == EntityKind::Other {
                    existing.kind = incoming.kind;
                }
                existing.union_lists(&incoming);
            }
            None => self.push(incoming),
        }
    }

    /// Pass 3: every `Location.characters` link gets its reverse edge.
    fn propagate_forward(&mut self) {
        for location in self.names_of_kind(EntityKind::Location) {
            let listed = self
                .get(&location)
                .map(|e| e.characters.clone())
                .unwrap_or_default();
            let mut kept = Vec::with_capacity(listed.len());
            for character in listed {
                if self.ensure_kind(&character, EntityKind::Character) {
                    if let Some(c) = self.get_mut(&character) {
                        union_into(&mut c.locations, std::slice::from_ref(&location));
                    }
                    kept.push(character);
                } else {
                    debug!(%location, %character, "dropping non-character from location");
                }
            }
            if let Some(l) = self.get_mut(&location) {
                l.characters = kept;
            }
        }
    }

    /// Pass 4: every `Character.locations` link gets its reverse edge.
    fn propagate_backward(&mut self) {
        for character in self.names_of_kind(EntityKind::Character) {
            let listed = self
                .get(&character)
                .map(|e| e.locations.clone())
                .unwrap_or_default();
            let mut kept = Vec::with_capacity(listed.len());
            for location in listed {
                if self.ensure_kind(&location, EntityKind::Location) {
                    if let Some(l) = self.get_mut(&location) {
                        union_into(&mut l.characters, std::slice::from_ref(&character));
                    }
                    kept.push(location);
                } else {
                    debug!(%character, %location, "dropping non-location from character");
                }
            }
            if let Some(c) = self.get_mut(&character) {
                c.locations = kept;
            }
        }
    }

    /// Pass 6: the special entity is always a Character with fixed identity.
    fn inject_special(&mut self, special: &SpecialEntity) {
        let name = special.name.trim();
        if name.is_empty() {
            return;
        }
        let previous_kind = self.get(name).map(|e| e.kind);
        if previous_kind == Some(EntityKind::Location) {
            // Nothing may keep pointing at it as a place.
            for entity in &mut self.entities {
                entity.locations.retain(|l| l != name);
                entity.children_names.retain(|c| c != name);
            }
        }
        match self.get_mut(name) {
            Some(existing) => {
                existing.kind = EntityKind::Character;
                existing.base_info.clone_from(&special.base_info);
                existing.children_names.clear();
                existing.characters.clear();
                if previous_kind != Some(EntityKind::Character) {
                    existing.locations.clear();
                }
            }
            None => {
                let mut entity = EntityDefinition::character(name);
                entity.base_info.clone_from(&special.base_info);
                self.push(entity);
            }
        }
    }
}

/// Merge configuration and runtime entities into one consistent list.
///
/// See the module docs for the pass order. The result lists configuration
/// entries first (in declaration order), then runtime-only entries, then any
/// entities synthesized by the later passes.
pub fn normalize_entities<'a, I>(
    config: &[EntityDefinition],
    runtime: I,
    owner_names: &[String],
    special: Option<&SpecialEntity>,
    bound_parameters: &[ParameterDefinition],
) -> Vec<EntityDefinition>
where
    I: IntoIterator<Item = &'a EntityRuntime>,
{
    let mut graph = EntityGraph::default();

    for entry in config {
        graph.merge(entry, true);
    }
    for entry in runtime {
        graph.merge(entry, false);
    }

    for entity in &mut graph.entities {
        entity.strip_for_kind();
    }

    graph.propagate_forward();
    graph.propagate_backward();

    for owner in owner_names {
        let owner = owner.trim();
        if !owner.is_empty() && graph.get(owner).is_none() {
            graph.push(EntityDefinition::new(owner, EntityKind::Other));
        }
    }

    if let Some(special) = special {
        graph.inject_special(special);
    }

    let auto_bound: Vec<String> = bound_parameters
        .iter()
        .filter(|p| p.auto_bind)
        .map(|p| p.name.clone())
        .collect();
    if !auto_bound.is_empty() {
        let special_name = special.map(|s| s.name.trim());
        for entity in &mut graph.entities {
            if entity.kind == EntityKind::Character && Some(entity.name.as_str()) != special_name {
                union_into(&mut entity.parameters, &auto_bound);
            }
        }
    }

    graph.entities
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
