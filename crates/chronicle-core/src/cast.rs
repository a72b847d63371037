//! Cast tiers: which entities are in scope, and at what level of detail.
//!
//! The cast is three ordered, mutually exclusive lists. [`apply_cast_intent`]
//! is the only transition function. It never fills the cast on its own: an
//! intent that only removes names may leave every tier empty.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::delta::CastIntent;
use crate::entities::{EntityDefinition, EntityKind};

/// A visibility tier, ordered by specificity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CastTier {
    /// Full detail.
    Focus,
    /// Present in the scene, summarized.
    PresentSupporting,
    /// Not present but relevant.
    OffstageRelated,
}

impl CastTier {
    /// All tiers, most specific first.
    pub const ALL: [Self; 3] = [Self::Focus, Self::PresentSupporting, Self::OffstageRelated];

    /// Higher is more specific.
    pub fn rank(self) -> u8 {
        match self {
            Self::Focus => 2,
            Self::PresentSupporting => 1,
            Self::OffstageRelated => 0,
        }
    }

    /// Parse a tier name, ignoring case, separators and short forms.
    pub fn parse(raw: &str) -> Option<Self> {
        let key: String = raw
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .flat_map(char::to_lowercase)
            .collect();
        match key.as_str() {
            "focus" | "main" => Some(Self::Focus),
            "presentsupporting" | "present" | "supporting" => Some(Self::PresentSupporting),
            "offstagerelated" | "offstage" | "related" => Some(Self::OffstageRelated),
            _ => None,
        }
    }
}

/// Current cast membership.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CastState {
    /// Focus tier.
    pub focus: Vec<String>,
    /// PresentSupporting tier.
    pub present_supporting: Vec<String>,
    /// OffstageRelated tier.
    pub offstage_related: Vec<String>,
}

impl CastState {
    /// Names in a tier.
    pub fn list(&self, tier: CastTier) -> &[String] {
        match tier {
            CastTier::Focus => &self.focus,
            CastTier::PresentSupporting => &self.present_supporting,
            CastTier::OffstageRelated => &self.offstage_related,
        }
    }

    fn list_mut(&mut self, tier: CastTier) -> &mut Vec<String> {
        match tier {
            CastTier::Focus => &mut self.focus,
            CastTier::PresentSupporting => &mut self.present_supporting,
            CastTier::OffstageRelated => &mut self.offstage_related,
        }
    }

    /// Tier currently holding `name`.
    pub fn tier_of(&self, name: &str) -> Option<CastTier> {
        CastTier::ALL
            .into_iter()
            .find(|&tier| self.list(tier).iter().any(|n| n == name))
    }

    /// Every member with its tier, most specific tier first.
    pub fn members(&self) -> Vec<(&str, CastTier)> {
        CastTier::ALL
            .into_iter()
            .flat_map(|tier| self.list(tier).iter().map(move |n| (n.as_str(), tier)))
            .collect()
    }

    /// Whether no tier has members.
    pub fn is_empty(&self) -> bool {
        self.focus.is_empty() && self.present_supporting.is_empty() && self.offstage_related.is_empty()
    }

    /// Remove `name` from every tier. Returns whether it was present.
    pub fn remove(&mut self, name: &str) -> bool {
        let mut removed = false;
        for tier in CastTier::ALL {
            let list = self.list_mut(tier);
            let before = list.len();
            list.retain(|n| n != name);
            removed |= list.len() != before;
        }
        removed
    }

    /// Place `name` in `tier`, removing it from any other tier.
    pub fn insert(&mut self, name: &str, tier: CastTier) {
        let _ = self.remove(name);
        self.list_mut(tier).push(name.to_string());
    }
}

/// Resolve `name` to the declared spelling of a Character, exact match first.
fn canonical_character<'a>(characters: &'a [EntityDefinition], name: &str) -> Option<&'a str> {
    let is_character = |e: &&EntityDefinition| e.kind == EntityKind::Character;
    characters
        .iter()
        .filter(is_character)
        .find(|e| e.name == name)
        .or_else(|| {
            characters
                .iter()
                .filter(is_character)
                .find(|e| e.name.eq_ignore_ascii_case(name))
        })
        .map(|e| e.name.as_str())
}

/// Apply an enter/leave intent to the cast.
///
/// `leave` runs first, so leaving and re-entering at a lower tier demotes.
/// Each `enter` entry must resolve to a Character in `available`; unknown
/// names are ignored. An entry never demotes an existing member.
pub fn apply_cast_intent(
    current: &CastState,
    intent: &CastIntent,
    available: &[EntityDefinition],
) -> CastState {
    let mut cast = current.clone();

    for name in &intent.leave {
        let name = name.trim();
        let resolved = canonical_character(available, name).unwrap_or(name);
        if !cast.remove(resolved) {
            debug!(name, "cast leave for a name not in the cast");
        }
    }

    for entry in &intent.enter {
        let Some(name) = canonical_character(available, entry.name.trim()) else {
            debug!(name = %entry.name, "ignoring cast enter for unknown character");
            continue;
        };
        let requested = entry.preferred_layer.unwrap_or(CastTier::Focus);
        match cast.tier_of(name) {
            Some(existing) if existing.rank() >= requested.rank() => {}
            _ => cast.insert(name, requested),
        }
    }

    cast
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::CastEntry;

    fn roster() -> Vec<EntityDefinition> {
        vec![
            EntityDefinition::character("Aria"),
            EntityDefinition::character("Bob"),
            EntityDefinition::character("Cy"),
            EntityDefinition::location("Tavern"),
        ]
    }

    fn enter(entries: Vec<CastEntry>) -> CastIntent {
        CastIntent {
            enter: entries,
            leave: Vec::new(),
        }
    }

    #[test]
    fn enter_defaults_to_focus() {
        let cast = apply_cast_intent(&CastState::default(), &enter(vec![CastEntry::new("Aria")]), &roster());
        assert_eq!(cast.focus, vec!["Aria".to_string()]);
        assert_eq!(cast.tier_of("Aria"), Some(CastTier::Focus));
    }

    #[test]
    fn unknown_and_non_character_names_are_ignored() {
        let intent = enter(vec![CastEntry::new("Zed"), CastEntry::new("Tavern")]);
        let cast = apply_cast_intent(&CastState::default(), &intent, &roster());
        assert!(cast.is_empty());
    }

    #[test]
    fn enter_never_demotes() {
        let start = CastState {
            focus: vec!["Aria".into()],
            ..CastState::default()
        };
        let intent = enter(vec![CastEntry::at("Aria", CastTier::OffstageRelated)]);
        let cast = apply_cast_intent(&start, &intent, &roster());
        assert_eq!(cast, start);
    }

    #[test]
    fn enter_promotes() {
        let start = CastState {
            offstage_related: vec!["Bob".into()],
            ..CastState::default()
        };
        let intent = enter(vec![CastEntry::at("Bob", CastTier::PresentSupporting)]);
        let cast = apply_cast_intent(&start, &intent, &roster());
        assert!(cast.offstage_related.is_empty());
        assert_eq!(cast.present_supporting, vec!["Bob".to_string()]);
    }

    #[test]
    fn leave_then_enter_demotes() {
        let start = CastState {
            focus: vec!["Aria".into()],
            ..CastState::default()
        };
        let intent = CastIntent {
            enter: vec![CastEntry::at("Aria", CastTier::OffstageRelated)],
            leave: vec!["Aria".into()],
        };
        let cast = apply_cast_intent(&start, &intent, &roster());
        assert_eq!(cast.tier_of("Aria"), Some(CastTier::OffstageRelated));
    }

    #[test]
    fn leave_can_empty_the_cast() {
        let start = CastState {
            focus: vec!["Aria".into()],
            present_supporting: vec!["Bob".into()],
            ..CastState::default()
        };
        let intent = CastIntent {
            enter: Vec::new(),
            leave: vec!["Aria".into(), "bob".into()],
        };
        let cast = apply_cast_intent(&start, &intent, &roster());
        assert!(cast.is_empty());
    }

    #[test]
    fn case_insensitive_match_stores_declared_spelling() {
        let cast = apply_cast_intent(&CastState::default(), &enter(vec![CastEntry::new("aria")]), &roster());
        assert_eq!(cast.focus, vec!["Aria".to_string()]);
    }

    #[test]
    fn members_lists_tiers_in_order() {
        let cast = CastState {
            focus: vec!["Aria".into()],
            present_supporting: vec!["Bob".into()],
            offstage_related: vec!["Cy".into()],
        };
        assert_eq!(
            cast.members(),
            vec![
                ("Aria", CastTier::Focus),
                ("Bob", CastTier::PresentSupporting),
                ("Cy", CastTier::OffstageRelated),
            ]
        );
    }

    #[test]
    fn tier_parse_variants() {
        assert_eq!(CastTier::parse("Focus"), Some(CastTier::Focus));
        assert_eq!(CastTier::parse("present-supporting"), Some(CastTier::PresentSupporting));
        assert_eq!(CastTier::parse("OFFSTAGE_RELATED"), Some(CastTier::OffstageRelated));
        assert_eq!(CastTier::parse("backstage"), None);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        const NAMES: [&str; 5] = ["Aria", "Bob", "Cy", "Tavern", "Zed"];

        fn arb_tier() -> impl Strategy<Value = Option<CastTier>> {
            prop_oneof![
                Just(None),
                Just(Some(CastTier::Focus)),
                Just(Some(CastTier::PresentSupporting)),
                Just(Some(CastTier::OffstageRelated)),
            ]
        }

        fn arb_intent() -> impl Strategy<Value = CastIntent> {
            let entry = (proptest::sample::select(NAMES.to_vec()), arb_tier()).prop_map(|(name, tier)| {
                CastEntry {
                    name: name.to_string(),
                    preferred_layer: tier,
                }
            });
            let leave = proptest::sample::select(NAMES.to_vec()).prop_map(String::from);
            (
                proptest::collection::vec(entry, 0..5),
                proptest::collection::vec(leave, 0..3),
            )
                .prop_map(|(enter, leave)| CastIntent { enter, leave })
        }

        proptest! {
            #[test]
            fn tiers_stay_mutually_exclusive(intents in proptest::collection::vec(arb_intent(), 1..6)) {
                let available = roster();
                let mut cast = CastState::default();
                for intent in &intents {
                    cast = apply_cast_intent(&cast, intent, &available);
                    let members = cast.members();
                    let mut names: Vec<&str> = members.iter().map(|(n, _)| *n).collect();
                    names.sort_unstable();
                    let total = names.len();
                    names.dedup();
                    prop_assert_eq!(total, names.len());
                    prop_assert!(names.iter().all(|n| ["Aria", "Bob", "Cy"].contains(n)));
                }
            }
        }
    }
}
