//! Log entries, their stable identities, and the parent-pointer chain.
//!
//! Every entry gets an [`EntryId`] (the host id, or a content-derived hash)
//! and a content hash. [`LogChain`] links each entry to its predecessor and
//! folds the whole ancestry into a per-position lineage hash, so "is this
//! checkpoint still on the current branch" is a single string comparison.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Lineage of the empty prefix (position `-1`).
pub const ROOT_LINEAGE: &str = "";

/// Who authored an entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryRole {
    /// The querying party. Not eligible for delta application by default.
    User,
    /// The other party.
    Assistant,
}

impl EntryRole {
    /// Lowercase name, as serialized.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// Stable identity of a log entry.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(String);

impl EntryId {
    /// Wrap an id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One entry of the conversational log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// Host-assigned id, if the host has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Author.
    pub role: EntryRole,
    /// Free-form text.
    pub content: String,
    /// Send timestamp, as the host formats it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<String>,
}

impl LogEntry {
    /// Entry with the given role and content.
    pub fn new(role: EntryRole, content: impl Into<String>) -> Self {
        Self {
            id: None,
            role,
            content: content.into(),
            sent_at: None,
        }
    }

    /// User entry.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(EntryRole::User, content)
    }

    /// Assistant entry.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(EntryRole::Assistant, content)
    }

    /// Set the host id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the send timestamp.
    #[must_use]
    pub fn sent_at(mut self, at: impl Into<String>) -> Self {
        self.sent_at = Some(at.into());
        self
    }

    /// Identity: the host id when present, else a hash of role, timestamp
    /// and content.
    pub fn entry_id(&self) -> EntryId {
        match self.id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => EntryId::new(id),
            _ => EntryId(hex_sha256(&[
                self.role.as_str().as_bytes(),
                self.sent_at.as_deref().unwrap_or_default().as_bytes(),
                self.content.as_bytes(),
            ])),
        }
    }

    /// Hash of role and content.
    pub fn content_hash(&self) -> String {
        hex_sha256(&[self.role.as_str().as_bytes(), self.content.as_bytes()])
    }
}

/// SHA-256 over `parts`, separated so that field boundaries are unambiguous.
pub(crate) fn hex_sha256(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update((part.len() as u64).to_le_bytes());
        hasher.update(part);
    }
    format!("{:x}", hasher.finalize())
}

/// One position of a [`LogChain`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainLink {
    /// Zero-based log position.
    pub position: usize,
    /// Entry identity.
    pub entry_id: EntryId,
    /// Entry content hash.
    pub content_hash: String,
    /// Identity of the preceding entry.
    pub parent: Option<EntryId>,
    /// Hash of the whole prefix up to and including this entry.
    pub lineage: String,
    /// Entry author.
    pub role: EntryRole,
}

/// The log as an immutable chain of identities.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LogChain {
    links: Vec<ChainLink>,
}

impl LogChain {
    /// Build the chain for a log.
    pub fn build(entries: &[LogEntry]) -> Self {
        let mut links: Vec<ChainLink> = Vec::with_capacity(entries.len());
        for (position, entry) in entries.iter().enumerate() {
            let entry_id = entry.entry_id();
            let content_hash = entry.content_hash();
            let (parent, parent_lineage) = match links.last() {
                Some(prev) => (Some(prev.entry_id.clone()), prev.lineage.as_str()),
                None => (None, ROOT_LINEAGE),
            };
            let lineage = hex_sha256(&[
                parent_lineage.as_bytes(),
                entry_id.as_str().as_bytes(),
                content_hash.as_bytes(),
            ]);
            links.push(ChainLink {
                position,
                entry_id,
                content_hash,
                parent,
                lineage,
                role: entry.role,
            });
        }
        Self { links }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Link at a position.
    pub fn link(&self, position: usize) -> Option<&ChainLink> {
        self.links.get(position)
    }

    /// All links in order.
    pub fn links(&self) -> &[ChainLink] {
        &self.links
    }

    /// Lineage at a position; `-1` is the root.
    pub fn lineage_at(&self, position: i64) -> Option<&str> {
        if position < 0 {
            return Some(ROOT_LINEAGE);
        }
        usize::try_from(position)
            .ok()
            .and_then(|p| self.links.get(p))
            .map(|link| link.lineage.as_str())
    }

    /// Position of the last entry, `-1` when empty.
    pub fn last_position(&self) -> i64 {
        self.links.len() as i64 - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn host_id_wins() {
        let entry = LogEntry::assistant("hi").with_id("msg-7");
        assert_eq!(entry.entry_id(), EntryId::new("msg-7"));
        let blank = LogEntry::assistant("hi").with_id("  ");
        assert_ne!(blank.entry_id(), EntryId::new("  "));
    }

    #[test]
    fn derived_id_depends_on_timestamp_and_role() {
        let a = LogEntry::assistant("hi").sent_at("2024-01-01T00:00:00Z");
        let b = LogEntry::assistant("hi").sent_at("2024-01-01T00:00:01Z");
        let c = LogEntry::user("hi").sent_at("2024-01-01T00:00:00Z");
        assert_ne!(a.entry_id(), b.entry_id());
        assert_ne!(a.entry_id(), c.entry_id());
        assert_eq!(a.entry_id(), a.clone().entry_id());
        assert_eq!(a.content_hash(), b.content_hash());
        assert_ne!(a.content_hash(), c.content_hash());
    }

    #[test]
    fn field_boundaries_are_unambiguous() {
        assert_ne!(hex_sha256(&[b"ab", b"c"]), hex_sha256(&[b"a", b"bc"]));
    }

    #[test]
    fn chain_links_parents() {
        let log = vec![
            LogEntry::user("a").with_id("1"),
            LogEntry::assistant("b").with_id("2"),
        ];
        let chain = LogChain::build(&log);
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.link(0).unwrap().parent, None);
        assert_eq!(chain.link(1).unwrap().parent, Some(EntryId::new("1")));
        assert_eq!(chain.last_position(), 1);
        assert_eq!(chain.lineage_at(-1), Some(ROOT_LINEAGE));
        assert!(chain.lineage_at(2).is_none());
    }

    #[test]
    fn editing_an_ancestor_changes_every_later_lineage() {
        let log = vec![
            LogEntry::user("a").with_id("1"),
            LogEntry::assistant("b").with_id("2"),
            LogEntry::user("c").with_id("3"),
        ];
        let before = LogChain::build(&log);
        let mut edited = log.clone();
        edited[1].content = "B".into();
        let after = LogChain::build(&edited);
        assert_eq!(before.lineage_at(0), after.lineage_at(0));
        assert_ne!(before.lineage_at(1), after.lineage_at(1));
        assert_ne!(before.lineage_at(2), after.lineage_at(2));
        assert_eq!(before.link(2).unwrap().content_hash, after.link(2).unwrap().content_hash);
    }

    #[test]
    fn entry_serde_shape() {
        let entry: LogEntry = serde_json::from_value(json!({
            "role": "assistant",
            "content": "hello",
            "sentAt": "2024-05-01T10:00:00Z"
        }))
        .unwrap();
        assert_eq!(entry.role, EntryRole::Assistant);
        assert_eq!(entry.sent_at.as_deref(), Some("2024-05-01T10:00:00Z"));
        assert!(entry.id.is_none());
    }
}
