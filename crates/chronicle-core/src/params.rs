//! Parameter definitions supplied by configuration.
//!
//! A [`ParameterDefinition`] tells the reducer which bucket an op lands in
//! when the op does not say, and tells the symbolic resolver how to read a
//! symbol such as `up_small` or `next`.

use serde::{Deserialize, Serialize};

use crate::delta::VariableScope;

/// Declared value type of a parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    /// Numeric, optionally bounded by a [`ValueRange`].
    Number,
    /// `true` / `false`.
    Boolean,
    /// One of a declared, ordered list of values.
    Enum,
    /// Free text.
    Text,
}

/// Inclusive numeric bounds.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    /// Lower bound.
    pub min: f64,
    /// Upper bound.
    pub max: f64,
}

impl ValueRange {
    /// Create a range. Bounds given in the wrong order are swapped.
    pub fn new(min: f64, max: f64) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    /// Distance between the bounds.
    pub fn span(&self) -> f64 {
        (self.max - self.min).abs()
    }

    /// Clamp `value` into the range.
    pub fn clamp(&self, value: f64) -> f64 {
        let lo = self.min.min(self.max);
        let hi = self.min.max(self.max);
        value.clamp(lo, hi)
    }
}

/// A configured state parameter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterDefinition {
    /// Display name, also the storage key.
    pub name: String,
    /// Stable identifier; ops may reference a parameter by id.
    #[serde(default)]
    pub id: String,
    /// Value type.
    #[serde(rename = "type")]
    pub param_type: ParameterType,
    /// Declared bucket. `None` lets the reducer infer one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<VariableScope>,
    /// Bounds for `Number` parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<ValueRange>,
    /// Ordered members for `Enum` parameters.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<String>,
    /// Short-term parameters always live in the Character bucket.
    #[serde(default)]
    pub is_short_term: bool,
    /// Bind this parameter to every Character entity during normalization.
    #[serde(default)]
    pub auto_bind: bool,
}

impl ParameterDefinition {
    /// Minimal definition with the given name and type.
    pub fn new(name: impl Into<String>, param_type: ParameterType) -> Self {
        let name = name.into();
        Self {
            id: name.clone(),
            name,
            param_type,
            scope: None,
            range: None,
            enum_values: Vec::new(),
            is_short_term: false,
            auto_bind: false,
        }
    }

    /// Set the declared scope.
    #[must_use]
    pub fn with_scope(mut self, scope: VariableScope) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Set the numeric range.
    #[must_use]
    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.range = Some(ValueRange::new(min, max));
        self
    }

    /// Set the enum members.
    #[must_use]
    pub fn with_enum_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enum_values = values.into_iter().map(Into::into).collect();
        self
    }

    /// Mark as short-term.
    #[must_use]
    pub fn short_term(mut self) -> Self {
        self.is_short_term = true;
        self
    }

    /// Mark as auto-bound to every Character.
    #[must_use]
    pub fn auto_bound(mut self) -> Self {
        self.auto_bind = true;
        self
    }

    /// Whether `key` names this parameter (by name or id, exact match).
    pub fn matches_exact(&self, key: &str) -> bool {
        self.name == key || (!self.id.is_empty() && self.id == key)
    }
}

/// Look up a definition by name or id, exact first, then ignoring case.
pub fn find_parameter<'a>(
    defs: &'a [ParameterDefinition],
    key: &str,
) -> Option<&'a ParameterDefinition> {
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    defs.iter().find(|d| d.matches_exact(key)).or_else(|| {
        defs.iter().find(|d| {
            d.name.eq_ignore_ascii_case(key) || (!d.id.is_empty() && d.id.eq_ignore_ascii_case(key))
        })
    })
}
