//! Symbolic resolution: turning qualitative intents into concrete values.
//!
//! `Number` parameters understand `set_<n>` and `up_*`/`down_*` steps;
//! `Enum` parameters understand `set_<member>`, `next` and `prev`. Every
//! other combination resolves to [`ResolvedOperation::Keep`].

use serde::{Deserialize, Serialize};

use crate::params::{ParameterDefinition, ParameterType};
use crate::value::Scalar;

/// Step sizes as a percentage of a declared range span.
pub const SMALL_STEP_PERCENT: f64 = 5.0;
/// See [`SMALL_STEP_PERCENT`].
pub const MEDIUM_STEP_PERCENT: f64 = 10.0;
/// See [`SMALL_STEP_PERCENT`].
pub const LARGE_STEP_PERCENT: f64 = 20.0;

/// Step sizes for parameters without a declared range.
pub const SMALL_STEP_ABSOLUTE: f64 = 5.0;
/// See [`SMALL_STEP_ABSOLUTE`].
pub const MEDIUM_STEP_ABSOLUTE: f64 = 10.0;
/// See [`SMALL_STEP_ABSOLUTE`].
pub const LARGE_STEP_ABSOLUTE: f64 = 20.0;

/// Magnitude of a relative step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Magnitude {
    /// `*_small`
    Small,
    /// `*_medium`
    Medium,
    /// `*_large`
    Large,
}

impl Magnitude {
    fn percent(self) -> f64 {
        match self {
            Self::Small => SMALL_STEP_PERCENT,
            Self::Medium => MEDIUM_STEP_PERCENT,
            Self::Large => LARGE_STEP_PERCENT,
        }
    }

    fn absolute(self) -> f64 {
        match self {
            Self::Small => SMALL_STEP_ABSOLUTE,
            Self::Medium => MEDIUM_STEP_ABSOLUTE,
            Self::Large => LARGE_STEP_ABSOLUTE,
        }
    }
}

/// A parsed symbol.
#[derive(Clone, Debug, PartialEq)]
pub enum Symbol {
    /// `set_<argument>`
    Set(String),
    /// `up_<magnitude>`
    Up(Magnitude),
    /// `down_<magnitude>`
    Down(Magnitude),
    /// `next`
    Next,
    /// `prev`
    Prev,
}

impl Symbol {
    /// Parse a symbol, ignoring surrounding whitespace and keyword case.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if let Some(arg) = raw.get(..4).filter(|p| p.eq_ignore_ascii_case("set_")).map(|_| &raw[4..]) {
            let arg = arg.trim();
            return (!arg.is_empty()).then(|| Self::Set(arg.to_string()));
        }
        let lower = raw.to_ascii_lowercase();
        let (direction, magnitude) = match lower.as_str() {
            "next" => return Some(Self::Next),
            "prev" | "previous" => return Some(Self::Prev),
            other => other.split_once('_')?,
        };
        let magnitude = match magnitude {
            "small" => Magnitude::Small,
            "medium" => Magnitude::Medium,
            "large" => Magnitude::Large,
            _ => return None,
        };
        match direction {
            "up" => Some(Self::Up(magnitude)),
            "down" => Some(Self::Down(magnitude)),
            _ => None,
        }
    }
}

/// What the reducer should do with a [`Resolution`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolvedOperation {
    /// Absolute value.
    Set,
    /// Relative step; `value` is the already-added result.
    Add,
    /// Nothing to write.
    Keep,
}

/// Result of resolving a symbol.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    /// Kind of change.
    pub operation: ResolvedOperation,
    /// Value to store, absent for `Keep` when there was no current value.
    pub value: Option<Scalar>,
    /// The range clamp changed the value.
    pub clamped: bool,
    /// An enum step actually moved.
    pub moved: bool,
}

impl Resolution {
    fn keep(current: Option<&Scalar>) -> Self {
        Self {
            operation: ResolvedOperation::Keep,
            value: current.cloned(),
            clamped: false,
            moved: false,
        }
    }

    fn number(operation: ResolvedOperation, raw: f64, def: &ParameterDefinition) -> Self {
        let value = def.range.map_or(raw, |r| r.clamp(raw));
        Self {
            operation,
            value: Some(Scalar::Number(value)),
            clamped: value != raw,
            moved: false,
        }
    }

    /// Whether the reducer has something to write.
    pub fn writes(&self) -> bool {
        self.operation != ResolvedOperation::Keep && self.value.is_some()
    }
}

/// Resolve `symbol` against the current value and a parameter definition.
///
/// Pure and total; anything unresolvable is `Keep`.
pub fn resolve(symbol: &str, current: Option<&Scalar>, def: &ParameterDefinition) -> Resolution {
    let Some(symbol) = Symbol::parse(symbol) else {
        return Resolution::keep(current);
    };
    match def.param_type {
        ParameterType::Number => resolve_number(&symbol, current, def),
        ParameterType::Enum => resolve_enum(&symbol, current, def),
        ParameterType::Boolean | ParameterType::Text => Resolution::keep(current),
    }
}

fn resolve_number(symbol: &Symbol, current: Option<&Scalar>, def: &ParameterDefinition) -> Resolution {
    let base = current.and_then(Scalar::as_f64).unwrap_or(0.0);
    let step = |m: Magnitude| match def.range {
        Some(range) => range.span() * m.percent() / 100.0,
        None => m.absolute(),
    };
    match symbol {
        Symbol::Set(arg) => match arg.parse::<f64>() {
            Ok(n) if n.is_finite() => Resolution::number(ResolvedOperation::Set, n, def),
            _ => Resolution::keep(current),
        },
        Symbol::Up(m) => Resolution::number(ResolvedOperation::Add, base + step(*m), def),
        Symbol::Down(m) => Resolution::number(ResolvedOperation::Add, base - step(*m), def),
        Symbol::Next | Symbol::Prev => Resolution::keep(current),
    }
}

fn resolve_enum(symbol: &Symbol, current: Option<&Scalar>, def: &ParameterDefinition) -> Resolution {
    let values = &def.enum_values;
    let set = |value: &str, moved: bool| Resolution {
        operation: ResolvedOperation::Set,
        value: Some(Scalar::from(value)),
        clamped: false,
        moved,
    };
    match symbol {
        Symbol::Set(arg) => values
            .iter()
            .find(|v| *v == arg)
            .or_else(|| values.iter().find(|v| v.eq_ignore_ascii_case(arg)))
            .map_or_else(|| Resolution::keep(current), |v| set(v.as_str(), true)),
        Symbol::Next | Symbol::Prev => {
            if values.is_empty() {
                return Resolution::keep(current);
            }
            let forward = matches!(symbol, Symbol::Next);
            let position = current
                .and_then(Scalar::as_str)
                .and_then(|c| values.iter().position(|v| v == c));
            match position {
                None if forward => set(values[0].as_str(), true),
                None => set(values[values.len() - 1].as_str(), true),
                Some(i) => {
                    let target = if forward { i.checked_add(1) } else { i.checked_sub(1) };
                    match target.filter(|&t| t < values.len()) {
                        Some(t) => set(values[t].as_str(), true),
                        None => set(values[i].as_str(), false),
                    }
                }
            }
        }
        Symbol::Up(_) | Symbol::Down(_) => Resolution::keep(current),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
