//! Payload filters for vector search.
//!
//! A [`Filter`] is one [`Combinator`] applied over a list of
//! [`FieldCondition`]s. Conditions either match a payload value exactly or
//! constrain a numeric payload value to a range.
//!
//! Filters can be built directly or from the loose request form used by the
//! HTTP surface: a simple `{key: value}` map plus a list of
//! [`ConditionSpec`]s, merged into a single condition list.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::document::Payload;
use crate::error::{RagError, Result};

/// A scalar value an exact-match condition compares against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MatchValue {
    /// A boolean flag.
    Bool(bool),
    /// An integer.
    Integer(i64),
    /// A string keyword.
    Keyword(String),
}

impl MatchValue {
    fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Array(items)) => items.iter().any(|item| self.matches(item)),
            (MatchValue::Bool(b), Value::Bool(v)) => b == v,
            (MatchValue::Integer(i), Value::Number(n)) => n.as_i64() == Some(*i),
            (MatchValue::Keyword(k), Value::String(s)) => k == s,
            _ => false,
        }
    }
}

impl TryFrom<&Value> for MatchValue {
    type Error = RagError;

    fn try_from(value: &Value) -> Result<Self> {
        match value {
            Value::Bool(b) => Ok(MatchValue::Bool(*b)),
            Value::String(s) => Ok(MatchValue::Keyword(s.clone())),
            Value::Number(n) => n.as_i64().map(MatchValue::Integer).ok_or_else(|| {
                RagError::InvalidFilter(format!("exact match needs an integer, got {n}"))
            }),
            other => Err(RagError::InvalidFilter(format!(
                "exact match needs a string, integer or boolean, got {other}"
            ))),
        }
    }
}

impl From<&str> for MatchValue {
    fn from(value: &str) -> Self {
        MatchValue::Keyword(value.to_string())
    }
}

impl From<String> for MatchValue {
    fn from(value: String) -> Self {
        MatchValue::Keyword(value)
    }
}

impl From<i64> for MatchValue {
    fn from(value: i64) -> Self {
        MatchValue::Integer(value)
    }
}

impl From<bool> for MatchValue {
    fn from(value: bool) -> Self {
        MatchValue::Bool(value)
    }
}

/// Numeric bounds; any subset may be present. No bounds matches any number.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Range {
    /// Strictly greater than.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gt: Option<f64>,
    /// Greater than or equal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gte: Option<f64>,
    /// Strictly less than.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lt: Option<f64>,
    /// Less than or equal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lte: Option<f64>,
}

impl Range {
    /// Whether `x` satisfies every present bound.
    pub fn contains(&self, x: f64) -> bool {
        self.gt.is_none_or(|b| x > b)
            && self.gte.is_none_or(|b| x >= b)
            && self.lt.is_none_or(|b| x < b)
            && self.lte.is_none_or(|b| x <= b)
    }

    fn matches(&self, value: &Value) -> bool {
        match value {
            Value::Array(items) => items.iter().any(|item| self.matches(item)),
            Value::Number(n) => n.as_f64().is_some_and(|x| self.contains(x)),
            _ => false,
        }
    }
}

/// A single condition on one payload field.
///
/// Keys may address nested objects with dots (`"meta.year"`). A field holding
/// an array matches when any element does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldCondition {
    /// The field equals `value`.
    ExactMatch {
        /// Payload key.
        key: String,
        /// Expected value.
        value: MatchValue,
    },
    /// The field is a number inside `range`.
    Range {
        /// Payload key.
        key: String,
        /// Bounds to check.
        range: Range,
    },
}

impl FieldCondition {
    /// Build an exact-match condition.
    pub fn exact(key: impl Into<String>, value: impl Into<MatchValue>) -> Self {
        FieldCondition::ExactMatch { key: key.into(), value: value.into() }
    }

    /// Build a range condition.
    pub fn range(key: impl Into<String>, range: Range) -> Self {
        FieldCondition::Range { key: key.into(), range }
    }

    /// The payload key this condition inspects.
    pub fn key(&self) -> &str {
        match self {
            FieldCondition::ExactMatch { key, .. } | FieldCondition::Range { key, .. } => key,
        }
    }

    /// Evaluate the condition against a payload. Missing fields never match.
    pub fn matches(&self, payload: &Payload) -> bool {
        let Some(value) = lookup(payload, self.key()) else {
            return false;
        };
        match self {
            FieldCondition::ExactMatch { value: expected, .. } => expected.matches(value),
            FieldCondition::Range { range, .. } => range.matches(value),
        }
    }
}

/// Resolve a dotted key path inside a payload.
fn lookup<'a>(payload: &'a Payload, key: &str) -> Option<&'a Value> {
    if let Some(value) = payload.get(key) {
        return Some(value);
    }
    let mut parts = key.split('.');
    let mut current = payload.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// How the conditions of a [`Filter`] combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Combinator {
    /// Every condition must hold (AND).
    #[default]
    Must,
    /// At least one condition must hold (OR).
    Should,
    /// No condition may hold (NOT).
    MustNot,
}

impl FromStr for Combinator {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "must" => Ok(Combinator::Must),
            "should" => Ok(Combinator::Should),
            "must_not" => Ok(Combinator::MustNot),
            other => Err(RagError::InvalidFilter(format!("unsupported filter type: {other}"))),
        }
    }
}

impl fmt::Display for Combinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Combinator::Must => "must",
            Combinator::Should => "should",
            Combinator::MustNot => "must_not",
        })
    }
}

/// A boolean combinator over field conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    /// How the conditions combine.
    pub combinator: Combinator,
    /// The conditions.
    pub conditions: Vec<FieldCondition>,
}

impl Filter {
    /// Create a filter with an explicit combinator.
    pub fn new(combinator: Combinator, conditions: Vec<FieldCondition>) -> Self {
        Self { combinator, conditions }
    }

    /// All conditions must hold.
    pub fn must(conditions: Vec<FieldCondition>) -> Self {
        Self::new(Combinator::Must, conditions)
    }

    /// At least one condition must hold.
    pub fn should(conditions: Vec<FieldCondition>) -> Self {
        Self::new(Combinator::Should, conditions)
    }

    /// No condition may hold.
    pub fn must_not(conditions: Vec<FieldCondition>) -> Self {
        Self::new(Combinator::MustNot, conditions)
    }

    /// Build a filter from the loose request form.
    ///
    /// Conditions from the simple `{key: value}` map come first, followed by
    /// the structured conditions, all wrapped in `kind`. Returns `Ok(None)`
    /// when neither source is supplied.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidFilter`] for an unknown `kind` or a value
    /// that cannot be matched exactly.
    pub fn from_request(
        simple: Option<&Payload>,
        conditions: Option<&[ConditionSpec]>,
        kind: &str,
    ) -> Result<Option<Self>> {
        if simple.is_none() && conditions.is_none() {
            return Ok(None);
        }
        let combinator = kind.parse::<Combinator>()?;

        let mut merged = Vec::new();
        if let Some(simple) = simple {
            for (key, value) in simple {
                merged.push(FieldCondition::ExactMatch {
                    key: key.clone(),
                    value: MatchValue::try_from(value)?,
                });
            }
        }
        if let Some(conditions) = conditions {
            for spec in conditions {
                match spec.to_condition()? {
                    Some(condition) => merged.push(condition),
                    None => debug!(key = %spec.key, "condition without match or range ignored"),
                }
            }
        }

        Ok(Some(Self::new(combinator, merged)))
    }

    /// Evaluate the filter against a payload.
    ///
    /// An empty condition list accepts every payload under all combinators.
    pub fn matches(&self, payload: &Payload) -> bool {
        match self.combinator {
            Combinator::Must => self.conditions.iter().all(|c| c.matches(payload)),
            Combinator::Should => {
                self.conditions.is_empty() || self.conditions.iter().any(|c| c.matches(payload))
            }
            Combinator::MustNot => !self.conditions.iter().any(|c| c.matches(payload)),
        }
    }
}

/// The loose wire form of a condition: a key with an optional exact value and
/// optional range. When both are given the range wins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConditionSpec {
    /// Payload key.
    pub key: String,
    /// Exact value to match.
    #[serde(default, rename = "match", skip_serializing_if = "Option::is_none")]
    pub match_value: Option<Value>,
    /// Numeric bounds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<Range>,
}

impl ConditionSpec {
    /// Convert to a typed condition; `None` when neither match nor range is set.
    pub fn to_condition(&self) -> Result<Option<FieldCondition>> {
        if let Some(range) = self.range {
            return Ok(Some(FieldCondition::range(self.key.clone(), range)));
        }
        match &self.match_value {
            Some(Value::Null) | None => Ok(None),
            Some(value) => Ok(Some(FieldCondition::ExactMatch {
                key: self.key.clone(),
                value: MatchValue::try_from(value)?,
            })),
        }
    }
}
