//! Change-event filter criteria.
//!
//! Criteria are written as JSON patterns, one per filter:
//!
//! ```json
//! {"eventName": [{"prefix": "INSERT"}]}
//! ```
//!
//! An event passes when any pattern matches. A pattern matches when every
//! field it names matches at least one of that field's rules. A rule is a
//! bare string (exact match), `{"equals": ".."}` or `{"prefix": ".."}`.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::model::{ChangeEvent, InsertEvent};

/// Event fields a pattern may refer to.
pub const FILTERABLE_FIELDS: [&str; 3] = ["eventName", "eventID", "eventSourceARN"];

/// Errors in filter configuration.
#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    #[error("Invalid filter pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Filter field '{0}' is not one of eventName, eventID, eventSourceARN")]
    UnknownField(String),

    #[error("Filter field '{0}' has no rules")]
    EmptyRules(String),
}

/// One way a field value can match.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum FieldRule {
    Exact(String),
    Prefix { prefix: String },
    Equals { equals: String },
}

impl FieldRule {
    pub fn matches(&self, value: &str) -> bool {
        match self {
            Self::Exact(expected) | Self::Equals { equals: expected } => value == expected,
            Self::Prefix { prefix } => value.starts_with(prefix.as_str()),
        }
    }
}

/// Field name to alternative rules.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(transparent)]
pub struct FilterPattern(BTreeMap<String, Vec<FieldRule>>);

impl FilterPattern {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rule(mut self, field: impl Into<String>, rule: FieldRule) -> Self {
        self.0.entry(field.into()).or_default().push(rule);
        self
    }

    fn validate(&self) -> Result<(), FilterError> {
        for (field, rules) in &self.0 {
            if !FILTERABLE_FIELDS.contains(&field.as_str()) {
                return Err(FilterError::UnknownField(field.clone()));
            }
            if rules.is_empty() {
                return Err(FilterError::EmptyRules(field.clone()));
            }
        }
        Ok(())
    }

    pub fn matches(&self, event: &ChangeEvent) -> bool {
        self.0.iter().all(|(field, rules)| {
            let value = match field.as_str() {
                "eventName" => Some(event.event_name.as_str()),
                "eventID" => Some(event.event_id.as_str()),
                "eventSourceARN" => event.event_source_arn.as_deref(),
                _ => None,
            };
            value.is_some_and(|v| rules.iter().any(|rule| rule.matches(v)))
        })
    }
}

/// Any-of list of patterns. No patterns means everything passes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilterCriteria {
    patterns: Vec<FilterPattern>,
}

impl FilterCriteria {
    pub fn new(patterns: Vec<FilterPattern>) -> Result<Self, FilterError> {
        for pattern in &patterns {
            pattern.validate()?;
        }
        Ok(Self { patterns })
    }

    /// Keep only events whose name starts with `INSERT`.
    pub fn insert_only() -> Self {
        Self {
            patterns: vec![FilterPattern::new().with_rule(
                "eventName",
                FieldRule::Prefix {
                    prefix: InsertEvent::NAME_PREFIX.to_string(),
                },
            )],
        }
    }

    /// Parse JSON-encoded patterns.
    pub fn from_json_patterns<S: AsRef<str>>(patterns: &[S]) -> Result<Self, FilterError> {
        let parsed = patterns
            .iter()
            .map(|p| {
                serde_json::from_str::<FilterPattern>(p.as_ref()).map_err(|source| {
                    FilterError::InvalidPattern {
                        pattern: p.as_ref().to_string(),
                        source,
                    }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(parsed)
    }

    pub fn patterns(&self) -> &[FilterPattern] {
        &self.patterns
    }

    pub fn matches(&self, event: &ChangeEvent) -> bool {
        self.patterns.is_empty() || self.patterns.iter().any(|p| p.matches(event))
    }
}
