// src/core/options.rs

//! Option schemas declared by add-ons and validation of caller-supplied values.

use crate::constants::DEFAULT_OPTIONS_LABEL;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use thiserror::Error;

/// Errors produced while checking an option schema or validating values against it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A value was supplied for a key the schema does not declare.
    #[error("Unknown option '{key}'.")]
    UnknownKey {
        /// The offending key.
        key: String,
    },
    /// A value does not have the shape its question expects.
    #[error("Option '{key}' expects {expected}, got '{actual}'.")]
    TypeMismatch {
        /// The option key.
        key: String,
        /// Human readable description of the expected shape.
        expected: &'static str,
        /// The rendered value that was supplied.
        actual: String,
    },
    /// A select or multiselect value is not among the declared choices.
    #[error("Option '{key}' does not accept '{value}'. Allowed values: {allowed}.")]
    InvalidChoice {
        /// The option key.
        key: String,
        /// The rejected value.
        value: String,
        /// Comma separated list of the accepted values.
        allowed: String,
    },
    /// A conditional option was supplied while its governing condition is false.
    #[error("Option '{key}' was supplied, but its condition does not hold for the other options.")]
    InactiveOption {
        /// The option key.
        key: String,
    },
    /// Two questions share the same key.
    #[error("Option '{key}' is declared more than once.")]
    DuplicateKey {
        /// The duplicated key.
        key: String,
    },
    /// A condition references a key that is not declared before the question owning it.
    #[error("The condition of option '{key}' references '{reference}', which is not declared before it.")]
    ForwardReference {
        /// The option whose condition is invalid.
        key: String,
        /// The key referenced by the condition.
        reference: String,
    },
    /// The declared default does not satisfy the question itself.
    #[error("The default value of option '{key}' is invalid: {reason}")]
    InvalidDefault {
        /// The option key.
        key: String,
        /// Why the default was rejected.
        reason: String,
    },
    /// A command line option argument was not in `key=value` form.
    #[error("Could not parse option argument '{input}': expected 'key=value'.")]
    MalformedArgument {
        /// The raw argument.
        input: String,
    },
}

type ValidationResult<T> = Result<T, ValidationError>;

/// A concrete option value. Untagged so it reads naturally from TOML and JSON.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum OptionValue {
    /// Answer to a boolean question.
    Bool(bool),
    /// Answer to a select or free-text question.
    Text(String),
    /// Answer to a multiselect question.
    List(Vec<String>),
}

impl OptionValue {
    /// Returns the boolean payload, if any.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the text payload, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the list payload, if any.
    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Text(s) => f.write_str(s),
            Self::List(items) => f.write_str(&items.join(",")),
        }
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<String>> for OptionValue {
    fn from(value: Vec<String>) -> Self {
        Self::List(value)
    }
}

/// Caller-supplied, not yet validated option values.
pub type RawOptions = BTreeMap<String, OptionValue>;

/// Builds a [`RawOptions`] map from `(key, value)` pairs.
pub fn raw_options<I, K, V>(pairs: I) -> RawOptions
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<OptionValue>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// One selectable answer of a select or multiselect question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    /// The value stored in [`OptionValues`].
    pub value: String,
    /// Display label.
    pub label: String,
    /// Optional extra hint shown next to the label.
    pub hint: Option<String>,
}

impl Choice {
    /// Creates a choice without a hint.
    pub fn new(value: &str, label: &str) -> Self {
        Self {
            value: value.to_string(),
            label: label.to_string(),
            hint: None,
        }
    }

    /// Attaches a hint to the choice.
    pub fn with_hint(mut self, hint: &str) -> Self {
        self.hint = Some(hint.to_string());
        self
    }
}

/// The answer shape a question accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuestionKind {
    /// Yes/no.
    Boolean,
    /// Exactly one of the choices.
    Select(Vec<Choice>),
    /// Any subset of the choices.
    MultiSelect(Vec<Choice>),
    /// Free text.
    String {
        /// Placeholder shown by interactive front ends.
        placeholder: Option<String>,
    },
}

impl QuestionKind {
    fn expected(&self) -> &'static str {
        match self {
            Self::Boolean => "a boolean",
            Self::Select(_) => "one of its choices",
            Self::MultiSelect(_) => "a list of its choices",
            Self::String { .. } => "a string",
        }
    }
}

/// A declarative governing condition over previously declared options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// The option equals the value.
    Equals(String, OptionValue),
    /// The option is absent or differs from the value.
    NotEquals(String, OptionValue),
    /// The boolean option is `true`.
    IsTrue(String),
    /// The multiselect option contains the value.
    Includes(String, String),
    /// Every inner condition holds.
    All(Vec<Condition>),
    /// At least one inner condition holds.
    Any(Vec<Condition>),
    /// The inner condition does not hold.
    Not(Box<Condition>),
}

impl Condition {
    /// Shorthand for [`Condition::Equals`].
    pub fn equals(key: &str, value: impl Into<OptionValue>) -> Self {
        Self::Equals(key.to_string(), value.into())
    }

    /// Shorthand for [`Condition::IsTrue`].
    pub fn is_true(key: &str) -> Self {
        Self::IsTrue(key.to_string())
    }

    /// Evaluates the condition against already resolved values.
    pub fn evaluate(&self, values: &OptionValues) -> bool {
        match self {
            Self::Equals(key, expected) => values.get(key) == Some(expected),
            Self::NotEquals(key, expected) => values.get(key) != Some(expected),
            Self::IsTrue(key) => values.get_bool(key) == Some(true),
            Self::Includes(key, item) => values
                .get(key)
                .and_then(OptionValue::as_list)
                .is_some_and(|items| items.iter().any(|i| i == item)),
            Self::All(inner) => inner.iter().all(|c| c.evaluate(values)),
            Self::Any(inner) => inner.iter().any(|c| c.evaluate(values)),
            Self::Not(inner) => !inner.evaluate(values),
        }
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Equals(key, _) | Self::NotEquals(key, _) | Self::IsTrue(key) => out.push(key),
            Self::Includes(key, _) => out.push(key),
            Self::All(inner) | Self::Any(inner) => {
                inner.iter().for_each(|c| c.collect_references(out));
            }
            Self::Not(inner) => inner.collect_references(out),
        }
    }
}

/// A single configurable option of an add-on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    /// Prompt text.
    pub question: String,
    /// Accepted answer shape.
    pub kind: QuestionKind,
    /// Value used when the caller leaves the option out.
    pub default: OptionValue,
    /// When set, the option only exists while the condition holds.
    pub condition: Option<Condition>,
}

impl Question {
    /// A yes/no question.
    pub fn boolean(question: &str, default: bool) -> Self {
        Self {
            question: question.to_string(),
            kind: QuestionKind::Boolean,
            default: OptionValue::Bool(default),
            condition: None,
        }
    }

    /// A single-choice question.
    pub fn select(question: &str, choices: Vec<Choice>, default: &str) -> Self {
        Self {
            question: question.to_string(),
            kind: QuestionKind::Select(choices),
            default: OptionValue::Text(default.to_string()),
            condition: None,
        }
    }

    /// A multiple-choice question.
    pub fn multiselect(question: &str, choices: Vec<Choice>, default: &[&str]) -> Self {
        Self {
            question: question.to_string(),
            kind: QuestionKind::MultiSelect(choices),
            default: OptionValue::List(default.iter().map(|s| s.to_string()).collect()),
            condition: None,
        }
    }

    /// A free-text question.
    pub fn string(question: &str, default: &str) -> Self {
        Self {
            question: question.to_string(),
            kind: QuestionKind::String { placeholder: None },
            default: OptionValue::Text(default.to_string()),
            condition: None,
        }
    }

    /// Makes the question conditional.
    pub fn when(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }
}

/// Ordered mapping from option key to [`Question`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionDefinition {
    entries: Vec<(String, Question)>,
}

impl OptionDefinition {
    /// Builds a definition from `(key, question)` pairs in declaration order.
    ///
    /// Construction does not validate; [`OptionDefinition::check`] does, and
    /// [`validate`] always runs it first.
    pub fn new(entries: Vec<(&str, Question)>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|(k, q)| (k.to_string(), q))
                .collect(),
        }
    }

    /// A definition without options.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns the question declared for `key`.
    pub fn get(&self, key: &str) -> Option<&Question> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, q)| q)
    }

    /// Iterates over `(key, question)` in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Question)> {
        self.entries.iter().map(|(k, q)| (k.as_str(), q))
    }

    /// Number of declared options.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the definition declares no options.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Checks the schema invariants: unique keys, valid defaults, and conditions
    /// that only reference previously declared keys.
    pub fn check(&self) -> ValidationResult<()> {
        let mut declared: HashSet<&str> = HashSet::new();
        for (key, question) in &self.entries {
            if let Some(condition) = &question.condition {
                let mut references = Vec::new();
                condition.collect_references(&mut references);
                if let Some(reference) = references.into_iter().find(|r| !declared.contains(r)) {
                    return Err(ValidationError::ForwardReference {
                        key: key.clone(),
                        reference: reference.to_string(),
                    });
                }
            }
            check_value(key, &question.kind, &question.default).map_err(|e| {
                ValidationError::InvalidDefault {
                    key: key.clone(),
                    reason: e.to_string(),
                }
            })?;
            if !declared.insert(key.as_str()) {
                return Err(ValidationError::DuplicateKey { key: key.clone() });
            }
        }
        Ok(())
    }

    /// The values obtained when the caller supplies nothing.
    pub fn defaults(&self) -> ValidationResult<OptionValues> {
        validate(self, &RawOptions::new())
    }
}

/// Validated option values; contains exactly the keys whose condition holds.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionValues(BTreeMap<String, OptionValue>);

impl OptionValues {
    /// Returns the value for `key`.
    pub fn get(&self, key: &str) -> Option<&OptionValue> {
        self.0.get(key)
    }

    /// Returns the text value for `key`.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(OptionValue::as_str)
    }

    /// Returns the boolean value for `key`.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(OptionValue::as_bool)
    }

    /// Whether `key` holds the text `value`.
    pub fn is(&self, key: &str, value: &str) -> bool {
        self.get_str(key) == Some(value)
    }

    /// Iterates over the values in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &OptionValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of resolved values.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no value was resolved.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Stable, filesystem-safe name of this option set, used for snapshot
    /// directories and reports. Values equal to their defaults are omitted; a
    /// set made only of defaults is labelled `default`.
    pub fn label(&self, definition: &OptionDefinition) -> String {
        let parts: Vec<String> = definition
            .iter()
            .filter_map(|(key, question)| {
                let value = self.get(key)?;
                (value != &question.default).then(|| format!("{key}-{value}"))
            })
            .collect();

        if parts.is_empty() {
            return DEFAULT_OPTIONS_LABEL.to_string();
        }
        parts
            .join("_")
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '-'
                }
            })
            .collect()
    }

    fn insert(&mut self, key: &str, value: OptionValue) {
        self.0.insert(key.to_string(), value);
    }
}

/// Validates `raw` against `definition`, filling defaults for absent keys.
///
/// Conditions are evaluated in declaration order against the values resolved
/// so far, so an option only ever depends on earlier ones.
pub fn validate(definition: &OptionDefinition, raw: &RawOptions) -> ValidationResult<OptionValues> {
    definition.check()?;

    if let Some(key) = raw.keys().find(|k| definition.get(k).is_none()) {
        return Err(ValidationError::UnknownKey { key: key.clone() });
    }

    let mut values = OptionValues::default();
    for (key, question) in definition.iter() {
        let active = question
            .condition
            .as_ref()
            .is_none_or(|condition| condition.evaluate(&values));

        match (raw.get(key), active) {
            (Some(_), false) => {
                return Err(ValidationError::InactiveOption {
                    key: key.to_string(),
                });
            }
            (None, false) => {}
            (Some(value), true) => {
                check_value(key, &question.kind, value)?;
                values.insert(key, value.clone());
            }
            (None, true) => values.insert(key, question.default.clone()),
        }
    }
    Ok(values)
}

/// Converts `key=value` command line arguments into typed raw options.
///
/// Booleans accept `true/false/yes/no`; multiselect values are comma separated.
pub fn parse_cli_pairs(definition: &OptionDefinition, pairs: &[String]) -> ValidationResult<RawOptions> {
    let mut raw = RawOptions::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .map(|(k, v)| (k.trim(), v.trim()))
            .filter(|(k, _)| !k.is_empty())
            .ok_or_else(|| ValidationError::MalformedArgument {
                input: pair.clone(),
            })?;
        let question = definition
            .get(key)
            .ok_or_else(|| ValidationError::UnknownKey {
                key: key.to_string(),
            })?;

        let typed = match &question.kind {
            QuestionKind::Boolean => match value.to_ascii_lowercase().as_str() {
                "true" | "yes" | "y" | "1" => OptionValue::Bool(true),
                "false" | "no" | "n" | "0" => OptionValue::Bool(false),
                _ => {
                    return Err(ValidationError::TypeMismatch {
                        key: key.to_string(),
                        expected: question.kind.expected(),
                        actual: value.to_string(),
                    });
                }
            },
            QuestionKind::MultiSelect(_) => OptionValue::List(
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect(),
            ),
            QuestionKind::Select(_) | QuestionKind::String { .. } => {
                OptionValue::Text(value.to_string())
            }
        };
        raw.insert(key.to_string(), typed);
    }
    Ok(raw)
}

fn check_value(key: &str, kind: &QuestionKind, value: &OptionValue) -> ValidationResult<()> {
    let mismatch = || ValidationError::TypeMismatch {
        key: key.to_string(),
        expected: kind.expected(),
        actual: value.to_string(),
    };
    let not_a_choice = |choices: &[Choice], candidate: &str| ValidationError::InvalidChoice {
        key: key.to_string(),
        value: candidate.to_string(),
        allowed: choices
            .iter()
            .map(|c| c.value.as_str())
            .collect::<Vec<_>>()
            .join(", "),
    };

    match (kind, value) {
        (QuestionKind::Boolean, OptionValue::Bool(_)) => Ok(()),
        (QuestionKind::String { .. }, OptionValue::Text(_)) => Ok(()),
        (QuestionKind::Select(choices), OptionValue::Text(v)) => {
            if choices.iter().any(|c| &c.value == v) {
                Ok(())
            } else {
                Err(not_a_choice(choices, v))
            }
        }
        (QuestionKind::MultiSelect(choices), OptionValue::List(items)) => {
            match items.iter().find(|i| !choices.iter().any(|c| &c.value == *i)) {
                Some(unknown) => Err(not_a_choice(choices, unknown)),
                None => Ok(()),
            }
        }
        _ => Err(mismatch()),
    }
}
