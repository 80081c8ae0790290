//! Prompt schemas and the decoding of raw platform responses against them.
//!
//! Decoding is pure: it never touches the registry or the platform, so the
//! registry can decide separately whether a failure is retryable.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::token::CorrelationToken;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptKind {
    Form,
    Buttons,
    Selection,
}

impl PromptKind {
    /// Forms keep their waiter alive after a decode failure so the user can
    /// resubmit; button and selection prompts are one-shot.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Form)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Form => "form",
            Self::Buttons => "buttons",
            Self::Selection => "selection",
        }
    }
}

impl fmt::Display for PromptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputStyle {
    Short,
    Paragraph,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormField {
    pub id: String,
    pub label: String,
    pub style: InputStyle,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
}

impl FormField {
    pub fn short(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            style: InputStyle::Short,
            required: true,
            placeholder: None,
            max_length: None,
        }
    }

    pub fn paragraph(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self { style: InputStyle::Paragraph, ..Self::short(id, label) }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = Some(placeholder.into());
        self
    }

    pub fn max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub id: String,
    pub label: String,
}

impl Choice {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self { id: id.into(), label: label.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PromptSchema {
    Form { fields: Vec<FormField> },
    /// Each button carries its own token; the map resolves a pressed token to
    /// the choice identifier it was bound to.
    Buttons { choices: BTreeMap<CorrelationToken, String> },
    Selection { choices: Vec<Choice>, min_values: usize, max_values: usize },
}

impl PromptSchema {
    pub fn kind(&self) -> PromptKind {
        match self {
            Self::Form { .. } => PromptKind::Form,
            Self::Buttons { .. } => PromptKind::Buttons,
            Self::Selection { .. } => PromptKind::Selection,
        }
    }
}

/// Payload carried by an inbound component event, before decoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RawResponse {
    FormSubmission { values: Vec<(String, String)> },
    ButtonPress,
    Selection { values: Vec<String> },
}

impl RawResponse {
    pub fn kind(&self) -> PromptKind {
        match self {
            Self::FormSubmission { .. } => PromptKind::Form,
            Self::ButtonPress => PromptKind::Buttons,
            Self::Selection { .. } => PromptKind::Selection,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum FieldValue {
    Provided(String),
    /// An optional field left blank.
    NotProvided,
}

impl FieldValue {
    pub fn as_deref(&self) -> Option<&str> {
        match self {
            Self::Provided(value) => Some(value),
            Self::NotProvided => None,
        }
    }

    pub fn display_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.as_deref().unwrap_or(fallback)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FormValues(BTreeMap<String, FieldValue>);

impl FormValues {
    pub fn get(&self, field_id: &str) -> Option<&FieldValue> {
        self.0.get(field_id)
    }

    pub fn provided(&self, field_id: &str) -> Option<&str> {
        self.0.get(field_id).and_then(FieldValue::as_deref)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.0.iter().map(|(id, value)| (id.as_str(), value))
    }
}

impl FromIterator<(String, FieldValue)> for FormValues {
    fn from_iter<I: IntoIterator<Item = (String, FieldValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PromptValue {
    Form(FormValues),
    Choice(String),
    Selection(Vec<String>),
}

impl PromptValue {
    pub fn kind(&self) -> PromptKind {
        match self {
            Self::Form(_) => PromptKind::Form,
            Self::Choice(_) => PromptKind::Buttons,
            Self::Selection(_) => PromptKind::Selection,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("required field `{0}` is missing from the submission")]
    MissingField(String),
    #[error("required field `{0}` was left empty")]
    RequiredFieldEmpty(String),
    #[error("field `{0}` is not part of this form")]
    UnexpectedField(String),
    #[error("field `{field}` exceeds {max} characters")]
    FieldTooLong { field: String, max: usize },
    #[error("`{0}` is not one of the offered choices")]
    UnknownChoice(String),
    #[error("expected between {min} and {max} selections, received {received}")]
    SelectionCount { min: usize, max: usize, received: usize },
    #[error("expected a {expected} response, received a {received} response")]
    ShapeMismatch { expected: PromptKind, received: PromptKind },
}

pub fn decode_response(
    schema: &PromptSchema,
    token: &CorrelationToken,
    raw: &RawResponse,
) -> Result<PromptValue, DecodeError> {
    match (schema, raw) {
        (PromptSchema::Form { fields }, RawResponse::FormSubmission { values }) => {
            decode_form(fields, values).map(PromptValue::Form)
        }
        (PromptSchema::Buttons { choices }, RawResponse::ButtonPress) => choices
            .get(token)
            .cloned()
            .map(PromptValue::Choice)
            .ok_or_else(|| DecodeError::UnknownChoice(token.to_string())),
        (
            PromptSchema::Selection { choices, min_values, max_values },
            RawResponse::Selection { values },
        ) => {
            decode_selection(choices, *min_values, *max_values, values).map(PromptValue::Selection)
        }
        (schema, raw) => {
            Err(DecodeError::ShapeMismatch { expected: schema.kind(), received: raw.kind() })
        }
    }
}

fn decode_form(
    fields: &[FormField],
    submitted: &[(String, String)],
) -> Result<FormValues, DecodeError> {
    let mut by_id = BTreeMap::new();
    for (id, value) in submitted {
        if !fields.iter().any(|field| &field.id == id) {
            return Err(DecodeError::UnexpectedField(id.clone()));
        }
        by_id.insert(id.as_str(), value.trim());
    }

    let mut values = BTreeMap::new();
    for field in fields {
        let value = match by_id.get(field.id.as_str()) {
            Some(value) if !value.is_empty() => {
                if let Some(max) = field.max_length {
                    if value.chars().count() > max {
                        return Err(DecodeError::FieldTooLong { field: field.id.clone(), max });
                    }
                }
                FieldValue::Provided((*value).to_owned())
            }
            Some(_) if field.required => {
                return Err(DecodeError::RequiredFieldEmpty(field.id.clone()));
            }
            None if field.required => return Err(DecodeError::MissingField(field.id.clone())),
            _ => FieldValue::NotProvided,
        };
        values.insert(field.id.clone(), value);
    }

    Ok(FormValues(values))
}

fn decode_selection(
    choices: &[Choice],
    min_values: usize,
    max_values: usize,
    selected: &[String],
) -> Result<Vec<String>, DecodeError> {
    let mut seen = BTreeSet::new();
    let mut decoded = Vec::with_capacity(selected.len());
    for value in selected {
        if !choices.iter().any(|choice| &choice.id == value) {
            return Err(DecodeError::UnknownChoice(value.clone()));
        }
        if seen.insert(value.as_str()) {
            decoded.push(value.clone());
        }
    }

    if decoded.len() < min_values || decoded.len() > max_values {
        return Err(DecodeError::SelectionCount {
            min: min_values,
            max: max_values,
            received: decoded.len(),
        });
    }

    Ok(decoded)
}
