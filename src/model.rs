//! Conversation and sequence data types
//!
//! This module contains the data structures shared between the controller,
//! the API client and the terminal UI. None of them depend on a UI framework.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Who (or what) produced a transcript entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    User,
    Assistant,
    /// System-generated notice. Rendered inline but never sent as context.
    Status,
}

/// A single transcript entry. Messages are append-only and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Message {
    pub fn new(kind: MessageKind, content: impl Into<String>) -> Self {
        Self {
            id: None,
            content: content.into(),
            kind,
            timestamp: Some(Utc::now()),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageKind::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageKind::Assistant, content)
    }

    pub fn status(content: impl Into<String>) -> Self {
        Self::new(MessageKind::Status, content)
    }

    pub fn is_status(&self) -> bool {
        self.kind == MessageKind::Status
    }
}

/// One editable unit of a sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceStep {
    /// Positional label assigned at creation time ("1", "2", ...).
    /// Edits never renumber it.
    pub step: String,
    pub content: String,
}

impl SequenceStep {
    pub fn new(step: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            content: content.into(),
        }
    }
}

/// The outreach sequence currently shown in the workspace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sequence {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub steps: Vec<SequenceStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<SequenceContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Sequence {
    pub fn new(steps: Vec<SequenceStep>) -> Self {
        Self {
            id: None,
            steps,
            context: None,
            created_at: Some(Utc::now()),
            updated_at: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// A step entry exactly as the backend returned it.
///
/// The generate-sequence endpoint hands back plain strings and step objects
/// interchangeably, so both shapes are accepted. Anything else lands in
/// `Other` instead of failing the whole response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawStep {
    Text(String),
    Object(StepObject),
    Other(Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepObject {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RawStep {
    /// The text this entry contributes to a step. Missing content is empty.
    pub fn into_content(self) -> String {
        match self {
            RawStep::Text(text) => text,
            RawStep::Object(StepObject { content, .. }) => content.unwrap_or_default(),
            RawStep::Other(_) => String::new(),
        }
    }
}

/// Turn backend step entries into labelled steps, numbering from 1.
pub fn normalize_steps(raw: Vec<RawStep>) -> Vec<SequenceStep> {
    raw.into_iter()
        .enumerate()
        .map(|(index, entry)| SequenceStep {
            step: (index + 1).to_string(),
            content: entry.into_content(),
        })
        .collect()
}

/// A transcript entry as sent to the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextMessage {
    pub content: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
}

impl From<&Message> for ContextMessage {
    fn from(message: &Message) -> Self {
        Self {
            content: message.content.clone(),
            kind: message.kind,
        }
    }
}

/// Context handed to the generate-sequence endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceContext {
    pub messages: Vec<ContextMessage>,
    pub user_request: String,
}

/// The logical conversation: every message except status notices.
pub fn conversation(messages: &[Message]) -> Vec<ContextMessage> {
    messages
        .iter()
        .filter(|m| !m.is_status())
        .map(ContextMessage::from)
        .collect()
}
