//! Conversation message types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{Display, EnumString};

use crate::error::{ParleyError, Result};

/// Conversation role.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString, Default,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    System,
    #[default]
    User,
    Assistant,
}

/// Type tag carried by messages and transcript segments.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString, Default,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ContentType {
    #[default]
    Text,
    Think,
    Tool,
    Error,
}

impl ContentType {
    /// Reasoning, tool-call and error content is never replayed to the model.
    pub fn is_model_visible(&self) -> bool {
        matches!(self, Self::Text)
    }
}

/// A file attached to a user message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Attachment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Remote URL or file-store identifier.
    pub url: String,
    #[serde(default)]
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes: Option<u64>,
}

impl Attachment {
    pub fn is_image(&self) -> bool {
        self.content_type.starts_with("image/")
    }
}

/// A message in a conversation. Order in a `Vec<Message>` is conversation order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Message {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ContentType>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    /// Hidden messages reach the model but are left out of persisted history.
    #[serde(default)]
    pub hidden: bool,
}

impl Message {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            ..Default::default()
        }
    }

    /// Create a system message.
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, text)
    }

    /// Create a user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    /// Create an assistant message.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_kind(mut self, kind: ContentType) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// The effective type tag (untagged messages are text).
    pub fn content_type(&self) -> ContentType {
        self.kind.unwrap_or_default()
    }

    /// Build a message from a loosely-typed JSON object.
    ///
    /// `content` and `text` are both accepted for the body; a non-string
    /// body is kept as its JSON encoding. `default_role` applies when the
    /// map has no `role`.
    pub fn from_map(map: &Map<String, Value>, default_role: Role) -> Result<Self> {
        let role = match map.get("role") {
            None | Some(Value::Null) => default_role,
            Some(Value::String(role)) if role.is_empty() => default_role,
            Some(Value::String(role)) => role
                .parse::<Role>()
                .map_err(|_| ParleyError::invalid_input(format!("unknown role: {role}")))?,
            Some(other) => {
                return Err(ParleyError::invalid_input(format!(
                    "role must be a string, got {other}"
                )))
            }
        };

        let text = match map.get("content").or_else(|| map.get("text")) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(text)) => text.clone(),
            Some(other) => other.to_string(),
        };

        let kind = match map.get("type").and_then(Value::as_str) {
            Some(kind) => Some(
                kind.parse::<ContentType>()
                    .map_err(|_| ParleyError::invalid_input(format!("unknown type: {kind}")))?,
            ),
            None => None,
        };

        let attachments = match map.get("attachments") {
            Some(value @ Value::Array(_)) => serde_json::from_value(value.clone())?,
            _ => Vec::new(),
        };

        Ok(Self {
            role,
            name: map
                .get("name")
                .and_then(Value::as_str)
                .filter(|name| !name.is_empty())
                .map(str::to_string),
            text,
            kind,
            attachments,
            hidden: map.get("hidden").and_then(Value::as_bool).unwrap_or(false),
        })
    }

    /// Decode a raw string as a message.
    ///
    /// A JSON object is decoded through [`Message::from_map`]; anything else
    /// is taken as plain text under `default_role`.
    pub fn from_string(raw: &str, default_role: Role) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.starts_with('{') {
            if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed) {
                return Self::from_map(&map, default_role);
            }
        }
        Ok(Self::new(default_role, raw))
    }
}
