//! Client-facing frames written onto the response transport.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::Display;

use super::message::{ContentType, Role};
use super::stream::DeltaKind;

/// Frame type seen by the client.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FrameType {
    Text,
    Think,
    Tool,
    Error,
    Loading,
}

impl From<ContentType> for FrameType {
    fn from(kind: ContentType) -> Self {
        match kind {
            ContentType::Text => Self::Text,
            ContentType::Think => Self::Think,
            ContentType::Tool => Self::Tool,
            ContentType::Error => Self::Error,
        }
    }
}

impl From<DeltaKind> for FrameType {
    /// Native tool-call fragments are presented to clients as plain `tool`.
    fn from(kind: DeltaKind) -> Self {
        match kind {
            DeltaKind::Text | DeltaKind::Other => Self::Text,
            DeltaKind::Think => Self::Think,
            DeltaKind::ToolCallsNative => Self::Tool,
            DeltaKind::Error => Self::Error,
        }
    }
}

/// Identity of the assistant answering a turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AssistantMeta {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

/// One frame of the client event protocol.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ClientFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assistant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assistant_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assistant_avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<FrameType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub props: Option<Map<String, Value>>,
    /// Starts a new message bubble on the client.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub new: bool,
    #[serde(default)]
    pub delta: bool,
    #[serde(default)]
    pub done: bool,
}

impl ClientFrame {
    /// Incremental content frame.
    pub fn delta(text: impl Into<String>, kind: FrameType) -> Self {
        Self {
            text: Some(text.into()),
            kind: Some(kind),
            delta: true,
            ..Default::default()
        }
    }

    /// Terminal error frame.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            text: Some(message.into()),
            kind: Some(FrameType::Error),
            done: true,
            ..Default::default()
        }
    }

    /// Bare end-of-turn frame.
    pub fn done() -> Self {
        Self {
            done: true,
            ..Default::default()
        }
    }

    /// End-of-turn frame carrying literal output.
    pub fn output(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            done: true,
            ..Default::default()
        }
    }

    /// Transient placeholder shown while another assistant is being called.
    pub fn loading(placeholder: impl Into<String>) -> Self {
        let mut props = Map::new();
        props.insert("placeholder".into(), Value::String(placeholder.into()));
        Self {
            role: Some(Role::Assistant),
            kind: Some(FrameType::Loading),
            props: Some(props),
            new: true,
            ..Default::default()
        }
    }

    pub fn with_assistant(mut self, meta: &AssistantMeta) -> Self {
        self.assistant_id = Some(meta.id.clone());
        self.assistant_name = Some(meta.name.clone());
        self.assistant_avatar = meta.avatar.clone();
        self
    }

    pub fn is_error(&self) -> bool {
        self.kind == Some(FrameType::Error)
    }
}

/// Callback used for writing frames to the client transport.
pub type FrameSink = Arc<dyn Fn(ClientFrame) + Send + Sync>;
