//! Conversation storage collaborator.

pub mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;
use crate::types::{AssistantMeta, ContentType, Message, Role};

/// One persisted history entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryRecord {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assistant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assistant_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assistant_avatar: Option<String>,
}

impl HistoryRecord {
    pub fn user(content: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            name: Some(name.into()),
            assistant_id: None,
            assistant_name: None,
            assistant_avatar: None,
        }
    }

    /// Assistant record; `content` is the transcript JSON.
    pub fn assistant(
        content: impl Into<String>,
        name: impl Into<String>,
        assistant: &AssistantMeta,
    ) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            name: Some(name.into()),
            assistant_id: Some(assistant.id.clone()),
            assistant_name: Some(assistant.name.clone()),
            assistant_avatar: assistant.avatar.clone(),
        }
    }

    /// Expand into conversation messages.
    ///
    /// An assistant record holding a JSON segment array becomes one message
    /// per segment, keeping each segment's type; anything else is a single
    /// message.
    pub fn into_messages(self) -> Vec<Message> {
        let segments = if self.role == Role::Assistant {
            serde_json::from_str::<Vec<StoredSegment>>(&self.content).ok()
        } else {
            None
        };

        match segments {
            Some(segments) => segments
                .into_iter()
                .map(|segment| Message {
                    role: self.role,
                    name: self.name.clone(),
                    text: segment.text,
                    kind: Some(segment.kind),
                    ..Default::default()
                })
                .collect(),
            None => vec![Message {
                role: self.role,
                name: self.name,
                text: self.content,
                ..Default::default()
            }],
        }
    }
}

#[derive(Deserialize)]
struct StoredSegment {
    #[serde(rename = "type", default)]
    kind: ContentType,
    #[serde(default)]
    text: String,
}

/// Summary of one chat in a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatSummary {
    pub chat_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Persistence of conversation history and chat metadata.
///
/// May be called concurrently by unrelated turns; implementations keep
/// per-session ordering consistent.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// History of one chat, oldest first.
    async fn get_history(&self, session_id: &str, chat_id: &str) -> Result<Vec<HistoryRecord>>;

    async fn save_history(
        &self,
        session_id: &str,
        records: Vec<HistoryRecord>,
        chat_id: &str,
        metadata: &Map<String, Value>,
    ) -> Result<()>;

    /// Chats of a session, most recently updated first.
    async fn get_chats(&self, session_id: &str) -> Result<Vec<ChatSummary>>;

    async fn update_chat_title(&self, session_id: &str, chat_id: &str, title: &str) -> Result<()>;
}
