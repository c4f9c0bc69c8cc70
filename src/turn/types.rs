//! Per-turn context and result types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Unique turn identifier.
pub type TurnId = Uuid;

/// Identity and capability flags of one user turn.
///
/// Owned by the turn; cloned into hooks and delegated turns, never shared
/// between concurrent turns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnContext {
    pub turn_id: TurnId,
    pub session_id: String,
    pub chat_id: String,
    pub assistant_id: String,
    /// The active assistant accepts inline images.
    #[serde(default)]
    pub vision: bool,
    /// A retrieval collaborator is attached to this turn.
    #[serde(default)]
    pub rag: bool,
    /// Delegation nesting level; 0 for the user's own turn.
    #[serde(default)]
    pub depth: usize,
}

impl TurnContext {
    pub fn new(
        session_id: impl Into<String>,
        chat_id: impl Into<String>,
        assistant_id: impl Into<String>,
    ) -> Self {
        Self {
            turn_id: Uuid::new_v4(),
            session_id: session_id.into(),
            chat_id: chat_id.into(),
            assistant_id: assistant_id.into(),
            vision: false,
            rag: false,
            depth: 0,
        }
    }

    pub fn with_rag(mut self, enabled: bool) -> Self {
        self.rag = enabled;
        self
    }

    /// Metadata stored alongside persisted history.
    pub fn metadata(&self) -> Map<String, Value> {
        let mut metadata = Map::new();
        metadata.insert("turn_id".into(), Value::String(self.turn_id.to_string()));
        metadata.insert("assistant_id".into(), Value::String(self.assistant_id.clone()));
        metadata.insert("depth".into(), Value::from(self.depth));
        metadata.insert("rag".into(), Value::Bool(self.rag));
        metadata
    }
}

/// Turn lifecycle status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    Completed,
    Failed,
    Canceled,
}

/// Result of a turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnResult {
    pub status: TurnStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub finished_at: DateTime<Utc>,
}

impl TurnResult {
    pub fn completed() -> Self {
        Self {
            status: TurnStatus::Completed,
            error: None,
            finished_at: Utc::now(),
        }
    }

    pub fn canceled() -> Self {
        Self {
            status: TurnStatus::Canceled,
            error: None,
            finished_at: Utc::now(),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: TurnStatus::Failed,
            error: Some(error.into()),
            finished_at: Utc::now(),
        }
    }
}
