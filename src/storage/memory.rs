//! In-process conversation store with size and TTL limits.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::config::ParleyConfig;
use crate::error::{ParleyError, Result};

use super::{ChatSummary, ConversationStore, HistoryRecord};

#[derive(Debug, Clone)]
struct StoredRecord {
    record: HistoryRecord,
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct Chat {
    records: Vec<StoredRecord>,
    title: Option<String>,
    updated_at: Option<DateTime<Utc>>,
}

type ChatKey = (String, String);

#[derive(Debug)]
pub struct MemoryStore {
    chats: RwLock<HashMap<ChatKey, Chat>>,
    max_size: usize,
    ttl: Option<Duration>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_HISTORY_MAX_SIZE, None)
    }
}

impl MemoryStore {
    pub fn new(max_size: usize, ttl: Option<Duration>) -> Self {
        Self {
            chats: RwLock::new(HashMap::new()),
            max_size,
            ttl,
        }
    }

    pub fn from_config(config: &ParleyConfig) -> Self {
        Self::new(
            config.history_max_size,
            config.history_ttl_secs.map(Duration::from_secs),
        )
    }

    fn expiry(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.ttl
            .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
            .map(|ttl| now + ttl)
    }
}

fn live(record: &StoredRecord, now: DateTime<Utc>) -> bool {
    record.expires_at.map_or(true, |at| at > now)
}

fn key(session_id: &str, chat_id: &str) -> ChatKey {
    (session_id.to_string(), chat_id.to_string())
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn get_history(&self, session_id: &str, chat_id: &str) -> Result<Vec<HistoryRecord>> {
        let now = Utc::now();
        let chats = self.chats.read().await;
        let Some(chat) = chats.get(&key(session_id, chat_id)) else {
            return Ok(Vec::new());
        };

        let records: Vec<HistoryRecord> = chat
            .records
            .iter()
            .filter(|stored| live(stored, now))
            .map(|stored| stored.record.clone())
            .collect();
        let skip = records.len().saturating_sub(self.max_size);
        Ok(records.into_iter().skip(skip).collect())
    }

    async fn save_history(
        &self,
        session_id: &str,
        records: Vec<HistoryRecord>,
        chat_id: &str,
        metadata: &Map<String, Value>,
    ) -> Result<()> {
        if session_id.is_empty() {
            return Err(ParleyError::Storage("session id is required".to_string()));
        }

        let now = Utc::now();
        let expires_at = self.expiry(now);
        let mut chats = self.chats.write().await;
        let chat = chats.entry(key(session_id, chat_id)).or_default();

        chat.records.retain(|stored| live(stored, now));
        chat.records.extend(
            records
                .into_iter()
                .map(|record| StoredRecord { record, expires_at }),
        );
        chat.updated_at = Some(now);
        if chat.title.is_none() {
            chat.title = metadata
                .get("title")
                .and_then(Value::as_str)
                .map(str::to_string);
        }
        Ok(())
    }

    async fn get_chats(&self, session_id: &str) -> Result<Vec<ChatSummary>> {
        let chats = self.chats.read().await;
        let mut summaries: Vec<ChatSummary> = chats
            .iter()
            .filter(|((sid, _), _)| sid == session_id)
            .map(|((_, chat_id), chat)| ChatSummary {
                chat_id: chat_id.clone(),
                title: chat.title.clone(),
                updated_at: chat.updated_at.unwrap_or_else(Utc::now),
            })
            .collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }

    async fn update_chat_title(&self, session_id: &str, chat_id: &str, title: &str) -> Result<()> {
        let mut chats = self.chats.write().await;
        let chat = chats
            .get_mut(&key(session_id, chat_id))
            .ok_or_else(|| ParleyError::Storage(format!("chat {chat_id} not found")))?;
        chat.title = Some(title.to_string());
        Ok(())
    }
}
