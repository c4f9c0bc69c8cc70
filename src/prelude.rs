//! Convenience re-exports for common use.

pub use crate::assistant::{Assistant, AssistantRegistry, ConnectorRegistry, ConnectorSettings, Prompt, ToolSet};
pub use crate::config::ParleyConfig;
pub use crate::content::{Contents, Segment, SegmentId};
pub use crate::error::{ParleyError, Result};
pub use crate::hooks::{AssistantHooks, HookContext, HookResult, HookStage};
pub use crate::provider::{ChatBackend, FrameControl, OpenAiBackend};
pub use crate::storage::{ConversationStore, HistoryRecord, MemoryStore};
pub use crate::turn::{Engine, NextAction, TurnContext, TurnResult, TurnStatus};
pub use crate::types::{
    Attachment, ClientFrame, ContentType, DeltaEvent, DeltaKind, FrameSink, FrameType, Message,
    Options, Role,
};
