//! Normalized delta events produced from raw provider frames.

use serde::{Deserialize, Serialize};
use strum::Display;

/// Kind of a normalized delta.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeltaKind {
    /// Plain assistant text.
    Text,
    /// Content from the provider's reasoning channel.
    Think,
    /// Fragment of a provider-native tool call.
    ToolCallsNative,
    /// Error reported by the provider inside the stream.
    Error,
    /// Vendor-specific visible text that is neither of the above.
    Other,
}

/// One incremental fragment of model output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeltaEvent {
    pub kind: DeltaKind,
    pub text: String,
    /// Set on the frame that ends the stream.
    #[serde(default)]
    pub done: bool,
    /// The frame could not be decoded and must be buffered, never emitted.
    #[serde(default)]
    pub pending: bool,
}

impl DeltaEvent {
    pub fn new(kind: DeltaKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            done: false,
            pending: false,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(DeltaKind::Text, text)
    }

    pub fn think(text: impl Into<String>) -> Self {
        Self::new(DeltaKind::Think, text)
    }

    pub fn tool(text: impl Into<String>) -> Self {
        Self::new(DeltaKind::ToolCallsNative, text)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(DeltaKind::Error, text)
    }

    /// Terminal frame with optional trailing text.
    pub fn done(text: impl Into<String>) -> Self {
        Self {
            done: true,
            ..Self::text(text)
        }
    }

    /// Undecodable raw fragment.
    pub fn pending(raw: impl Into<String>) -> Self {
        Self {
            pending: true,
            ..Self::text(raw)
        }
    }

    pub fn finished(mut self) -> Self {
        self.done = true;
        self
    }
}
