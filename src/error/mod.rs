//! Error types for Parley.

pub mod unified;

pub use unified::ErrorCategory;

use thiserror::Error;

use crate::hooks::HookStage;

/// Primary error type for all Parley operations.
#[derive(Error, Debug)]
pub enum ParleyError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("unknown action: {0}")]
    UnknownAction(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("{stage} hook error: {message}")]
    Hook { stage: HookStage, message: String },

    #[error("Assistant not found: {0}")]
    AssistantNotFound(String),

    #[error("file {0} not found")]
    AttachmentNotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Delegation depth exceeded (max {0})")]
    DelegationDepthExceeded(usize),

    #[error("Turn canceled")]
    Canceled,

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

impl ParleyError {
    /// Create a hook error for the given stage.
    pub fn hook(stage: HookStage, message: impl Into<String>) -> Self {
        Self::Hook {
            stage,
            message: message.into(),
        }
    }

    /// Create an input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidInput(_) | Self::UnknownAction(_) | Self::Serialization(_) => {
                ErrorCategory::Input
            }
            Self::Provider(_) => ErrorCategory::Provider,
            Self::Hook { .. } => ErrorCategory::Hook,
            Self::AssistantNotFound(_) | Self::AttachmentNotFound(_) => ErrorCategory::Resolution,
            Self::Storage(_) | Self::Io(_) => ErrorCategory::Storage,
            Self::Network(_) => ErrorCategory::Network,
            Self::Configuration(_) | Self::ConfigParse(_) => ErrorCategory::Configuration,
            Self::DelegationDepthExceeded(_) => ErrorCategory::Input,
            Self::Canceled => ErrorCategory::Canceled,
        }
    }

    /// Whether a client frame should be written for this error.
    ///
    /// A canceled turn has no client left to write to.
    pub fn is_reportable(&self) -> bool {
        !matches!(self.category(), ErrorCategory::Canceled)
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, ParleyError>;
