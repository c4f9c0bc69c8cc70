//! Unified error classification.

use serde::{Deserialize, Serialize};
use strum::Display;

/// Broad error category, one per failure class a turn can end with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorCategory {
    /// Malformed hook payload, unknown action, missing field.
    Input,
    /// Error frame or failure reported by the model backend.
    Provider,
    /// A hook call failed.
    Hook,
    /// Assistant or attachment could not be resolved.
    Resolution,
    Storage,
    Network,
    Configuration,
    Canceled,
}
