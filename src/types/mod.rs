//! Core types for Parley.

pub mod frame;
pub mod message;
pub mod stream;

pub use frame::*;
pub use message::*;
pub use stream::*;

/// Request options sent to the model backend (`temperature`, `tools`, ...).
pub type Options = serde_json::Map<String, serde_json::Value>;
