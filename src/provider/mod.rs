//! Model backend trait and the bundled OpenAI-compatible implementation.

pub mod http;
pub mod openai;

pub use openai::OpenAiBackend;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::types::Options;

/// Reply from the per-frame callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameControl {
    Continue,
    /// Halt delivery; the backend must not invoke the callback again.
    Stop,
}

/// Frame callback handed to [`ChatBackend::chat`].
pub type OnFrame<'a> = dyn FnMut(&[u8]) -> FrameControl + Send + 'a;

/// A language-model endpoint that streams raw frames.
///
/// Implementations call `on_frame` once per provider frame, in order, and
/// stop as soon as it returns [`FrameControl::Stop`]. Errors reported
/// inside the stream are delivered as frames; `Err` is reserved for
/// transport failures.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    async fn chat(
        &self,
        messages: &[Value],
        options: &Options,
        on_frame: &mut OnFrame<'_>,
    ) -> Result<()>;
}
