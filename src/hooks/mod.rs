//! Assistant hook pipeline: init, failure and completion hooks.
//!
//! Hooks are opaque async callbacks supplied by the assistant definition.
//! They may be slow or fail; the engine never retries them.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::{Map, Value};
use strum::Display;

use crate::content::Contents;
use crate::error::{ErrorCategory, ParleyError, Result};
use crate::turn::action::NextAction;
use crate::turn::TurnContext;
use crate::types::{Message, Options, Role};

/// Point in the turn lifecycle where a hook runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum HookStage {
    Init,
    Fail,
    Done,
}

/// In-flight state handed to every hook.
#[derive(Debug, Clone)]
pub struct HookContext {
    pub turn: TurnContext,
    pub messages: Vec<Message>,
    pub options: Options,
    /// Transcript accumulated so far (empty for the init hook).
    pub contents: Contents,
}

/// Changes requested by a hook. Every field is optional; `None` means no change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HookResult {
    pub options: Option<Options>,
    pub messages: Option<Vec<Message>>,
    pub assistant_id: Option<String>,
    pub output: Option<String>,
    pub error: Option<String>,
    pub next: Option<NextAction>,
}

impl HookResult {
    /// Decode a hook result returned as JSON by a scripted hook.
    ///
    /// Accepts `options`, `input` (or `messages`), `assistant_id`, `output`,
    /// `error` and `next`. A non-string `output` is kept as its JSON text.
    pub fn from_value(value: &Value) -> Result<Self> {
        let Value::Object(map) = value else {
            return Err(ParleyError::invalid_input("hook result should be an object"));
        };

        let options = match map.get("options") {
            None | Some(Value::Null) => None,
            Some(Value::Object(options)) => Some(options.clone()),
            Some(_) => return Err(ParleyError::invalid_input("options should be an object")),
        };

        let messages = match map.get("input").or_else(|| map.get("messages")) {
            None | Some(Value::Null) => None,
            Some(Value::Array(items)) => Some(
                items
                    .iter()
                    .map(|item| match item {
                        Value::Object(msg) => Message::from_map(msg, Role::User),
                        Value::String(raw) => Message::from_string(raw, Role::User),
                        _ => Err(ParleyError::invalid_input("input item should be a message")),
                    })
                    .collect::<Result<Vec<_>>>()?,
            ),
            Some(_) => return Err(ParleyError::invalid_input("input should be a message list")),
        };

        let output = match map.get("output") {
            None | Some(Value::Null) => None,
            Some(Value::String(text)) => Some(text.clone()),
            Some(other) => Some(other.to_string()),
        };

        let next = match map.get("next") {
            None | Some(Value::Null) => None,
            Some(next) => Some(NextAction::from_value(next)?),
        };

        Ok(Self {
            options,
            messages,
            assistant_id: string_field(map, "assistant_id"),
            output,
            error: string_field(map, "error"),
            next,
        })
    }
}

fn string_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Future returned by every hook.
pub type HookFuture = Pin<Box<dyn Future<Output = Result<Option<HookResult>>> + Send>>;

/// Runs before the model request; may rewrite messages/options or switch assistant.
pub type InitHook = Arc<dyn Fn(HookContext) -> HookFuture + Send + Sync>;

/// Runs when the model stream reports an error; receives the raw error text.
pub type FailHook = Arc<dyn Fn(HookContext, String) -> HookFuture + Send + Sync>;

/// Runs once after the stream completes; may override output or request a next action.
pub type DoneHook = Arc<dyn Fn(HookContext) -> HookFuture + Send + Sync>;

#[derive(Clone, Default)]
pub struct AssistantHooks {
    pub init: Option<InitHook>,
    pub fail: Option<FailHook>,
    pub done: Option<DoneHook>,
}

impl fmt::Debug for AssistantHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssistantHooks")
            .field("init", &self.init.as_ref().map(|_| ".."))
            .field("fail", &self.fail.as_ref().map(|_| ".."))
            .field("done", &self.done.as_ref().map(|_| ".."))
            .finish()
    }
}

impl AssistantHooks {
    pub fn with_init(mut self, hook: InitHook) -> Self {
        self.init = Some(hook);
        self
    }

    pub fn with_fail(mut self, hook: FailHook) -> Self {
        self.fail = Some(hook);
        self
    }

    pub fn with_done(mut self, hook: DoneHook) -> Self {
        self.done = Some(hook);
        self
    }

    pub async fn run_init(&self, ctx: HookContext) -> Result<Option<HookResult>> {
        let Some(hook) = &self.init else {
            return Ok(None);
        };
        tracing::trace!(turn_id = %ctx.turn.turn_id, "running init hook");
        hook(ctx).await.map_err(|err| stage_error(HookStage::Init, err))
    }

    pub async fn run_fail(&self, ctx: HookContext, error: String) -> Result<Option<HookResult>> {
        let Some(hook) = &self.fail else {
            return Ok(None);
        };
        tracing::trace!(turn_id = %ctx.turn.turn_id, "running fail hook");
        hook(ctx, error)
            .await
            .map_err(|err| stage_error(HookStage::Fail, err))
    }

    pub async fn run_done(&self, ctx: HookContext) -> Result<Option<HookResult>> {
        let Some(hook) = &self.done else {
            return Ok(None);
        };
        tracing::trace!(turn_id = %ctx.turn.turn_id, "running done hook");
        hook(ctx).await.map_err(|err| stage_error(HookStage::Done, err))
    }
}

/// Input errors keep their own variant so the client sees what was malformed.
fn stage_error(stage: HookStage, err: ParleyError) -> ParleyError {
    match err.category() {
        ErrorCategory::Input | ErrorCategory::Resolution => err,
        _ => ParleyError::hook(stage, err.to_string()),
    }
}
