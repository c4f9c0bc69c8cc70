//! Follow-on actions requested by the completion hook.

use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::content::Contents;
use crate::error::{ParleyError, Result};
use crate::types::{ClientFrame, FrameSink, Message, Options, Role};

use super::{Engine, TurnContext, TurnResult};

/// Control action issued by a completion hook. Consumed exactly once.
#[derive(Debug, Clone, PartialEq)]
pub enum NextAction {
    /// Hand the conversation to another assistant.
    Delegate(Delegation),
    /// End the turn with no further output.
    Exit,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Delegation {
    pub assistant_id: String,
    pub input: DelegateInput,
    /// Caller options for the delegated turn.
    pub options: Options,
}

/// Accepted shapes of a delegated input.
#[derive(Debug, Clone, PartialEq)]
pub enum DelegateInput {
    Message(Message),
    Map(Map<String, Value>),
    /// Raw text, decoded as a message if it holds a JSON message object.
    Raw(String),
}

impl TryFrom<Value> for DelegateInput {
    type Error = ParleyError;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::String(raw) => Ok(Self::Raw(raw)),
            Value::Object(map) => Ok(Self::Map(map)),
            other => Err(ParleyError::invalid_input(format!(
                "input should be a string or a message, got {other}"
            ))),
        }
    }
}

impl DelegateInput {
    pub fn into_message(self) -> Result<Message> {
        match self {
            Self::Message(message) => Ok(message),
            Self::Map(map) => Message::from_map(&map, Role::User),
            Self::Raw(raw) => Message::from_string(&raw, Role::User),
        }
    }
}

impl NextAction {
    /// Decode `{"action": "assistant" | "exit", "payload": {..}}`.
    pub fn from_value(value: &Value) -> Result<Self> {
        let action = value
            .get("action")
            .and_then(Value::as_str)
            .ok_or_else(|| ParleyError::invalid_input("action is required"))?;

        match action {
            "assistant" => {
                let payload = value
                    .get("payload")
                    .and_then(Value::as_object)
                    .ok_or_else(|| ParleyError::invalid_input("payload is required"))?;

                let assistant_id = payload
                    .get("assistant_id")
                    .and_then(Value::as_str)
                    .filter(|id| !id.is_empty())
                    .ok_or_else(|| ParleyError::invalid_input("assistant_id should be a string"))?;

                let input = match payload.get("input") {
                    None | Some(Value::Null) => {
                        return Err(ParleyError::invalid_input("input is required"))
                    }
                    Some(input) => DelegateInput::try_from(input.clone())?,
                };

                let options = match payload.get("options") {
                    None | Some(Value::Null) => Options::new(),
                    Some(Value::Object(options)) => options.clone(),
                    Some(_) => return Err(ParleyError::invalid_input("options should be an object")),
                };

                Ok(Self::Delegate(Delegation {
                    assistant_id: assistant_id.to_string(),
                    input,
                    options,
                }))
            }
            "exit" => Ok(Self::Exit),
            other => Err(ParleyError::UnknownAction(other.to_string())),
        }
    }
}

impl Engine {
    pub(crate) async fn execute_action(
        &self,
        action: NextAction,
        ctx: TurnContext,
        sink: FrameSink,
        cancel: CancellationToken,
    ) -> Result<TurnResult> {
        let delegation = match action {
            NextAction::Exit => {
                debug!(turn_id = %ctx.turn_id, "next action: exit");
                return Ok(TurnResult::completed());
            }
            NextAction::Delegate(delegation) => delegation,
        };

        let assistant = self.assistants.get(&delegation.assistant_id)?;
        let mut input = delegation.input.into_message()?;
        input.hidden = true;
        if input.name.is_none() && !ctx.session_id.is_empty() {
            input.name = Some(ctx.session_id.clone());
        }

        let mut ctx = ctx;
        ctx.assistant_id = assistant.id.clone();
        ctx.depth += 1;

        debug!(
            turn_id = %ctx.turn_id,
            assistant_id = %assistant.id,
            depth = ctx.depth,
            "delegating to assistant"
        );

        let messages = self.with_history(&ctx, &assistant, input).await?;
        let loading = ClientFrame::loading(format!("Calling {}", assistant.name));
        sink(loading.with_assistant(&assistant.meta()));

        self.run_turn(
            ctx,
            assistant,
            messages,
            delegation.options,
            Contents::new(),
            sink,
            cancel,
        )
        .await
    }
}
