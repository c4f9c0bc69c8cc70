//! Outbound conversation assembly: history, system prompts and options.

use serde_json::Value;

use crate::assistant::Assistant;
use crate::error::Result;
use crate::types::{Message, Options};

use super::{Engine, TurnContext};

pub const TOOL_CALLS_SCHEMA: &str = "TOOL_CALLS_SCHEMA";
pub const TOOL_CALLS: &str = "TOOL_CALLS";

const TOOL_RESPONSE_FORMAT: &str = "## Tool Response Format
1. If no matching function exists in TOOL_CALLS_SCHEMA, respond normally without using tool calls
2. When using tools, wrap function calls in <tool> and </tool> tags
3. The tool call must be a valid JSON object
4. Follow the JSON Schema defined in TOOL_CALLS_SCHEMA
5. One complete tool call per response
6. Parameter values MUST strictly follow the descriptions and validation rules defined in properties
7. For each parameter, carefully check and comply with:
   - Data type requirements
   - Format restrictions
   - Value range limitations
   - Pattern matching rules
   - Required field validations

Example:
<tool>
{\"function\":\"<FunctionName>\",\"arguments\":{\"<ArgumentName>\":\"<ArgumentValue>\"}}
</tool>";

const TOOL_USAGE_GUIDELINES: &str = "## Tool Usage Guidelines
1. Use functions defined in TOOL_CALLS_SCHEMA only when they match your needs
2. If no matching function exists, respond normally as a helpful assistant
3. When using tools, arguments must match the schema definition exactly
4. All parameter values must strictly adhere to the validation rules specified in properties
5. Never skip or ignore any validation requirements defined in the schema";

impl Engine {
    /// History (oldest first) + assistant prompts + `input`.
    pub async fn with_history(
        &self,
        ctx: &TurnContext,
        assistant: &Assistant,
        input: Message,
    ) -> Result<Vec<Message>> {
        let mut messages = Vec::new();

        if let Some(storage) = &self.storage {
            if !ctx.session_id.is_empty() {
                let history = storage.get_history(&ctx.session_id, &ctx.chat_id).await?;
                let skip = history.len().saturating_sub(self.config.history_max_size);
                for record in history.into_iter().skip(skip) {
                    messages.extend(record.into_messages());
                }
            }
        }

        messages.extend(self.prompt_messages(assistant)?);
        messages.push(input);
        Ok(messages)
    }

    /// System prompts of `assistant`, plus the tool-call instructions when
    /// its connector has no native tool support.
    pub fn prompt_messages(&self, assistant: &Assistant) -> Result<Vec<Message>> {
        let mut messages: Vec<Message> = assistant
            .prompts
            .iter()
            .map(|prompt| {
                let name = prompt.name.clone().unwrap_or_else(|| assistant.name.clone());
                Message::new(prompt.role, prompt.content.clone()).with_name(name)
            })
            .collect();

        let Some(tools) = assistant.tool_set() else {
            return Ok(messages);
        };
        if self.connectors.supports_tools(&assistant.connector) {
            return Ok(messages);
        }

        let schema = serde_json::to_string(&tools.tools)?;
        messages.push(Message::system(schema).with_name(TOOL_CALLS_SCHEMA));
        messages.push(Message::system(TOOL_RESPONSE_FORMAT).with_name(TOOL_CALLS));
        messages.push(Message::system(TOOL_USAGE_GUIDELINES).with_name(TOOL_CALLS));
        for prompt in &tools.prompts {
            let mut message = Message::new(prompt.role, prompt.content.clone());
            message.name = prompt.name.clone();
            messages.push(message);
        }
        Ok(messages)
    }

    /// Assistant defaults overlaid with caller options, plus native tools.
    pub fn with_options(&self, assistant: &Assistant, caller: Options) -> Options {
        let mut options = assistant.options.clone();
        options.extend(caller);

        match assistant.tool_set() {
            Some(tools) if self.connectors.supports_tools(&assistant.connector) => {
                options.insert("tools".into(), Value::Array(tools.tools.clone()));
                if options.get("tool_choice").map_or(true, Value::is_null) {
                    options.insert("tool_choice".into(), Value::String("auto".into()));
                }
            }
            _ if !self.connectors.supports_tools(&assistant.connector) => {
                options.remove("tools");
            }
            _ => {}
        }
        options
    }
}
