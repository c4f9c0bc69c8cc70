//! Raw provider frame to [`DeltaEvent`] normalization.

use serde::Deserialize;
use serde_json::Value;

use crate::types::{DeltaEvent, DeltaKind};

/// Normalize one raw frame.
///
/// Returns `None` for frames that carry nothing visible (keep-alives,
/// comments, usage-only chunks). A frame that cannot be decoded is returned
/// as a pending event so the caller can retry it joined with the next one.
pub fn normalize(raw: &[u8]) -> Option<DeltaEvent> {
    let line = String::from_utf8_lossy(raw);
    let line = line.trim();
    if line.is_empty() || line.starts_with(':') || line.starts_with("event:") {
        return None;
    }

    let data = line.strip_prefix("data:").map(str::trim_start).unwrap_or(line);
    if data.is_empty() {
        return None;
    }
    if data == "[DONE]" {
        return Some(DeltaEvent::done(""));
    }

    let value = match serde_json::from_str::<Value>(data) {
        Ok(value @ Value::Object(_)) => value,
        _ => return Some(DeltaEvent::pending(data)),
    };

    if let Some(error) = value.get("error").filter(|e| !e.is_null()) {
        return Some(DeltaEvent::error(error_text(error)));
    }

    if value.get("choices").is_some() {
        let chunk: ChatChunk = match serde_json::from_value(value) {
            Ok(chunk) => chunk,
            Err(_) => return Some(DeltaEvent::pending(data)),
        };
        return chunk.choices.into_iter().next().and_then(choice_event);
    }

    value
        .get("text")
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
        .map(|text| DeltaEvent::new(DeltaKind::Other, text))
}

/// Human-readable text for a provider error payload.
///
/// Accepts `{"error": {"message": ..}}` bodies, bare error objects and
/// plain text; falls back to the input unchanged.
pub fn error_text_from_raw(raw: &str) -> String {
    match serde_json::from_str::<Value>(raw.trim()) {
        Ok(value) => match value.get("error") {
            Some(error) => error_text(error),
            None => error_text(&value),
        },
        Err(_) => raw.to_string(),
    }
}

fn error_text(error: &Value) -> String {
    match error {
        Value::String(message) => message.clone(),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string()),
        other => other.to_string(),
    }
}

fn choice_event(choice: ChunkChoice) -> Option<DeltaEvent> {
    let done = choice.finish_reason.is_some();
    let delta = choice.delta;

    let reasoning = delta
        .reasoning_content
        .or(delta.reasoning)
        .filter(|text| !text.is_empty());

    let event = if let Some(text) = reasoning {
        DeltaEvent::think(text)
    } else if !delta.tool_calls.is_empty() {
        DeltaEvent::tool(tool_fragment(&delta.tool_calls))
    } else if let Some(text) = delta.content.filter(|text| !text.is_empty()) {
        DeltaEvent::text(text)
    } else if done {
        return Some(DeltaEvent::done(""));
    } else {
        return None;
    };

    Some(if done { event.finished() } else { event })
}

/// Flatten native tool-call fragments into streamable JSON text.
///
/// The first fragment of each call opens an object with its id and function
/// name; argument fragments follow verbatim. A call after the first closes
/// the previous object.
fn tool_fragment(calls: &[ToolCallDelta]) -> String {
    let mut out = String::new();
    for call in calls {
        let function = call.function.as_ref();
        let name = function.and_then(|f| f.name.as_deref());
        if call.id.is_some() || name.is_some() {
            if call.index > 0 {
                out.push_str("}\n");
            }
            out.push_str(&format!(
                "{{\"id\":{},\"function\":{},\"arguments\":",
                Value::String(call.id.clone().unwrap_or_default()),
                Value::String(name.unwrap_or_default().to_string()),
            ));
        }
        if let Some(arguments) = function.and_then(|f| f.arguments.as_deref()) {
            out.push_str(arguments);
        }
    }
    out
}

// OpenAI-compatible chunk shapes (internal)

#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct ChunkDelta {
    content: Option<String>,
    reasoning_content: Option<String>,
    reasoning: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCallDelta>,
}

#[derive(Deserialize)]
struct ToolCallDelta {
    #[serde(default)]
    index: usize,
    id: Option<String>,
    function: Option<FunctionDelta>,
}

#[derive(Deserialize)]
struct FunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}
