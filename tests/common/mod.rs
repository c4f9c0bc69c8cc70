//! Shared test helpers: scripted backend, recording sink and frame builders.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use parley::prelude::*;
use parley::provider::OnFrame;

/// One recorded backend call.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub messages: Vec<Value>,
    pub options: Options,
}

/// A backend that replays canned raw frames, one script per call.
pub struct ScriptedBackend {
    scripts: Mutex<VecDeque<Vec<String>>>,
    requests: Mutex<Vec<RecordedRequest>>,
    hang: bool,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            hang: false,
        }
    }

    /// Never return after the script is delivered, like a stalled stream.
    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::new()
        }
    }

    /// Queue the frames for the next call.
    pub fn queue(self, frames: Vec<String>) -> Self {
        self.scripts.lock().unwrap().push_back(frames);
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn chat(
        &self,
        messages: &[Value],
        options: &Options,
        on_frame: &mut OnFrame<'_>,
    ) -> parley::error::Result<()> {
        self.requests.lock().unwrap().push(RecordedRequest {
            messages: messages.to_vec(),
            options: options.clone(),
        });
        let frames = self.scripts.lock().unwrap().pop_front().unwrap_or_default();
        for frame in frames {
            if on_frame(frame.as_bytes()) == FrameControl::Stop {
                return Ok(());
            }
        }
        if self.hang {
            std::future::pending::<()>().await;
        }
        Ok(())
    }
}

/// Collects every frame written to the client.
#[derive(Clone, Default)]
pub struct RecordingSink {
    frames: Arc<Mutex<Vec<ClientFrame>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sink(&self) -> FrameSink {
        let frames = self.frames.clone();
        Arc::new(move |frame| frames.lock().unwrap().push(frame))
    }

    pub fn frames(&self) -> Vec<ClientFrame> {
        self.frames.lock().unwrap().clone()
    }

    /// Concatenated text of every non-error frame.
    pub fn text(&self) -> String {
        self.frames()
            .iter()
            .filter(|frame| !frame.is_error())
            .filter_map(|frame| frame.text.clone())
            .collect()
    }

    pub fn errors(&self) -> Vec<ClientFrame> {
        self.frames().into_iter().filter(|f| f.is_error()).collect()
    }
}

pub fn text(content: &str) -> String {
    sse(json!({"choices": [{"delta": {"content": content}}]}))
}

pub fn think(content: &str) -> String {
    sse(json!({"choices": [{"delta": {"reasoning_content": content}}]}))
}

pub fn tool_start(index: usize, id: &str, name: &str) -> String {
    sse(json!({"choices": [{"delta": {"tool_calls": [
        {"index": index, "id": id, "function": {"name": name, "arguments": ""}}
    ]}}]}))
}

pub fn tool_args(index: usize, arguments: &str) -> String {
    sse(json!({"choices": [{"delta": {"tool_calls": [
        {"index": index, "function": {"arguments": arguments}}
    ]}}]}))
}

pub fn finish() -> String {
    sse(json!({"choices": [{"delta": {}, "finish_reason": "stop"}]}))
}

pub fn provider_error(message: &str) -> String {
    sse(json!({"error": {"message": message}}))
}

pub fn sse(value: Value) -> String {
    format!("data: {value}")
}

pub fn assistant(id: &str, name: &str) -> Assistant {
    Assistant::builder().id(id).name(name).connector("test").build()
}

pub fn engine(backend: Arc<ScriptedBackend>, assistants: Vec<Assistant>) -> Engine {
    let registry = AssistantRegistry::new();
    for assistant in assistants {
        registry.insert(assistant);
    }
    Engine::new(ParleyConfig::default(), registry, backend)
}
