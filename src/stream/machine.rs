//! Per-turn stream state machine.
//!
//! Turns normalized deltas into client frames and transcript segments,
//! injecting `<think>`/`<tool>` markers around provider-native reasoning
//! and tool-call channels so that both arrive in a single textual stream.

use serde_json::{Map, Value};
use tracing::trace;

use crate::content::{strip_markers, Contents, TokenBoundary};
use crate::types::{
    AssistantMeta, ClientFrame, ContentType, DeltaEvent, DeltaKind, FrameSink, FrameType,
    Message, Role,
};

use super::normalize::normalize;

const THINK_OPEN: &str = "<think>\n";
const THINK_CLOSE: &str = "\n</think>\n";
const TOOL_OPEN: &str = "\n<tool>\n";
const TOOL_CLOSE: &str = "}\n</tool>\n";

/// What the driver should do after a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Continue,
    /// The provider reported an error; carries the raw error text.
    Failed(String),
    /// The stream finished normally.
    Done,
}

/// Everything left once a stream has ended.
#[derive(Debug, Default)]
pub struct StreamOutput {
    pub contents: Contents,
    /// Messages decoded from text trailing a closed block, in arrival order.
    pub downstream: Vec<Message>,
    /// Undecodable text that never resolved into a frame.
    pub pending: Option<String>,
}

pub struct StreamMachine {
    assistant: AssistantMeta,
    sink: FrameSink,
    contents: Contents,
    thinking: bool,
    tool_call: bool,
    first_frame: bool,
    pending: String,
    downstream: Vec<Message>,
}

impl StreamMachine {
    pub fn new(assistant: AssistantMeta, contents: Contents, sink: FrameSink) -> Self {
        Self {
            assistant,
            sink,
            contents,
            thinking: false,
            tool_call: false,
            first_frame: true,
            pending: String::new(),
            downstream: Vec::new(),
        }
    }

    /// Buffered text that has not decoded yet.
    pub fn pending(&self) -> Option<&str> {
        (!self.pending.is_empty()).then_some(self.pending.as_str())
    }

    /// Feed one raw provider frame.
    pub fn handle_frame(&mut self, raw: &[u8]) -> Step {
        match self.decode(raw) {
            Some(event) => self.handle_event(event),
            None => Step::Continue,
        }
    }

    /// Feed one normalized delta.
    pub fn handle_event(&mut self, event: DeltaEvent) -> Step {
        if event.pending {
            trace!(len = event.text.len(), "buffering undecodable frame");
            self.pending.push_str(&event.text);
            return Step::Continue;
        }
        if event.kind == DeltaKind::Error {
            return Step::Failed(event.text);
        }

        // A terminal frame that still carries a reasoning or tool fragment is
        // applied as two steps so the block is closed after its last fragment.
        if event.done
            && !event.text.is_empty()
            && matches!(event.kind, DeltaKind::Think | DeltaKind::ToolCallsNative)
        {
            let fragment = DeltaEvent {
                done: false,
                ..event
            };
            self.handle_event(fragment);
            return self.handle_event(DeltaEvent::done(""));
        }

        let mut text = event.text;

        if event.kind == DeltaKind::Think && !self.thinking {
            text.insert_str(0, THINK_OPEN);
            self.thinking = true;
        }
        if self.thinking && event.kind != DeltaKind::Think {
            self.close_block(ContentType::Think, THINK_CLOSE);
            self.thinking = false;
        }

        if event.kind == DeltaKind::ToolCallsNative && !self.tool_call {
            text.insert_str(0, TOOL_OPEN);
            self.tool_call = true;
        }
        if self.tool_call && event.kind != DeltaKind::ToolCallsNative {
            if event.done {
                self.close_block(ContentType::Tool, TOOL_CLOSE);
            } else {
                // The model went back to plain text without finishing the call.
                text.insert_str(0, TOOL_CLOSE);
            }
            self.tool_call = false;
        }

        // Only the turn's final frame carries `done`.
        if !text.is_empty() {
            let kind = self.append(&text, event.kind);
            self.emit(ClientFrame::delta(text, kind));
        }

        if event.done {
            self.contents.remove_last_empty();
            Step::Done
        } else {
            Step::Continue
        }
    }

    /// The backend closed the stream without a terminal frame: run the done
    /// transition so an open think or tool block is closed.
    pub fn end_of_stream(&mut self) -> Step {
        self.handle_event(DeltaEvent::done(""))
    }

    /// Consume the machine once the stream has ended.
    pub fn finish(self) -> StreamOutput {
        StreamOutput {
            contents: self.contents,
            downstream: self.downstream,
            pending: (!self.pending.is_empty()).then_some(self.pending),
        }
    }

    fn decode(&mut self, raw: &[u8]) -> Option<DeltaEvent> {
        if !self.pending.is_empty() {
            let mut joined = self.pending.clone().into_bytes();
            joined.extend_from_slice(raw);
            if let Some(event) = normalize(&joined).filter(|event| !event.pending) {
                self.pending.clear();
                return Some(event);
            }
        }
        normalize(raw)
    }

    /// Append to the transcript and resolve the frame type for the text.
    fn append(&mut self, text: &str, kind: DeltaKind) -> FrameType {
        self.contents.append(text, None);

        let mut boundaries: Vec<TokenBoundary> = Vec::new();
        self.contents
            .scan_tokens(|boundary| boundaries.push(boundary.clone()));

        for boundary in boundaries.iter().filter(|b| !b.begin && !b.tails.is_empty()) {
            match Message::from_string(&boundary.tails, Role::Assistant) {
                Ok(message) => self.downstream.push(message),
                Err(err) => trace!(error = %err, "ignoring undecodable block tail"),
            }
        }

        match (boundaries.last(), self.contents.open_token()) {
            (Some(boundary), _) => boundary.token.into(),
            (None, Some(open)) => open.into(),
            (None, None) => kind.into(),
        }
    }

    /// Close a synthetic block: emit the marker, retype the block and start
    /// a fresh text segment.
    fn close_block(&mut self, kind: ContentType, marker: &str) {
        self.emit(ClientFrame::delta(marker, kind.into()));
        self.contents.append(marker, None);

        if let Some(id) = self.contents.current_id() {
            let body = self
                .contents
                .segment(id)
                .map(|segment| strip_markers(kind, &segment.text))
                .unwrap_or_default();
            let mut patch = Map::new();
            patch.insert("text".into(), Value::String(body));
            self.contents.update_type(kind, patch, id);
        }

        self.contents.new_text("");
        self.contents.clear_token();
    }

    fn emit(&mut self, frame: ClientFrame) {
        let frame = if self.first_frame {
            self.first_frame = false;
            frame.with_assistant(&self.assistant)
        } else {
            frame
        };
        (self.sink)(frame);
    }
}
