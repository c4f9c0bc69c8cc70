//! Append-only transcript of one assistant reply.
//!
//! [`Contents`] merges streamed fragments into typed [`Segment`]s and keeps a
//! rolling scan buffer so that `<think>`/`<tool>` markers are detected even
//! when a marker is split across two provider frames.

pub mod scanner;

pub use scanner::{strip_markers, token_for, Token, TokenBoundary, THINK, TOKENS, TOOL};

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::ContentType;

use scanner::ScanBuffer;

/// Identifier of a transcript segment. Monotonic within one stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentId(pub u64);

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seg-{}", self.0)
    }
}

/// A typed, contiguous span of accumulated output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Segment {
    pub id: SegmentId,
    #[serde(rename = "type")]
    pub kind: ContentType,
    pub text: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub props: Map<String, Value>,
    /// Creation order within the transcript.
    #[serde(skip)]
    pub order: usize,
    #[serde(skip)]
    pub begin: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub end: Option<DateTime<Utc>>,
}

impl Segment {
    fn new(id: SegmentId, kind: ContentType, order: usize) -> Self {
        let now = Utc::now();
        Self {
            id,
            kind,
            text: String::new(),
            props: Map::new(),
            order,
            begin: Some(now),
            end: Some(now),
        }
    }
}

/// Transcript builder for one stream.
#[derive(Debug, Default, Clone)]
pub struct Contents {
    segments: Vec<Segment>,
    current: Option<usize>,
    next_id: u64,
    scan: ScanBuffer,
}

impl Contents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segment(&self, id: SegmentId) -> Option<&Segment> {
        self.segments.iter().find(|segment| segment.id == id)
    }

    /// Segment currently receiving appended text.
    pub fn current_id(&self) -> Option<SegmentId> {
        self.current.map(|idx| self.segments[idx].id)
    }

    /// Token whose closing marker has not been seen yet.
    pub fn open_token(&self) -> Option<ContentType> {
        self.scan.open.map(|token| token.kind)
    }

    /// Append text to segment `id` (the current segment when `None`),
    /// creating the segment if it does not exist. Empty text is a no-op.
    pub fn append(&mut self, text: &str, id: Option<SegmentId>) {
        if text.is_empty() {
            return;
        }

        let idx = match id {
            Some(id) => match self.index_of(id) {
                Some(idx) => idx,
                None => self.push_segment(id, ContentType::Text),
            },
            None => match self.current {
                Some(idx) => idx,
                None => {
                    let id = self.allocate_id();
                    self.push_segment(id, ContentType::Text)
                }
            },
        };

        if self.current != Some(idx) {
            self.current = Some(idx);
            self.scan.clear();
        }

        let segment = &mut self.segments[idx];
        segment.text.push_str(text);
        segment.end = Some(Utc::now());
        self.scan.buffer.push_str(text);
    }

    /// Open a fresh text segment and make it current.
    pub fn new_text(&mut self, text: &str) -> SegmentId {
        let id = self.allocate_id();
        let idx = self.push_segment(id, ContentType::Text);
        self.current = Some(idx);
        self.scan.clear();
        self.segments[idx].text.push_str(text);
        self.scan.buffer.push_str(text);
        id
    }

    /// Detect marker boundaries in the rolling buffer.
    ///
    /// Each boundary re-segments the transcript: an opening marker moves the
    /// marker and everything after it into a segment of the marker's type,
    /// a closing marker ends that segment and moves the trailing text into
    /// a new text segment. Consumed text is dropped from the buffer so no
    /// boundary is reported twice.
    pub fn scan_tokens<F>(&mut self, mut on_token: F)
    where
        F: FnMut(&TokenBoundary),
    {
        loop {
            let boundary = match self.scan.open {
                None => match self.scan.find_open() {
                    Some((pos, token)) => self.split_open(pos, token),
                    None => {
                        self.scan.retain_partial_open();
                        return;
                    }
                },
                Some(token) => match self.scan.buffer.find(token.close) {
                    Some(pos) => self.split_close(pos, token),
                    None => return,
                },
            };
            on_token(&boundary);
        }
    }

    /// Retype segment `id` in place and merge `patch` into its props.
    /// Returns `false` when no such segment exists.
    pub fn update_type(&mut self, kind: ContentType, patch: Map<String, Value>, id: SegmentId) -> bool {
        let Some(idx) = self.index_of(id) else {
            return false;
        };
        let segment = &mut self.segments[idx];
        segment.kind = kind;
        segment.props.extend(patch);
        segment.end = Some(Utc::now());
        true
    }

    /// Drop a trailing zero-length segment.
    pub fn remove_last_empty(&mut self) {
        if !self.segments.last().is_some_and(|segment| segment.text.is_empty()) {
            return;
        }
        self.segments.pop();
        if self.current.is_some_and(|idx| idx >= self.segments.len()) {
            self.current = self.segments.len().checked_sub(1);
            self.scan.clear();
        }
    }

    /// Reset the rolling scan buffer after a marker cycle closes.
    pub fn clear_token(&mut self) {
        self.scan.clear();
    }

    /// Full transcript text, segments concatenated in order.
    pub fn text(&self) -> String {
        self.segments.iter().map(|segment| segment.text.as_str()).collect()
    }

    /// Transcript as a JSON array of `{id, type, text, props}` objects.
    pub fn json(&self) -> String {
        serde_json::to_string(&self.segments).unwrap_or_else(|_| "[]".to_string())
    }

    fn index_of(&self, id: SegmentId) -> Option<usize> {
        self.segments.iter().position(|segment| segment.id == id)
    }

    fn allocate_id(&mut self) -> SegmentId {
        self.next_id += 1;
        SegmentId(self.next_id)
    }

    fn push_segment(&mut self, id: SegmentId, kind: ContentType) -> usize {
        self.next_id = self.next_id.max(id.0);
        let order = self.segments.len();
        self.segments.push(Segment::new(id, kind, order));
        order
    }

    /// Bytes at the end of the current segment that belong to `buffer[pos..]`.
    fn take_tail(&mut self, pos: usize) -> String {
        let cut = self.scan.buffer.len() - pos;
        let Some(idx) = self.current else {
            return String::new();
        };
        let segment = &mut self.segments[idx];
        debug_assert!(segment.text.ends_with(&self.scan.buffer[pos..]));
        let at = segment.text.len().saturating_sub(cut);
        segment.text.split_off(at)
    }

    fn split_open(&mut self, pos: usize, token: Token) -> TokenBoundary {
        let before = self.scan.buffer[..pos].to_string();
        let tails = self.scan.buffer[pos + token.open.len()..].to_string();
        let moved = self.take_tail(pos);

        let reuse = self
            .current
            .filter(|idx| self.segments[*idx].text.is_empty());
        let idx = match reuse {
            Some(idx) => {
                self.segments[idx].kind = token.kind;
                idx
            }
            None => {
                let id = self.allocate_id();
                self.push_segment(id, token.kind)
            }
        };
        let segment = &mut self.segments[idx];
        segment.text.push_str(&moved);
        segment.end = Some(Utc::now());
        self.current = Some(idx);

        self.scan.buffer = tails.clone();
        self.scan.open = Some(token);

        TokenBoundary {
            token: token.kind,
            id: self.segments[idx].id,
            begin: true,
            text: before,
            tails,
        }
    }

    fn split_close(&mut self, pos: usize, token: Token) -> TokenBoundary {
        let inner = self.scan.buffer[..pos].to_string();
        let tail_start = pos + token.close.len();
        let tails = self.scan.buffer[tail_start..].to_string();
        let moved = self.take_tail(tail_start);

        let closed = self.current_id().unwrap_or(SegmentId(0));
        if let Some(idx) = self.current {
            let segment = &mut self.segments[idx];
            segment.kind = token.kind;
            segment
                .props
                .insert("text".into(), Value::String(inner.trim().to_string()));
        }

        let id = self.allocate_id();
        let idx = self.push_segment(id, ContentType::Text);
        self.segments[idx].text.push_str(&moved);
        self.current = Some(idx);

        self.scan.buffer = tails.clone();
        self.scan.open = None;

        TokenBoundary {
            token: token.kind,
            id: closed,
            begin: false,
            text: inner,
            tails,
        }
    }
}
