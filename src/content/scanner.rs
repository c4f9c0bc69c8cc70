//! Marker tokens embedded in streamed text and the rolling scan buffer.

use crate::types::ContentType;

/// A pair of pseudo-tags delimiting a typed block inside streamed text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: ContentType,
    pub open: &'static str,
    pub close: &'static str,
}

pub const THINK: Token = Token {
    kind: ContentType::Think,
    open: "<think>",
    close: "</think>",
};

pub const TOOL: Token = Token {
    kind: ContentType::Tool,
    open: "<tool>",
    close: "</tool>",
};

pub const TOKENS: [Token; 2] = [THINK, TOOL];

/// Lookup the token for a segment type.
pub fn token_for(kind: ContentType) -> Option<Token> {
    TOKENS.iter().copied().find(|token| token.kind == kind)
}

/// Text of a typed block with its markers and surrounding whitespace removed.
pub fn strip_markers(kind: ContentType, text: &str) -> String {
    let Some(token) = token_for(kind) else {
        return text.to_string();
    };
    let mut inner = text.trim();
    if let Some(rest) = inner.strip_prefix(token.open) {
        inner = rest;
    }
    if let Some(rest) = inner.strip_suffix(token.close) {
        inner = rest;
    }
    inner.trim().to_string()
}

/// A boundary crossing reported by [`super::Contents::scan_tokens`].
#[derive(Debug, Clone, PartialEq)]
pub struct TokenBoundary {
    pub token: ContentType,
    /// Segment that now holds the typed block.
    pub id: super::SegmentId,
    /// `true` for an opening marker, `false` for a closing one.
    pub begin: bool,
    /// Text before an opening marker, or the block body for a closing one.
    pub text: String,
    /// Text after the marker that arrived in the same buffer.
    pub tails: String,
}

/// Unconsumed tail of the current segment.
///
/// Invariant: `buffer` is always a suffix of the current segment's text.
#[derive(Debug, Default, Clone)]
pub(crate) struct ScanBuffer {
    pub(crate) buffer: String,
    /// Token whose closing marker we are waiting for.
    pub(crate) open: Option<Token>,
}

impl ScanBuffer {
    pub(crate) fn clear(&mut self) {
        self.buffer.clear();
        self.open = None;
    }

    /// Earliest opening marker in the buffer.
    pub(crate) fn find_open(&self) -> Option<(usize, Token)> {
        TOKENS
            .iter()
            .filter_map(|token| self.buffer.find(token.open).map(|pos| (pos, *token)))
            .min_by_key(|(pos, _)| *pos)
    }

    /// Drop consumed text, keeping only a suffix that may still grow into an
    /// opening marker on the next frame.
    pub(crate) fn retain_partial_open(&mut self) {
        let keep_from = partial_open_start(&self.buffer);
        self.buffer.drain(..keep_from);
    }
}

fn partial_open_start(buffer: &str) -> usize {
    let longest = TOKENS.iter().map(|t| t.open.len()).max().unwrap_or(0);
    let floor = buffer.len().saturating_sub(longest.saturating_sub(1));
    (floor..buffer.len())
        .filter(|start| buffer.is_char_boundary(*start))
        .find(|start| {
            let suffix = &buffer[*start..];
            TOKENS.iter().any(|token| token.open.starts_with(suffix))
        })
        .unwrap_or(buffer.len())
}
