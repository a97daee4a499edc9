//! Streaming Response Analyzer
//!
//! Watches the text of a structured response while it streams in and
//! pulls out early signals (who is answering, what kind of answer, which
//! tool) plus a rough completion percentage. The text is only guaranteed
//! to be valid JSON once the stream ends, so every check here works on
//! partial input and never fails.
//!
//! Each signal is locked in the first time it matches and is never
//! re-evaluated, so the buffer is only re-scanned for signals that are
//! still missing.

use std::sync::OnceLock;

use regex::Regex;

use crate::models::conversation::ResponseKind;

/// Minimum increase (in points) before a new progress value is reported.
const PROGRESS_STEP: u8 = 5;

const WEIGHT_OPEN_BRACE: u32 = 10;
const WEIGHT_ACTOR: u32 = 20;
const WEIGHT_KIND: u32 = 20;
const WEIGHT_CONTENT_KEY: u32 = 15;
const WEIGHT_PRIMARY_FIELD: u32 = 15;
const WEIGHT_SECONDARY_FIELD: u32 = 10;
const WEIGHT_BRACE_BALANCE: f32 = 10.0;

/// Compiled once; `None` only if a literal below were invalid.
fn actor_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r#""actor"\s*:\s*"([^"\\]*)""#).ok())
        .as_ref()
}

fn kind_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r#""content"\s*:\s*\{\s*"type"\s*:\s*"([^"\\]*)""#).ok())
        .as_ref()
}

fn tool_name_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r#""name"\s*:\s*"([^"\\]*)""#).ok())
        .as_ref()
}

/// Signals newly detected by one [`StreamAnalyzer::push`] call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalyzerUpdate {
    pub actor: Option<String>,
    pub kind: Option<ResponseKind>,
    pub tool_name: Option<String>,
    /// Present only when progress grew by more than the reporting step.
    pub progress: Option<u8>,
}

impl AnalyzerUpdate {
    pub fn is_empty(&self) -> bool {
        self.actor.is_none() && self.kind.is_none() && self.tool_name.is_none() && self.progress.is_none()
    }
}

#[derive(Debug, Default)]
pub struct StreamAnalyzer {
    buffer: String,
    actor: Option<String>,
    kind: Option<ResponseKind>,
    /// Byte offset just after the matched content type, once locked.
    kind_end: Option<usize>,
    kind_checked: bool,
    tool_name: Option<String>,
    has_content_key: bool,
    has_primary_field: bool,
    has_secondary_field: bool,
    opened: usize,
    closed: usize,
    progress: u8,
    last_reported: u8,
}

impl StreamAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one text increment.
    pub fn push(&mut self, delta: &str) -> AnalyzerUpdate {
        let mut update = AnalyzerUpdate::default();
        if delta.is_empty() {
            return update;
        }

        self.buffer.push_str(delta);
        self.opened += delta.matches('{').count();
        self.closed += delta.matches('}').count();

        if self.actor.is_none() {
            if let Some(caps) = actor_pattern().and_then(|re| re.captures(&self.buffer)) {
                let actor = caps[1].to_string();
                self.actor = Some(actor.clone());
                update.actor = Some(actor);
            }
        }

        if !self.kind_checked {
            if let Some(caps) = kind_pattern().and_then(|re| re.captures(&self.buffer)) {
                self.kind_checked = true;
                self.kind_end = caps.get(0).map(|m| m.end());
                self.kind = ResponseKind::from_tag(&caps[1]);
                update.kind = self.kind;
            }
        }

        if !self.has_content_key {
            self.has_content_key = self.buffer.contains("\"content\"");
        }

        match self.kind {
            Some(ResponseKind::Formatted) => {
                self.has_primary_field |= self.buffer.contains("\"blocks\"");
                self.has_secondary_field |= self.buffer.contains("\"text\"");
            }
            Some(ResponseKind::ToolCall) => {
                self.has_primary_field |= self.buffer.contains("\"params\"");
                self.has_secondary_field |= self.buffer.contains("\"display\"");
                if self.tool_name.is_none() {
                    let from = self.kind_end.unwrap_or(0);
                    if let Some(caps) = self
                        .buffer
                        .get(from..)
                        .and_then(|tail| tool_name_pattern().and_then(|re| re.captures(tail)))
                    {
                        let name = caps[1].to_string();
                        self.tool_name = Some(name.clone());
                        update.tool_name = Some(name);
                    }
                }
            }
            None => {}
        }

        let estimate = self.estimate();
        if estimate > self.progress {
            self.progress = estimate;
        }
        if self.progress > self.last_reported.saturating_add(PROGRESS_STEP) {
            self.last_reported = self.progress;
            update.progress = Some(self.progress);
        }

        update
    }

    fn estimate(&self) -> u8 {
        let mut score = 0u32;
        if self.opened > 0 {
            score += WEIGHT_OPEN_BRACE;
        }
        if self.actor.is_some() {
            score += WEIGHT_ACTOR;
        }
        if self.kind.is_some() {
            score += WEIGHT_KIND;
        }
        if self.has_content_key {
            score += WEIGHT_CONTENT_KEY;
        }
        if self.has_primary_field {
            score += WEIGHT_PRIMARY_FIELD;
        }
        if self.has_secondary_field {
            score += WEIGHT_SECONDARY_FIELD;
        }
        if self.opened > 0 {
            let ratio = self.closed.min(self.opened) as f32 / self.opened as f32;
            score += (ratio * WEIGHT_BRACE_BALANCE).round() as u32;
        }
        score.min(100) as u8
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn actor(&self) -> Option<&str> {
        self.actor.as_deref()
    }

    pub fn kind(&self) -> Option<ResponseKind> {
        self.kind
    }

    pub fn tool_name(&self) -> Option<&str> {
        self.tool_name.as_deref()
    }

    pub fn text(&self) -> &str {
        &self.buffer
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
