//! Markdown Chunker
//!
//! Splits a markdown document along its headers. Every chunk starts with
//! the header that opened it, prefixed by the chain of ancestor headers, so
//! a passage read in isolation still says where it came from:
//!
//! ```text
//! # Guide
//! ## Install
//! ### Linux
//! Run the installer...
//! ```
//!
//! - `##`..`######` close the open chunk and start a new one.
//! - `#` folds into the open chunk (or starts one when none is open).
//! - Lines inside fenced code blocks are never headers.
//! - A document without headers is one chunk.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::models::knowledge::{KnowledgeChunk, KnowledgeItem};

/// Chunks with this many characters or fewer outside header lines are dropped.
pub const MIN_CONTENT_CHARS: usize = 10;

fn header_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^(#{1,6})\s+(.*)$").ok())
        .as_ref()
}

/// `(level, title)` when `line` is an ATX header.
fn parse_header(line: &str) -> Option<(usize, String)> {
    let caps = header_pattern()?.captures(line)?;
    let level = caps.get(1)?.as_str().len();
    let title = caps.get(2).map(|m| m.as_str().trim()).unwrap_or_default();
    Some((level, title.to_string()))
}

fn is_fence(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("```") || trimmed.starts_with("~~~")
}

/// A chunk before it is attached to a knowledge item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkdownChunk {
    pub title: Option<String>,
    pub content: String,
    pub order: u32,
}

struct OpenChunk {
    title: Option<String>,
    ancestors: Vec<String>,
    lines: Vec<String>,
}

impl OpenChunk {
    fn render(self) -> String {
        let mut all = self.ancestors;
        all.extend(self.lines);
        all.join("\n").trim().to_string()
    }
}

#[derive(Debug, Clone)]
pub struct MarkdownChunker {
    min_content_chars: usize,
}

impl Default for MarkdownChunker {
    fn default() -> Self {
        Self {
            min_content_chars: MIN_CONTENT_CHARS,
        }
    }
}

impl MarkdownChunker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_min_content_chars(mut self, chars: usize) -> Self {
        self.min_content_chars = chars;
        self
    }

    pub fn chunk(&self, markdown: &str) -> Vec<MarkdownChunk> {
        let mut stack: Vec<(usize, String)> = Vec::new();
        let mut open: Option<OpenChunk> = None;
        let mut raw: Vec<(Option<String>, String)> = Vec::new();
        let mut in_fence = false;
        let mut saw_header = false;

        for line in markdown.lines() {
            if is_fence(line) {
                in_fence = !in_fence;
            }

            let header = if in_fence || is_fence(line) {
                None
            } else {
                parse_header(line)
            };

            match header {
                Some((level, title)) if level >= 2 => {
                    saw_header = true;
                    if let Some(chunk) = open.take() {
                        raw.push((chunk.title.clone(), chunk.render()));
                    }
                    stack.retain(|(l, _)| *l < level);
                    open = Some(OpenChunk {
                        title: Some(title),
                        ancestors: stack.iter().map(|(_, h)| h.clone()).collect(),
                        lines: vec![line.to_string()],
                    });
                    stack.push((level, line.to_string()));
                }
                Some((level, title)) => {
                    saw_header = true;
                    stack.clear();
                    stack.push((level, line.to_string()));
                    match open.as_mut() {
                        Some(chunk) => chunk.lines.push(line.to_string()),
                        None => {
                            open = Some(OpenChunk {
                                title: Some(title),
                                ancestors: Vec::new(),
                                lines: vec![line.to_string()],
                            })
                        }
                    }
                }
                None => {
                    let chunk = open.get_or_insert_with(|| OpenChunk {
                        title: None,
                        ancestors: stack.iter().map(|(_, h)| h.clone()).collect(),
                        lines: Vec::new(),
                    });
                    chunk.lines.push(line.to_string());
                }
            }
        }

        if let Some(chunk) = open.take() {
            raw.push((chunk.title.clone(), chunk.render()));
        }

        if !saw_header {
            let whole = markdown.trim();
            if whole.is_empty() {
                return Vec::new();
            }
            return vec![MarkdownChunk {
                title: None,
                content: whole.to_string(),
                order: 0,
            }];
        }

        raw.into_iter()
            .filter(|(_, content)| self.has_body(content))
            .enumerate()
            .map(|(i, (title, content))| MarkdownChunk {
                title,
                content,
                order: i as u32,
            })
            .collect()
    }

    /// Chunk a knowledge item. Chunk ids are `{item_id}:{order}`.
    pub fn chunk_item(&self, item: &KnowledgeItem) -> Vec<KnowledgeChunk> {
        self.chunk(&item.content)
            .into_iter()
            .map(|c| KnowledgeChunk {
                id: format!("{}:{}", item.id, c.order),
                item_id: item.id.clone(),
                project_id: item.project_id.clone(),
                title: c.title,
                content: c.content,
                order: c.order,
                embeddings: None,
            })
            .collect()
    }

    /// Content with header lines stripped must exceed `min_content_chars`.
    fn has_body(&self, content: &str) -> bool {
        let mut in_fence = false;
        let mut body: Vec<&str> = Vec::new();
        for line in content.lines() {
            if is_fence(line) {
                in_fence = !in_fence;
                body.push(line);
            } else if in_fence || parse_header(line).is_none() {
                body.push(line);
            }
        }
        body.join("\n").trim().chars().count() > self.min_content_chars
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
