// SPDX-License-Identifier: MIT
//! Context gathering for the completion prompt.
//!
//! The engine splits the document at the cursor, then asks the host's
//! [`ContextCollaborator`] for symbol definitions (raced against a bounded
//! timeout), recently-edited snippets, and clipboard text. Everything is
//! rendered into a capped context block prepended to the prompt.

use std::time::Duration;

use async_trait::async_trait;
use tracing::trace;

use super::model::Snippet;

// ─── Document state ───────────────────────────────────────────────────────────

/// Snapshot of the document being completed, as reported by the host editor.
#[derive(Debug, Clone)]
pub struct DocumentState {
    /// Absolute path of the file (language detection).
    pub file_path: String,
    /// Full document text.
    pub text: String,
    /// 0-based line number of the cursor.
    pub cursor_line: usize,
    /// 0-based byte column of the cursor within its line.
    pub cursor_col: usize,
}

impl DocumentState {
    pub fn new(
        file_path: impl Into<String>,
        text: impl Into<String>,
        cursor_line: usize,
        cursor_col: usize,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            text: text.into(),
            cursor_line,
            cursor_col,
        }
    }

    /// Byte offset of the cursor into `text`, clamped to the document and
    /// to a UTF-8 character boundary.
    pub fn cursor_offset(&self) -> usize {
        let mut offset = 0;
        for (i, line) in self.text.split_inclusive('\n').enumerate() {
            if i == self.cursor_line {
                let content_len = line.trim_end_matches(['\n', '\r']).len();
                let mut pos = offset + self.cursor_col.min(content_len);
                while pos > 0 && !self.text.is_char_boundary(pos) {
                    pos -= 1;
                }
                return pos;
            }
            offset += line.len();
        }
        self.text.len()
    }

    /// Document text before and after the cursor.
    pub fn split_at_cursor(&self) -> (&str, &str) {
        self.text.split_at(self.cursor_offset())
    }

    /// The line the cursor is on ("" past the end of the document).
    pub fn current_line(&self) -> &str {
        self.text.lines().nth(self.cursor_line).unwrap_or("")
    }

    /// The line directly below the cursor ("" when there is none).
    pub fn line_below(&self) -> &str {
        self.text.lines().nth(self.cursor_line + 1).unwrap_or("")
    }

    /// True when the cursor sits at (or past) the end of its line.
    pub fn cursor_at_line_end(&self) -> bool {
        self.cursor_col >= self.current_line().len()
    }
}

// ─── Collaborator seam ────────────────────────────────────────────────────────

/// Host-side context sources consulted while building the prompt.
///
/// Implementations live in the host (LSP client, edit tracker, clipboard
/// bridge). All methods are best-effort: an empty result is always valid.
#[async_trait]
pub trait ContextCollaborator: Send + Sync {
    /// Symbol definitions relevant to the cursor position. Raced against
    /// the engine's context timeout; losing the race means no definitions.
    async fn get_definitions(&self, file_path: &str, text: &str, offset: usize) -> Vec<Snippet>;

    /// Snippets from ranges the user edited recently.
    async fn recently_edited(&self) -> Vec<Snippet>;

    /// Current clipboard text, if the host exposes it.
    async fn clipboard_text(&self) -> Option<String>;
}

/// Collaborator that contributes nothing. Useful for hosts without an LSP
/// bridge and for tests.
pub struct NoContext;

#[async_trait]
impl ContextCollaborator for NoContext {
    async fn get_definitions(&self, _: &str, _: &str, _: usize) -> Vec<Snippet> {
        Vec::new()
    }

    async fn recently_edited(&self) -> Vec<Snippet> {
        Vec::new()
    }

    async fn clipboard_text(&self) -> Option<String> {
        None
    }
}

// ─── Bounded wait ─────────────────────────────────────────────────────────────

/// Await `fut` for at most `limit`; past the bound return `fallback`.
///
/// This is the engine's only internal timeout — the model stream itself is
/// bounded solely by the caller's cancellation flag.
pub async fn first_of<T>(
    limit: Duration,
    fut: impl std::future::Future<Output = T>,
    fallback: T,
) -> T {
    match tokio::time::timeout(limit, fut).await {
        Ok(value) => value,
        Err(_) => {
            trace!(limit_ms = limit.as_millis() as u64, "context lookup lost the race");
            fallback
        }
    }
}

// ─── Prompt context block ─────────────────────────────────────────────────────

/// Truncate a prompt prefix to at most `max` bytes, clipping from the left.
pub fn truncate_prefix(prefix: &str, max: usize) -> &str {
    if prefix.len() > max {
        let mut start = prefix.len() - max;
        while start < prefix.len() && !prefix.is_char_boundary(start) {
            start += 1;
        }
        &prefix[start..]
    } else {
        prefix
    }
}

/// Truncate a prompt suffix to at most `max` bytes, clipping from the right.
pub fn truncate_suffix(suffix: &str, max: usize) -> &str {
    if suffix.len() > max {
        let mut end = max;
        while end > 0 && !suffix.is_char_boundary(end) {
            end -= 1;
        }
        &suffix[..end]
    } else {
        suffix
    }
}

/// Render gathered snippets into a comment-framed context block headed by
/// the language label, capped at `max_chars`. Empty input renders to an
/// empty string.
pub fn render_context_block(
    language: &str,
    definitions: &[Snippet],
    recently_edited: &[Snippet],
    clipboard: Option<&str>,
    max_chars: usize,
) -> String {
    let mut parts: Vec<String> = Vec::new();

    for snippet in definitions.iter().chain(recently_edited) {
        parts.push(format!("// {}\n{}", snippet.file_path, snippet.content));
    }
    if let Some(clip) = clipboard {
        if !clip.trim().is_empty() {
            parts.push(format!("// clipboard\n{clip}"));
        }
    }

    if parts.is_empty() {
        return String::new();
    }

    let combined = parts.join("\n");
    let mut cap = combined.len().min(max_chars);
    while cap > 0 && !combined.is_char_boundary(cap) {
        cap -= 1;
    }
    format!(
        "// Language: {language}\n// Context:\n{}\n// End context\n",
        &combined[..cap]
    )
}

// ─── Tests ────────────────────────────────────────────────────────────────────
