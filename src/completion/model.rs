// SPDX-License-Identifier: MIT
//! Completion engine data model.
//!
//! Wire-facing types use camelCase field names so a host extension can pass
//! them through JSON-RPC unchanged.

use serde::{Deserialize, Serialize};

/// Multiline completion behaviour requested by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MultilineMode {
    /// Always allow completions spanning multiple lines.
    Always,
    /// Cut generation at the first newline.
    Never,
    /// Decide per request from the cursor surroundings.
    Auto,
}

/// Per-call options supplied by the host alongside the document state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionOptions {
    /// Multiline behaviour; when absent the engine config's default
    /// applies, and `auto` resolves against the cursor line.
    #[serde(default)]
    pub multiline: Option<MultilineMode>,
    /// Optional prompt-template override with `{prefix}` / `{suffix}`
    /// placeholders. When absent the model handle's template is used.
    #[serde(default)]
    pub template: Option<String>,
    /// Provider-specific sampling parameters, forwarded opaquely.
    #[serde(default)]
    pub params: serde_json::Value,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            multiline: None,
            template: None,
            params: serde_json::Value::Null,
        }
    }
}

/// Fully resolved parameters for one completion attempt.
///
/// Built once per call after context gathering and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// The exact text sent to the model; also the cache key.
    pub rendered_prompt: String,
    /// Document text before the cursor (clipped), used for stream
    /// coalescing across overlapping requests.
    pub prefix_text: String,
    /// Ordered stop sequences forwarded to the provider.
    pub stop_sequences: Vec<String>,
    /// Whether generation may continue past the first newline.
    pub allow_multiline: bool,
    /// The line originally below the cursor, used by the similar-line
    /// stopper to detect the model catching up to existing code.
    pub line_below_cursor: String,
}

/// Result of a served completion.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionOutcome {
    /// Final completion text, trailing whitespace trimmed.
    #[serde(rename = "completionText")]
    pub completion_text: String,
    /// Wall-clock time for the whole call, milliseconds.
    #[serde(rename = "elapsedMillis")]
    pub elapsed_millis: u64,
    /// Whether the text came from the prompt cache.
    #[serde(rename = "cacheHit")]
    pub cache_hit: bool,
    /// The rendered prompt that produced (or keyed) this completion.
    #[serde(rename = "promptUsed")]
    pub prompt_used: String,
    /// Provider that served the request.
    #[serde(rename = "providerId")]
    pub provider_id: String,
    /// Model identifier within the provider.
    #[serde(rename = "modelId")]
    pub model_id: String,
    /// The completion options that were in effect, as an opaque mapping.
    #[serde(rename = "completionOptionsUsed")]
    pub completion_options_used: serde_json::Value,
}

/// A symbol-definition or recently-edited snippet contributed by a context
/// collaborator and rendered into the prompt's context block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snippet {
    /// File the snippet came from.
    #[serde(rename = "filePath")]
    pub file_path: String,
    /// Snippet text, verbatim.
    pub content: String,
}
