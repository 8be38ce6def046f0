// SPDX-License-Identifier: MIT
//! Engine configuration.
//!
//! All tunables for the completion pipeline live here so a host can load
//! them from its own config file (`[completion]` table or similar) and hand
//! a single [`EngineConfig`] to [`crate::CompletionEngine::new`].

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::completion::model::MultilineMode;

const DEFAULT_CACHE_CAPACITY: usize = 256;
const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.8;
const DEFAULT_CONTEXT_TIMEOUT_MS: u64 = 100;
const DEFAULT_MAX_PREFIX_CHARS: usize = 4000;
const DEFAULT_MAX_SUFFIX_CHARS: usize = 2000;
const DEFAULT_MAX_CONTEXT_CHARS: usize = 2048;

/// Tunable parameters for the completion engine.
///
/// Every field has a default so a host can deserialize a partial table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of rendered prompts memoized by the LRU completion cache.
    pub cache_capacity: usize,
    /// Similarity score (0.0–1.0) at which a generated line is considered
    /// "the same as" the line below the cursor and generation stops.
    pub similarity_threshold: f64,
    /// Upper bound on the symbol-definition lookup; past this the lookup
    /// loses the race and the prompt is built without definitions.
    pub context_timeout_ms: u64,
    /// Maximum characters of document prefix included in the prompt
    /// (clipped from the left).
    pub max_prefix_chars: usize,
    /// Maximum characters of document suffix included in the prompt
    /// (clipped from the right).
    pub max_suffix_chars: usize,
    /// Cap on the rendered context block prepended to the prompt.
    pub max_context_chars: usize,
    /// Default multiline behaviour when the caller does not override it.
    pub multiline: MultilineMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            context_timeout_ms: DEFAULT_CONTEXT_TIMEOUT_MS,
            max_prefix_chars: DEFAULT_MAX_PREFIX_CHARS,
            max_suffix_chars: DEFAULT_MAX_SUFFIX_CHARS,
            max_context_chars: DEFAULT_MAX_CONTEXT_CHARS,
            multiline: MultilineMode::Auto,
        }
    }
}

impl EngineConfig {
    /// The context-lookup bound as a [`Duration`].
    pub fn context_timeout(&self) -> Duration {
        Duration::from_millis(self.context_timeout_ms)
    }
}
