// SPDX-License-Identifier: MIT
//! Completion orchestrator.
//!
//! Per-call state machine: Filter → Resolve → Build context → Cache probe →
//! Generate → Finalize, with terminal states Served / Cancelled / Failed /
//! Empty. Everything except a Served outcome resolves to `None`; model
//! stream errors are additionally surfaced once per distinct message
//! through the [`ErrorNotifier`].

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;
use tracing::debug;

use crate::config::EngineConfig;

use super::cache::CompletionCache;
use super::coalescer::GeneratorCoalescer;
use super::context::{
    first_of, render_context_block, truncate_prefix, truncate_suffix, ContextCollaborator,
    DocumentState, NoContext,
};
use super::language::{self, LanguageProfile};
use super::model::{CompletionOptions, CompletionOutcome, CompletionRequest, MultilineMode};
use super::provider::{render_prompt, CompletionProvider, ModelHandle, ProviderOptions};
use super::stream::{stop_pipeline, DeltaSource};
use super::{CancellationFlag, CompletionError, ErrorNotifier};

/// Separators that end a completion regardless of language: a blank line
/// means the model moved on to something unrelated.
const HARD_STOP_SEPARATORS: [&str; 2] = ["\n\n", "\r\n\r\n"];

/// The inline completion engine. One instance per process; all state
/// (prompt cache, in-flight stream slot, surfaced-error set) lives in
/// explicit fields and dies with the instance.
pub struct CompletionEngine {
    config: EngineConfig,
    provider: Arc<dyn CompletionProvider>,
    collaborator: Arc<dyn ContextCollaborator>,
    cache: Mutex<CompletionCache>,
    coalescer: GeneratorCoalescer,
    notifier: ErrorNotifier,
}

impl CompletionEngine {
    /// Engine without a context collaborator (no definition lookup).
    pub fn new(config: EngineConfig, provider: Arc<dyn CompletionProvider>) -> Self {
        Self::with_collaborator(config, provider, Arc::new(NoContext))
    }

    pub fn with_collaborator(
        config: EngineConfig,
        provider: Arc<dyn CompletionProvider>,
        collaborator: Arc<dyn ContextCollaborator>,
    ) -> Self {
        let cache = Mutex::new(CompletionCache::new(config.cache_capacity));
        Self {
            config,
            provider,
            collaborator,
            cache,
            coalescer: GeneratorCoalescer::new(),
            notifier: ErrorNotifier::new(),
        }
    }

    /// Surfaced-error channel for the host UI.
    pub fn notifier(&self) -> &ErrorNotifier {
        &self.notifier
    }

    /// (hits, misses, entries) of the prompt cache.
    pub async fn cache_stats(&self) -> (u64, u64, usize) {
        let cache = self.cache.lock().await;
        (cache.hits, cache.misses, cache.len())
    }

    /// Request an inline completion for the given document state.
    ///
    /// Returns `None` when there is nothing to show: the cursor sits after
    /// a closed statement, no model is configured, the call was cancelled,
    /// the provider failed, or the completion trimmed to nothing.
    pub async fn complete(
        &self,
        document: &DocumentState,
        cancel: &CancellationFlag,
        options: &CompletionOptions,
        model: Option<&ModelHandle>,
    ) -> Option<CompletionOutcome> {
        let started = Instant::now();
        let profile = language::profile_for_path(&document.file_path);

        // Filter: a statement that is already closed needs no completion.
        if document.cursor_at_line_end()
            && language::line_ends_with_marker(document.current_line(), profile)
        {
            debug!(file_path = %document.file_path, "cursor after closed statement; skipping");
            return None;
        }

        // Resolve: no model, no completion.
        let result = match model {
            Some(model) => {
                self.generate(document, cancel, options, model, profile, started)
                    .await
            }
            None => Err(CompletionError::ModelUnavailable),
        };

        match result {
            Ok(outcome) => outcome,
            Err(CompletionError::Cancelled) => {
                debug!(file_path = %document.file_path, "completion cancelled");
                None
            }
            Err(err @ CompletionError::ModelStream(_)) => {
                self.notifier.surface(&err.to_string());
                None
            }
            Err(err) => {
                debug!(error = %err, "completion resolved empty");
                None
            }
        }
    }

    async fn generate(
        &self,
        document: &DocumentState,
        cancel: &CancellationFlag,
        options: &CompletionOptions,
        model: &ModelHandle,
        profile: &LanguageProfile,
        started: Instant,
    ) -> Result<Option<CompletionOutcome>, CompletionError> {
        // Build context: prefix/suffix window plus raced definition lookup.
        let (prefix_full, suffix_full) = document.split_at_cursor();
        let prefix = truncate_prefix(prefix_full, self.config.max_prefix_chars);
        let suffix = truncate_suffix(suffix_full, self.config.max_suffix_chars);

        let definitions = first_of(
            self.config.context_timeout(),
            self.collaborator
                .get_definitions(&document.file_path, &document.text, document.cursor_offset()),
            Vec::new(),
        )
        .await;
        let recently_edited = self.collaborator.recently_edited().await;
        let clipboard = self.collaborator.clipboard_text().await;
        let context_block = render_context_block(
            profile.name,
            &definitions,
            &recently_edited,
            clipboard.as_deref(),
            self.config.max_context_chars,
        );

        let template = options.template.as_deref().unwrap_or(&model.template);
        let rendered_prompt = format!("{context_block}{}", render_prompt(template, prefix, suffix));

        let mode = options.multiline.unwrap_or(self.config.multiline);
        let multiline = resolve_multiline(mode, prefix);
        let request = CompletionRequest {
            rendered_prompt,
            prefix_text: prefix.to_string(),
            stop_sequences: build_stop_list(model, profile, multiline),
            allow_multiline: multiline,
            line_below_cursor: document.line_below().to_string(),
        };
        let provider_options =
            ProviderOptions::new(request.stop_sequences.clone(), options.params.clone());

        // Cache probe: an identical prompt was already completed.
        if let Some(text) = self
            .cache
            .lock()
            .await
            .get(&request.rendered_prompt)
            .map(str::to_string)
        {
            debug!(file_path = %document.file_path, "completion cache hit");
            return Ok(Some(self.outcome(&request, model, &provider_options, text, true, started)));
        }

        // Generate: share or start the model stream, then shape it.
        let provider = Arc::clone(&self.provider);
        let prompt = request.rendered_prompt.clone();
        let start_options = provider_options.clone();
        let subscription = self
            .coalescer
            .acquire_or_share(&request.prefix_text, move || async move {
                provider.stream_complete(&prompt, &start_options).await
            })
            .await?;

        let mut pipeline = stop_pipeline(
            subscription,
            cancel.clone(),
            profile.eol_markers,
            &request.line_below_cursor,
            self.config.similarity_threshold,
        );
        let mut accumulated = String::new();
        while let Some(item) = pipeline.next_delta().await {
            accumulated.push_str(&item?);
        }
        if cancel.is_cancelled() {
            return Err(CompletionError::Cancelled);
        }

        // Finalize: trim, suppress empties, memoize.
        let text = accumulated.trim_end().to_string();
        if text.trim().is_empty() {
            debug!(file_path = %document.file_path, "completion trimmed to empty");
            return Ok(None);
        }
        self.cache
            .lock()
            .await
            .put(request.rendered_prompt.clone(), text.clone());
        debug!(
            file_path = %document.file_path,
            chars = text.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "completion served"
        );
        Ok(Some(self.outcome(&request, model, &provider_options, text, false, started)))
    }

    fn outcome(
        &self,
        request: &CompletionRequest,
        model: &ModelHandle,
        provider_options: &ProviderOptions,
        completion_text: String,
        cache_hit: bool,
        started: Instant,
    ) -> CompletionOutcome {
        let mut options_used = provider_options.as_value();
        options_used["multiline"] = serde_json::Value::Bool(request.allow_multiline);
        CompletionOutcome {
            completion_text,
            elapsed_millis: started.elapsed().as_millis() as u64,
            cache_hit,
            prompt_used: request.rendered_prompt.clone(),
            provider_id: model.provider_id.clone(),
            model_id: model.model_id.clone(),
            completion_options_used: options_used,
        }
    }
}

/// Resolve the effective multiline flag: `auto` allows multiline only when
/// the cursor line has no text before it yet.
fn resolve_multiline(mode: MultilineMode, prefix: &str) -> bool {
    match mode {
        MultilineMode::Always => true,
        MultilineMode::Never => false,
        MultilineMode::Auto => {
            let current_line = prefix.rsplit('\n').next().unwrap_or(prefix);
            current_line.trim().is_empty()
        }
    }
}

/// Stop list: a leading single-newline stop unless multiline is on, then
/// provider defaults, the hard separators, and the language stop words.
fn build_stop_list(
    model: &ModelHandle,
    profile: &LanguageProfile,
    allow_multiline: bool,
) -> Vec<String> {
    let mut stop = Vec::new();
    if !allow_multiline {
        stop.push("\n".to_string());
    }
    stop.extend(model.default_stop.iter().cloned());
    stop.extend(HARD_STOP_SEPARATORS.iter().map(|s| s.to_string()));
    stop.extend(profile.stop_words.iter().map(|s| s.to_string()));
    stop
}

// ─── Tests ────────────────────────────────────────────────────────────────────
