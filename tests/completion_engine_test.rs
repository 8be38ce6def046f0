// SPDX-License-Identifier: MIT
// Completion engine integration tests: the full Filter → Resolve → Context →
// Cache → Generate → Finalize path against a scripted provider.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ghostline::{
    CancellationFlag, CompletionEngine, CompletionOptions, CompletionProvider,
    ContextCollaborator, DeltaStream, DocumentState, EngineConfig, ModelHandle, MultilineMode,
    ProviderOptions, Snippet,
};

/// Route engine tracing into the test harness (RUST_LOG controls verbosity).
fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

// ─── Scripted provider ────────────────────────────────────────────────────────

/// Provider that replays a fixed delta script and records every call.
struct ScriptedProvider {
    deltas: Vec<String>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
    options: Mutex<Vec<ProviderOptions>>,
    /// Trip this flag while emitting the delta at the given index.
    trip: Option<(usize, CancellationFlag)>,
    /// Fail the call outright instead of streaming.
    fail_with: Option<String>,
}

impl ScriptedProvider {
    fn new(deltas: &[&str]) -> Self {
        Self {
            deltas: deltas.iter().map(|d| d.to_string()).collect(),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
            options: Mutex::new(Vec::new()),
            trip: None,
            fail_with: None,
        }
    }

    fn failing(message: &str) -> Self {
        let mut p = Self::new(&[]);
        p.fail_with = Some(message.to_string());
        p
    }

    fn tripping(deltas: &[&str], at: usize, flag: CancellationFlag) -> Self {
        let mut p = Self::new(deltas);
        p.trip = Some((at, flag));
        p
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    async fn stream_complete(
        &self,
        prompt: &str,
        options: &ProviderOptions,
    ) -> anyhow::Result<DeltaStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.options.lock().unwrap().push(options.clone());
        if let Some(message) = &self.fail_with {
            anyhow::bail!("{message}");
        }
        let trip = self.trip.clone();
        let script = self.deltas.clone();
        let stream = tokio_stream::iter(script.into_iter().enumerate().map(move |(i, delta)| {
            if let Some((at, flag)) = &trip {
                if i == *at {
                    flag.cancel();
                }
            }
            Ok(delta)
        }));
        Ok(Box::pin(stream))
    }
}

fn engine_with(provider: Arc<ScriptedProvider>) -> CompletionEngine {
    init_tracing();
    CompletionEngine::new(EngineConfig::default(), provider)
}

fn doc_in_fn_body() -> DocumentState {
    // Cursor on the blank body line of a small Rust function.
    DocumentState::new("src/lib.rs", "fn inc(x: i32) -> i32 {\n    \n}", 1, 4)
}

fn model() -> ModelHandle {
    ModelHandle::new("scripted", "fim-small")
}

// ─── Cache determinism ────────────────────────────────────────────────────────

#[tokio::test]
async fn identical_requests_hit_the_cache() {
    let provider = Arc::new(ScriptedProvider::new(&["x + 1"]));
    let engine = engine_with(provider.clone());
    let doc = doc_in_fn_body();
    let opts = CompletionOptions::default();

    let first = engine
        .complete(&doc, &CancellationFlag::new(), &opts, Some(&model()))
        .await
        .expect("first call must serve");
    assert!(!first.cache_hit);
    assert_eq!(first.completion_text, "x + 1");
    assert_eq!(provider.call_count(), 1);

    let second = engine
        .complete(&doc, &CancellationFlag::new(), &opts, Some(&model()))
        .await
        .expect("second call must serve from cache");
    assert!(second.cache_hit);
    assert_eq!(second.completion_text, first.completion_text);
    assert_eq!(second.prompt_used, first.prompt_used);
    assert_eq!(provider.call_count(), 1, "cache hit must not invoke the model");

    let (hits, misses, entries) = engine.cache_stats().await;
    assert_eq!((hits, misses, entries), (1, 1, 1));
}

// ─── End-of-line filter ───────────────────────────────────────────────────────

#[tokio::test]
async fn closed_statement_yields_empty_without_model_call() {
    let provider = Arc::new(ScriptedProvider::new(&["never"]));
    let engine = engine_with(provider.clone());
    // Cursor at the very end of a line already terminated with ';'.
    let doc = DocumentState::new("src/lib.rs", "let x = 1;\n", 0, 10);

    let outcome = engine
        .complete(
            &doc,
            &CancellationFlag::new(),
            &CompletionOptions::default(),
            Some(&model()),
        )
        .await;
    assert!(outcome.is_none());
    assert_eq!(provider.call_count(), 0, "filter must fire before the model");
}

#[tokio::test]
async fn missing_model_yields_empty() {
    let provider = Arc::new(ScriptedProvider::new(&["never"]));
    let engine = engine_with(provider.clone());
    let outcome = engine
        .complete(
            &doc_in_fn_body(),
            &CancellationFlag::new(),
            &CompletionOptions::default(),
            None,
        )
        .await;
    assert!(outcome.is_none());
    assert_eq!(provider.call_count(), 0);
}

// ─── Similar-line stop ────────────────────────────────────────────────────────

#[tokio::test]
async fn generation_stops_before_duplicating_line_below_cursor() {
    // The model regenerates the closing brace that already sits below the
    // cursor; the pipeline must cut before it.
    let provider = Arc::new(ScriptedProvider::new(&["    x + 1\n", "}", "\n", "fn extra() {}\n"]));
    let engine = engine_with(provider.clone());
    let doc = doc_in_fn_body(); // line below cursor is "}"

    let outcome = engine
        .complete(
            &doc,
            &CancellationFlag::new(),
            &CompletionOptions::default(),
            Some(&model()),
        )
        .await
        .expect("must serve the part before the duplicate line");
    assert_eq!(outcome.completion_text, "    x + 1");
    assert!(!outcome.completion_text.contains('}'));
    assert!(!outcome.completion_text.contains("extra"));
}

// ─── Cancellation ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn cancellation_mid_stream_returns_absent_and_skips_cache() {
    let cancel = CancellationFlag::new();
    let provider = Arc::new(ScriptedProvider::tripping(
        &["    let a = 1;\n", "    let b = 2;\n", "    a + b\n"],
        1,
        cancel.clone(),
    ));
    let engine = engine_with(provider.clone());

    let outcome = engine
        .complete(
            &doc_in_fn_body(),
            &cancel,
            &CompletionOptions::default(),
            Some(&model()),
        )
        .await;
    assert!(outcome.is_none());

    let (_, _, entries) = engine.cache_stats().await;
    assert_eq!(entries, 0, "a cancelled completion must never be memoized");
}

// ─── Empty suppression ────────────────────────────────────────────────────────

#[tokio::test]
async fn whitespace_only_completion_is_not_served_or_cached() {
    let provider = Arc::new(ScriptedProvider::new(&["   ", "\n", "  "]));
    let engine = engine_with(provider.clone());

    let outcome = engine
        .complete(
            &doc_in_fn_body(),
            &CancellationFlag::new(),
            &CompletionOptions::default(),
            Some(&model()),
        )
        .await;
    assert!(outcome.is_none());
    let (_, _, entries) = engine.cache_stats().await;
    assert_eq!(entries, 0);
}

// ─── Stop sequences & options ─────────────────────────────────────────────────

#[tokio::test]
async fn single_line_mode_leads_with_newline_stop() {
    let provider = Arc::new(ScriptedProvider::new(&["x + 1"]));
    let engine = engine_with(provider.clone());
    let opts = CompletionOptions {
        multiline: Some(MultilineMode::Never),
        ..Default::default()
    };

    engine
        .complete(
            &doc_in_fn_body(),
            &CancellationFlag::new(),
            &opts,
            Some(&model()),
        )
        .await
        .expect("must serve");

    let recorded = provider.options.lock().unwrap();
    let stop = &recorded[0].stop;
    assert_eq!(stop[0], "\n");
    assert!(stop.contains(&"\n\n".to_string()));
    assert_eq!(recorded[0].temperature, 0.0);
    assert!(recorded[0].raw);
}

#[tokio::test]
async fn config_multiline_default_applies_when_options_are_silent() {
    let provider = Arc::new(ScriptedProvider::new(&["x + 1"]));
    init_tracing();
    let config = EngineConfig {
        multiline: MultilineMode::Never,
        ..Default::default()
    };
    let engine = CompletionEngine::new(config, provider.clone());

    engine
        .complete(
            &doc_in_fn_body(),
            &CancellationFlag::new(),
            &CompletionOptions::default(),
            Some(&model()),
        )
        .await
        .expect("must serve");

    let recorded = provider.options.lock().unwrap();
    assert_eq!(
        recorded[0].stop[0], "\n",
        "host-configured single-line default must reach the provider"
    );
}

#[tokio::test]
async fn per_call_multiline_overrides_config_default() {
    let provider = Arc::new(ScriptedProvider::new(&["x + 1"]));
    init_tracing();
    let config = EngineConfig {
        multiline: MultilineMode::Never,
        ..Default::default()
    };
    let engine = CompletionEngine::new(config, provider.clone());
    let opts = CompletionOptions {
        multiline: Some(MultilineMode::Always),
        ..Default::default()
    };

    engine
        .complete(
            &doc_in_fn_body(),
            &CancellationFlag::new(),
            &opts,
            Some(&model()),
        )
        .await
        .expect("must serve");

    let recorded = provider.options.lock().unwrap();
    assert_ne!(recorded[0].stop.first().map(String::as_str), Some("\n"));
}

#[tokio::test]
async fn template_override_shapes_the_prompt() {
    let provider = Arc::new(ScriptedProvider::new(&["x + 1"]));
    let engine = engine_with(provider.clone());
    let opts = CompletionOptions {
        template: Some("PRE[{prefix}]SUF[{suffix}]".to_string()),
        ..Default::default()
    };

    let outcome = engine
        .complete(
            &doc_in_fn_body(),
            &CancellationFlag::new(),
            &opts,
            Some(&model()),
        )
        .await
        .expect("must serve");

    let prompts = provider.prompts.lock().unwrap();
    assert!(prompts[0].starts_with("PRE[fn inc"));
    assert!(prompts[0].contains("SUF["));
    assert_eq!(outcome.prompt_used, prompts[0]);
}

// ─── Context block ────────────────────────────────────────────────────────────

/// Collaborator contributing one fixed definition snippet.
struct OneDefinition;

#[async_trait]
impl ContextCollaborator for OneDefinition {
    async fn get_definitions(&self, _: &str, _: &str, _: usize) -> Vec<Snippet> {
        vec![Snippet {
            file_path: "util.rs".into(),
            content: "pub fn inc(n: i32) -> i32 { n + 1 }".into(),
        }]
    }

    async fn recently_edited(&self) -> Vec<Snippet> {
        Vec::new()
    }

    async fn clipboard_text(&self) -> Option<String> {
        None
    }
}

#[tokio::test]
async fn context_block_heads_the_prompt_with_the_language() {
    let provider = Arc::new(ScriptedProvider::new(&["x + 1"]));
    init_tracing();
    let engine = CompletionEngine::with_collaborator(
        EngineConfig::default(),
        provider.clone(),
        Arc::new(OneDefinition),
    );

    engine
        .complete(
            &doc_in_fn_body(),
            &CancellationFlag::new(),
            &CompletionOptions::default(),
            Some(&model()),
        )
        .await
        .expect("must serve");

    let prompts = provider.prompts.lock().unwrap();
    assert!(prompts[0].starts_with("// Language: Rust\n// Context:\n"));
    assert!(prompts[0].contains("pub fn inc"));
}

// ─── Provider failure surfacing ───────────────────────────────────────────────

#[tokio::test]
async fn provider_failure_surfaces_once_per_distinct_message() {
    let provider = Arc::new(ScriptedProvider::failing("api key missing"));
    let engine = engine_with(provider.clone());
    let mut errors = engine.notifier().subscribe();
    let doc = doc_in_fn_body();

    for _ in 0..3 {
        let outcome = engine
            .complete(
                &doc,
                &CancellationFlag::new(),
                &CompletionOptions::default(),
                Some(&model()),
            )
            .await;
        assert!(outcome.is_none(), "failed call resolves to absent");
    }

    let first = errors.try_recv().expect("first failure must be surfaced");
    assert!(first.contains("api key missing"));
    assert!(
        errors.try_recv().is_err(),
        "repeats of the same message must be deduplicated"
    );
}

// ─── Outcome record ───────────────────────────────────────────────────────────

#[tokio::test]
async fn outcome_carries_provider_identity_and_options() {
    let provider = Arc::new(ScriptedProvider::new(&["x + 1"]));
    let engine = engine_with(provider);

    let outcome = engine
        .complete(
            &doc_in_fn_body(),
            &CancellationFlag::new(),
            &CompletionOptions::default(),
            Some(&model()),
        )
        .await
        .expect("must serve");

    assert_eq!(outcome.provider_id, "scripted");
    assert_eq!(outcome.model_id, "fim-small");
    assert_eq!(outcome.completion_options_used["temperature"], 0.0);
    assert_eq!(outcome.completion_options_used["raw"], true);
    assert!(outcome.completion_options_used["multiline"].is_boolean());
}
