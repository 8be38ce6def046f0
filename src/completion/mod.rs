// SPDX-License-Identifier: MIT
//! Inline completion pipeline.
//!
//! The flow for one request: [`engine::CompletionEngine::complete`] builds
//! the prompt, probes [`cache::CompletionCache`], and on a miss drives
//! [`coalescer::GeneratorCoalescer`] (one live model stream per prefix
//! family) through the [`stream`] stop pipeline, accumulating the final
//! completion text under a cooperative [`CancellationFlag`].

pub mod cache;
pub mod coalescer;
pub mod context;
pub mod engine;
pub mod language;
pub mod model;
pub mod provider;
pub mod stream;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tracing::warn;

// ─── Errors ───────────────────────────────────────────────────────────────────

/// Failure kinds inside the completion pipeline.
///
/// Only `ModelStream` is ever surfaced to the host; everything else resolves
/// to an absent completion without user interruption.
#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("no completion model configured")]
    ModelUnavailable,
    #[error("model stream failed: {0}")]
    ModelStream(String),
    #[error("completion cancelled")]
    Cancelled,
}

// ─── Cancellation ─────────────────────────────────────────────────────────────

/// Cooperative cancellation signal shared between the host and an in-flight
/// completion.
///
/// The engine polls the flag once per received delta; it never interrupts a
/// suspended await. Cloning shares the underlying flag.
#[derive(Clone, Debug, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trip the flag. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

// ─── Error notifier ───────────────────────────────────────────────────────────

/// Surfaces model-stream errors to the host, once per distinct message.
///
/// A persistent misconfiguration produces the same message on every
/// keystroke; without dedup the host would show a notification storm.
/// Hosts subscribe via [`ErrorNotifier::subscribe`]; no subscribers is fine.
pub struct ErrorNotifier {
    seen: Mutex<HashSet<String>>,
    tx: broadcast::Sender<String>,
}

impl Default for ErrorNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorNotifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self {
            seen: Mutex::new(HashSet::new()),
            tx,
        }
    }

    /// Surface an error message to the host. Returns `false` when the same
    /// message was already surfaced earlier in this process.
    pub fn surface(&self, message: &str) -> bool {
        let mut seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());
        if !seen.insert(message.to_string()) {
            return false;
        }
        warn!(error = %message, "completion provider error");
        let _ = self.tx.send(message.to_string());
        true
    }

    /// Subscribe to surfaced error messages.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }
}
