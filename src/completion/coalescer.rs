// SPDX-License-Identifier: MIT
//! Generator reuse across overlapping completion requests.
//!
//! Rapid keystrokes produce a chain of requests whose prefixes extend each
//! other ("foo", "foob", "foobar"). At most one model stream runs for such
//! a prefix family: the first request starts it, later compatible requests
//! attach as subscribers and replay the buffered deltas before following
//! live output. An incompatible prefix abandons the stream and starts
//! fresh. The compatibility check and slot replacement happen under one
//! lock, so two racing identical prefixes always share a single stream.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use futures_util::StreamExt;
use tokio::sync::{watch, Mutex};
use tracing::{debug, trace};

use super::provider::DeltaStream;
use super::CompletionError;

// ─── Shared stream ────────────────────────────────────────────────────────────

#[derive(Debug)]
struct StreamState {
    deltas: Vec<String>,
    /// `None` while running, `Some(None)` after clean exhaustion,
    /// `Some(Some(msg))` after a terminal provider error.
    terminal: Option<Option<String>>,
}

/// One in-flight model call, shared by every subscriber in its prefix
/// family. Owned exclusively by [`GeneratorCoalescer`].
#[derive(Debug)]
pub(crate) struct SharedStream {
    prefix: String,
    state: StdMutex<StreamState>,
    /// Bumped on every state change; subscribers wait on it.
    version: watch::Sender<u64>,
    abandoned: AtomicBool,
}

impl SharedStream {
    fn new(prefix: &str) -> Self {
        let (version, _) = watch::channel(0);
        Self {
            prefix: prefix.to_string(),
            state: StdMutex::new(StreamState {
                deltas: Vec::new(),
                terminal: None,
            }),
            version,
            abandoned: AtomicBool::new(false),
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, StreamState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn push(&self, delta: String) {
        self.lock_state().deltas.push(delta);
        self.version.send_modify(|v| *v += 1);
    }

    fn finish(&self, error: Option<String>) {
        self.lock_state().terminal = Some(error);
        self.version.send_modify(|v| *v += 1);
    }

    fn abandon(&self) {
        self.abandoned.store(true, Ordering::Release);
        self.version.send_modify(|v| *v += 1);
    }

    fn is_live(&self) -> bool {
        !self.abandoned.load(Ordering::Acquire) && self.lock_state().terminal.is_none()
    }

    fn subscribe(self: &Arc<Self>) -> DeltaSubscription {
        DeltaSubscription {
            rx: self.version.subscribe(),
            stream: Arc::clone(self),
            cursor: 0,
        }
    }
}

// ─── Subscription ─────────────────────────────────────────────────────────────

/// A subscriber's view over a [`SharedStream`]: buffered deltas first, then
/// live ones, in the exact order the model produced them.
#[derive(Debug)]
pub struct DeltaSubscription {
    stream: Arc<SharedStream>,
    rx: watch::Receiver<u64>,
    cursor: usize,
}

impl DeltaSubscription {
    /// Next delta. `None` means clean exhaustion; an `Err` is terminal.
    ///
    /// Abandonment (a newer incompatible request took over) surfaces as
    /// [`CompletionError::Cancelled`] so a superseded caller never serves a
    /// half-finished completion.
    pub async fn next_delta(&mut self) -> Option<Result<String, CompletionError>> {
        loop {
            {
                let state = self.stream.lock_state();
                if self.stream.abandoned.load(Ordering::Acquire) {
                    return Some(Err(CompletionError::Cancelled));
                }
                if self.cursor < state.deltas.len() {
                    let delta = state.deltas[self.cursor].clone();
                    self.cursor += 1;
                    return Some(Ok(delta));
                }
                if let Some(terminal) = &state.terminal {
                    return terminal
                        .as_ref()
                        .map(|msg| Err(CompletionError::ModelStream(msg.clone())));
                }
            }
            if self.rx.changed().await.is_err() {
                // Sender gone with no terminal state recorded.
                return None;
            }
        }
    }
}

// ─── Coalescer ────────────────────────────────────────────────────────────────

/// Tracks the single in-flight stream and decides whether a new request
/// attaches to it or replaces it.
#[derive(Default)]
pub struct GeneratorCoalescer {
    slot: Mutex<Option<Arc<SharedStream>>>,
}

impl GeneratorCoalescer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach to a compatible in-flight stream, or start a fresh one via
    /// `start`, abandoning any incompatible stream first.
    ///
    /// Compatibility: the recorded prefix is a prefix of (or equal to) the
    /// new request's prefix text. The slot lock is held across `start` so
    /// the check-and-set is atomic.
    ///
    /// A `start` failure propagates as [`CompletionError::ModelStream`]; no
    /// retry happens at this layer.
    pub async fn acquire_or_share<F, Fut>(
        &self,
        prefix_text: &str,
        start: F,
    ) -> Result<DeltaSubscription, CompletionError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = anyhow::Result<DeltaStream>>,
    {
        let mut slot = self.slot.lock().await;

        if let Some(existing) = slot.as_ref() {
            if existing.is_live() && prefix_text.starts_with(existing.prefix.as_str()) {
                debug!(
                    shared_prefix_len = existing.prefix.len(),
                    request_prefix_len = prefix_text.len(),
                    "attaching to in-flight completion stream"
                );
                return Ok(existing.subscribe());
            }
        }

        if let Some(stale) = slot.take() {
            if stale.is_live() {
                debug!("abandoning incompatible completion stream");
            }
            stale.abandon();
        }

        let deltas = start()
            .await
            .map_err(|err| CompletionError::ModelStream(format!("{err:#}")))?;
        let shared = Arc::new(SharedStream::new(prefix_text));
        tokio::spawn(pump(Arc::clone(&shared), deltas));
        let subscription = shared.subscribe();
        *slot = Some(shared);
        Ok(subscription)
    }

    /// Whether a live stream currently occupies the slot.
    pub async fn has_live_stream(&self) -> bool {
        self.slot
            .lock()
            .await
            .as_ref()
            .is_some_and(|s| s.is_live())
    }

    /// Number of subscribers attached to the current stream (0 when none).
    pub async fn subscriber_count(&self) -> usize {
        self.slot
            .lock()
            .await
            .as_ref()
            .map_or(0, |s| s.version.receiver_count())
    }
}

/// Drains the provider stream into the shared buffer. Stops early when the
/// stream has been abandoned by a superseding request.
async fn pump(shared: Arc<SharedStream>, mut deltas: DeltaStream) {
    while let Some(item) = deltas.next().await {
        if shared.abandoned.load(Ordering::Acquire) {
            trace!("dropping delta for abandoned stream");
            return;
        }
        match item {
            Ok(chunk) => shared.push(chunk),
            Err(err) => {
                shared.finish(Some(format!("{err:#}")));
                return;
            }
        }
    }
    shared.finish(None);
}

// ─── Tests ────────────────────────────────────────────────────────────────────
