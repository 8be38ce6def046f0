// SPDX-License-Identifier: MIT
//! Stream stop pipeline.
//!
//! Three ordered transforms over the raw delta stream, each an independent
//! [`DeltaSource`] stage (sequence of string in, sequence of string out,
//! order preserved, early termination allowed):
//!
//! 1. [`WhitespaceSuppressor`] — after a generated line consisting only of
//!    an end-of-line marker, drop pure-whitespace deltas until real text
//!    resumes (kills trailing blank-line spam).
//! 2. [`LineAssembler`] — regroup raw deltas into complete-line chunks so
//!    downstream logic reasons at line granularity.
//! 3. [`SimilarLineStopper`] — stop the stream the moment a generated line
//!    resembles the line already below the cursor.
//!
//! [`CancelGuard`] sits below the stages and observes the caller's
//! cancellation flag once per received delta.

use async_trait::async_trait;

use super::coalescer::DeltaSubscription;
use super::{CancellationFlag, CompletionError};

/// One stage of the delta pipeline. `None` means clean exhaustion; an `Err`
/// item is terminal.
#[async_trait]
pub trait DeltaSource: Send {
    async fn next_delta(&mut self) -> Option<Result<String, CompletionError>>;
}

#[async_trait]
impl DeltaSource for DeltaSubscription {
    async fn next_delta(&mut self) -> Option<Result<String, CompletionError>> {
        DeltaSubscription::next_delta(self).await
    }
}

/// In-memory source for exercising stages in isolation.
pub struct VecSource(std::vec::IntoIter<String>);

impl VecSource {
    pub fn new(deltas: Vec<String>) -> Self {
        Self(deltas.into_iter())
    }
}

#[async_trait]
impl DeltaSource for VecSource {
    async fn next_delta(&mut self) -> Option<Result<String, CompletionError>> {
        self.0.next().map(Ok)
    }
}

// ─── Cancellation guard ───────────────────────────────────────────────────────

/// Checks the cancellation flag once per received delta. Cooperative: a
/// provider stream that never yields is bounded only by the host dropping
/// the call.
pub struct CancelGuard<S> {
    inner: S,
    flag: CancellationFlag,
}

impl<S: DeltaSource> CancelGuard<S> {
    pub fn new(inner: S, flag: CancellationFlag) -> Self {
        Self { inner, flag }
    }
}

#[async_trait]
impl<S: DeltaSource> DeltaSource for CancelGuard<S> {
    async fn next_delta(&mut self) -> Option<Result<String, CompletionError>> {
        if self.flag.is_cancelled() {
            return Some(Err(CompletionError::Cancelled));
        }
        match self.inner.next_delta().await {
            Some(Ok(_)) if self.flag.is_cancelled() => Some(Err(CompletionError::Cancelled)),
            other => other,
        }
    }
}

// ─── Stage 1: whitespace-after-EOL suppressor ─────────────────────────────────

/// Once a produced line consists only of an end-of-line marker, drops
/// pure-whitespace deltas until a delta with visible text arrives. Deltas
/// pass through unmodified otherwise.
pub struct WhitespaceSuppressor<S> {
    inner: S,
    eol_markers: Vec<String>,
    /// Partial content of the line currently being produced.
    line: String,
    suppressing: bool,
}

impl<S: DeltaSource> WhitespaceSuppressor<S> {
    pub fn new(inner: S, eol_markers: &[&str]) -> Self {
        Self {
            inner,
            eol_markers: eol_markers.iter().map(|m| m.to_string()).collect(),
            line: String::new(),
            suppressing: false,
        }
    }

    fn observe(&mut self, delta: &str) {
        self.line.push_str(delta);
        while let Some(pos) = self.line.find('\n') {
            let completed = self.line[..pos].trim_end_matches('\r');
            let trimmed = completed.trim();
            if !trimmed.is_empty() && self.eol_markers.iter().any(|m| m.as_str() == trimmed) {
                self.suppressing = true;
            }
            self.line.drain(..=pos);
        }
    }
}

#[async_trait]
impl<S: DeltaSource> DeltaSource for WhitespaceSuppressor<S> {
    async fn next_delta(&mut self) -> Option<Result<String, CompletionError>> {
        loop {
            let delta = match self.inner.next_delta().await {
                Some(Ok(delta)) => delta,
                other => return other,
            };
            if self.suppressing {
                if delta.trim().is_empty() {
                    self.observe(&delta);
                    continue;
                }
                self.suppressing = false;
            }
            self.observe(&delta);
            return Some(Ok(delta));
        }
    }
}

// ─── Stage 2: line reassembler ────────────────────────────────────────────────

/// Regroups raw deltas into complete-line chunks (newline included),
/// preserving boundaries exactly as received. The unterminated remainder is
/// flushed when the upstream ends.
pub struct LineAssembler<S> {
    inner: S,
    buffer: String,
    upstream_done: bool,
}

impl<S: DeltaSource> LineAssembler<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            buffer: String::new(),
            upstream_done: false,
        }
    }

    fn take_line(&mut self) -> Option<String> {
        let pos = self.buffer.find('\n')?;
        Some(self.buffer.drain(..=pos).collect())
    }
}

#[async_trait]
impl<S: DeltaSource> DeltaSource for LineAssembler<S> {
    async fn next_delta(&mut self) -> Option<Result<String, CompletionError>> {
        loop {
            if let Some(line) = self.take_line() {
                return Some(Ok(line));
            }
            if self.upstream_done {
                if self.buffer.is_empty() {
                    return None;
                }
                return Some(Ok(std::mem::take(&mut self.buffer)));
            }
            match self.inner.next_delta().await {
                Some(Ok(delta)) => self.buffer.push_str(&delta),
                Some(Err(err)) => return Some(Err(err)),
                None => self.upstream_done = true,
            }
        }
    }
}

// ─── Stage 3: similar-line stopper ────────────────────────────────────────────

/// Terminates the stream when a complete generated line is similar enough
/// to the line originally below the cursor — the model has caught up to
/// code that already exists, and emitting it would duplicate it. The
/// matching line itself is withheld.
pub struct SimilarLineStopper<S> {
    inner: S,
    reference: String,
    threshold: f64,
    stopped: bool,
}

impl<S: DeltaSource> SimilarLineStopper<S> {
    pub fn new(inner: S, line_below_cursor: &str, threshold: f64) -> Self {
        Self {
            inner,
            reference: line_below_cursor.trim().to_string(),
            threshold,
            stopped: false,
        }
    }
}

#[async_trait]
impl<S: DeltaSource> DeltaSource for SimilarLineStopper<S> {
    async fn next_delta(&mut self) -> Option<Result<String, CompletionError>> {
        if self.stopped {
            return None;
        }
        let chunk = match self.inner.next_delta().await {
            Some(Ok(chunk)) => chunk,
            other => return other,
        };
        let line = chunk.trim();
        if !self.reference.is_empty()
            && !line.is_empty()
            && line_similarity(line, &self.reference) >= self.threshold
        {
            self.stopped = true;
            return None;
        }
        Some(Ok(chunk))
    }
}

/// Normalized edit-distance similarity in 0.0–1.0; 1.0 means identical.
pub fn line_similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - edit_distance(a, b) as f64 / longest as f64
}

/// Levenshtein distance, two-row dynamic programming.
fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            current[j + 1] = substitution.min(prev[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut prev, &mut current);
    }
    prev[b.len()]
}

// ─── Pipeline assembly ────────────────────────────────────────────────────────

/// Compose the full stop pipeline over a subscription, in fixed order:
/// cancel guard → whitespace suppressor → line reassembler → similar-line
/// stopper.
pub fn stop_pipeline(
    source: DeltaSubscription,
    cancel: CancellationFlag,
    eol_markers: &[&str],
    line_below_cursor: &str,
    similarity_threshold: f64,
) -> impl DeltaSource {
    let guarded = CancelGuard::new(source, cancel);
    let suppressed = WhitespaceSuppressor::new(guarded, eol_markers);
    let lines = LineAssembler::new(suppressed);
    SimilarLineStopper::new(lines, line_below_cursor, similarity_threshold)
}

// ─── Tests ────────────────────────────────────────────────────────────────────
