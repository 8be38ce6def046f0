// SPDX-License-Identifier: MIT
//! ghostline — inline AI code-completion engine.
//!
//! Given a cursor position in a source file, [`CompletionEngine::complete`]
//! assembles a bounded context window, requests a streamed completion from
//! a language model, and incrementally decides where the stream should
//! stop. Repeated prompts are served from an LRU cache; overlapping
//! requests share one live model stream per prefix family.
//!
//! The host supplies the narrow outer seams: a [`CompletionProvider`] for
//! the model layer and (optionally) a [`ContextCollaborator`] for symbol
//! definitions, recent edits, and clipboard text. Everything else —
//! caching, coalescing, stream shaping, cancellation — is this crate.

pub mod completion;
pub mod config;

pub use completion::cache::CompletionCache;
pub use completion::coalescer::GeneratorCoalescer;
pub use completion::context::{ContextCollaborator, DocumentState, NoContext};
pub use completion::engine::CompletionEngine;
pub use completion::model::{
    CompletionOptions, CompletionOutcome, CompletionRequest, MultilineMode, Snippet,
};
pub use completion::provider::{
    CompletionProvider, DeltaStream, ModelHandle, ProviderOptions, DEFAULT_TEMPLATE,
};
pub use completion::{CancellationFlag, CompletionError, ErrorNotifier};
pub use config::EngineConfig;
