// SPDX-License-Identifier: MIT
//! Model-layer seam.
//!
//! The engine never talks to a provider transport directly; it goes through
//! [`CompletionProvider`], which turns a rendered prompt into a lazy stream
//! of text deltas. Provider adapters (HTTP, local runtimes) live in the
//! host and implement this trait.

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

/// Lazy sequence of text deltas from the model. Each item is either a chunk
/// of generated text or a terminal transport/decode error.
pub type DeltaStream = Pin<Box<dyn Stream<Item = anyhow::Result<String>> + Send>>;

/// Sampling options forwarded with every completion call.
///
/// Temperature is pinned to zero so identical prompts produce identical
/// completions, which is what makes the prompt cache sound.
#[derive(Debug, Clone)]
pub struct ProviderOptions {
    /// Ordered stop sequences; generation ends at the first match.
    pub stop: Vec<String>,
    /// Always 0.0 for completions.
    pub temperature: f32,
    /// Bypass provider chat formatting; the prompt is already rendered.
    pub raw: bool,
    /// Provider-specific parameters, forwarded opaquely.
    pub extra: serde_json::Value,
}

impl ProviderOptions {
    pub fn new(stop: Vec<String>, extra: serde_json::Value) -> Self {
        Self {
            stop,
            temperature: 0.0,
            raw: true,
            extra,
        }
    }

    /// The options as an opaque mapping for [`super::model::CompletionOutcome`].
    pub fn as_value(&self) -> serde_json::Value {
        serde_json::json!({
            "stop": self.stop,
            "temperature": self.temperature,
            "raw": self.raw,
            "extra": self.extra,
        })
    }
}

/// A resolved model the host wants completions from.
#[derive(Debug, Clone)]
pub struct ModelHandle {
    /// Provider identifier ("openai", "ollama", ...).
    pub provider_id: String,
    /// Model identifier within the provider.
    pub model_id: String,
    /// Prompt template with `{prefix}` / `{suffix}` placeholders.
    pub template: String,
    /// Stop sequences the provider always wants for this model.
    pub default_stop: Vec<String>,
}

/// Fill-in-middle template used when a model declares none of its own.
pub const DEFAULT_TEMPLATE: &str = "<|fim_prefix|>{prefix}<|fim_suffix|>{suffix}<|fim_middle|>";

impl ModelHandle {
    pub fn new(provider_id: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            model_id: model_id.into(),
            template: DEFAULT_TEMPLATE.to_string(),
            default_stop: Vec::new(),
        }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    pub fn with_default_stop(mut self, stop: Vec<String>) -> Self {
        self.default_stop = stop;
        self
    }
}

/// Turns a rendered prompt into a stream of text deltas.
///
/// Retries, endpoint selection and authentication are the adapter's
/// concern; the engine treats any error as terminal for the request.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn stream_complete(
        &self,
        prompt: &str,
        options: &ProviderOptions,
    ) -> anyhow::Result<DeltaStream>;
}

/// Substitute prefix/suffix into a template. Placeholders that do not occur
/// are simply absent from the output; a template with no placeholders is
/// returned unchanged.
pub fn render_prompt(template: &str, prefix: &str, suffix: &str) -> String {
    template
        .replace("{prefix}", prefix)
        .replace("{suffix}", suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_substitutes_both_placeholders() {
        let prompt = render_prompt(DEFAULT_TEMPLATE, "let x = ", ";");
        assert!(prompt.contains("<|fim_prefix|>let x = "));
        assert!(prompt.contains("<|fim_suffix|>;"));
        assert!(prompt.ends_with("<|fim_middle|>"));
    }

    #[test]
    fn render_is_deterministic() {
        let a = render_prompt("{prefix}|{suffix}", "p", "s");
        let b = render_prompt("{prefix}|{suffix}", "p", "s");
        assert_eq!(a, b);
        assert_eq!(a, "p|s");
    }

    #[test]
    fn provider_options_pin_temperature() {
        let opts = ProviderOptions::new(vec!["\n\n".into()], serde_json::Value::Null);
        assert_eq!(opts.temperature, 0.0);
        assert!(opts.raw);
        let value = opts.as_value();
        assert_eq!(value["stop"][0], "\n\n");
    }
}
