//! Inference collaborators that turn a prompt into answer text.
//!
//! The answerer only depends on the [`InferenceClient`] trait. Two adapters ship with the
//! crate: an Ollama HTTP client for model-backed answers and a deterministic extractive
//! client that picks the best-matching sentence from the supplied passages.

mod extractive;
mod ollama;

pub use extractive::ExtractiveInferenceClient;
pub use ollama::OllamaInferenceClient;

use crate::config::{Config, InferenceProvider};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by inference providers.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// Provider was unreachable or not serving the requested model.
    #[error("Inference provider unavailable: {0}")]
    Unavailable(String),
    /// Provider returned an error response.
    #[error("Failed to generate answer: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

/// Answer text produced by an inference provider.
#[derive(Debug, Clone, PartialEq)]
pub struct Inference {
    /// Answer text.
    pub text: String,
    /// Provider-reported certainty in `[0, 1]`, when the provider reports one.
    pub certainty: Option<f32>,
}

/// The prompt handed to an inference provider.
///
/// Model-backed providers use the rendered `text`; local providers may work directly on the
/// question and passages.
#[derive(Debug, Clone)]
pub struct Prompt {
    /// Question being answered.
    pub question: String,
    /// Context passages in rank order.
    pub passages: Vec<String>,
    /// Fully rendered prompt text.
    pub text: String,
}

/// Interface implemented by answer synthesis backends.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Produce an answer for the prompt.
    async fn infer(&self, prompt: &Prompt) -> Result<Inference, InferenceError>;
}

/// Build an inference client based on configuration.
pub fn build_inference_client(config: &Config) -> Result<Arc<dyn InferenceClient>, InferenceError> {
    match config.inference_provider {
        InferenceProvider::Extractive => Ok(Arc::new(ExtractiveInferenceClient::new())),
        InferenceProvider::Ollama => Ok(Arc::new(OllamaInferenceClient::new(
            config.ollama_url.clone(),
            config.inference_model.clone(),
        )?)),
    }
}
