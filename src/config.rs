use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

use crate::answer::AnswerConfig;
use crate::chunking::ChunkConfig;

const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
    /// Configuration was already installed in the global cache.
    #[error("Configuration already initialized")]
    AlreadyInitialized,
}

/// Runtime configuration for the question-answering pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Maximum chunk length in characters.
    pub chunk_max_len: usize,
    /// Characters shared between consecutive chunks.
    pub chunk_overlap: usize,
    /// How far back from the hard limit the chunker looks for a natural boundary.
    pub chunk_boundary_lookback: usize,
    /// Retrieval key scheme used when building document indexes.
    pub index_scheme: IndexScheme,
    /// Embedding provider used by the semantic scheme.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of locally hashed embeddings.
    pub embedding_dimension: usize,
    /// Default number of chunks retrieved per question.
    pub retrieval_top_k: usize,
    /// Minimum normalized relevance a chunk needs to be used as context.
    pub answer_min_relevance: f32,
    /// Token budget for the concatenated answer context.
    pub answer_context_budget: usize,
    /// Weight of retrieval relevance when blending with model certainty.
    pub answer_relevance_weight: f32,
    /// Optional tiktoken model used for context budgeting.
    pub answer_tokenizer_model: Option<String>,
    /// Inference backend answering questions.
    pub inference_provider: InferenceProvider,
    /// Model identifier for the inference backend.
    pub inference_model: String,
    /// Base URL of the Ollama runtime.
    pub ollama_url: String,
    /// Upper bound on PDF text extraction time.
    pub extraction_timeout_secs: u64,
}

/// Retrieval key schemes supported by the indexer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexScheme {
    /// BM25 term-frequency postings.
    Lexical,
    /// Embedding vectors compared by cosine similarity.
    Semantic,
}

/// Supported embedding backends for the semantic scheme.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Deterministic in-process feature hashing.
    Hashing,
    /// Local Ollama runtime.
    Ollama,
}

/// Supported inference backends for answer synthesis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InferenceProvider {
    /// Deterministic sentence extraction from the retrieved passages.
    Extractive,
    /// Local Ollama runtime.
    Ollama,
}

impl Default for Config {
    fn default() -> Self {
        let chunk = ChunkConfig::default();
        let answer = AnswerConfig::default();
        Self {
            chunk_max_len: chunk.max_len,
            chunk_overlap: chunk.overlap,
            chunk_boundary_lookback: chunk.boundary_lookback,
            index_scheme: IndexScheme::Lexical,
            embedding_provider: EmbeddingProvider::Hashing,
            embedding_model: "nomic-embed-text".to_string(),
            embedding_dimension: 256,
            retrieval_top_k: 4,
            answer_min_relevance: answer.min_relevance,
            answer_context_budget: answer.context_budget,
            answer_relevance_weight: answer.relevance_weight,
            answer_tokenizer_model: answer.tokenizer_model,
            inference_provider: InferenceProvider::Extractive,
            inference_model: "llama3.2".to_string(),
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            extraction_timeout_secs: 30,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to defaults for unset keys.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            chunk_max_len: parse_or("CHUNK_MAX_LEN", defaults.chunk_max_len)?,
            chunk_overlap: parse_or("CHUNK_OVERLAP", defaults.chunk_overlap)?,
            chunk_boundary_lookback: parse_or(
                "CHUNK_BOUNDARY_LOOKBACK",
                defaults.chunk_boundary_lookback,
            )?,
            index_scheme: parse_or("INDEX_SCHEME", defaults.index_scheme)?,
            embedding_provider: parse_or("EMBEDDING_PROVIDER", defaults.embedding_provider)?,
            embedding_model: load_env_optional("EMBEDDING_MODEL")
                .unwrap_or(defaults.embedding_model),
            embedding_dimension: parse_or("EMBEDDING_DIMENSION", defaults.embedding_dimension)?,
            retrieval_top_k: parse_or("RETRIEVAL_TOP_K", defaults.retrieval_top_k)?,
            answer_min_relevance: parse_or(
                "ANSWER_MIN_RELEVANCE",
                defaults.answer_min_relevance,
            )?,
            answer_context_budget: parse_or(
                "ANSWER_CONTEXT_BUDGET",
                defaults.answer_context_budget,
            )?,
            answer_relevance_weight: parse_or(
                "ANSWER_RELEVANCE_WEIGHT",
                defaults.answer_relevance_weight,
            )?,
            answer_tokenizer_model: load_env_optional("ANSWER_TOKENIZER_MODEL"),
            inference_provider: parse_or("INFERENCE_PROVIDER", defaults.inference_provider)?,
            inference_model: load_env_optional("INFERENCE_MODEL")
                .unwrap_or(defaults.inference_model),
            ollama_url: load_env_optional("OLLAMA_URL").unwrap_or(defaults.ollama_url),
            extraction_timeout_secs: parse_or(
                "EXTRACTION_TIMEOUT_SECS",
                defaults.extraction_timeout_secs,
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject chunking and answer settings that parse but are out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.chunk_config()
            .validate()
            .map_err(|error| ConfigError::InvalidValue(error.to_string()))?;
        self.answer_config()
            .validate()
            .map_err(|error| ConfigError::InvalidValue(error.to_string()))
    }

    /// Chunking parameters derived from this configuration.
    pub fn chunk_config(&self) -> ChunkConfig {
        ChunkConfig {
            max_len: self.chunk_max_len,
            overlap: self.chunk_overlap,
            boundary_lookback: self.chunk_boundary_lookback,
        }
    }

    /// Answer synthesis parameters derived from this configuration.
    pub fn answer_config(&self) -> AnswerConfig {
        AnswerConfig {
            min_relevance: self.answer_min_relevance,
            context_budget: self.answer_context_budget,
            relevance_weight: self.answer_relevance_weight,
            tokenizer_model: self.answer_tokenizer_model.clone(),
        }
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_or<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match load_env_optional(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

impl FromStr for IndexScheme {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lexical" | "bm25" => Ok(Self::Lexical),
            "semantic" | "embedding" => Ok(Self::Semantic),
            _ => Err(()),
        }
    }
}

impl FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hashing" => Ok(Self::Hashing),
            "ollama" => Ok(Self::Ollama),
            _ => Err(()),
        }
    }
}

impl FromStr for InferenceProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "extractive" => Ok(Self::Extractive),
            "ollama" => Ok(Self::Ollama),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, or the defaults when initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get_or_init(Config::default)
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() -> Result<&'static Config, ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    tracing::debug!(
        index_scheme = ?config.index_scheme,
        inference_provider = ?config.inference_provider,
        chunk_max_len = config.chunk_max_len,
        chunk_overlap = config.chunk_overlap,
        "Loaded configuration"
    );
    CONFIG
        .set(config)
        .map_err(|_| ConfigError::AlreadyInitialized)?;
    Ok(get_config())
}
