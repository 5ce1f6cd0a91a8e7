//! Per-document retrieval indexes.
//!
//! An [`Index`] owns the chunks of exactly one document and a retrieval key for each of them.
//! Two key schemes are available:
//!
//! - **Lexical**: BM25 through an in-RAM tantivy index. Deterministic and fully local.
//! - **Semantic**: one embedding vector per chunk, compared by cosine similarity.
//!
//! Indexes are immutable once built and are meant to be shared behind an `Arc`; concurrent
//! scoring requires no locking.

mod lexical;
mod semantic;

pub use crate::config::IndexScheme;

use crate::config::Config;
use crate::document::{Chunk, DocumentId};
use crate::embedding::{EmbeddingClient, EmbeddingClientError, build_embedding_client};
use lexical::LexicalIndex;
use semantic::SemanticIndex;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while building an index.
#[derive(Debug, Error)]
pub enum IndexingError {
    /// No chunks were supplied.
    #[error("cannot build an index from an empty chunk sequence")]
    Empty,
    /// Chunks from more than one document were supplied.
    #[error("chunks belong to more than one document ({first} and {other})")]
    MixedDocuments {
        /// Document of the first chunk.
        first: DocumentId,
        /// Conflicting document found later in the sequence.
        other: DocumentId,
    },
    /// Embedding provider failed while computing chunk keys.
    #[error("Failed to embed chunks: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Embedding provider returned vectors that cannot be used as keys.
    #[error("Invalid chunk embeddings: {0}")]
    InvalidEmbeddings(String),
    /// The tantivy index could not be built.
    #[error("Failed to build lexical index: {0}")]
    Lexical(#[from] tantivy::TantivyError),
}

/// Errors raised while scoring chunks against a question.
#[derive(Debug, Error)]
pub enum ScoringError {
    /// The question could not be embedded.
    #[error(transparent)]
    Embedding(#[from] EmbeddingClientError),
    /// The tantivy search failed.
    #[error("Lexical search failed: {0}")]
    Lexical(#[from] tantivy::TantivyError),
}

/// Relevance of one chunk to a question.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkScore {
    /// Relevance normalized to `[0, 1]`.
    pub normalized: f32,
    /// Scheme-specific raw relevance (BM25 score or cosine similarity).
    pub raw: f32,
}

/// Builds indexes with a fixed key scheme.
#[derive(Clone)]
pub enum Indexer {
    /// BM25 over a tantivy index.
    Lexical,
    /// Embedding vectors from the given client.
    Semantic(Arc<dyn EmbeddingClient>),
}

impl Default for Indexer {
    fn default() -> Self {
        Self::Lexical
    }
}

impl Indexer {
    /// Select the indexer described by the configuration.
    pub fn from_config(config: &Config) -> Result<Self, EmbeddingClientError> {
        Ok(match config.index_scheme {
            IndexScheme::Lexical => Self::Lexical,
            IndexScheme::Semantic => Self::Semantic(build_embedding_client(config)?),
        })
    }

    /// Key scheme produced by this indexer.
    pub fn scheme(&self) -> IndexScheme {
        match self {
            Self::Lexical => IndexScheme::Lexical,
            Self::Semantic(_) => IndexScheme::Semantic,
        }
    }

    /// Compute a retrieval key for every chunk of one document.
    ///
    /// Fails on an empty sequence or when chunks belong to different documents. Building twice
    /// from the same chunks yields indexes that rank identically.
    #[tracing::instrument(skip_all, fields(scheme = ?self.scheme(), chunks = chunks.len()))]
    pub async fn build(&self, chunks: Vec<Chunk>) -> Result<Index, IndexingError> {
        let first = chunks.first().ok_or(IndexingError::Empty)?;
        let document_id = first.document_id.clone();
        if let Some(other) = chunks
            .iter()
            .find(|chunk| chunk.document_id != document_id)
        {
            return Err(IndexingError::MixedDocuments {
                first: document_id,
                other: other.document_id.clone(),
            });
        }

        let keys = match self {
            Self::Lexical => RetrievalKeys::Lexical(LexicalIndex::build(&chunks)?),
            Self::Semantic(client) => {
                RetrievalKeys::Semantic(SemanticIndex::build(&chunks, Arc::clone(client)).await?)
            }
        };

        tracing::debug!(document_id = %document_id, "Index built");
        Ok(Index {
            document_id,
            chunks,
            keys,
        })
    }
}

enum RetrievalKeys {
    Lexical(LexicalIndex),
    Semantic(SemanticIndex),
}

/// Read-only retrieval structure over the chunks of one document.
pub struct Index {
    document_id: DocumentId,
    chunks: Vec<Chunk>,
    keys: RetrievalKeys,
}

impl Index {
    /// Document the index belongs to.
    pub fn document_id(&self) -> &DocumentId {
        &self.document_id
    }

    /// Indexed chunks in sequence order.
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Number of indexed chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether the index holds no chunks.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Key scheme of the index.
    pub fn scheme(&self) -> IndexScheme {
        match self.keys {
            RetrievalKeys::Lexical(_) => IndexScheme::Lexical,
            RetrievalKeys::Semantic(_) => IndexScheme::Semantic,
        }
    }

    /// Score every chunk against the question, in chunk sequence order.
    pub async fn score(&self, question: &str) -> Result<Vec<ChunkScore>, ScoringError> {
        match &self.keys {
            RetrievalKeys::Lexical(lexical) => Ok(lexical.score(question)?),
            RetrievalKeys::Semantic(semantic) => Ok(semantic.score(question).await?),
        }
    }
}

impl fmt::Debug for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Index")
            .field("document_id", &self.document_id)
            .field("scheme", &self.scheme())
            .field("chunks", &self.chunks.len())
            .finish()
    }
}
