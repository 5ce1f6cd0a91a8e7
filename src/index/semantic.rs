//! Embedding-vector keys compared by cosine similarity.

use super::{ChunkScore, IndexingError};
use crate::document::Chunk;
use crate::embedding::{EmbeddingClient, EmbeddingClientError, cosine_similarity};
use std::sync::Arc;

/// One embedding per chunk plus the client used to embed questions.
pub(super) struct SemanticIndex {
    client: Arc<dyn EmbeddingClient>,
    vectors: Vec<Vec<f32>>,
    dimension: usize,
}

impl SemanticIndex {
    pub(super) async fn build(
        chunks: &[Chunk],
        client: Arc<dyn EmbeddingClient>,
    ) -> Result<Self, IndexingError> {
        let texts = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let vectors = client.generate_embeddings(texts).await?;

        if vectors.len() != chunks.len() {
            return Err(IndexingError::InvalidEmbeddings(format!(
                "expected {} vectors, received {}",
                chunks.len(),
                vectors.len()
            )));
        }
        let dimension = vectors.first().map(Vec::len).unwrap_or(0);
        if dimension == 0 {
            return Err(IndexingError::InvalidEmbeddings(
                "embedding dimension is zero".to_string(),
            ));
        }
        if vectors.iter().any(|vector| vector.len() != dimension) {
            return Err(IndexingError::InvalidEmbeddings(
                "chunk embeddings have inconsistent dimensions".to_string(),
            ));
        }

        Ok(Self {
            client,
            vectors,
            dimension,
        })
    }

    /// Cosine similarity of the question embedding to each chunk, clamped below at zero.
    pub(super) async fn score(
        &self,
        question: &str,
    ) -> Result<Vec<ChunkScore>, EmbeddingClientError> {
        let mut embedded = self
            .client
            .generate_embeddings(vec![question.to_string()])
            .await?;
        let query = embedded.pop().ok_or_else(|| {
            EmbeddingClientError::GenerationFailed("provider returned no query vector".into())
        })?;
        if query.len() != self.dimension {
            return Err(EmbeddingClientError::GenerationFailed(format!(
                "query dimension {} does not match index dimension {}",
                query.len(),
                self.dimension
            )));
        }

        Ok(self
            .vectors
            .iter()
            .map(|vector| {
                let similarity = cosine_similarity(&query, vector);
                ChunkScore {
                    normalized: similarity.clamp(0.0, 1.0),
                    raw: similarity,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbeddingClient;
    use crate::index::tests::chunk;
    use async_trait::async_trait;

    struct FixedClient(Vec<Vec<f32>>);

    #[async_trait]
    impl EmbeddingClient for FixedClient {
        async fn generate_embeddings(
            &self,
            _texts: Vec<String>,
        ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn scores_follow_term_overlap() {
        let chunks = vec![
            chunk("doc", 0, "paid time off accrues monthly"),
            chunk("doc", 1, "salary reviews happen in january"),
        ];
        let index = SemanticIndex::build(&chunks, Arc::new(HashingEmbeddingClient::new(128)))
            .await
            .unwrap();
        let scores = index.score("how does paid time off accrue").await.unwrap();
        assert!(scores[0].normalized > scores[1].normalized);
    }

    #[tokio::test]
    async fn vector_count_mismatch_is_rejected() {
        let chunks = vec![chunk("doc", 0, "a"), chunk("doc", 1, "b")];
        let result = SemanticIndex::build(&chunks, Arc::new(FixedClient(vec![vec![1.0]]))).await;
        assert!(matches!(result, Err(IndexingError::InvalidEmbeddings(_))));
    }

    #[tokio::test]
    async fn inconsistent_dimensions_are_rejected() {
        let chunks = vec![chunk("doc", 0, "a"), chunk("doc", 1, "b")];
        let client = FixedClient(vec![vec![1.0, 0.0], vec![1.0]]);
        let result = SemanticIndex::build(&chunks, Arc::new(client)).await;
        assert!(matches!(result, Err(IndexingError::InvalidEmbeddings(_))));
    }

    #[tokio::test]
    async fn opposite_vectors_clamp_to_zero() {
        let index = SemanticIndex {
            client: Arc::new(FixedClient(vec![vec![-1.0, 0.0]])),
            vectors: vec![vec![1.0, 0.0]],
            dimension: 2,
        };
        let scores = index.score("anything").await.unwrap();
        assert_eq!(scores[0].normalized, 0.0);
        assert!(scores[0].raw < 0.0);
    }
}
