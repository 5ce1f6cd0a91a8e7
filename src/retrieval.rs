//! Question-driven passage selection over a built [`Index`].

use crate::document::Chunk;
use crate::embedding::EmbeddingClientError;
use crate::index::{Index, ScoringError};
use serde::Serialize;
use std::cmp::Ordering;
use thiserror::Error;

/// Errors raised while ranking chunks for a question.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// `k` must request at least one chunk.
    #[error("retrieval k must be greater than zero")]
    InvalidK,
    /// The index holds no chunks.
    #[error("index for document {0} is empty")]
    EmptyIndex(String),
    /// The question could not be embedded for semantic scoring.
    #[error("Failed to embed question: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// The lexical search over the index failed.
    #[error("Lexical search failed: {0}")]
    Search(#[from] tantivy::TantivyError),
}

impl From<ScoringError> for RetrievalError {
    fn from(error: ScoringError) -> Self {
        match error {
            ScoringError::Embedding(error) => Self::Embedding(error),
            ScoringError::Lexical(error) => Self::Search(error),
        }
    }
}

/// A chunk paired with its relevance to the question.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedChunk {
    /// The retrieved chunk.
    pub chunk: Chunk,
    /// Relevance normalized to `[0, 1]`.
    pub score: f32,
    /// Scheme-specific raw relevance used for ranking.
    pub raw_score: f32,
}

/// Return the `k` chunks most relevant to the question, best first.
///
/// Chunks are ordered by descending raw relevance with ties broken by ascending sequence, so
/// normalized scores are non-increasing and identical inputs always rank identically. When the
/// index has fewer than `k` chunks all of them are returned.
#[tracing::instrument(skip(index, question), fields(document_id = %index.document_id()))]
pub async fn retrieve(
    index: &Index,
    question: &str,
    k: usize,
) -> Result<Vec<RankedChunk>, RetrievalError> {
    if k == 0 {
        return Err(RetrievalError::InvalidK);
    }
    if index.is_empty() {
        return Err(RetrievalError::EmptyIndex(index.document_id().to_string()));
    }

    let scores = index.score(question).await?;
    let mut ranked: Vec<(usize, f32, f32)> = scores
        .into_iter()
        .enumerate()
        .map(|(position, score)| (position, score.normalized, score.raw))
        .collect();
    ranked.sort_by(|left, right| match right.2.total_cmp(&left.2) {
        Ordering::Equal => left.0.cmp(&right.0),
        other => other,
    });

    let chunks = index.chunks();
    let results: Vec<RankedChunk> = ranked
        .into_iter()
        .take(k)
        .map(|(position, score, raw_score)| RankedChunk {
            chunk: chunks[position].clone(),
            score,
            raw_score,
        })
        .collect();

    tracing::debug!(
        returned = results.len(),
        top_score = results.first().map(|hit| hit.score),
        "Retrieved chunks"
    );
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{DocumentId, PageRange};
    use crate::embedding::HashingEmbeddingClient;
    use crate::index::Indexer;
    use std::sync::Arc;

    fn chunks(texts: &[&str]) -> Vec<Chunk> {
        texts
            .iter()
            .enumerate()
            .map(|(sequence, text)| Chunk {
                document_id: DocumentId::new("doc"),
                sequence,
                start: sequence * 50,
                end: sequence * 50 + text.chars().count(),
                pages: PageRange { first: 1, last: 1 },
                text: text.to_string(),
            })
            .collect()
    }

    async fn handbook_index(indexer: Indexer) -> Index {
        indexer
            .build(chunks(&[
                "Saturday hours are 10 AM to 4 PM.",
                "Paid time off accrues at 1.5 days per month.",
                "The company observes 10 federal holidays annually.",
                "Salary reviews are conducted annually in January.",
                "Paid parental leave lasts twelve weeks.",
            ]))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn zero_k_is_rejected() {
        let index = handbook_index(Indexer::default()).await;
        let error = retrieve(&index, "holidays", 0).await.unwrap_err();
        assert!(matches!(error, RetrievalError::InvalidK));
    }

    #[tokio::test]
    async fn returns_at_most_k_with_non_increasing_scores() {
        let index = handbook_index(Indexer::default()).await;
        for k in [1, 3, 5, 10] {
            let hits = retrieve(&index, "how much paid time off per month", k)
                .await
                .unwrap();
            assert_eq!(hits.len(), k.min(index.len()));
            assert!(hits.windows(2).all(|pair| pair[0].score >= pair[1].score));
        }
    }

    #[tokio::test]
    async fn best_match_ranks_first() {
        let index = handbook_index(Indexer::default()).await;
        let hits = retrieve(&index, "federal holidays", 2).await.unwrap();
        assert_eq!(hits[0].chunk.sequence, 2);
        assert!(hits[0].score > 0.0);
    }

    #[tokio::test]
    async fn ties_break_by_ascending_sequence() {
        let index = Indexer::default()
            .build(chunks(&["same words here", "other text", "same words here"]))
            .await
            .unwrap();
        let hits = retrieve(&index, "same words", 3).await.unwrap();
        assert_eq!(hits[0].chunk.sequence, 0);
        assert_eq!(hits[1].chunk.sequence, 2);

        let unrelated = retrieve(&index, "zebra", 3).await.unwrap();
        let order: Vec<_> = unrelated.iter().map(|hit| hit.chunk.sequence).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn retrieval_is_deterministic_for_both_schemes() {
        for indexer in [
            Indexer::default(),
            Indexer::Semantic(Arc::new(HashingEmbeddingClient::new(64))),
        ] {
            let index = handbook_index(indexer).await;
            let first = retrieve(&index, "paid leave", 3).await.unwrap();
            let second = retrieve(&index, "paid leave", 3).await.unwrap();
            assert_eq!(first, second);
        }
    }
}
