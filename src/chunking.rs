//! Boundary-aware text chunking with overlap.
//!
//! Chunks are measured in chars and always cut on char boundaries. A chunk is cut at its hard
//! limit (`max_len` chars) unless a natural boundary lies within the lookback window before the
//! limit. Boundaries are tried in order of strength:
//!
//! 1. paragraph break (a blank line),
//! 2. sentence end (`.`, `!` or `?` followed by whitespace),
//! 3. any whitespace.
//!
//! The nearest boundary of the strongest kind found wins. Consecutive chunks share `overlap`
//! chars so spans around cuts stay visible to retrieval.

use crate::document::{Chunk, Document, PageRange};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while splitting a document into chunks.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkingError {
    /// Configured chunk length is zero.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Overlap would prevent chunks from advancing.
    #[error("chunk overlap ({overlap}) must be smaller than chunk size ({max_len})")]
    OverlapTooLarge {
        /// Requested overlap.
        overlap: usize,
        /// Requested maximum chunk length.
        max_len: usize,
    },
}

/// Chunk sizing parameters, all in chars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkConfig {
    /// Maximum chunk length.
    pub max_len: usize,
    /// Chars repeated at the start of each chunk from the end of the previous one.
    pub overlap: usize,
    /// Distance before the hard limit searched for a natural boundary.
    pub boundary_lookback: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_len: 500,
            overlap: 50,
            boundary_lookback: 100,
        }
    }
}

impl ChunkConfig {
    /// Reject configurations that cannot produce a finite chunk sequence.
    pub fn validate(&self) -> Result<(), ChunkingError> {
        if self.max_len == 0 {
            return Err(ChunkingError::InvalidChunkSize);
        }
        if self.overlap >= self.max_len {
            return Err(ChunkingError::OverlapTooLarge {
                overlap: self.overlap,
                max_len: self.max_len,
            });
        }
        Ok(())
    }

    /// Lookback clamped so every chunk advances past the previous start.
    fn effective_lookback(&self) -> usize {
        self.boundary_lookback.min(self.max_len - self.overlap - 1)
    }
}

/// Split the document text into ordered, overlapping chunks.
///
/// The chunks cover the whole document text with no gaps, no chunk exceeds
/// `config.max_len` chars, and the same input always yields the same sequence. An empty
/// document produces no chunks.
pub fn chunk(document: &Document, config: &ChunkConfig) -> Result<Vec<Chunk>, ChunkingError> {
    config.validate()?;

    let text = document.text();
    let char_indices: Vec<(usize, char)> = text.char_indices().collect();
    let total = char_indices.len();
    if total == 0 {
        return Ok(Vec::new());
    }

    let chars: Vec<char> = char_indices.iter().map(|(_, ch)| *ch).collect();
    let byte_at = |position: usize| {
        if position < total {
            char_indices[position].0
        } else {
            text.len()
        }
    };
    let lookback = config.effective_lookback();

    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        let limit = start + config.max_len;
        let end = if limit >= total {
            total
        } else {
            find_cut(&chars, limit, lookback)
        };

        chunks.push(Chunk {
            document_id: document.id().clone(),
            sequence: chunks.len(),
            start,
            end,
            pages: PageRange {
                first: document.page_at(start),
                last: document.page_at(end - 1),
            },
            text: text[byte_at(start)..byte_at(end)].to_string(),
        });

        if end >= total {
            break;
        }
        start = end.saturating_sub(config.overlap).max(start + 1);
    }

    tracing::debug!(
        document_id = %document.id(),
        chunks = chunks.len(),
        max_len = config.max_len,
        overlap = config.overlap,
        "Chunked document"
    );
    Ok(chunks)
}

/// Pick the cut position (exclusive chunk end) in `[limit - lookback, limit]`.
fn find_cut(chars: &[char], limit: usize, lookback: usize) -> usize {
    let lowest = limit - lookback;
    let candidates = || (lowest.max(1)..=limit).rev();

    let paragraph =
        candidates().find(|&cut| cut >= 2 && chars[cut - 1] == '\n' && chars[cut - 2] == '\n');
    if let Some(cut) = paragraph {
        return cut;
    }

    let sentence = candidates().find(|&cut| {
        cut >= 2 && chars[cut - 1].is_whitespace() && matches!(chars[cut - 2], '.' | '!' | '?')
    });
    if let Some(cut) = sentence {
        return cut;
    }

    candidates()
        .find(|&cut| chars[cut - 1].is_whitespace())
        .unwrap_or(limit)
}
