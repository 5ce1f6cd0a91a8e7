//! Lifecycle states for ingestion jobs and questions.

use serde::Serialize;
use std::fmt;

/// Progress of a document through ingestion.
///
/// Moves forward through `Received`, `Extracting`, `Chunking`, and `Indexing` and ends in
/// either `Ready` or `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "error", rename_all = "snake_case")]
pub enum IngestStatus {
    /// Bytes accepted, work not started.
    Received,
    /// Reading page text from the PDF.
    Extracting,
    /// Splitting the document text into chunks.
    Chunking,
    /// Computing retrieval keys.
    Indexing,
    /// The index is built and can answer questions.
    Ready,
    /// Ingestion stopped; carries the error message.
    Failed(String),
}

impl IngestStatus {
    /// Whether no further transitions will happen.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready | Self::Failed(_))
    }
}

impl fmt::Display for IngestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Received => f.write_str("received"),
            Self::Extracting => f.write_str("extracting"),
            Self::Chunking => f.write_str("chunking"),
            Self::Indexing => f.write_str("indexing"),
            Self::Ready => f.write_str("ready"),
            Self::Failed(error) => write!(f, "failed: {error}"),
        }
    }
}

/// Stage a question has reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionStage {
    /// Question accepted.
    Received,
    /// Ranking chunks.
    Retrieving,
    /// Synthesizing the answer.
    Answering,
    /// Answer produced.
    Done,
}

impl fmt::Display for QuestionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Received => "received",
            Self::Retrieving => "retrieving",
            Self::Answering => "answering",
            Self::Done => "done",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_ready_and_failed_are_terminal() {
        assert!(IngestStatus::Ready.is_terminal());
        assert!(IngestStatus::Failed("boom".into()).is_terminal());
        assert!(!IngestStatus::Indexing.is_terminal());
    }

    #[test]
    fn status_serializes_with_state_tag() {
        let value = serde_json::to_value(IngestStatus::Failed("no text".into())).unwrap();
        assert_eq!(value["state"], "failed");
        assert_eq!(value["error"], "no text");
        assert_eq!(IngestStatus::Chunking.to_string(), "chunking");
    }
}
