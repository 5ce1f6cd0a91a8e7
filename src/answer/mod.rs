//! Answer synthesis from retrieved chunks.
//!
//! The [`Answerer`] filters ranked chunks by relevance, packs the survivors into a
//! token-bounded context, asks the configured [`InferenceClient`] for an answer, and blends
//! retrieval relevance with the provider's certainty into a single confidence value. When no
//! chunk is relevant enough the result is the insufficient-context answer rather than an error.

mod context;
mod evidence;

pub use evidence::EVIDENCE_WINDOW;

use crate::document::PageRange;
use crate::inference::{InferenceClient, InferenceError};
use crate::retrieval::RankedChunk;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Answer text returned when no chunk clears the relevance threshold.
pub const INSUFFICIENT_CONTEXT_ANSWER: &str =
    "The document does not contain enough relevant information to answer this question.";

/// Errors raised while synthesizing an answer.
#[derive(Debug, Error)]
pub enum AnswerError {
    /// The inference provider could not be reached.
    #[error("Inference unavailable")]
    InferenceUnavailable(#[source] InferenceError),
    /// The provider failed to produce a usable answer.
    #[error("Answer generation failed: {0}")]
    Generation(String),
    /// Answer parameters are out of range.
    #[error("Invalid answer configuration: {0}")]
    InvalidConfig(String),
}

impl From<InferenceError> for AnswerError {
    fn from(error: InferenceError) -> Self {
        match error {
            InferenceError::Unavailable(_) => Self::InferenceUnavailable(error),
            other => Self::Generation(other.to_string()),
        }
    }
}

/// Answer synthesis parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerConfig {
    /// Chunks scoring below this normalized relevance are not used as context.
    pub min_relevance: f32,
    /// Maximum tokens of context passed to the inference provider.
    pub context_budget: usize,
    /// Weight of retrieval relevance in the confidence blend, in `[0, 1]`.
    pub relevance_weight: f32,
    /// tiktoken model or encoding name used to count context tokens. Whitespace words are
    /// counted when unset.
    pub tokenizer_model: Option<String>,
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            min_relevance: 0.2,
            context_budget: 1500,
            relevance_weight: 0.5,
            tokenizer_model: None,
        }
    }
}

impl AnswerConfig {
    /// Reject parameters that cannot yield a meaningful answer.
    pub fn validate(&self) -> Result<(), AnswerError> {
        if self.context_budget == 0 {
            return Err(AnswerError::InvalidConfig(
                "context budget must be greater than zero".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_relevance) {
            return Err(AnswerError::InvalidConfig(format!(
                "minimum relevance {} is outside [0, 1]",
                self.min_relevance
            )));
        }
        if !(0.0..=1.0).contains(&self.relevance_weight) {
            return Err(AnswerError::InvalidConfig(format!(
                "relevance weight {} is outside [0, 1]",
                self.relevance_weight
            )));
        }
        Ok(())
    }
}

/// Whether the question could be answered from the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerOutcome {
    /// An answer was produced from relevant context.
    Answered,
    /// No chunk met the minimum relevance.
    InsufficientContext,
}

/// Coarse confidence band for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    /// Confidence of at least 0.60.
    High,
    /// Confidence of at least 0.30.
    Medium,
    /// Anything lower.
    Low,
}

impl ConfidenceLevel {
    /// Band for a confidence value.
    pub fn from_confidence(confidence: f32) -> Self {
        if confidence >= 0.6 {
            Self::High
        } else if confidence >= 0.3 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// Reference to a chunk that supported an answer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChunkRef {
    /// Chunk sequence within the document.
    pub sequence: usize,
    /// Pages the chunk spans.
    pub pages: PageRange,
    /// Normalized relevance of the chunk to the question.
    pub score: f32,
}

/// Answer text shown within its surrounding chunk text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Evidence {
    /// Sequence of the chunk containing the answer.
    pub sequence: usize,
    /// Pages that chunk spans.
    pub pages: PageRange,
    /// Up to [`EVIDENCE_WINDOW`] chars either side of the answer, plus the answer itself.
    pub snippet: String,
    /// Char offset of the answer within `snippet`.
    pub highlight_start: usize,
    /// Char offset just past the answer within `snippet`.
    pub highlight_end: usize,
}

/// Answer to a question about a document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    /// Answer text.
    pub text: String,
    /// Estimated correctness in `[0, 1]`.
    pub confidence: f32,
    /// Display band of `confidence`.
    pub level: ConfidenceLevel,
    /// Whether relevant context was found.
    pub outcome: AnswerOutcome,
    /// Chunks used as context, in rank order.
    pub supporting: Vec<ChunkRef>,
    /// Where the answer appears verbatim in the supporting text, if it does.
    pub evidence: Option<Evidence>,
}

impl Answer {
    /// The fixed answer for questions the document cannot answer.
    pub fn insufficient_context() -> Self {
        Self {
            text: INSUFFICIENT_CONTEXT_ANSWER.to_string(),
            confidence: 0.0,
            level: ConfidenceLevel::Low,
            outcome: AnswerOutcome::InsufficientContext,
            supporting: Vec::new(),
            evidence: None,
        }
    }
}

/// Produces answers from ranked chunks through an inference provider.
#[derive(Clone)]
pub struct Answerer {
    inference: Arc<dyn InferenceClient>,
}

impl Answerer {
    /// Build an answerer backed by the given inference client.
    pub fn new(inference: Arc<dyn InferenceClient>) -> Self {
        Self { inference }
    }

    /// Answer `question` from `ranked` chunks, best first.
    #[tracing::instrument(skip(self, question, ranked, config), fields(candidates = ranked.len()))]
    pub async fn answer(
        &self,
        question: &str,
        ranked: &[RankedChunk],
        config: &AnswerConfig,
    ) -> Result<Answer, AnswerError> {
        config.validate()?;

        let relevant: Vec<&RankedChunk> = ranked
            .iter()
            .filter(|hit| hit.score >= config.min_relevance)
            .collect();
        let Some(top) = relevant
            .iter()
            .map(|hit| hit.score)
            .max_by(|left, right| left.total_cmp(right))
        else {
            tracing::info!(
                min_relevance = config.min_relevance,
                "No chunk met the relevance threshold"
            );
            return Ok(Answer::insufficient_context());
        };

        let counter = context::build_token_counter(config.tokenizer_model.as_deref());
        let passages = context::assemble(&relevant, config.context_budget, &counter);
        let prompt = context::render_prompt(question, &passages);

        let inference = self.inference.infer(&prompt).await?;
        let text = inference.text.trim();
        if text.is_empty() {
            return Err(AnswerError::Generation(
                "inference provider returned an empty answer".into(),
            ));
        }

        let confidence = blend_confidence(top, inference.certainty, config.relevance_weight);
        let evidence = evidence::locate(text, passages.iter().map(|passage| passage.ranked));
        let supporting: Vec<ChunkRef> = passages
            .iter()
            .map(|passage| ChunkRef {
                sequence: passage.ranked.chunk.sequence,
                pages: passage.ranked.chunk.pages,
                score: passage.ranked.score,
            })
            .collect();

        tracing::debug!(
            confidence,
            context_chunks = supporting.len(),
            certainty = inference.certainty,
            "Answer synthesized"
        );
        Ok(Answer {
            text: text.to_string(),
            confidence,
            level: ConfidenceLevel::from_confidence(confidence),
            outcome: AnswerOutcome::Answered,
            supporting,
            evidence,
        })
    }
}

/// Blend top relevance with provider certainty, clamped to `[0, 1]`.
fn blend_confidence(top: f32, certainty: Option<f32>, relevance_weight: f32) -> f32 {
    let blended = match certainty {
        Some(certainty) => {
            let weight = relevance_weight.clamp(0.0, 1.0);
            weight * top + (1.0 - weight) * certainty
        }
        None => top,
    };
    if blended.is_nan() {
        0.0
    } else {
        blended.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Chunk, DocumentId};
    use crate::inference::{ExtractiveInferenceClient, Inference, Prompt};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct StubClient {
        result: fn() -> Result<Inference, InferenceError>,
        prompts: Mutex<Vec<Prompt>>,
    }

    impl StubClient {
        fn new(result: fn() -> Result<Inference, InferenceError>) -> Arc<Self> {
            Arc::new(Self {
                result,
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl InferenceClient for StubClient {
        async fn infer(&self, prompt: &Prompt) -> Result<Inference, InferenceError> {
            self.prompts.lock().unwrap().push(prompt.clone());
            (self.result)()
        }
    }

    fn hit(sequence: usize, text: &str, score: f32) -> RankedChunk {
        RankedChunk {
            chunk: Chunk {
                document_id: DocumentId::new("doc"),
                sequence,
                start: 0,
                end: text.chars().count(),
                pages: PageRange {
                    first: sequence as u32 + 1,
                    last: sequence as u32 + 1,
                },
                text: text.to_string(),
            },
            score,
            raw_score: score * 10.0,
        }
    }

    #[test]
    fn confidence_levels_use_display_bands() {
        assert_eq!(ConfidenceLevel::from_confidence(0.6), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::from_confidence(0.59), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_confidence(0.3), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_confidence(0.1), ConfidenceLevel::Low);
    }

    #[test]
    fn blend_uses_weight_and_clamps() {
        assert!((blend_confidence(0.8, Some(0.4), 0.5) - 0.6).abs() < 1e-6);
        assert!((blend_confidence(0.8, None, 0.5) - 0.8).abs() < 1e-6);
        assert_eq!(blend_confidence(0.9, Some(3.0), 0.0), 1.0);
        assert_eq!(blend_confidence(f32::NAN, None, 0.5), 0.0);
    }

    #[tokio::test]
    async fn below_threshold_yields_insufficient_context_without_inference() {
        let client = StubClient::new(|| unreachable!("inference must not be called"));
        let answerer = Answerer::new(client.clone());
        let hits = [hit(0, "Unrelated text.", 0.05), hit(1, "More noise.", 0.01)];

        let answer = answerer
            .answer("What is the refund policy?", &hits, &AnswerConfig::default())
            .await
            .unwrap();

        assert_eq!(answer, Answer::insufficient_context());
        assert_eq!(answer.confidence, 0.0);
        assert!(client.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn no_chunks_yields_insufficient_context() {
        let answerer = Answerer::new(Arc::new(ExtractiveInferenceClient::new()));
        let answer = answerer
            .answer("anything", &[], &AnswerConfig::default())
            .await
            .unwrap();
        assert_eq!(answer.outcome, AnswerOutcome::InsufficientContext);
    }

    #[tokio::test]
    async fn relevant_chunks_are_answered_with_blended_confidence() {
        let client = StubClient::new(|| {
            Ok(Inference {
                text: "  Parking is free.  ".into(),
                certainty: Some(0.5),
            })
        });
        let answerer = Answerer::new(client.clone());
        let hits = [
            hit(2, "Parking is free.", 0.8),
            hit(0, "Visitors sign in.", 0.3),
            hit(1, "Noise.", 0.1),
        ];

        let answer = answerer
            .answer("Is parking free?", &hits, &AnswerConfig::default())
            .await
            .unwrap();

        assert_eq!(answer.outcome, AnswerOutcome::Answered);
        assert_eq!(answer.text, "Parking is free.");
        assert!((answer.confidence - 0.65).abs() < 1e-6);
        assert_eq!(answer.level, ConfidenceLevel::High);
        let sequences: Vec<_> = answer.supporting.iter().map(|chunk| chunk.sequence).collect();
        assert_eq!(sequences, vec![2, 0]);
        assert_eq!(answer.evidence.as_ref().map(|evidence| evidence.sequence), Some(2));

        let prompts = client.prompts.lock().unwrap();
        assert_eq!(prompts[0].passages.len(), 2);
    }

    #[tokio::test]
    async fn unavailable_inference_is_surfaced() {
        let client = StubClient::new(|| Err(InferenceError::Unavailable("offline".into())));
        let answerer = Answerer::new(client);
        let hits = [hit(0, "Parking is free.", 0.9)];

        let error = answerer
            .answer("Is parking free?", &hits, &AnswerConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(
            &error,
            AnswerError::InferenceUnavailable(InferenceError::Unavailable(message)) if message == "offline"
        ));
        let source = std::error::Error::source(&error).map(ToString::to_string);
        assert_eq!(
            source.as_deref(),
            Some("Inference provider unavailable: offline")
        );
    }

    #[test]
    fn out_of_range_answer_config_is_rejected() {
        assert!(AnswerConfig::default().validate().is_ok());
        for config in [
            AnswerConfig {
                context_budget: 0,
                ..AnswerConfig::default()
            },
            AnswerConfig {
                min_relevance: -3.0,
                ..AnswerConfig::default()
            },
            AnswerConfig {
                relevance_weight: 7.0,
                ..AnswerConfig::default()
            },
            AnswerConfig {
                min_relevance: f32::NAN,
                ..AnswerConfig::default()
            },
        ] {
            assert!(matches!(config.validate(), Err(AnswerError::InvalidConfig(_))));
        }
    }

    #[tokio::test]
    async fn zero_context_budget_fails_before_inference() {
        let client = StubClient::new(|| unreachable!("inference must not be called"));
        let answerer = Answerer::new(client.clone());
        let hits = [hit(0, "Parking is free.", 0.9)];
        let config = AnswerConfig {
            context_budget: 0,
            ..AnswerConfig::default()
        };

        let error = answerer
            .answer("Is parking free?", &hits, &config)
            .await
            .unwrap_err();

        assert!(matches!(error, AnswerError::InvalidConfig(_)));
        assert!(client.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_or_malformed_output_is_generation_error() {
        let hits = [hit(0, "Parking is free.", 0.9)];

        let empty = Answerer::new(StubClient::new(|| {
            Ok(Inference {
                text: "   ".into(),
                certainty: None,
            })
        }));
        let error = empty
            .answer("Is parking free?", &hits, &AnswerConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(error, AnswerError::Generation(_)));

        let malformed = Answerer::new(StubClient::new(|| {
            Err(InferenceError::InvalidResponse("bad json".into()))
        }));
        let error = malformed
            .answer("Is parking free?", &hits, &AnswerConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(error, AnswerError::Generation(_)));
    }
}
