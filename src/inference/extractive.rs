//! Offline answer extraction.
//!
//! Answers with the single passage sentence that shares the most terms with the question.
//! Certainty is the share of the question's terms that sentence covers.

use super::{Inference, InferenceClient, InferenceError, Prompt};
use crate::terms::unique_terms;
use async_trait::async_trait;

/// Inference client that extracts the best-matching sentence from the prompt passages.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExtractiveInferenceClient;

impl ExtractiveInferenceClient {
    /// Build the extractive client.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl InferenceClient for ExtractiveInferenceClient {
    async fn infer(&self, prompt: &Prompt) -> Result<Inference, InferenceError> {
        let question_terms = unique_terms(&prompt.question);

        let mut best: Option<(&str, usize)> = None;
        for sentence in prompt.passages.iter().flat_map(|passage| sentences(passage)) {
            let overlap = unique_terms(sentence)
                .intersection(&question_terms)
                .count();
            // Strictly greater keeps the earliest sentence on ties.
            if best.is_none_or(|(_, top)| overlap > top) {
                best = Some((sentence, overlap));
            }
        }

        let (sentence, overlap) = best.ok_or_else(|| {
            InferenceError::GenerationFailed("no passage text to extract an answer from".into())
        })?;
        let certainty = if question_terms.is_empty() {
            0.0
        } else {
            overlap as f32 / question_terms.len() as f32
        };

        tracing::debug!(overlap, certainty, "Extracted answer sentence");
        Ok(Inference {
            text: sentence.to_string(),
            certainty: Some(certainty),
        })
    }
}

/// Split text into trimmed sentences.
///
/// A sentence ends at `.`, `!` or `?` followed by whitespace (so decimals such as `1.5` stay
/// intact), at a paragraph break, or at the end of the text.
fn sentences(text: &str) -> Vec<&str> {
    let mut result = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((position, ch)) = chars.next() {
        let next = chars.peek().map(|(_, next)| *next);
        let boundary = match ch {
            '.' | '!' | '?' => next.is_none_or(char::is_whitespace),
            '\n' => next == Some('\n'),
            _ => false,
        };
        if boundary {
            let end = position + ch.len_utf8();
            push_sentence(&mut result, &text[start..end]);
            start = end;
        }
    }
    push_sentence(&mut result, &text[start..]);
    result
}

fn push_sentence<'a>(sentences: &mut Vec<&'a str>, candidate: &'a str) {
    let trimmed = candidate.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt(question: &str, passages: &[&str]) -> Prompt {
        Prompt {
            question: question.into(),
            passages: passages.iter().map(|passage| passage.to_string()).collect(),
            text: String::new(),
        }
    }

    #[test]
    fn sentences_keep_decimals_together() {
        assert_eq!(
            sentences("Leave accrues at 1.5 days. Ask HR!\n\nNew paragraph"),
            vec!["Leave accrues at 1.5 days.", "Ask HR!", "New paragraph"]
        );
    }

    #[tokio::test]
    async fn picks_sentence_with_most_question_terms() {
        let client = ExtractiveInferenceClient::new();
        let inference = client
            .infer(&prompt(
                "How many days of paid time off accrue per month?",
                &[
                    "Employees are welcome. Paid time off accrues at 1.5 days per month.",
                    "Holidays are listed separately.",
                ],
            ))
            .await
            .unwrap();

        assert_eq!(inference.text, "Paid time off accrues at 1.5 days per month.");
        let certainty = inference.certainty.unwrap();
        assert!(certainty > 0.5 && certainty <= 1.0);
    }

    #[tokio::test]
    async fn earliest_sentence_wins_ties() {
        let client = ExtractiveInferenceClient::new();
        let inference = client
            .infer(&prompt("parking", &["Parking is free.", "Parking is covered."]))
            .await
            .unwrap();
        assert_eq!(inference.text, "Parking is free.");
        assert_eq!(inference.certainty, Some(1.0));
    }

    #[tokio::test]
    async fn empty_passages_fail() {
        let client = ExtractiveInferenceClient::new();
        let error = client.infer(&prompt("anything", &[])).await.unwrap_err();
        assert!(matches!(error, InferenceError::GenerationFailed(_)));
    }
}
