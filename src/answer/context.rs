//! Context assembly under a token budget, plus prompt rendering.

use crate::inference::Prompt;
use crate::retrieval::RankedChunk;
use std::sync::Arc;
use tiktoken_rs::{
    CoreBPE, cl100k_base, get_bpe_from_model, o200k_base, p50k_base, p50k_edit, r50k_base,
};

pub(crate) type TokenCounter = Box<dyn Fn(&str) -> usize + Send + Sync>;

const INSTRUCTIONS: &str = "You answer questions about a document using only the numbered \
passages below. If the passages do not contain the answer, say that the document does not \
say. Keep the answer short. End with a final line of the form `Confidence: <number between 0 \
and 1>` describing how sure you are.";

/// A chunk selected for the answer context, possibly truncated.
#[derive(Debug, Clone)]
pub(crate) struct ContextPassage<'a> {
    pub(crate) ranked: &'a RankedChunk,
    pub(crate) text: String,
}

/// Build a token counter for the configured tokenizer, or count whitespace words.
pub(crate) fn build_token_counter(tokenizer_model: Option<&str>) -> TokenCounter {
    let Some(model) = tokenizer_model.map(str::trim).filter(|model| !model.is_empty()) else {
        return whitespace_counter();
    };
    match resolve_encoding(model) {
        Some(encoding) => {
            let encoding = Arc::new(encoding);
            Box::new(move |segment: &str| encoding.encode_ordinary(segment).len())
        }
        None => {
            tracing::warn!(
                model,
                "Tokenizer unavailable; falling back to whitespace counter"
            );
            whitespace_counter()
        }
    }
}

fn resolve_encoding(model: &str) -> Option<CoreBPE> {
    let encoding = match get_bpe_from_model(model) {
        Ok(encoding) => return Some(encoding),
        Err(error) => {
            tracing::debug!(model, error = %error, "Tokenizer model lookup failed; trying encoding name");
            match model {
                "cl100k_base" => cl100k_base(),
                "o200k_base" => o200k_base(),
                "p50k_base" => p50k_base(),
                "p50k_edit" => p50k_edit(),
                "r50k_base" | "gpt2" => r50k_base(),
                _ => return None,
            }
        }
    };
    encoding
        .inspect_err(|error| tracing::warn!(model, error = %error, "Failed to load encoding"))
        .ok()
}

fn whitespace_counter() -> TokenCounter {
    Box::new(|segment: &str| segment.split_whitespace().count())
}

/// Take chunks in rank order while they fit in `budget` tokens.
///
/// The first chunk is always kept, cut down to the budget when it alone exceeds it. Chunks
/// after the first one that does not fit are dropped.
pub(crate) fn assemble<'a>(
    ranked: &[&'a RankedChunk],
    budget: usize,
    counter: &TokenCounter,
) -> Vec<ContextPassage<'a>> {
    let mut passages = Vec::new();
    let mut used = 0;

    for (position, hit) in ranked.iter().enumerate() {
        let tokens = counter(&hit.chunk.text);
        if used + tokens <= budget {
            used += tokens;
            passages.push(ContextPassage {
                ranked: hit,
                text: hit.chunk.text.clone(),
            });
            continue;
        }
        if position == 0 {
            passages.push(ContextPassage {
                ranked: hit,
                text: truncate_to_budget(&hit.chunk.text, budget, counter),
            });
        }
        break;
    }

    passages
}

/// Longest whitespace-delimited prefix of `text` within `budget` tokens.
fn truncate_to_budget(text: &str, budget: usize, counter: &TokenCounter) -> String {
    let word_ends: Vec<usize> = text
        .split_whitespace()
        .map(|word| word.as_ptr() as usize - text.as_ptr() as usize + word.len())
        .collect();

    // Binary search the number of words whose prefix still fits.
    let (mut low, mut high) = (0, word_ends.len());
    while low < high {
        let middle = (low + high).div_ceil(2);
        if counter(&text[..word_ends[middle - 1]]) <= budget {
            low = middle;
        } else {
            high = middle - 1;
        }
    }

    match low {
        0 => String::new(),
        words => text[..word_ends[words - 1]].to_string(),
    }
}

/// Render the prompt for the question and selected passages.
pub(crate) fn render_prompt(question: &str, passages: &[ContextPassage<'_>]) -> Prompt {
    let mut text = String::from(INSTRUCTIONS);
    text.push_str("\n\nPassages:\n");
    for (number, passage) in passages.iter().enumerate() {
        text.push_str(&format!(
            "\n[{}] ({})\n{}\n",
            number + 1,
            passage.ranked.chunk.pages,
            passage.text.trim()
        ));
    }
    text.push_str(&format!("\nQuestion: {}\nAnswer:", question.trim()));

    Prompt {
        question: question.to_string(),
        passages: passages.iter().map(|passage| passage.text.clone()).collect(),
        text,
    }
}
