//! Text analysis shared by lexical scoring, hashed embeddings, and extractive answers.
//!
//! One tantivy analyzer chain defines what a term is everywhere in the crate: alphanumeric
//! runs, lowercased, with a small English stop-word list removed.

use std::collections::BTreeSet;
use tantivy::tokenizer::{
    LowerCaser, RemoveLongFilter, SimpleTokenizer, StopWordFilter, TextAnalyzer, TokenStream,
};

/// Name under which [`analyzer`] is registered on lexical indexes.
pub const ANALYZER_NAME: &str = "docqa_terms";

const STOP_WORDS: &[&str] = &[
    "a", "about", "after", "all", "also", "am", "an", "and", "any", "are", "as", "at", "be",
    "been", "before", "but", "by", "can", "could", "did", "do", "does", "for", "from", "had",
    "has", "have", "he", "her", "his", "how", "i", "if", "in", "into", "is", "it", "its", "me",
    "my", "of", "on", "or", "our", "she", "should", "so", "than", "that", "the", "their", "them",
    "then", "there", "these", "they", "this", "those", "to", "was", "we", "were", "what", "when",
    "where", "which", "who", "whom", "why", "will", "with", "would", "you", "your",
];

/// Analyzer producing lowercased alphanumeric terms without stop words.
pub fn analyzer() -> TextAnalyzer {
    TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(RemoveLongFilter::limit(40))
        .filter(LowerCaser)
        .filter(StopWordFilter::remove(
            STOP_WORDS.iter().map(|word| word.to_string()),
        ))
        .build()
}

/// Terms of `text`, in order.
pub fn terms(text: &str) -> Vec<String> {
    let mut analyzer = analyzer();
    let mut stream = analyzer.token_stream(text);
    let mut terms = Vec::new();
    stream.process(&mut |token| terms.push(token.text.clone()));
    terms
}

/// Distinct terms of `text` in sorted order.
pub fn unique_terms(text: &str) -> BTreeSet<String> {
    terms(text).into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terms_are_lowercased_and_filtered() {
        assert_eq!(
            terms("What are the Working Hours on Saturday? 9:00 AM"),
            vec!["working", "hours", "saturday", "9", "00"]
        );
    }

    #[test]
    fn unique_terms_deduplicate() {
        let unique = unique_terms("leave Leave LEAVE policy");
        assert_eq!(unique.len(), 2);
        assert!(unique.contains("leave"));
    }

    #[test]
    fn stop_word_only_text_has_no_terms() {
        assert!(terms("what is the").is_empty());
    }
}
