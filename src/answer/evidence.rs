//! Locating the answer inside its supporting text.

use super::Evidence;
use crate::retrieval::RankedChunk;

/// Chars of surrounding text kept on each side of the answer.
pub const EVIDENCE_WINDOW: usize = 200;

/// Find the first supporting chunk that contains `answer` verbatim and cut a snippet around it.
pub(crate) fn locate<'a>(
    answer: &str,
    supporting: impl IntoIterator<Item = &'a RankedChunk>,
) -> Option<Evidence> {
    let needle = answer.trim();
    if needle.is_empty() {
        return None;
    }

    supporting.into_iter().find_map(|hit| {
        let text = &hit.chunk.text;
        let byte_start = text.find(needle)?;
        let match_start = text[..byte_start].chars().count();
        let match_len = needle.chars().count();

        let snippet_start = match_start.saturating_sub(EVIDENCE_WINDOW);
        let snippet: String = text
            .chars()
            .skip(snippet_start)
            .take(match_start - snippet_start + match_len + EVIDENCE_WINDOW)
            .collect();

        Some(Evidence {
            sequence: hit.chunk.sequence,
            pages: hit.chunk.pages,
            snippet,
            highlight_start: match_start - snippet_start,
            highlight_end: match_start - snippet_start + match_len,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Chunk, DocumentId, PageRange};

    fn hit(sequence: usize, text: &str) -> RankedChunk {
        RankedChunk {
            chunk: Chunk {
                document_id: DocumentId::new("doc"),
                sequence,
                start: 0,
                end: text.chars().count(),
                pages: PageRange { first: 4, last: 4 },
                text: text.to_string(),
            },
            score: 0.5,
            raw_score: 1.0,
        }
    }

    #[test]
    fn snippet_is_bounded_on_both_sides() {
        let text = format!("{}ANSWER{}", "x".repeat(300), "y".repeat(300));
        let hits = [hit(7, &text)];
        let evidence = locate("ANSWER", &hits).unwrap();

        assert_eq!(evidence.sequence, 7);
        assert_eq!(evidence.snippet.chars().count(), 2 * EVIDENCE_WINDOW + 6);
        let highlighted: String = evidence
            .snippet
            .chars()
            .skip(evidence.highlight_start)
            .take(evidence.highlight_end - evidence.highlight_start)
            .collect();
        assert_eq!(highlighted, "ANSWER");
    }

    #[test]
    fn short_chunks_are_kept_whole() {
        let hits = [hit(0, "Nothing here."), hit(1, "Parking is free.")];
        let evidence = locate("is free", &hits).unwrap();
        assert_eq!(evidence.sequence, 1);
        assert_eq!(evidence.snippet, "Parking is free.");
        assert_eq!(evidence.highlight_start, 8);
    }

    #[test]
    fn non_verbatim_answers_have_no_evidence() {
        let hits = [hit(0, "Parking is free.")];
        assert!(locate("Parking costs money", &hits).is_none());
        assert!(locate("   ", &hits).is_none());
    }
}
