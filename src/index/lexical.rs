//! BM25 scoring backed by an in-RAM tantivy index.
//!
//! Each chunk becomes one tantivy document holding its text and its position in the index.
//! tantivy scores with BM25 (`k1 = 1.2`, `b = 0.75`).

use super::ChunkScore;
use crate::document::Chunk;
use crate::terms::{ANALYZER_NAME, analyzer, unique_terms};
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::{
    Field, INDEXED, IndexRecordOption, STORED, Schema, TextFieldIndexing, TextOptions, Value,
};
use tantivy::{Index as TantivyIndex, IndexReader, ReloadPolicy, TantivyDocument, Term, doc};

/// Writer heap for building one document's index (tantivy's per-thread minimum).
const WRITER_HEAP_BYTES: usize = 15_000_000;

/// Schema with a BM25-indexed `text` field and a stored `chunk_index` field.
fn create_schema() -> Schema {
    let mut builder = Schema::builder();
    let indexing = TextFieldIndexing::default()
        .set_tokenizer(ANALYZER_NAME)
        .set_index_option(IndexRecordOption::WithFreqsAndPositions);
    builder.add_text_field("text", TextOptions::default().set_indexing_options(indexing));
    builder.add_u64_field("chunk_index", INDEXED | STORED);
    builder.build()
}

/// tantivy index over one document's chunks.
pub(super) struct LexicalIndex {
    reader: IndexReader,
    text_field: Field,
    chunk_index_field: Field,
    chunk_count: usize,
}

impl LexicalIndex {
    pub(super) fn build(chunks: &[Chunk]) -> tantivy::Result<Self> {
        let schema = create_schema();
        let text_field = schema.get_field("text")?;
        let chunk_index_field = schema.get_field("chunk_index")?;

        let index = TantivyIndex::create_in_ram(schema);
        index.tokenizers().register(ANALYZER_NAME, analyzer());

        let mut writer = index.writer_with_num_threads::<TantivyDocument>(1, WRITER_HEAP_BYTES)?;
        for (position, chunk) in chunks.iter().enumerate() {
            writer.add_document(doc!(
                text_field => chunk.text.as_str(),
                chunk_index_field => position as u64,
            ))?;
        }
        writer.commit()?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;

        tracing::trace!(chunks = chunks.len(), "Built tantivy index");
        Ok(Self {
            reader,
            text_field,
            chunk_index_field,
            chunk_count: chunks.len(),
        })
    }

    /// Score every chunk against the question's distinct terms.
    ///
    /// The normalized score divides BM25 by the question's ideal score, the sum of the IDFs of
    /// its distinct terms, which is what a chunk of average length containing each term once
    /// would score. Questions without indexable terms score zero everywhere.
    pub(super) fn score(&self, question: &str) -> tantivy::Result<Vec<ChunkScore>> {
        let mut raw = vec![0.0_f32; self.chunk_count];
        let searcher = self.reader.searcher();
        let total = searcher.num_docs() as f32;

        let mut ideal = 0.0_f32;
        let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();
        for text in unique_terms(question) {
            let term = Term::from_field_text(self.text_field, &text);
            ideal += idf(searcher.doc_freq(&term)? as f32, total);
            clauses.push((
                Occur::Should,
                Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs)),
            ));
        }

        if !clauses.is_empty() && self.chunk_count > 0 {
            let query = BooleanQuery::new(clauses);
            let hits = searcher.search(&query, &TopDocs::with_limit(self.chunk_count))?;
            for (score, address) in hits {
                let document: TantivyDocument = searcher.doc(address)?;
                let position = document
                    .get_first(self.chunk_index_field)
                    .and_then(|value| value.as_u64());
                if let Some(slot) = position.and_then(|position| raw.get_mut(position as usize)) {
                    *slot = score;
                }
            }
        }

        Ok(raw
            .into_iter()
            .map(|score| ChunkScore {
                normalized: if ideal > 0.0 {
                    (score / ideal).clamp(0.0, 1.0)
                } else {
                    0.0
                },
                raw: score,
            })
            .collect())
    }
}

/// BM25 inverse document frequency, as tantivy computes it.
fn idf(document_frequency: f32, total: f32) -> f32 {
    ((total - document_frequency + 0.5) / (document_frequency + 0.5) + 1.0).ln()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::tests::chunk;

    fn handbook() -> Vec<Chunk> {
        vec![
            chunk("doc", 0, "The office is open Monday through Friday from nine to six."),
            chunk("doc", 1, "Full-time employees are eligible for health insurance after 90 days."),
            chunk("doc", 2, "Overtime is paid at 1.5 times the regular rate."),
            chunk("doc", 3, "Health and dental plans renew every January."),
        ]
    }

    #[test]
    fn schema_has_text_and_chunk_index_fields() {
        let schema = create_schema();
        assert!(schema.get_field("text").is_ok());
        assert!(schema.get_field("chunk_index").is_ok());
    }

    #[test]
    fn matching_chunk_scores_highest() {
        let index = LexicalIndex::build(&handbook()).unwrap();
        let scores = index
            .score("When are employees eligible for health insurance?")
            .unwrap();
        let best = scores
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.raw.total_cmp(&b.1.raw))
            .map(|(position, _)| position);
        assert_eq!(best, Some(1));
        assert!(scores[1].normalized > scores[3].normalized);
        assert_eq!(scores[0].raw, 0.0);
    }

    #[test]
    fn normalized_scores_stay_in_unit_interval() {
        let index = LexicalIndex::build(&handbook()).unwrap();
        for question in ["health", "health insurance eligible employees", "overtime rate paid"] {
            for score in index.score(question).unwrap() {
                assert!((0.0..=1.0).contains(&score.normalized));
            }
        }
    }

    #[test]
    fn unrelated_question_scores_zero() {
        let index = LexicalIndex::build(&handbook()).unwrap();
        let scores = index.score("What is the capital of Mongolia?").unwrap();
        assert!(scores.iter().all(|score| score.normalized == 0.0));
    }

    #[test]
    fn stop_word_only_question_scores_zero() {
        let index = LexicalIndex::build(&handbook()).unwrap();
        assert!(
            index
                .score("what is the")
                .unwrap()
                .iter()
                .all(|score| score.raw == 0.0 && score.normalized == 0.0)
        );
    }

    #[test]
    fn full_coverage_normalizes_near_one() {
        let chunks = vec![
            chunk("doc", 0, "alpha beta"),
            chunk("doc", 1, "gamma delta"),
        ];
        let index = LexicalIndex::build(&chunks).unwrap();
        let scores = index.score("alpha beta").unwrap();
        assert!((scores[0].normalized - 1.0).abs() < 1e-4);
        assert_eq!(scores[1].normalized, 0.0);
    }
}
