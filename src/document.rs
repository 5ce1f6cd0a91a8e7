//! Document, page, and chunk types shared across the pipeline.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;

/// Separator inserted between page texts when building the document text.
pub const PAGE_SEPARATOR: &str = "\n\n";

/// Opaque identifier of an ingested document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Wrap a caller-supplied identifier.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Derive a stable identifier from the document bytes (first 16 hex chars of SHA-256).
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let digest = hex::encode(hasher.finalize());
        Self(digest[..16].to_string())
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Text of a single PDF page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page {
    /// 1-based page number.
    pub number: u32,
    /// Sanitized page text; empty for pages without a text layer.
    pub text: String,
    /// The page's text layer could not be decoded, so `text` is empty.
    pub extraction_failed: bool,
}

impl Page {
    /// Build a page from its number and text.
    pub fn new(number: u32, text: impl Into<String>) -> Self {
        Self {
            number,
            text: text.into(),
            extraction_failed: false,
        }
    }

    /// An empty page whose text layer could not be read.
    pub fn unreadable(number: u32) -> Self {
        Self {
            number,
            text: String::new(),
            extraction_failed: true,
        }
    }
}

/// Immutable, extracted document.
///
/// The document text is the page texts joined by [`PAGE_SEPARATOR`]. Char offsets into that
/// text are the coordinate system used by chunks.
#[derive(Debug, Clone)]
pub struct Document {
    id: DocumentId,
    pages: Vec<Page>,
    text: String,
    page_starts: Vec<usize>,
    char_len: usize,
}

impl Document {
    /// Assemble a document from ordered pages.
    pub fn new(id: DocumentId, pages: Vec<Page>) -> Self {
        let separator_len = PAGE_SEPARATOR.chars().count();
        let mut text = String::new();
        let mut page_starts = Vec::with_capacity(pages.len());
        let mut offset = 0;

        for (position, page) in pages.iter().enumerate() {
            if position > 0 {
                text.push_str(PAGE_SEPARATOR);
                offset += separator_len;
            }
            page_starts.push(offset);
            text.push_str(&page.text);
            offset += page.text.chars().count();
        }

        Self {
            id,
            pages,
            text,
            page_starts,
            char_len: offset,
        }
    }

    /// Identifier of the document.
    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    /// Pages in original order.
    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    /// Full document text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Length of the document text in chars.
    pub fn char_len(&self) -> usize {
        self.char_len
    }

    /// Page number containing the given char offset. Separators belong to the preceding page.
    pub fn page_at(&self, char_offset: usize) -> u32 {
        let position = self
            .page_starts
            .partition_point(|&start| start <= char_offset)
            .saturating_sub(1);
        self.pages.get(position).map(|page| page.number).unwrap_or(1)
    }

    /// Character, word, and page counts, plus the pages that could not be read.
    pub fn stats(&self) -> DocumentStats {
        DocumentStats {
            pages: self.pages.len(),
            characters: self.char_len,
            words: self.text.split_whitespace().count(),
            failed_pages: self
                .pages
                .iter()
                .filter(|page| page.extraction_failed)
                .map(|page| page.number)
                .collect(),
        }
    }
}

/// Size summary of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentStats {
    /// Number of pages, including pages without text.
    pub pages: usize,
    /// Number of chars in the document text.
    pub characters: usize,
    /// Number of whitespace-separated words.
    pub words: usize,
    /// Numbers of pages whose text could not be extracted.
    pub failed_pages: Vec<u32>,
}

/// Inclusive range of pages a chunk spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageRange {
    /// First page touched by the chunk.
    pub first: u32,
    /// Last page touched by the chunk.
    pub last: u32,
}

impl fmt::Display for PageRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.first == self.last {
            write!(f, "p.{}", self.first)
        } else {
            write!(f, "pp.{}-{}", self.first, self.last)
        }
    }
}

/// Bounded contiguous span of document text; the unit of retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    /// Owning document.
    pub document_id: DocumentId,
    /// Position of the chunk within the document, starting at 0.
    pub sequence: usize,
    /// Char offset where the chunk starts (inclusive).
    pub start: usize,
    /// Char offset where the chunk ends (exclusive).
    pub end: usize,
    /// Pages the chunk spans.
    pub pages: PageRange,
    /// Chunk text.
    pub text: String,
}

impl Chunk {
    /// Length of the chunk in chars.
    pub fn char_len(&self) -> usize {
        self.end - self.start
    }
}
