//! PDF text extraction.
//!
//! Turns raw PDF bytes into ordered, sanitized [`Page`]s. Only the text layer is read; images,
//! fonts, and other non-text objects are ignored and no OCR is attempted.

mod sanitize;

pub use sanitize::sanitize_extracted_text;

use crate::document::Page;
use lopdf::Document as PdfDocument;
use thiserror::Error;

/// Errors raised while reading a PDF.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// No bytes were supplied.
    #[error("PDF byte stream is empty")]
    Empty,
    /// The bytes could not be parsed as a PDF.
    #[error("Failed to parse PDF: {0}")]
    Malformed(String),
    /// The PDF is encrypted and cannot be read without a password.
    #[error("PDF is encrypted")]
    Encrypted,
    /// The PDF parsed but contains no pages.
    #[error("PDF contains no pages")]
    NoPages,
    /// No page yielded any text.
    #[error("PDF has no extractable text layer ({page_count} pages inspected)")]
    NoTextLayer {
        /// Number of pages in the PDF.
        page_count: usize,
    },
    /// Extraction exceeded the configured time limit.
    #[error("PDF extraction timed out after {0} seconds")]
    Timeout(u64),
    /// The blocking extraction task failed to complete.
    #[error("PDF extraction task failed: {0}")]
    Task(String),
}

/// Extract sanitized page texts from PDF bytes, in page order.
///
/// Every page of the PDF is returned, including pages without text, so the result length
/// equals the PDF page count. A page whose text layer cannot be decoded is returned empty and
/// flagged with [`Page::extraction_failed`]. Fails when the bytes are not a readable PDF or
/// when no page carries any text.
pub fn extract(pdf_bytes: &[u8]) -> Result<Vec<Page>, ExtractionError> {
    if pdf_bytes.is_empty() {
        return Err(ExtractionError::Empty);
    }

    let pdf = PdfDocument::load_mem(pdf_bytes)
        .map_err(|error| ExtractionError::Malformed(error.to_string()))?;

    if pdf.is_encrypted() {
        return Err(ExtractionError::Encrypted);
    }

    let page_numbers: Vec<u32> = pdf.get_pages().keys().copied().collect();
    if page_numbers.is_empty() {
        return Err(ExtractionError::NoPages);
    }

    let mut pages = Vec::with_capacity(page_numbers.len());
    for number in page_numbers {
        match pdf.extract_text(&[number]) {
            Ok(raw) => pages.push(Page::new(number, sanitize_extracted_text(&raw))),
            Err(error) => {
                tracing::warn!(page = number, error = %error, "Page text extraction failed");
                pages.push(Page::unreadable(number));
            }
        }
    }

    let page_count = pages.len();
    let text_pages = pages.iter().filter(|page| !page.text.is_empty()).count();
    if text_pages == 0 {
        return Err(ExtractionError::NoTextLayer { page_count });
    }

    let failed_pages = pages.iter().filter(|page| page.extraction_failed).count();
    tracing::debug!(page_count, text_pages, failed_pages, "PDF text extraction complete");
    Ok(pages)
}
