#![deny(missing_docs)]

//! Core library for docqa: ask natural-language questions about a PDF and get an answer with a
//! confidence score.

/// Answer synthesis, confidence, and evidence.
pub mod answer;
/// Boundary-aware chunking with overlap.
pub mod chunking;
/// Environment-driven configuration management.
pub mod config;
/// Document, page, and chunk types.
pub mod document;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// PDF text extraction and sanitation.
pub mod extraction;
/// Per-document retrieval indexes.
pub mod index;
/// Inference client abstraction and adapters.
pub mod inference;
/// Structured logging and tracing setup.
pub mod logging;
/// Pipeline metrics helpers.
pub mod metrics;
/// Ingestion and question orchestration.
pub mod pipeline;
/// Top-k chunk retrieval.
pub mod retrieval;
/// Term extraction shared by scoring components.
pub mod terms;
