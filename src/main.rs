//! Command-line entrypoint.
//!
//! `docqa ingest <pdf>` extracts and indexes a document and prints what was found;
//! `docqa ask <pdf> <question>` does the same and then answers the question.
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docqa::answer::{Answer, AnswerOutcome};
use docqa::config;
use docqa::document::DocumentId;
use docqa::logging;
use docqa::pipeline::{Ingested, Pipeline};
use serde_json::json;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(
    name = "docqa",
    version,
    about = "Ask natural-language questions about a PDF document"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract and index a PDF, then print document statistics.
    Ingest {
        /// Path to the PDF file.
        pdf: PathBuf,
        /// Print machine-readable JSON.
        #[arg(long)]
        json: bool,
    },
    /// Answer a question about a PDF.
    Ask {
        /// Path to the PDF file.
        pdf: PathBuf,
        /// Question to answer.
        question: String,
        /// Number of chunks to retrieve (defaults to RETRIEVAL_TOP_K).
        #[arg(short, long)]
        k: Option<usize>,
        /// Print machine-readable JSON.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::init_config().context("failed to load configuration")?;
    logging::init_tracing();

    let cli = Cli::parse();
    let pipeline = Pipeline::from_config(config).context("failed to initialize pipeline")?;

    match cli.command {
        Command::Ingest { pdf, json } => {
            let ingested = ingest(&pipeline, &pdf, config).await?;
            if json {
                let output = json!({
                    "document_id": ingested.index.document_id(),
                    "stats": ingested.stats,
                    "chunks": ingested.index.len(),
                    "scheme": format!("{:?}", ingested.index.scheme()).to_lowercase(),
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                print_ingest_summary(&ingested);
            }
        }
        Command::Ask {
            pdf,
            question,
            k,
            json,
        } => {
            let ingested = ingest(&pipeline, &pdf, config).await?;
            let k = k.unwrap_or(config.retrieval_top_k);
            let answer = pipeline
                .ask(&ingested.index, &question, k, &config.answer_config())
                .await
                .context("failed to answer question")?;
            if json {
                let output = json!({
                    "document_id": ingested.index.document_id(),
                    "question": question,
                    "answer": answer,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                print_answer(&answer);
            }
        }
    }

    tracing::debug!(metrics = ?pipeline.metrics_snapshot(), "Run complete");
    Ok(())
}

async fn ingest(pipeline: &Pipeline, path: &Path, config: &config::Config) -> Result<Ingested> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let document_id = DocumentId::from_bytes(&bytes);
    pipeline
        .ingest_with_stats(document_id, bytes, &config.chunk_config())
        .await
        .with_context(|| format!("failed to ingest {}", path.display()))
}

fn print_ingest_summary(ingested: &Ingested) {
    let stats = &ingested.stats;
    println!("Document {}", ingested.index.document_id());
    println!("  pages:      {}", stats.pages);
    println!("  characters: {}", stats.characters);
    println!("  words:      {}", stats.words);
    if !stats.failed_pages.is_empty() {
        let failed: Vec<String> = stats.failed_pages.iter().map(u32::to_string).collect();
        println!("  unreadable: {}", failed.join(", "));
    }
    println!("  chunks:     {}", ingested.index.len());
    for chunk in ingested.index.chunks().iter().take(3) {
        let preview: String = chunk.text.chars().take(80).collect();
        println!("  [{}] {} {}", chunk.sequence, chunk.pages, preview.replace('\n', " "));
    }
}

fn print_answer(answer: &Answer) {
    println!("{}", answer.text);
    println!();
    println!(
        "Confidence: {:.0}% ({:?})",
        answer.confidence * 100.0,
        answer.level
    );
    if answer.outcome == AnswerOutcome::InsufficientContext {
        return;
    }
    let sources: Vec<String> = answer
        .supporting
        .iter()
        .map(|chunk| format!("#{} {} ({:.2})", chunk.sequence, chunk.pages, chunk.score))
        .collect();
    println!("Sources: {}", sources.join(", "));
    if let Some(evidence) = &answer.evidence {
        println!("Context ({}): ...{}...", evidence.pages, evidence.snippet.trim());
    }
}
