//! Orchestration of ingestion and question answering.
//!
//! [`Pipeline`] wires the extractor, chunker, indexer, retriever, and answerer together. It
//! holds no documents: callers keep the [`Index`] returned by ingestion and hand it back for
//! every question.

mod status;

pub use status::{IngestStatus, QuestionStage};

use crate::answer::{Answer, AnswerConfig, AnswerError, AnswerOutcome, Answerer};
use crate::chunking::{self, ChunkConfig, ChunkingError};
use crate::config::Config;
use crate::document::{Document, DocumentId, DocumentStats, Page};
use crate::embedding::EmbeddingClientError;
use crate::extraction::{self, ExtractionError};
use crate::index::{Index, Indexer, IndexingError};
use crate::inference::{InferenceError, build_inference_client};
use crate::metrics::{MetricsSnapshot, PipelineMetrics};
use crate::retrieval::{self, RetrievalError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Errors raised while constructing a pipeline from configuration.
#[derive(Debug, Error)]
pub enum SetupError {
    /// The embedding client could not be created.
    #[error(transparent)]
    Embedding(#[from] EmbeddingClientError),
    /// The inference client could not be created.
    #[error(transparent)]
    Inference(#[from] InferenceError),
}

/// Errors raised while ingesting a document.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Text extraction failed.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    /// Chunking failed.
    #[error(transparent)]
    Chunking(#[from] ChunkingError),
    /// Index construction failed.
    #[error(transparent)]
    Indexing(#[from] IndexingError),
    /// The ingest task panicked or was cancelled.
    #[error("Ingest task failed while {stage}: {message}")]
    Task {
        /// Last status the task reported.
        stage: IngestStatus,
        /// Join failure reported by the runtime.
        message: String,
    },
}

impl IngestError {
    /// Status the job was in when it failed.
    pub fn stage(&self) -> IngestStatus {
        match self {
            Self::Extraction(_) => IngestStatus::Extracting,
            Self::Chunking(_) => IngestStatus::Chunking,
            Self::Indexing(_) => IngestStatus::Indexing,
            Self::Task { stage, .. } => stage.clone(),
        }
    }
}

/// Errors raised while answering a question.
#[derive(Debug, Error)]
pub enum AskError {
    /// Chunk retrieval failed.
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),
    /// Answer synthesis failed.
    #[error(transparent)]
    Answer(#[from] AnswerError),
}

impl AskError {
    /// Stage the question reached before failing.
    pub fn stage(&self) -> QuestionStage {
        match self {
            Self::Retrieval(_) => QuestionStage::Retrieving,
            Self::Answer(_) => QuestionStage::Answering,
        }
    }
}

/// Result of a successful ingestion.
#[derive(Debug)]
pub struct Ingested {
    /// Index ready for questions.
    pub index: Index,
    /// Size summary of the extracted document.
    pub stats: DocumentStats,
}

/// Handle to an ingestion running in the background.
pub struct IngestJob {
    id: Uuid,
    status: watch::Receiver<IngestStatus>,
    handle: JoinHandle<Result<Ingested, IngestError>>,
}

impl IngestJob {
    /// Unique job identifier.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current status of the job.
    pub fn status(&self) -> IngestStatus {
        self.status.borrow().clone()
    }

    /// Receiver that observes every status change.
    pub fn subscribe(&self) -> watch::Receiver<IngestStatus> {
        self.status.clone()
    }

    /// Wait for the job to finish.
    pub async fn wait(self) -> Result<Ingested, IngestError> {
        match self.handle.await {
            Ok(result) => result,
            Err(error) => Err(IngestError::Task {
                stage: self.status.borrow().clone(),
                message: error.to_string(),
            }),
        }
    }
}

/// Document question-answering pipeline.
#[derive(Clone)]
pub struct Pipeline {
    indexer: Indexer,
    answerer: Answerer,
    metrics: Arc<PipelineMetrics>,
    extraction_timeout: Duration,
}

impl Pipeline {
    /// Assemble a pipeline from its collaborators.
    pub fn new(indexer: Indexer, answerer: Answerer, extraction_timeout: Duration) -> Self {
        Self {
            indexer,
            answerer,
            metrics: Arc::new(PipelineMetrics::new()),
            extraction_timeout,
        }
    }

    /// Build the pipeline described by the configuration.
    pub fn from_config(config: &Config) -> Result<Self, SetupError> {
        let indexer = Indexer::from_config(config)?;
        let answerer = Answerer::new(build_inference_client(config)?);
        Ok(Self::new(
            indexer,
            answerer,
            Duration::from_secs(config.extraction_timeout_secs),
        ))
    }

    /// Extract, chunk, and index a PDF.
    pub async fn ingest(
        &self,
        document_id: DocumentId,
        pdf_bytes: Vec<u8>,
        chunk_config: &ChunkConfig,
    ) -> Result<Index, IngestError> {
        let (status, _) = watch::channel(IngestStatus::Received);
        self.run_ingest(document_id, pdf_bytes, chunk_config, &status)
            .await
            .map(|ingested| ingested.index)
    }

    /// Like [`Pipeline::ingest`], also returning document statistics.
    pub async fn ingest_with_stats(
        &self,
        document_id: DocumentId,
        pdf_bytes: Vec<u8>,
        chunk_config: &ChunkConfig,
    ) -> Result<Ingested, IngestError> {
        let (status, _) = watch::channel(IngestStatus::Received);
        self.run_ingest(document_id, pdf_bytes, chunk_config, &status)
            .await
    }

    /// Start ingestion on a background task and return a handle for polling its status.
    ///
    /// A panic inside the worker still ends the job: the status moves to `Failed` and
    /// [`IngestJob::wait`] returns [`IngestError::Task`].
    pub fn spawn_ingest(
        &self,
        document_id: DocumentId,
        pdf_bytes: Vec<u8>,
        chunk_config: ChunkConfig,
    ) -> IngestJob {
        let id = Uuid::new_v4();
        let (sender, receiver) = watch::channel(IngestStatus::Received);
        let status = Arc::new(sender);
        let worker_status = Arc::clone(&status);
        let pipeline = self.clone();
        let worker = tokio::spawn(async move {
            pipeline
                .run_ingest(document_id, pdf_bytes, &chunk_config, &worker_status)
                .await
        });
        let handle = tokio::spawn(async move {
            match worker.await {
                Ok(result) => result,
                Err(join_error) => {
                    let error = IngestError::Task {
                        stage: status.borrow().clone(),
                        message: join_error.to_string(),
                    };
                    status.send_replace(IngestStatus::Failed(error.to_string()));
                    tracing::error!(job_id = %id, error = %error, "Ingest task aborted");
                    Err(error)
                }
            }
        });
        tracing::debug!(job_id = %id, "Ingest job spawned");
        IngestJob {
            id,
            status: receiver,
            handle,
        }
    }

    #[tracing::instrument(
        skip_all,
        fields(document_id = %document_id, bytes = pdf_bytes.len())
    )]
    async fn run_ingest(
        &self,
        document_id: DocumentId,
        pdf_bytes: Vec<u8>,
        chunk_config: &ChunkConfig,
        status: &watch::Sender<IngestStatus>,
    ) -> Result<Ingested, IngestError> {
        let result = self
            .ingest_stages(document_id, pdf_bytes, chunk_config, status)
            .await;
        match &result {
            Ok(ingested) => {
                self.metrics.record_document(ingested.index.len() as u64);
                status.send_replace(IngestStatus::Ready);
                tracing::info!(
                    pages = ingested.stats.pages,
                    failed_pages = ingested.stats.failed_pages.len(),
                    chunks = ingested.index.len(),
                    "Document ready"
                );
            }
            Err(error) => {
                status.send_replace(IngestStatus::Failed(error.to_string()));
                tracing::warn!(stage = %error.stage(), error = %error, "Ingestion failed");
            }
        }
        result
    }

    async fn ingest_stages(
        &self,
        document_id: DocumentId,
        pdf_bytes: Vec<u8>,
        chunk_config: &ChunkConfig,
        status: &watch::Sender<IngestStatus>,
    ) -> Result<Ingested, IngestError> {
        status.send_replace(IngestStatus::Extracting);
        let pages = self.extract_pages(pdf_bytes).await?;
        let document = Document::new(document_id, pages);
        let stats = document.stats();

        status.send_replace(IngestStatus::Chunking);
        let chunks = chunking::chunk(&document, chunk_config)?;

        status.send_replace(IngestStatus::Indexing);
        let index = self.indexer.build(chunks).await?;

        Ok(Ingested { index, stats })
    }

    /// Run the blocking PDF parser off the async runtime, bounded by the extraction timeout.
    async fn extract_pages(&self, pdf_bytes: Vec<u8>) -> Result<Vec<Page>, ExtractionError> {
        let task = tokio::task::spawn_blocking(move || extraction::extract(&pdf_bytes));
        match tokio::time::timeout(self.extraction_timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(error)) => Err(ExtractionError::Task(error.to_string())),
            Err(_) => Err(ExtractionError::Timeout(self.extraction_timeout.as_secs())),
        }
    }

    /// Answer a question about an ingested document.
    ///
    /// An unanswerable question is not an error: it yields an answer with
    /// [`AnswerOutcome::InsufficientContext`] and confidence 0.
    #[tracing::instrument(skip_all, fields(document_id = %index.document_id(), k = k))]
    pub async fn ask(
        &self,
        index: &Index,
        question: &str,
        k: usize,
        answer_config: &AnswerConfig,
    ) -> Result<Answer, AskError> {
        tracing::debug!(stage = %QuestionStage::Received, "Question received");

        tracing::debug!(stage = %QuestionStage::Retrieving, "Retrieving chunks");
        let ranked = retrieval::retrieve(index, question, k)
            .await
            .inspect_err(|error| log_failure(QuestionStage::Retrieving, error))?;

        tracing::debug!(stage = %QuestionStage::Answering, candidates = ranked.len(), "Answering");
        let answer = self
            .answerer
            .answer(question, &ranked, answer_config)
            .await
            .inspect_err(|error| log_failure(QuestionStage::Answering, error))?;

        self.metrics
            .record_answer(answer.outcome == AnswerOutcome::InsufficientContext);
        tracing::info!(
            stage = %QuestionStage::Done,
            confidence = answer.confidence,
            outcome = ?answer.outcome,
            "Question answered"
        );
        Ok(answer)
    }

    /// Current pipeline counters.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

fn log_failure(stage: QuestionStage, error: &dyn std::error::Error) {
    tracing::warn!(stage = %stage, error = %error, "Question failed");
}
