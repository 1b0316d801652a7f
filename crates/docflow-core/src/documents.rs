//! # Document Ingestion
//!
//! Applies the backpressure pipeline to a two-stage unit of work per file:
//! load the document (I/O bound), then chunk and optionally embed it (CPU
//! bound, run on the blocking pool). Every path yields exactly one
//! [`ProcessingResult`], whichever stage failed.

use std::collections::HashMap;
use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ConfigError, DocumentError, TaskError};
use crate::pipeline::{BackpressurePipeline, ProgressCallback};
use crate::priority::Priority;

/// A loaded source document
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub path: PathBuf,
    pub content: String,
    pub metadata: HashMap<String, String>,
}

/// A slice of a document sized for embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub index: usize,
    pub source: String,
}

pub type Embedding = Vec<f32>;

/// Reads a document from storage
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    async fn load(&self, path: &Path) -> Result<Document, DocumentError>;
}

/// Splits a document into chunks
pub trait Chunker: Send + Sync {
    fn chunk(&self, document: &Document) -> Result<Vec<Chunk>, DocumentError>;
}

/// Turns chunk texts into vectors, one per input text
pub trait Embedder: Send + Sync {
    fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>, DocumentError>;
}

/// Outcome of ingesting a single document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub id: String,
    pub success: bool,
    pub duration_secs: f64,
    pub chunks_created: usize,
    pub error: Option<String>,
}

impl ProcessingResult {
    fn succeeded(id: String, started: Instant, chunks_created: usize) -> Self {
        Self {
            id,
            success: true,
            duration_secs: started.elapsed().as_secs_f64(),
            chunks_created,
            error: None,
        }
    }

    fn failed(id: String, started: Instant, error: String) -> Self {
        Self {
            id,
            success: false,
            duration_secs: started.elapsed().as_secs_f64(),
            chunks_created: 0,
            error: Some(error),
        }
    }
}

/// Loads UTF-8 text files
#[derive(Debug, Clone, Copy, Default)]
pub struct TextFileLoader;

#[async_trait]
impl DocumentLoader for TextFileLoader {
    async fn load(&self, path: &Path) -> Result<Document, DocumentError> {
        let content =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|source| DocumentError::Load {
                    path: path.to_path_buf(),
                    source,
                })?;

        let mut metadata = HashMap::new();
        metadata.insert("source".to_string(), path.display().to_string());
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            metadata.insert("extension".to_string(), ext.to_lowercase());
        }

        Ok(Document {
            id: path.display().to_string(),
            path: path.to_path_buf(),
            content,
            metadata,
        })
    }
}

/// Fixed-size character windows with overlap. Whitespace-only windows are skipped.
#[derive(Debug, Clone, Copy)]
pub struct FixedSizeChunker {
    chunk_size: usize,
    overlap: usize,
}

impl FixedSizeChunker {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, ConfigError> {
        if chunk_size == 0 {
            return Err(ConfigError::ValidationError(
                "chunk_size must be greater than 0".to_string(),
            ));
        }
        if overlap >= chunk_size {
            return Err(ConfigError::ValidationError(format!(
                "chunk overlap ({overlap}) must be smaller than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }
}

impl Default for FixedSizeChunker {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap: 200,
        }
    }
}

impl Chunker for FixedSizeChunker {
    fn chunk(&self, document: &Document) -> Result<Vec<Chunk>, DocumentError> {
        let chars: Vec<char> = document.content.chars().collect();
        let step = self.chunk_size - self.overlap;
        let mut chunks = Vec::new();
        let mut start = 0;

        while start < chars.len() {
            let end = (start + self.chunk_size).min(chars.len());
            let text: String = chars[start..end].iter().collect();
            if !text.trim().is_empty() {
                chunks.push(Chunk {
                    text,
                    index: chunks.len(),
                    source: document.id.clone(),
                });
            }
            if end == chars.len() {
                break;
            }
            start += step;
        }

        Ok(chunks)
    }
}

/// Runs document ingestion through a [`BackpressurePipeline`]
#[derive(Clone)]
pub struct DocumentProcessor {
    pipeline: BackpressurePipeline,
    loader: Arc<dyn DocumentLoader>,
}

impl DocumentProcessor {
    pub fn new(pipeline: BackpressurePipeline, loader: Arc<dyn DocumentLoader>) -> Self {
        Self { pipeline, loader }
    }

    pub fn pipeline(&self) -> &BackpressurePipeline {
        &self.pipeline
    }

    /// Load, chunk and optionally embed every path.
    ///
    /// Returns one result per path, in input order.
    pub async fn process_documents_with_backpressure(
        &self,
        file_paths: Vec<PathBuf>,
        chunker: Arc<dyn Chunker>,
        embedder: Option<Arc<dyn Embedder>>,
        priority: Priority,
        progress: Option<ProgressCallback>,
    ) -> Vec<ProcessingResult> {
        let ids: Vec<String> = file_paths
            .iter()
            .map(|path| path.display().to_string())
            .collect();
        let started = Instant::now();
        let loader = Arc::clone(&self.loader);

        let results = self
            .pipeline
            .process_async_with_backpressure(
                file_paths,
                move |path: PathBuf| {
                    let loader = Arc::clone(&loader);
                    let chunker = Arc::clone(&chunker);
                    let embedder = embedder.clone();
                    async move {
                        Ok::<_, Infallible>(process_document(loader, chunker, embedder, path).await)
                    }
                },
                priority,
                progress,
            )
            .await;

        results
            .into_iter()
            .zip(ids)
            .map(|(result, id)| {
                result.unwrap_or_else(|| {
                    warn!(document = %id, "Document was not processed");
                    ProcessingResult::failed(
                        id,
                        started,
                        "Document not processed: dropped under backpressure or aborted"
                            .to_string(),
                    )
                })
            })
            .collect()
    }
}

impl std::fmt::Debug for DocumentProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentProcessor")
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}

async fn process_document(
    loader: Arc<dyn DocumentLoader>,
    chunker: Arc<dyn Chunker>,
    embedder: Option<Arc<dyn Embedder>>,
    path: PathBuf,
) -> ProcessingResult {
    let started = Instant::now();
    let id = path.display().to_string();

    let document = match loader.load(&path).await {
        Ok(document) => document,
        Err(e) => {
            warn!(document = %id, error = %e, "Failed to load document");
            return ProcessingResult::failed(id, started, format!("Failed to load document: {e}"));
        }
    };

    match chunk_and_embed(document, chunker, embedder).await {
        Ok(chunks_created) => {
            debug!(document = %id, chunks_created, "Document processed");
            ProcessingResult::succeeded(id, started, chunks_created)
        }
        Err(message) => {
            warn!(document = %id, error = %message, "Failed to process document");
            ProcessingResult::failed(id, started, message)
        }
    }
}

async fn chunk_and_embed(
    document: Document,
    chunker: Arc<dyn Chunker>,
    embedder: Option<Arc<dyn Embedder>>,
) -> Result<usize, String> {
    let chunks = tokio::task::spawn_blocking(move || chunker.chunk(&document))
        .await
        .map_err(|e| format!("Failed to chunk document: {}", TaskError::from_join(e)))?
        .map_err(|e| format!("Failed to chunk document: {e}"))?;

    let Some(embedder) = embedder else {
        return Ok(chunks.len());
    };

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let expected = texts.len();
    let embeddings = tokio::task::spawn_blocking(move || embedder.embed(&texts))
        .await
        .map_err(|e| format!("Failed to embed chunks: {}", TaskError::from_join(e)))?
        .map_err(|e| format!("Failed to embed chunks: {e}"))?;

    if embeddings.len() != expected {
        return Err(format!(
            "Failed to embed chunks: embedder returned {} vectors for {} chunks",
            embeddings.len(),
            expected
        ));
    }

    Ok(chunks.len())
}
