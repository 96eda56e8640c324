//! Ingest path: mint a document id, split passages into chunks, add every
//! vector to the graph, then upload each chunk.

use std::sync::Arc;

use dashmap::DashSet;
use futures_util::future::join_all;
use rand::Rng;
use rayon::prelude::*;
use tracing::{info, warn};

use crate::chunk::Chunk;
use crate::config::AppConfig;
use crate::embed::Embedder;
use crate::error::AppError;
use crate::index::HnswIndex;
use crate::pointer::{encode_chunk_id, MAX_DOCUMENT};
use crate::store::ObjectStore;
use crate::vector::{Metadata, MetadataValue, Vector};

/// Outcome of uploading a single chunk.
#[derive(Debug, Clone)]
pub struct ChunkUploadResult {
    pub chunk_id: u64,
    pub vector_count: usize,
    pub error: Option<String>,
}

/// Outcome of one `Writer::ingest` call.
#[derive(Debug, Clone)]
pub struct IngestResult {
    pub document: u32,
    pub chunks: Vec<ChunkUploadResult>,
}

impl IngestResult {
    pub fn succeeded(&self) -> bool {
        self.chunks.iter().all(|c| c.error.is_none())
    }
}

pub struct Writer {
    index: Arc<HnswIndex>,
    store: Arc<dyn ObjectStore>,
    embedder: Arc<dyn Embedder>,
    config: AppConfig,
    minted_documents: DashSet<u32>,
}

impl Writer {
    pub fn new(
        index: Arc<HnswIndex>,
        store: Arc<dyn ObjectStore>,
        embedder: Arc<dyn Embedder>,
        config: AppConfig,
    ) -> Self {
        Self {
            index,
            store,
            embedder,
            config,
            minted_documents: DashSet::new(),
        }
    }

    /// Truncates `text` to the configured preview length, appending `…` if
    /// anything was cut.
    fn preview_of(&self, text: &str) -> String {
        let preview_len = self.config.metadata_text_preview_length;
        let mut preview: String = text.chars().take(preview_len).collect();
        if text.chars().count() > preview_len {
            preview.push('…');
        }
        preview
    }

    /// Draws a document id uniformly from `[0, 2^DOCUMENT_BITS)`, redrawing
    /// on collision with any id this writer has already minted. This only
    /// protects against collisions within this process's lifetime.
    fn mint_document_id(&self) -> u32 {
        let mut rng = rand::thread_rng();
        loop {
            let candidate = rng.gen_range(0..=MAX_DOCUMENT);
            if self.minted_documents.insert(candidate) {
                return candidate;
            }
        }
    }

    /// Splits `source_file`'s passages (already chunked by the caller — text
    /// extraction and chunking of raw documents is an external concern) into
    /// fixed-size chunks, embeds them, adds them to the graph, and uploads
    /// each chunk.
    pub async fn ingest(&self, source_file: &str, passages: &[String]) -> Result<IngestResult, AppError> {
        let document = self.mint_document_id();
        let embeddings = self.embedder.embed(passages).await?;

        let chunk_size = self.config.max_vectors_per_chunk;
        let dimension = self.embedder.dimension() as u32;
        let mut per_chunk_vectors: Vec<Vec<Vector>> = Vec::new();
        for (chunk_index, (passage_batch, embedding_batch)) in passages
            .chunks(chunk_size)
            .zip(embeddings.chunks(chunk_size))
            .enumerate()
        {
            let chunk_number = chunk_index as u32;
            let vectors: Vec<Vector> = passage_batch
                .iter()
                .zip(embedding_batch)
                .enumerate()
                .map(|(offset, (text, values))| {
                    let mut metadata = Metadata::new();
                    metadata.insert(
                        "source_file".to_string(),
                        MetadataValue::Text(source_file.to_string()),
                    );
                    metadata.insert("text_index".to_string(), MetadataValue::Integer(offset as i64));
                    metadata.insert(
                        "preview".to_string(),
                        MetadataValue::Text(self.preview_of(text)),
                    );
                    Vector::new(values.clone(), document, chunk_number, offset as u32, metadata)
                })
                .collect();

            self.index.add_many(&vectors)?;
            per_chunk_vectors.push(vectors);
        }

        // Packing is CPU-bound and independent per chunk; large documents
        // benefit from spreading it across threads before the I/O-bound
        // upload phase.
        let packed: Vec<Result<(u64, usize, Vec<u8>), AppError>> = per_chunk_vectors
            .into_par_iter()
            .enumerate()
            .map(|(chunk_index, vectors)| {
                let chunk_number = chunk_index as u32;
                let chunk = Chunk::from_vectors(dimension, &vectors);
                let chunk_id = encode_chunk_id(document, chunk_number);
                chunk.pack().map(|bytes| (chunk_id, vectors.len(), bytes))
            })
            .collect();

        let uploads = packed.into_iter().map(|entry| async {
            let (chunk_id, vector_count, bytes) = entry?;
            match self.store.put_chunk(chunk_id, bytes).await {
                Ok(()) => {
                    info!(chunk_id, vector_count, "store_put");
                    Ok(ChunkUploadResult {
                        chunk_id,
                        vector_count,
                        error: None,
                    })
                }
                Err(e) => {
                    warn!(chunk_id, error = %e, "store_error");
                    Ok(ChunkUploadResult {
                        chunk_id,
                        vector_count,
                        error: Some(e.to_string()),
                    })
                }
            }
        });
        let chunk_results: Vec<ChunkUploadResult> =
            join_all(uploads).await.into_iter().collect::<Result<_, AppError>>()?;

        info!(document, chunk_count = chunk_results.len(), "ingest complete");
        Ok(IngestResult {
            document,
            chunks: chunk_results,
        })
    }
}
