//! The embedding model is an external collaborator: this crate only depends
//! on the capability to turn text into a fixed-width vector, injected at
//! construction.

use async_trait::async_trait;

use crate::error::AppError;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embeds a batch of passages, preserving input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError>;

    /// Width of every vector this embedder produces.
    fn dimension(&self) -> usize;
}

/// Deterministic embedder for tests: hashes each input string into a fixed
/// vector so assertions on distances and ordering stay reproducible.
pub struct StubEmbedder {
    dimension: usize,
}

impl StubEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut values = vec![0.0f32; self.dimension];
        for (i, byte) in text.bytes().enumerate() {
            let slot = i % self.dimension;
            values[slot] += byte as f32 / 255.0;
        }
        values
    }
}

#[async_trait]
impl Embedder for StubEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
