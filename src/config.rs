/// Process-wide configuration, built once at startup and threaded through
/// every component by construction.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Width of every embedding vector accepted by the index.
    pub dimension: usize,
    /// `connectivity` passed to the underlying HNSW graph.
    pub hnsw_m: usize,
    /// Maximum number of vectors packed into a single chunk.
    pub max_vectors_per_chunk: usize,
    /// `k` used when a caller does not specify one.
    pub default_search_k: usize,
    /// Passage length, in characters, used when the writer splits raw text.
    pub text_chunk_size: usize,
    /// Character overlap between adjacent passages.
    pub text_overlap: usize,
    /// Length of the text preview stored in vector metadata.
    pub metadata_text_preview_length: usize,
    /// Time-to-live for cache entries, in seconds.
    pub cache_ttl_seconds: u64,
    /// AWS region for the object store.
    pub store_region: String,
    /// Bucket holding chunk blobs.
    pub store_bucket: String,
    /// Optional non-AWS endpoint override, for S3-compatible stores.
    pub store_endpoint_override: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            dimension: env_usize("STRATAVEC_DIMENSION", 384),
            hnsw_m: env_usize("STRATAVEC_HNSW_M", 16),
            max_vectors_per_chunk: env_usize("STRATAVEC_MAX_VECTORS_PER_CHUNK", 100),
            default_search_k: env_usize("STRATAVEC_DEFAULT_SEARCH_K", 5),
            text_chunk_size: env_usize("STRATAVEC_TEXT_CHUNK_SIZE", 300),
            text_overlap: env_usize("STRATAVEC_TEXT_OVERLAP", 50),
            metadata_text_preview_length: env_usize("STRATAVEC_METADATA_PREVIEW_LEN", 200),
            cache_ttl_seconds: env_u64("STRATAVEC_CACHE_TTL_SECONDS", 86400),
            store_region: std::env::var("STRATAVEC_STORE_REGION")
                .unwrap_or_else(|_| "us-east-1".to_string()),
            store_bucket: std::env::var("STRATAVEC_STORE_BUCKET")
                .unwrap_or_else(|_| "stratavec-chunks".to_string()),
            store_endpoint_override: std::env::var("STRATAVEC_STORE_ENDPOINT").ok(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane_when_env_unset() {
        let config = AppConfig {
            dimension: 384,
            hnsw_m: 16,
            max_vectors_per_chunk: 100,
            default_search_k: 5,
            text_chunk_size: 300,
            text_overlap: 50,
            metadata_text_preview_length: 200,
            cache_ttl_seconds: 86400,
            store_region: "us-east-1".to_string(),
            store_bucket: "stratavec-chunks".to_string(),
            store_endpoint_override: None,
        };
        assert_eq!(config.dimension, 384);
        assert!(config.text_overlap < config.text_chunk_size);
    }
}
