//! The remote chunked object store. Every chunk blob lives under the key
//! `chunks/<chunk_id>.bin` in a single bucket.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::error::StoreError;

fn chunk_key(chunk_id: u64) -> String {
    format!("chunks/{chunk_id}.bin")
}

#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_chunk(&self, chunk_id: u64, bytes: Vec<u8>) -> Result<(), StoreError>;
    async fn get_chunk(&self, chunk_id: u64) -> Result<Vec<u8>, StoreError>;
    async fn delete_chunk(&self, chunk_id: u64) -> Result<(), StoreError>;
    /// Checks whether the backing bucket exists and is reachable.
    async fn head_bucket(&self) -> Result<bool, StoreError>;
    /// Creates the backing bucket in `region` if [`ObjectStore::head_bucket`]
    /// reports it missing.
    async fn ensure_bucket(&self, region: &str) -> Result<(), StoreError>;
}

const MAX_ATTEMPTS: u32 = 3;
const BASE_BACKOFF: Duration = Duration::from_millis(50);

/// Retries transient failures with exponential backoff; permanent failures
/// and not-found are returned immediately.
async fn with_retry<T, F, Fut>(op_name: &str, mut f: F) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, StoreError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match f().await {
            Ok(value) => return Ok(value),
            Err(StoreError::Transient(msg)) if attempt < MAX_ATTEMPTS => {
                let backoff = BASE_BACKOFF * 2u32.pow(attempt - 1);
                warn!(
                    op = op_name,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %msg,
                    "store operation failed transiently, retrying"
                );
                tokio::time::sleep(backoff).await;
            }
            Err(other) => return Err(other),
        }
    }
}

/// S3-backed object store.
pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3ObjectStore {
    pub async fn new(config: &AppConfig) -> Result<Self, StoreError> {
        let mut loader =
            aws_config::defaults(aws_config::BehaviorVersion::latest()).region(
                aws_config::Region::new(config.store_region.clone()),
            );
        if let Some(endpoint) = &config.store_endpoint_override {
            loader = loader.endpoint_url(endpoint.clone());
        }
        let sdk_config = loader.load().await;
        let client = aws_sdk_s3::Client::new(&sdk_config);
        Ok(Self {
            client,
            bucket: config.store_bucket.clone(),
        })
    }
}

#[async_trait::async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put_chunk(&self, chunk_id: u64, bytes: Vec<u8>) -> Result<(), StoreError> {
        let key = chunk_key(chunk_id);
        with_retry("put_chunk", || async {
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(&key)
                .body(bytes.clone().into())
                .send()
                .await
                .map(|_| ())
                .map_err(|e| StoreError::Transient(e.to_string()))
        })
        .await?;
        info!(chunk_id, key = %key, "uploaded chunk");
        Ok(())
    }

    async fn get_chunk(&self, chunk_id: u64) -> Result<Vec<u8>, StoreError> {
        let key = chunk_key(chunk_id);
        let bytes = with_retry("get_chunk", || async {
            let output = self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(&key)
                .send()
                .await
                .map_err(|e| {
                    let msg = e.to_string();
                    if msg.contains("NoSuchKey") {
                        StoreError::NotFound(chunk_id)
                    } else {
                        StoreError::Transient(msg)
                    }
                })?;
            let data = output
                .body
                .collect()
                .await
                .map_err(|e| StoreError::Transient(e.to_string()))?;
            Ok(data.into_bytes().to_vec())
        })
        .await?;
        Ok(bytes)
    }

    async fn delete_chunk(&self, chunk_id: u64) -> Result<(), StoreError> {
        let key = chunk_key(chunk_id);
        with_retry("delete_chunk", || async {
            self.client
                .delete_object()
                .bucket(&self.bucket)
                .key(&key)
                .send()
                .await
                .map(|_| ())
                .map_err(|e| StoreError::Transient(e.to_string()))
        })
        .await
    }

    async fn head_bucket(&self) -> Result<bool, StoreError> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => Ok(true),
            Err(e) if e.to_string().contains("NotFound") => Ok(false),
            Err(e) => Err(StoreError::Transient(e.to_string())),
        }
    }

    async fn ensure_bucket(&self, region: &str) -> Result<(), StoreError> {
        if self.head_bucket().await? {
            return Ok(());
        }
        let constraint = aws_sdk_s3::types::BucketLocationConstraint::from(region);
        let configuration = aws_sdk_s3::types::CreateBucketConfiguration::builder()
            .location_constraint(constraint)
            .build();
        self.client
            .create_bucket()
            .bucket(&self.bucket)
            .create_bucket_configuration(configuration)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| StoreError::Permanent(e.to_string()))
    }
}

/// Fault a test can inject for one store operation on one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFault {
    Transient,
    Permanent,
    Corrupt,
}

/// Deterministic in-process fake used by tests and the demo CLI.
#[derive(Default)]
pub struct InMemoryObjectStore {
    chunks: DashMap<u64, Vec<u8>>,
    faults: DashMap<u64, InjectedFault>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inject_fault(&self, chunk_id: u64, fault: InjectedFault) {
        self.faults.insert(chunk_id, fault);
    }

    pub fn clear_fault(&self, chunk_id: u64) {
        self.faults.remove(&chunk_id);
    }
}

#[async_trait::async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put_chunk(&self, chunk_id: u64, bytes: Vec<u8>) -> Result<(), StoreError> {
        if let Some(fault) = self.faults.get(&chunk_id).map(|f| *f) {
            match fault {
                InjectedFault::Transient => return Err(StoreError::Transient("injected".into())),
                InjectedFault::Permanent => return Err(StoreError::Permanent("injected".into())),
                InjectedFault::Corrupt => {
                    self.chunks.insert(chunk_id, vec![0u8; 3]);
                    return Ok(());
                }
            }
        }
        self.chunks.insert(chunk_id, bytes);
        Ok(())
    }

    async fn get_chunk(&self, chunk_id: u64) -> Result<Vec<u8>, StoreError> {
        if let Some(fault) = self.faults.get(&chunk_id).map(|f| *f) {
            match fault {
                InjectedFault::Transient => return Err(StoreError::Transient("injected".into())),
                InjectedFault::Permanent => return Err(StoreError::Permanent("injected".into())),
                InjectedFault::Corrupt => return Ok(vec![0u8; 3]),
            }
        }
        self.chunks
            .get(&chunk_id)
            .map(|v| v.clone())
            .ok_or(StoreError::NotFound(chunk_id))
    }

    async fn delete_chunk(&self, chunk_id: u64) -> Result<(), StoreError> {
        self.chunks.remove(&chunk_id);
        Ok(())
    }

    async fn head_bucket(&self) -> Result<bool, StoreError> {
        Ok(true)
    }

    async fn ensure_bucket(&self, _region: &str) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Snapshot of the fake's contents, useful for assertions in tests.
pub fn snapshot(store: &InMemoryObjectStore) -> HashMap<u64, Vec<u8>> {
    store
        .chunks
        .iter()
        .map(|entry| (*entry.key(), entry.value().clone()))
        .collect()
}

pub fn shared(store: InMemoryObjectStore) -> Arc<dyn ObjectStore> {
    Arc::new(store)
}
