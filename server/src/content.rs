use common::valkey;
use common::{Metadata, MintForm, ValidationError};
use redis::AsyncCommands;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::canvas::ExportFormat;
use crate::engine::{EngineError, EngineHandle};

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("content store unavailable: {0}")]
    Storage(#[from] redis::RedisError),
    #[error("failed to encode metadata: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("failed to export drawing: {0}")]
    Engine(#[from] EngineError),
    #[error("upload failed: {0}")]
    Upload(#[from] UploadError),
}

/// A stored blob and the content type it was uploaded with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Content {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Content-addressed blob storage. Ids are the hex SHA-256 of the bytes, so
/// uploading the same content twice yields the same id.
#[derive(Clone)]
pub enum ContentStore {
    Valkey(redis::aio::MultiplexedConnection),
    Memory(Arc<MemoryStore>),
}

/// Process-local store; counts uploads the way the Valkey counter does.
#[derive(Default)]
pub struct MemoryStore {
    blobs: RwLock<HashMap<String, Content>>,
    uploads: AtomicU64,
}

pub fn content_id(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

impl ContentStore {
    pub fn memory() -> Self {
        ContentStore::Memory(Arc::default())
    }

    pub async fn put(&self, bytes: Vec<u8>, content_type: &str) -> Result<String, UploadError> {
        let cid = content_id(&bytes);
        match self {
            ContentStore::Valkey(con) => {
                let _: () = redis::pipe()
                    .set(valkey::content_key(&cid), bytes)
                    .ignore()
                    .hset(valkey::CONTENT_TYPES, &cid, content_type)
                    .ignore()
                    .incr(valkey::UPLOAD_COUNT, 1)
                    .ignore()
                    .query_async(&mut con.clone())
                    .await?;
            }
            ContentStore::Memory(store) => {
                store.blobs.write().await.insert(
                    cid.clone(),
                    Content {
                        content_type: content_type.to_string(),
                        bytes,
                    },
                );
                store.uploads.fetch_add(1, Ordering::Relaxed);
            }
        }
        Ok(cid)
    }

    pub async fn get(&self, cid: &str) -> Result<Option<Content>, UploadError> {
        match self {
            ContentStore::Valkey(con) => {
                let (bytes, content_type): (Option<Vec<u8>>, Option<String>) = redis::pipe()
                    .get(valkey::content_key(cid))
                    .hget(valkey::CONTENT_TYPES, cid)
                    .query_async(&mut con.clone())
                    .await?;
                Ok(bytes.map(|bytes| Content {
                    content_type: content_type
                        .unwrap_or_else(|| "application/octet-stream".to_string()),
                    bytes,
                }))
            }
            ContentStore::Memory(store) => Ok(store.blobs.read().await.get(cid).cloned()),
        }
    }

    /// Number of uploads accepted so far, repeats included.
    pub async fn upload_count(&self) -> Result<u64, UploadError> {
        match self {
            ContentStore::Valkey(con) => {
                let count: Option<u64> = con.clone().get(valkey::UPLOAD_COUNT).await?;
                Ok(count.unwrap_or(0))
            }
            ContentStore::Memory(store) => Ok(store.uploads.load(Ordering::Relaxed)),
        }
    }
}

/// URLs of a published drawing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Published {
    pub image_url: String,
    pub metadata_url: String,
}

/// Uploads finished drawings and their metadata.
pub struct Publisher {
    store: ContentStore,
    gateway_url: String,
}

impl Publisher {
    pub fn new(store: ContentStore, gateway_url: impl Into<String>) -> Self {
        Self {
            store,
            gateway_url: gateway_url.into(),
        }
    }

    pub fn url(&self, cid: &str) -> String {
        format!("{}/ipfs/{}", self.gateway_url, cid)
    }

    /// Export the canvas as JPEG, upload it, then upload the metadata that
    /// points at it. The form is checked before anything is uploaded.
    pub async fn publish(
        &self,
        engine: &EngineHandle,
        form: &MintForm,
    ) -> Result<Published, PublishError> {
        form.validate()?;
        let jpeg = engine.export(ExportFormat::Jpeg).await?;

        let image_cid = self
            .store
            .put(jpeg, ExportFormat::Jpeg.content_type())
            .await
            .inspect_err(|e| tracing::error!("Error uploading image: {}", e))?;
        let image_url = self.url(&image_cid);

        let metadata = Metadata::for_drawing(form, image_url.clone())?;
        let body = serde_json::to_vec(&metadata).map_err(UploadError::from)?;
        let metadata_cid = self
            .store
            .put(body, "application/json")
            .await
            .inspect_err(|e| tracing::error!("Error uploading metadata: {}", e))?;

        tracing::info!("Published drawing {} with metadata {}", image_cid, metadata_cid);
        Ok(Published {
            image_url,
            metadata_url: self.url(&metadata_cid),
        })
    }
}
