//! Snapshot object storage / 快照对象存储

use async_trait::async_trait;
use bytes::Bytes;
use object_store::path::Path;
use object_store::signer::Signer;
use object_store::{Attribute, Attributes, ObjectStore, PutOptions, PutPayload};
use reqwest::Method;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub const JPEG_CONTENT_TYPE: &str = "image/jpeg";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid object name: {0}")]
    InvalidName(String),
    #[error("{0}")]
    Backend(#[from] object_store::Error),
    #[error("URL signing is not available for this store")]
    SigningUnavailable,
}

/// Where snapshots are written and how they are handed out
/// 快照的写入位置与访问方式
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn put_jpeg(&self, name: &str, jpeg: Vec<u8>) -> Result<(), StorageError>;

    async fn exists(&self, name: &str) -> Result<bool, StorageError>;

    /// Time-limited GET URL / 有时效的GET链接
    async fn signed_url(&self, name: &str, expires_in: Duration) -> Result<String, StorageError>;

    fn bucket(&self) -> &str;
}

/// Object names must not contain empty or dot segments
/// 对象名不得包含空段或点段
pub fn object_path(name: &str) -> Result<Path, StorageError> {
    if name.is_empty() {
        return Err(StorageError::InvalidName(name.to_string()));
    }
    Path::parse(name).map_err(|_| StorageError::InvalidName(name.to_string()))
}

pub struct ObjectSnapshotStore {
    bucket: String,
    store: Arc<dyn ObjectStore>,
    signer: Option<Arc<dyn Signer>>,
}

impl ObjectSnapshotStore {
    pub fn new(
        bucket: impl Into<String>,
        store: Arc<dyn ObjectStore>,
        signer: Option<Arc<dyn Signer>>,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            store,
            signer,
        }
    }

    /// GCS bucket using ambient credentials / 使用环境凭据访问GCS存储桶
    pub fn gcs(bucket: &str) -> Result<Self, StorageError> {
        let gcs = Arc::new(
            object_store::gcp::GoogleCloudStorageBuilder::from_env()
                .with_bucket_name(bucket)
                .build()?,
        );
        Ok(Self::new(bucket, gcs.clone(), Some(gcs)))
    }
}

#[async_trait]
impl SnapshotStore for ObjectSnapshotStore {
    async fn put_jpeg(&self, name: &str, jpeg: Vec<u8>) -> Result<(), StorageError> {
        let path = object_path(name)?;
        let size = jpeg.len();
        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, JPEG_CONTENT_TYPE.into());
        let opts = PutOptions {
            attributes,
            ..Default::default()
        };
        self.store
            .put_opts(&path, PutPayload::from(Bytes::from(jpeg)), opts)
            .await?;
        debug!(bucket = %self.bucket, object = %path, size, "snapshot stored");
        Ok(())
    }

    async fn exists(&self, name: &str) -> Result<bool, StorageError> {
        let path = object_path(name)?;
        match self.store.head(&path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn signed_url(&self, name: &str, expires_in: Duration) -> Result<String, StorageError> {
        let path = object_path(name)?;
        let signer = self.signer.as_ref().ok_or(StorageError::SigningUnavailable)?;
        let url = signer.signed_url(Method::GET, &path, expires_in).await?;
        Ok(url.to_string())
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }
}
