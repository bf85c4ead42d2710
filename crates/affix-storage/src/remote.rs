use crate::traits::{Storage, StorageError, StorageResult};
use affix_core::StoreKind;
use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path;
use object_store::Error as ObjectStoreError;
use object_store::{ObjectStoreExt, PutPayload, Result as ObjectResult};
use std::sync::Arc;

/// Object storage implementation over any `object_store` backend
#[derive(Clone)]
pub struct RemoteStorage {
    store: Arc<dyn object_store::ObjectStore>,
    bucket: String,
    base_url: Option<String>,
}

impl std::fmt::Debug for RemoteStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteStorage")
            .field("bucket", &self.bucket)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl RemoteStorage {
    /// Wrap an existing object store. `bucket` is only used for logging.
    pub fn new(store: Arc<dyn object_store::ObjectStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            base_url: None,
        }
    }

    /// Create an S3 (or S3-compatible) store
    ///
    /// # Arguments
    /// * `bucket` - S3 bucket name
    /// * `region` - AWS region (or region identifier for S3-compatible providers)
    /// * `endpoint_url` - Optional custom endpoint URL for S3-compatible providers
    ///   (e.g., "http://localhost:9000" for MinIO)
    /// * `credentials` - Optional `(access_key_id, secret_access_key)`; otherwise the
    ///   standard `AWS_*` environment variables are used
    pub fn s3(
        bucket: String,
        region: String,
        endpoint_url: Option<String>,
        credentials: Option<(String, String)>,
    ) -> StorageResult<Self> {
        let mut builder = AmazonS3Builder::from_env()
            .with_region(region.clone())
            .with_bucket_name(bucket.clone());

        if let Some((access_key_id, secret_access_key)) = credentials {
            builder = builder
                .with_access_key_id(access_key_id)
                .with_secret_access_key(secret_access_key);
        }

        let base_url = match endpoint_url {
            Some(endpoint) => {
                let allow_http = endpoint.starts_with("http://");
                builder = builder
                    .with_endpoint(endpoint.clone())
                    .with_allow_http(allow_http);
                // path-style: {endpoint}/{bucket}/{key}
                format!("{}/{}", endpoint.trim_end_matches('/'), bucket)
            }
            None => format!("https://{}.s3.{}.amazonaws.com", bucket, region),
        };

        let store = builder
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        Ok(Self {
            store: Arc::new(store),
            bucket,
            base_url: Some(base_url),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }
}

#[async_trait]
impl Storage for RemoteStorage {
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        let size = data.len() as u64;
        let location = Path::from(key.to_string());

        let start = std::time::Instant::now();

        let result: ObjectResult<_> = self.store.put(&location, PutPayload::from(data)).await;

        result.map_err(|e| {
            tracing::error!(
                error = %e,
                bucket = %self.bucket,
                key = %key,
                size_bytes = size,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "Remote upload failed"
            );
            StorageError::UploadFailed(e.to_string())
        })?;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Remote upload successful"
        );

        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let start = std::time::Instant::now();
        let location = Path::from(key.to_string());

        let result: ObjectResult<_> = self.store.get(&location).await;

        let result = result.map_err(|e| match e {
            ObjectStoreError::NotFound { .. } => StorageError::NotFound(key.to_string()),
            other => {
                tracing::error!(
                    error = %other,
                    bucket = %self.bucket,
                    key = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Remote download failed"
                );
                StorageError::DownloadFailed(other.to_string())
            }
        })?;

        let bytes = result
            .bytes()
            .await
            .map_err(|e| StorageError::DownloadFailed(e.to_string()))?;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = bytes.len() as u64,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Remote download successful"
        );

        Ok(bytes)
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let start = std::time::Instant::now();
        let location = Path::from(key.to_string());

        let result: ObjectResult<_> = self.store.delete(&location).await;

        result.map_err(|e| match e {
            ObjectStoreError::NotFound { .. } => StorageError::NotFound(key.to_string()),
            other => {
                tracing::error!(
                    error = %other,
                    bucket = %self.bucket,
                    key = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Remote delete failed"
                );
                StorageError::DeleteFailed(other.to_string())
            }
        })?;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Remote delete successful"
        );

        Ok(())
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let location = Path::from(key.to_string());
        match self.store.head(&location).await {
            Ok(_) => Ok(true),
            Err(ObjectStoreError::NotFound { .. }) => Ok(false),
            Err(e) => Err(StorageError::BackendError(e.to_string())),
        }
    }

    async fn rename(&self, from: &str, to: &str) -> StorageResult<()> {
        let start = std::time::Instant::now();
        let from_location = Path::from(from.to_string());
        let to_location = Path::from(to.to_string());

        let copy_result: ObjectResult<_> = self.store.copy(&from_location, &to_location).await;

        copy_result.map_err(|e| match e {
            ObjectStoreError::NotFound { .. } => StorageError::NotFound(from.to_string()),
            other => StorageError::BackendError(other.to_string()),
        })?;

        // the copy is visible before the original is gone
        self.delete(from).await?;

        tracing::info!(
            bucket = %self.bucket,
            from_key = %from,
            to_key = %to,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Remote rename successful"
        );

        Ok(())
    }

    fn url(&self, key: &str) -> Option<String> {
        self.base_url
            .as_ref()
            .map(|base| format!("{}/{}", base.trim_end_matches('/'), key))
    }

    fn kind(&self) -> StoreKind {
        StoreKind::Remote
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::memory::InMemory;

    fn storage() -> RemoteStorage {
        RemoteStorage::new(Arc::new(InMemory::new()), "test-bucket")
    }

    #[tokio::test]
    async fn test_put_get_exists() {
        let storage = storage();
        storage
            .put("photos/1/a.png", Bytes::from_static(b"data"))
            .await
            .unwrap();

        assert!(storage.exists("photos/1/a.png").await.unwrap());
        assert_eq!(
            storage.get("photos/1/a.png").await.unwrap(),
            Bytes::from_static(b"data")
        );
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let storage = storage();
        assert!(storage.get("photos/1/none.png").await.unwrap_err().is_not_found());
        assert!(!storage.exists("photos/1/none.png").await.unwrap());
    }

    #[tokio::test]
    async fn test_rename_copies_then_deletes() {
        let storage = storage();
        storage
            .put("photos/1/a.png", Bytes::from_static(b"data"))
            .await
            .unwrap();

        storage.rename("photos/1/a.png", "photos/1/b.png").await.unwrap();

        assert!(!storage.exists("photos/1/a.png").await.unwrap());
        assert!(storage.exists("photos/1/b.png").await.unwrap());
    }

    #[tokio::test]
    async fn test_url_requires_base() {
        let storage = storage();
        assert!(storage.url("a").is_none());
        let storage = storage.with_base_url("https://cdn.example.com");
        assert_eq!(
            storage.url("photos/1/a.png").as_deref(),
            Some("https://cdn.example.com/photos/1/a.png")
        );
    }
}
