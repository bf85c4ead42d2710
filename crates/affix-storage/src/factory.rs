use crate::blob::{BlobRepository, BlobStore};
use crate::store::{AttachmentStore, KeyedStore};
use crate::{StorageDelegator, StorageError, StorageResult, StoreBinding};
#[cfg(feature = "storage-local")]
use crate::LocalStorage;
#[cfg(feature = "storage-remote")]
use crate::RemoteStorage;
use affix_core::{AffixConfig, AttachmentResult, StoreKind};
use std::sync::Arc;

/// Create the attachment store a binding describes.
///
/// Binding settings win over process configuration. `default_prefix` is the key prefix used
/// when the binding has none, normally the attachment type name.
pub async fn create_store(
    binding: &StoreBinding,
    config: &AffixConfig,
    blobs: Option<Arc<dyn BlobRepository>>,
    default_prefix: &str,
) -> StorageResult<Arc<dyn AttachmentStore>> {
    match binding.kind {
        #[cfg(feature = "storage-local")]
        StoreKind::FileSystem => {
            let root = binding
                .root
                .clone()
                .or_else(|| config.local_storage_path.as_ref().map(Into::into))
                .ok_or_else(|| {
                    StorageError::ConfigError(format!(
                        "store `{}` has no root and AFFIX_LOCAL_STORAGE_PATH is not configured",
                        binding.name
                    ))
                })?;

            let storage = LocalStorage::new(root, config.local_storage_base_url.clone()).await?;
            Ok(Arc::new(KeyedStore::new(
                binding.clone(),
                Arc::new(storage),
                default_prefix,
            )))
        }

        #[cfg(not(feature = "storage-local"))]
        StoreKind::FileSystem => Err(StorageError::ConfigError(
            "File system store not available (storage-local feature not enabled)".to_string(),
        )),

        #[cfg(feature = "storage-remote")]
        StoreKind::Remote => {
            let bucket = binding
                .bucket
                .clone()
                .or_else(|| config.s3_bucket.clone())
                .ok_or_else(|| {
                    StorageError::ConfigError(format!(
                        "store `{}` has no bucket and AFFIX_S3_BUCKET is not configured",
                        binding.name
                    ))
                })?;
            let region = config.s3_region().map(String::from).ok_or_else(|| {
                StorageError::ConfigError("AFFIX_S3_REGION or AWS_REGION not configured".to_string())
            })?;
            let credentials = binding
                .credentials
                .as_deref()
                .map(credentials_from_env)
                .transpose()?;

            let storage = RemoteStorage::s3(bucket, region, config.s3_endpoint.clone(), credentials)?;
            Ok(Arc::new(KeyedStore::new(
                binding.clone(),
                Arc::new(storage),
                default_prefix,
            )))
        }

        #[cfg(not(feature = "storage-remote"))]
        StoreKind::Remote => Err(StorageError::ConfigError(
            "Remote store not available (storage-remote feature not enabled)".to_string(),
        )),

        StoreKind::DbFile => {
            let blobs = blobs.ok_or_else(|| {
                StorageError::ConfigError(format!(
                    "store `{}` needs a blob repository",
                    binding.name
                ))
            })?;
            Ok(Arc::new(BlobStore::new(binding.clone(), blobs)))
        }
    }
}

/// Create every bound store and the delegator over them.
pub async fn create_delegator(
    bindings: &[StoreBinding],
    config: &AffixConfig,
    blobs: Option<Arc<dyn BlobRepository>>,
    default_prefix: &str,
) -> AttachmentResult<StorageDelegator> {
    let mut stores = Vec::with_capacity(bindings.len());
    for binding in bindings {
        let store = create_store(binding, config, blobs.clone(), default_prefix)
            .await
            .map_err(|e| e.into_attachment_error(&binding.name))?;
        tracing::debug!(store = %binding.name, kind = %binding.kind, "Store bound");
        stores.push(store);
    }

    StorageDelegator::new(stores, &config.temp_dir, config.store_save_timeout())
}

#[cfg(feature = "storage-remote")]
fn credentials_from_env(prefix: &str) -> StorageResult<(String, String)> {
    let read = |suffix: &str| {
        let name = format!("{}_{}", prefix, suffix);
        std::env::var(&name)
            .map_err(|_| StorageError::ConfigError(format!("{} not configured", name)))
    };
    Ok((read("ACCESS_KEY_ID")?, read("SECRET_ACCESS_KEY")?))
}
