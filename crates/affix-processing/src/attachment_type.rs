//! Attachment types
//!
//! An [`AttachmentType`] is everything one kind of attachment shares: its options, the
//! columns its table provides, its validation rules, its task chain, and the stores its bytes
//! live in. Types are built once at startup and shared behind an `Arc`.

use crate::geometry::GeometrySpec;
use crate::image::{adapter_named, ImageAdapter};
use crate::queue::{LoggingQueue, ProcessingQueue};
use crate::tasks::{TaskChain, TaskOptions, TaskRegistry};
use affix_core::constants::{DEFAULT_MAX_SIZE_BYTES, DEFAULT_MIN_SIZE_BYTES};
use affix_core::{
    AffixConfig, Attachment, AttachmentError, AttachmentRepository, AttachmentResult,
    AttachmentRules, InMemoryAttachmentRepository, Schema, StoreKind,
};
use affix_storage::{
    create_delegator, BlobRepository, InMemoryBlobRepository, StorageDelegator, StoreBinding,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Name of the store bound when a type configures none.
pub const DEFAULT_STORE_NAME: &str = "db_file";

/// Options an attachment type is declared with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttachmentOptions {
    /// Label to geometry. Each label becomes a thumbnail record.
    pub thumbnails: BTreeMap<String, GeometrySpec>,
    /// Resize the uploaded image itself.
    pub resize_to: Option<GeometrySpec>,
    /// Allowed content types. `image` expands to every known image type.
    pub content_types: Option<Vec<String>>,
    /// Inclusive accepted size range in bytes.
    pub size_range: (i64, i64),
    pub storage: Vec<StoreBinding>,
    /// Image adapter name. Defaults to the configured processor.
    pub processor: Option<String>,
    /// Hand uploads to the processing queue instead of processing inline.
    pub queued: bool,
    /// Key prefix for stores without their own. Defaults to the type name.
    pub path_prefix: Option<String>,
}

impl Default for AttachmentOptions {
    fn default() -> Self {
        Self {
            thumbnails: BTreeMap::new(),
            resize_to: None,
            content_types: None,
            size_range: (DEFAULT_MIN_SIZE_BYTES, DEFAULT_MAX_SIZE_BYTES),
            storage: Vec::new(),
            processor: None,
            queued: false,
            path_prefix: None,
        }
    }
}

impl AttachmentOptions {
    fn validate(&self, schema: &Schema) -> AttachmentResult<()> {
        let (min, max) = self.size_range;
        if min < 0 || min > max {
            return Err(AttachmentError::Configuration(format!(
                "size range {}..={} is empty",
                min, max
            )));
        }
        if self.storage.len() > 1 && !schema.stores {
            return Err(AttachmentError::Configuration(
                "binding several stores needs a `stores` column".to_string(),
            ));
        }
        if !self.thumbnails.is_empty() && !schema.thumbnails {
            return Err(AttachmentError::Configuration(
                "thumbnails need `parent_id` and `thumbnail` columns".to_string(),
            ));
        }
        Ok(())
    }

    fn bindings(&self) -> Vec<StoreBinding> {
        if self.storage.is_empty() {
            vec![StoreBinding::new(DEFAULT_STORE_NAME, StoreKind::DbFile)]
        } else {
            self.storage.clone()
        }
    }
}

/// One kind of attachment.
pub struct AttachmentType {
    pub(crate) name: String,
    pub(crate) options: AttachmentOptions,
    pub(crate) schema: Schema,
    pub(crate) rules: AttachmentRules,
    pub(crate) chain: TaskChain,
    pub(crate) repository: Arc<dyn AttachmentRepository>,
    pub(crate) delegator: StorageDelegator,
    pub(crate) adapter: Arc<dyn ImageAdapter>,
    pub(crate) thumbnail_type: Option<Arc<AttachmentType>>,
    pub(crate) config: AffixConfig,
    pub(crate) queue: Arc<dyn ProcessingQueue>,
}

impl AttachmentType {
    pub fn builder(name: impl Into<String>) -> AttachmentTypeBuilder {
        AttachmentTypeBuilder::new(name.into())
    }

    /// A builder for a type that inherits this one.
    ///
    /// The new type starts from a copy of this type's chain and may change it freely. Stores,
    /// repository, and thumbnail type are shared unless replaced on the builder.
    pub fn derive(&self, name: impl Into<String>) -> AttachmentTypeBuilder {
        let name = name.into();
        let mut builder = AttachmentTypeBuilder::new(name.clone());
        builder.base_chain = Some(self.chain.copy_for(name));
        builder.options = self.options.clone();
        builder.schema = self.schema;
        builder.repository = Some(self.repository.clone());
        builder.delegator = Some(self.delegator.clone());
        builder.config = Some(self.config.clone());
        builder.queue = Some(self.queue.clone());
        builder.thumbnail_type = self.thumbnail_type.clone();
        builder
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &AttachmentOptions {
        &self.options
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn rules(&self) -> &AttachmentRules {
        &self.rules
    }

    pub fn chain(&self) -> &TaskChain {
        &self.chain
    }

    pub fn repository(&self) -> &Arc<dyn AttachmentRepository> {
        &self.repository
    }

    pub fn delegator(&self) -> &StorageDelegator {
        &self.delegator
    }

    pub fn adapter(&self) -> &Arc<dyn ImageAdapter> {
        &self.adapter
    }

    pub fn config(&self) -> &AffixConfig {
        &self.config
    }

    pub fn temp_dir(&self) -> &Path {
        &self.config.temp_dir
    }

    /// Type thumbnails of this type are saved as. Types without one use themselves.
    pub fn thumbnail_type(&self) -> &AttachmentType {
        self.thumbnail_type.as_deref().unwrap_or(self)
    }

    /// Local path of the bytes tasks should work on.
    ///
    /// This is the most recent pending temp file. A record without pending bytes is copied
    /// out of its primary store first.
    pub async fn working_copy(&self, attachment: &mut Attachment) -> AttachmentResult<PathBuf> {
        if let Some(path) = attachment.latest_temp_path() {
            return Ok(path.to_path_buf());
        }

        let data = self.delegator.current_data(&attachment.record).await?;
        attachment.write_temp_data(data, self.temp_dir()).await?;

        attachment
            .latest_temp_path()
            .map(Path::to_path_buf)
            .ok_or_else(|| AttachmentError::Io(io::Error::other("working copy was not written")))
    }

    /// URL the record is served from by its primary store, if any.
    pub fn public_path(&self, attachment: &Attachment) -> AttachmentResult<Option<String>> {
        match self.delegator.primary_store(&attachment.record) {
            Some(store) => store
                .public_path(&attachment.record)
                .map_err(|e| e.into_attachment_error(store.name())),
            None => Ok(None),
        }
    }

    /// Key of the record's bytes in the named store.
    pub fn full_filename(
        &self,
        attachment: &Attachment,
        store: &str,
    ) -> AttachmentResult<Option<String>> {
        self.delegator
            .store(store)?
            .full_filename(&attachment.record)
            .map_err(|e| e.into_attachment_error(store))
    }
}

impl fmt::Debug for AttachmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttachmentType")
            .field("name", &self.name)
            .field("schema", &self.schema)
            .field("chain", &self.chain)
            .field("adapter", &self.adapter.name())
            .field(
                "thumbnail_type",
                &self.thumbnail_type.as_ref().map(|t| t.name.as_str()),
            )
            .finish()
    }
}

type ChainHook = Box<dyn FnOnce(&mut TaskChain) -> AttachmentResult<()> + Send>;

/// Builds an [`AttachmentType`].
///
/// Anything not supplied falls back to in-memory repositories, `AffixConfig::default()`,
/// and the process-wide task registry.
pub struct AttachmentTypeBuilder {
    name: String,
    options: AttachmentOptions,
    schema: Schema,
    repository: Option<Arc<dyn AttachmentRepository>>,
    blobs: Option<Arc<dyn BlobRepository>>,
    config: Option<AffixConfig>,
    registry: Option<Arc<TaskRegistry>>,
    thumbnail_type: Option<Arc<AttachmentType>>,
    queue: Option<Arc<dyn ProcessingQueue>>,
    delegator: Option<StorageDelegator>,
    base_chain: Option<TaskChain>,
    hooks: Vec<ChainHook>,
}

impl AttachmentTypeBuilder {
    fn new(name: String) -> Self {
        Self {
            name,
            options: AttachmentOptions::default(),
            schema: Schema::default(),
            repository: None,
            blobs: None,
            config: None,
            registry: None,
            thumbnail_type: None,
            queue: None,
            delegator: None,
            base_chain: None,
            hooks: Vec::new(),
        }
    }

    pub fn options(mut self, options: AttachmentOptions) -> Self {
        self.options = options;
        self
    }

    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }

    pub fn repository(mut self, repository: Arc<dyn AttachmentRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Blob rows used by `db_file` stores.
    pub fn blobs(mut self, blobs: Arc<dyn BlobRepository>) -> Self {
        self.blobs = Some(blobs);
        self
    }

    pub fn config(mut self, config: AffixConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn registry(mut self, registry: Arc<TaskRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn thumbnail_type(mut self, thumbnail_type: Arc<AttachmentType>) -> Self {
        self.thumbnail_type = Some(thumbnail_type);
        self
    }

    pub fn queue(mut self, queue: Arc<dyn ProcessingQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Use an existing delegator instead of building stores from `options.storage`.
    pub fn delegator(mut self, delegator: StorageDelegator) -> Self {
        self.delegator = Some(delegator);
        self
    }

    /// Change the task chain after the tasks implied by the options are queued.
    pub fn configure<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&mut TaskChain) -> AttachmentResult<()> + Send + 'static,
    {
        self.hooks.push(Box::new(f));
        self
    }

    pub async fn build(self) -> AttachmentResult<AttachmentType> {
        let AttachmentTypeBuilder {
            name,
            options,
            schema,
            repository,
            blobs,
            config,
            registry,
            thumbnail_type,
            queue,
            delegator,
            base_chain,
            hooks,
        } = self;

        options.validate(&schema)?;
        let config = config.unwrap_or_default();
        let repository =
            repository.unwrap_or_else(|| Arc::new(InMemoryAttachmentRepository::new()));

        let delegator = match delegator {
            Some(delegator) => delegator,
            None => {
                let blobs = blobs.unwrap_or_else(|| Arc::new(InMemoryBlobRepository::new()));
                let prefix = options.path_prefix.clone().unwrap_or_else(|| name.clone());
                create_delegator(&options.bindings(), &config, Some(blobs), &prefix).await?
            }
        };

        let processor = options
            .processor
            .clone()
            .unwrap_or_else(|| config.default_processor.clone());
        let adapter = adapter_named(&processor, config.jpeg_quality)?;

        let (min, max) = options.size_range;
        let rules = AttachmentRules::new(options.content_types.clone(), min..=max);

        let chain = match base_chain {
            Some(chain) => chain,
            None => {
                let registry = registry.unwrap_or_else(TaskRegistry::global);
                let mut chain = TaskChain::new(name.clone(), registry);
                if let Some(resize_to) = &options.resize_to {
                    chain.task("resize", TaskOptions::new().with("to", resize_to.to_string()))?;
                }
                if !options.thumbnails.is_empty() {
                    let sizes = serde_json::to_value(&options.thumbnails).map_err(|e| {
                        AttachmentError::Configuration(format!("invalid thumbnails option: {}", e))
                    })?;
                    chain.task("thumbnails", TaskOptions::new().with("sizes", sizes))?;
                }
                chain
            }
        };
        let mut chain = chain;
        for hook in hooks {
            hook(&mut chain)?;
        }
        if schema.dimensions && !chain.is_loaded("get_image_size") {
            chain.prepend("get_image_size", TaskOptions::new())?;
        }

        let queue: Arc<dyn ProcessingQueue> = queue.unwrap_or_else(|| Arc::new(LoggingQueue));

        let thumbnail_type = match thumbnail_type {
            Some(thumbnail_type) => Some(thumbnail_type),
            None if schema.thumbnails => {
                let thumbnail_name = format!("{}_thumbnails", name);
                let mut thumbnail_chain = chain.copy_for(thumbnail_name.clone());
                thumbnail_chain.clear();
                Some(Arc::new(AttachmentType {
                    name: thumbnail_name,
                    options: AttachmentOptions {
                        thumbnails: BTreeMap::new(),
                        resize_to: None,
                        queued: false,
                        ..options.clone()
                    },
                    schema,
                    rules: rules.clone(),
                    chain: thumbnail_chain,
                    repository: repository.clone(),
                    delegator: delegator.clone(),
                    adapter: adapter.clone(),
                    thumbnail_type: None,
                    config: config.clone(),
                    queue: queue.clone(),
                }))
            }
            None => None,
        };

        tracing::info!(
            attachment_type = %name,
            tasks = ?chain.names(),
            stores = delegator.stores().count(),
            processor = %adapter.name(),
            "Attachment type defined"
        );

        Ok(AttachmentType {
            name,
            options,
            schema,
            rules,
            chain,
            repository,
            delegator,
            adapter,
            thumbnail_type,
            config,
            queue,
        })
    }
}
