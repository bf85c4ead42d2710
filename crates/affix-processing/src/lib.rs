//! Affix Processing Library
//!
//! This crate turns stored attachments into processed ones: geometry resolution, image
//! adapters, the task registry and per-type task chains, and the save, process and destroy
//! hooks of an [`AttachmentType`].
//!
//! # Example
//!
//! ```no_run
//! use affix_core::{Attachment, Upload};
//! use affix_processing::{AttachmentOptions, AttachmentType};
//!
//! # async fn example() -> Result<(), affix_core::AttachmentError> {
//! let options: AttachmentOptions = serde_json::from_str(
//!     r#"{"content_types": ["image"], "thumbnails": {"thumb": "50x50"}}"#,
//! )
//! .map_err(|e| affix_core::AttachmentError::Configuration(e.to_string()))?;
//! let photos = AttachmentType::builder("photos").options(options).build().await?;
//!
//! let mut photo = Attachment::new();
//! photos
//!     .set_upload(&mut photo, Upload::from_path("rails.png").with_content_type("image/png"))
//!     .await?;
//! photos.save(&mut photo).await?;
//! # Ok(())
//! # }
//! ```

pub mod attachment_type;
pub mod geometry;
pub mod image;
pub mod lifecycle;
pub mod pipeline;
pub mod queue;
pub mod tasks;

pub use attachment_type::{AttachmentOptions, AttachmentType, AttachmentTypeBuilder};
pub use geometry::{Geometry, GeometryError, GeometrySpec, Modifier, ResizeMode, ResizeTarget};
pub use crate::image::{adapter_named, with_image, DecodeFailure, ImageAdapter, ImageHandle};
pub use pipeline::{ProcessOptions, ProcessOutcome};
pub use queue::{LoggingQueue, ProcessingQueue};
pub use tasks::{StackEntry, Task, TaskChain, TaskContext, TaskImpl, TaskOptions, TaskRegistry};
