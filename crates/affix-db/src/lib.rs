//! Affix Database Library
//!
//! PostgreSQL implementations of the attachment and blob repositories, plus pool setup that
//! applies the bundled migrations.

pub mod attachments;
pub mod blobs;
pub mod setup;

pub use attachments::{AttachmentRow, PgAttachmentRepository};
pub use blobs::PgBlobRepository;
pub use setup::setup_database;
