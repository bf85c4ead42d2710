pub mod attachment;
pub mod progress;
pub mod schema;
pub mod store_set;
pub mod upload;

pub use attachment::{Attachment, AttachmentRecord, ProcessingState};
pub use progress::{TaskOutcome, TaskProgress};
pub use schema::Schema;
pub use store_set::StoreSet;
pub use upload::{Upload, UploadSource};
