//! Upload inputs accepted by [`Attachment::set_upload`](super::Attachment::set_upload).

use bytes::Bytes;
use std::io::Read;
use std::path::PathBuf;

/// Where the uploaded bytes come from.
pub enum UploadSource {
    /// An existing file; it is copied, never moved.
    Path(PathBuf),
    Bytes(Bytes),
    /// Any blocking reader; consumed to EOF.
    Reader(Box<dyn Read + Send>),
}

/// Uploaded bytes plus the metadata the client sent along with them.
pub struct Upload {
    pub source: UploadSource,
    pub filename: Option<String>,
    pub content_type: Option<String>,
}

impl Upload {
    /// Upload an existing file. The filename defaults to the file's name.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());
        Self {
            source: UploadSource::Path(path),
            filename,
            content_type: None,
        }
    }

    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        Self {
            source: UploadSource::Bytes(data.into()),
            filename: None,
            content_type: None,
        }
    }

    pub fn from_reader(reader: impl Read + Send + 'static) -> Self {
        Self {
            source: UploadSource::Reader(Box::new(reader)),
            filename: None,
            content_type: None,
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}
