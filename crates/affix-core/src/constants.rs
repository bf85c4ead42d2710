//! Shared constants.

/// Content types treated as images. Records with one of these types are thumbnailable.
pub const IMAGE_CONTENT_TYPES: &[&str] = &[
    "image/jpeg",
    "image/pjpeg",
    "image/jpg",
    "image/gif",
    "image/png",
    "image/x-png",
    "image/x-ms-bmp",
    "image/bmp",
    "image/x-bmp",
    "image/x-bitmap",
    "image/x-xbitmap",
    "image/x-win-bitmap",
    "image/x-windows-bmp",
    "image/ms-bmp",
    "application/bmp",
    "application/x-bmp",
    "application/x-win-bitmap",
    "application/preview",
    "image/jp_",
    "application/jpg",
    "application/x-jpg",
    "image/pipeg",
    "image/vnd.swiftview-jpeg",
    "application/png",
    "application/x-png",
    "image/gi_",
    "image/x-citrix-pjpeg",
    "image/webp",
];

/// Placeholder accepted in content type allow lists that expands to [`IMAGE_CONTENT_TYPES`].
pub const IMAGE_CONTENT_TYPE_TOKEN: &str = "image";

/// Default accepted upload size range, in bytes.
pub const DEFAULT_MIN_SIZE_BYTES: i64 = 1;
pub const DEFAULT_MAX_SIZE_BYTES: i64 = 1024 * 1024;

/// Default time a single store may spend saving before it is dropped from a multi-store save.
pub const DEFAULT_STORE_SAVE_TIMEOUT_SECS: u64 = 30;

/// Progress map key marking every task of a chain as done.
pub const PROGRESS_COMPLETE_KEY: &str = "complete";

/// Returns true if `content_type` is one of the known image content types.
pub fn is_image_content_type(content_type: &str) -> bool {
    IMAGE_CONTENT_TYPES.contains(&content_type.trim())
}
