use super::{RasterAdapter, ThumbnailAdapter};
use crate::geometry::ResizeTarget;
use affix_core::{AttachmentError, AttachmentResult};
use image::codecs::jpeg::JpegEncoder;
use image::{imageops, DynamicImage, GenericImageView, ImageFormat, ImageReader, Rgba, RgbaImage};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Bytes at a path could not be read as an image.
#[derive(Debug, Error)]
#[error("{path} is not a decodable image: {message}")]
pub struct DecodeFailure {
    pub path: PathBuf,
    pub message: String,
}

impl DecodeFailure {
    fn new(path: &Path, error: impl std::fmt::Display) -> Self {
        Self {
            path: path.to_path_buf(),
            message: error.to_string(),
        }
    }
}

/// A decoded image and the format it was read from.
#[derive(Debug, Clone)]
pub struct ImageHandle {
    pub image: DynamicImage,
    pub format: Option<ImageFormat>,
}

impl ImageHandle {
    pub fn new(image: DynamicImage, format: Option<ImageFormat>) -> Self {
        Self { image, format }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

/// Image processing capability used by the resize and thumbnail tasks.
///
/// Adapters are blocking and must only be driven from [`with_image`] or other blocking
/// contexts.
pub trait ImageAdapter: Send + Sync {
    fn name(&self) -> &str;

    /// Decode the image at `path`.
    fn open(&self, path: &Path) -> Result<ImageHandle, DecodeFailure> {
        let reader = ImageReader::open(path)
            .and_then(|r| r.with_guessed_format())
            .map_err(|e| DecodeFailure::new(path, e))?;
        let format = reader.format();
        let image = reader.decode().map_err(|e| DecodeFailure::new(path, e))?;
        Ok(ImageHandle::new(image, format))
    }

    fn dimensions(&self, handle: &ImageHandle) -> (u32, u32) {
        handle.dimensions()
    }

    fn resize(&self, handle: &ImageHandle, target: &ResizeTarget) -> ImageHandle;

    /// Write `handle` to `destination`. The format follows the destination extension, falling
    /// back to the format the image was read from.
    fn encode(&self, handle: &ImageHandle, destination: &Path) -> anyhow::Result<()>;
}

/// Open `path` with `adapter` on the blocking pool and hand the image to `f`.
///
/// Returns `Ok(None)` when the bytes are not a decodable image. Errors from `f` propagate.
/// The decoded image is dropped before this returns on every path.
pub async fn with_image<T, F>(
    adapter: Arc<dyn ImageAdapter>,
    path: PathBuf,
    f: F,
) -> anyhow::Result<Option<T>>
where
    T: Send + 'static,
    F: FnOnce(&dyn ImageAdapter, ImageHandle) -> anyhow::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || match adapter.open(&path) {
        Ok(handle) => f(adapter.as_ref(), handle).map(Some),
        Err(failure) => {
            tracing::debug!(
                adapter = adapter.name(),
                path = %failure.path.display(),
                error = %failure.message,
                "Skipping image processing, bytes are not a decodable image"
            );
            Ok(None)
        }
    })
    .await
    .map_err(|e| anyhow::anyhow!("image task panicked or was cancelled: {}", e))?
}

/// Look up an adapter by name.
pub fn adapter_named(name: &str, jpeg_quality: u8) -> AttachmentResult<Arc<dyn ImageAdapter>> {
    match name {
        "raster" => Ok(Arc::new(RasterAdapter::new(jpeg_quality))),
        "thumbnail" => Ok(Arc::new(ThumbnailAdapter::new(jpeg_quality))),
        other => Err(AttachmentError::Configuration(format!(
            "unknown image processor `{}`",
            other
        ))),
    }
}

/// Shared encoder: JPEG output is flattened to RGB8 and written at `quality`.
pub(crate) fn encode_to_path(
    handle: &ImageHandle,
    destination: &Path,
    quality: u8,
) -> anyhow::Result<()> {
    let format = ImageFormat::from_path(destination)
        .ok()
        .or(handle.format)
        .unwrap_or(ImageFormat::Png);

    let mut writer = BufWriter::new(File::create(destination)?);
    match format {
        ImageFormat::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(&mut writer, quality);
            DynamicImage::ImageRgb8(handle.image.to_rgb8()).write_with_encoder(encoder)?;
        }
        ImageFormat::WebP => {
            DynamicImage::ImageRgba8(handle.image.to_rgba8()).write_to(&mut writer, format)?;
        }
        format => handle.image.write_to(&mut writer, format)?,
    }
    writer.flush()?;
    Ok(())
}

/// Fit `image` inside a `width` by `height` box without enlarging it and pad the rest white.
pub(crate) fn extend_to_box(
    image: &DynamicImage,
    width: u32,
    height: u32,
    scale_down: impl Fn(&DynamicImage, u32, u32) -> DynamicImage,
) -> DynamicImage {
    let (orig_width, orig_height) = image.dimensions();

    let scale_width = width as f32 / orig_width as f32;
    let scale_height = height as f32 / orig_height as f32;
    let scale = scale_width.min(scale_height).min(1.0);

    let scaled_width = ((orig_width as f32 * scale).round() as u32).clamp(1, width);
    let scaled_height = ((orig_height as f32 * scale).round() as u32).clamp(1, height);

    let canvas = RgbaImage::from_pixel(width, height, Rgba([255u8, 255u8, 255u8, 255u8]));
    let mut canvas = DynamicImage::ImageRgba8(canvas);

    let x_offset = (width - scaled_width) / 2;
    let y_offset = (height - scaled_height) / 2;

    if scale < 1.0 {
        let resized = scale_down(image, scaled_width, scaled_height);
        imageops::overlay(&mut canvas, &resized, x_offset as i64, y_offset as i64);
    } else {
        imageops::overlay(&mut canvas, image, x_offset as i64, y_offset as i64);
    }

    canvas
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_png(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
        let path = dir.join(name);
        RgbaImage::from_pixel(width, height, Rgba([10, 20, 30, 255]))
            .save(&path)
            .unwrap();
        path
    }

    #[tokio::test]
    async fn test_with_image_reports_dimensions() {
        let dir = tempdir().unwrap();
        let path = write_png(dir.path(), "a.png", 80, 75);
        let adapter = adapter_named("raster", 85).unwrap();

        let dims = with_image(adapter, path, |adapter, image| Ok(adapter.dimensions(&image)))
            .await
            .unwrap();
        assert_eq!(dims, Some((80, 75)));
    }

    #[tokio::test]
    async fn test_with_image_skips_non_images() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"plain text").unwrap();
        let adapter = adapter_named("raster", 85).unwrap();

        let result = with_image(adapter, path, |_, _| Ok(())).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_with_image_propagates_closure_errors() {
        let dir = tempdir().unwrap();
        let path = write_png(dir.path(), "a.png", 4, 4);
        let adapter = adapter_named("thumbnail", 85).unwrap();

        let result: anyhow::Result<Option<()>> =
            with_image(adapter, path, |_, _| Err(anyhow::anyhow!("boom"))).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_adapter() {
        assert!(matches!(
            adapter_named("core_image", 85),
            Err(AttachmentError::Configuration(_))
        ));
    }

    #[test]
    fn test_encode_follows_destination_extension() {
        let dir = tempdir().unwrap();
        let source = write_png(dir.path(), "a.png", 8, 6);
        let adapter = adapter_named("raster", 80).unwrap();
        let handle = adapter.open(&source).unwrap();

        let destination = dir.path().join("a.jpg");
        adapter.encode(&handle, &destination).unwrap();

        let reopened = adapter.open(&destination).unwrap();
        assert_eq!(reopened.format, Some(ImageFormat::Jpeg));
        assert_eq!(reopened.dimensions(), (8, 6));
    }

    #[test]
    fn test_extend_pads_to_box() {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            100,
            50,
            Rgba([0, 0, 0, 255]),
        ));
        let padded = extend_to_box(&image, 40, 40, |img, w, h| {
            img.resize_exact(w, h, imageops::FilterType::Triangle)
        });
        assert_eq!(padded.dimensions(), (40, 40));
        // top rows are padding
        assert_eq!(padded.get_pixel(20, 0), Rgba([255, 255, 255, 255]));
        assert_eq!(padded.get_pixel(20, 20), Rgba([0, 0, 0, 255]));
    }
}
