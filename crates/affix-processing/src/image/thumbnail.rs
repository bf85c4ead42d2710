use super::adapter::{encode_to_path, extend_to_box, ImageAdapter, ImageHandle};
use crate::geometry::{ResizeMode, ResizeTarget};
use image::imageops::FilterType;
use image::DynamicImage;
use std::path::Path;

/// Fast adapter for small previews: integer-ratio sampling instead of a filter kernel.
#[derive(Debug, Clone)]
pub struct ThumbnailAdapter {
    quality: u8,
}

impl ThumbnailAdapter {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }
}

fn sample(image: &DynamicImage, width: u32, height: u32) -> DynamicImage {
    if width > image.width() || height > image.height() {
        // sampling only reduces
        return image.resize_exact(width, height, FilterType::Triangle);
    }
    image.thumbnail_exact(width, height)
}

impl ImageAdapter for ThumbnailAdapter {
    fn name(&self) -> &str {
        "thumbnail"
    }

    fn resize(&self, handle: &ImageHandle, target: &ResizeTarget) -> ImageHandle {
        let (orig_width, orig_height) = handle.dimensions();
        let (width, height) = target.resolve(orig_width, orig_height);

        let image = match target.mode {
            ResizeMode::Fit if (width, height) == (orig_width, orig_height) => handle.image.clone(),
            ResizeMode::Fit => sample(&handle.image, width, height),
            ResizeMode::Crop => handle
                .image
                .resize_to_fill(width, height, FilterType::Triangle),
            ResizeMode::Extend => extend_to_box(&handle.image, width, height, sample),
        };

        ImageHandle::new(image, handle.format)
    }

    fn encode(&self, handle: &ImageHandle, destination: &Path) -> anyhow::Result<()> {
        encode_to_path(handle, destination, self.quality)
    }
}
