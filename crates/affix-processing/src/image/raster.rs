use super::adapter::{encode_to_path, extend_to_box, ImageAdapter, ImageHandle};
use crate::geometry::{ResizeMode, ResizeTarget};
use image::imageops::FilterType;
use image::DynamicImage;
use std::path::Path;

/// General purpose adapter: resampling filter picked from the scale ratio.
#[derive(Debug, Clone)]
pub struct RasterAdapter {
    quality: u8,
}

impl RasterAdapter {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    /// Select appropriate filter type based on resize ratio
    pub fn select_filter(
        orig_width: u32,
        orig_height: u32,
        new_width: u32,
        new_height: u32,
    ) -> FilterType {
        let width_ratio = orig_width as f32 / new_width as f32;
        let height_ratio = orig_height as f32 / new_height as f32;
        let max_ratio = width_ratio.max(height_ratio);

        if max_ratio > 2.0 {
            FilterType::Triangle
        } else if max_ratio > 1.5 {
            FilterType::CatmullRom
        } else {
            FilterType::Lanczos3
        }
    }

    fn resize_exact(image: &DynamicImage, width: u32, height: u32) -> DynamicImage {
        let filter = Self::select_filter(image.width(), image.height(), width, height);
        image.resize_exact(width, height, filter)
    }
}

impl ImageAdapter for RasterAdapter {
    fn name(&self) -> &str {
        "raster"
    }

    fn resize(&self, handle: &ImageHandle, target: &ResizeTarget) -> ImageHandle {
        let (orig_width, orig_height) = handle.dimensions();
        let (width, height) = target.resolve(orig_width, orig_height);

        let image = match target.mode {
            ResizeMode::Fit if (width, height) == (orig_width, orig_height) => handle.image.clone(),
            ResizeMode::Fit => Self::resize_exact(&handle.image, width, height),
            ResizeMode::Crop => {
                let filter = Self::select_filter(orig_width, orig_height, width, height);
                handle.image.resize_to_fill(width, height, filter)
            }
            ResizeMode::Extend => extend_to_box(&handle.image, width, height, Self::resize_exact),
        };

        ImageHandle::new(image, handle.format)
    }

    fn encode(&self, handle: &ImageHandle, destination: &Path) -> anyhow::Result<()> {
        encode_to_path(handle, destination, self.quality)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgba, RgbaImage};

    fn handle(width: u32, height: u32) -> ImageHandle {
        ImageHandle::new(
            DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba([1, 2, 3, 255]))),
            None,
        )
    }

    #[test]
    fn test_select_filter() {
        assert_eq!(RasterAdapter::select_filter(100, 100, 90, 90), FilterType::Lanczos3);
        assert_eq!(RasterAdapter::select_filter(100, 100, 60, 60), FilterType::CatmullRom);
        assert_eq!(RasterAdapter::select_filter(100, 100, 10, 10), FilterType::Triangle);
    }

    #[test]
    fn test_resize_modes() {
        let adapter = RasterAdapter::new(85);
        let source = handle(80, 75);

        let fit = adapter.resize(&source, &ResizeTarget::parse("40x40").unwrap());
        assert_eq!(fit.image.dimensions(), (40, 38));

        let crop = adapter.resize(&source, &ResizeTarget::parse("c40x40").unwrap());
        assert_eq!(crop.image.dimensions(), (40, 40));

        let extend = adapter.resize(&source, &ResizeTarget::parse("40x20e").unwrap());
        assert_eq!(extend.image.dimensions(), (40, 20));
    }

    #[test]
    fn test_quality_is_clamped() {
        assert_eq!(RasterAdapter::new(0).quality, 1);
        assert_eq!(RasterAdapter::new(250).quality, 100);
    }
}
