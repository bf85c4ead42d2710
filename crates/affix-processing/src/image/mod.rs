//! Image processor adapters
//!
//! Tasks only talk to [`ImageAdapter`]. Two adapters ship with the crate, both backed by the
//! `image` crate:
//! - `raster`: filter chosen by scale ratio, Lanczos3 for small reductions
//! - `thumbnail`: fast integer-ratio sampling for small previews

pub mod adapter;
pub mod raster;
pub mod thumbnail;

pub use adapter::{adapter_named, with_image, DecodeFailure, ImageAdapter, ImageHandle};
pub use raster::RasterAdapter;
pub use thumbnail::ThumbnailAdapter;
