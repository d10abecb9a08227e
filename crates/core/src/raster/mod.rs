//! Raster data structures and operations

mod element;
mod geotransform;
mod grid;
mod image;
mod mask;

pub use element::RasterElement;
pub use geotransform::{GeoTransform, GridSpec};
pub use grid::{Raster, RasterStatistics};
pub use image::Image;
pub use mask::Mask;
