//! GeoTIFF I/O for single-band rasters and named images

mod native;

pub use native::{
    read_geotiff, read_geotiff_from_buffer, write_geotiff, write_geotiff_to_buffer, write_image,
};
