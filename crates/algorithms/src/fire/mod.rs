//! Fire events: acquisition windows, record filtering and rasterization
//!
//! - [`fire_windows`]: pre/post windows around a fire
//! - [`filter_fire_records`]: in-scope fires vs. records with bad dates
//! - [`invalid_zone_mask`]: masks the footprints of bad-date records
//! - [`ground_truth`]: the reference burn raster used for scoring

mod rasterize;
mod records;
mod window;

pub use rasterize::{coverage_count, ground_truth, invalid_zone_mask, region_mask, CLASS_BAND};
pub use records::{filter_fire_records, FilteredFires};
pub use window::{fire_windows, TimeWindow};
