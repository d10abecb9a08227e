//! Imagery: composites, spectral indices and change stacks
//!
//! - Composite: per-window NaN-aware mean of scenes, scaled to reflectance
//! - Formula: band-arithmetic expressions evaluated per cell
//! - Indices: registry of named formulas with burn direction
//! - Change detection: `post - pre` deltas with optional smoothing

mod change_detection;
mod composite;
mod formula;
mod indices;
mod kernel;

pub use change_detection::{
    delta_band, delta_stack, raster_difference, DeltaParams, BLURRED_SUFFIX, DELTA_SUFFIX,
    POST_SUFFIX, PRE_SUFFIX,
};
pub use composite::{
    build_composite, nan_mean, CompositeParams, ImageCollection, Scene, S2_BANDS, STD_BANDS,
};
pub use formula::Formula;
pub use indices::{
    compute_indices, BurnDirection, IndexDefinition, IndexRegistry, DEFAULT_INDICES,
};
pub use kernel::{convolve, Convolve, Kernel};
