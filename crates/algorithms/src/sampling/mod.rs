//! Pixel sampling for classifier training and validation
//!
//! - [`sample_uniform`]: simple random sample of eligible pixels
//! - [`sample_stratified`]: per-stratum targets, e.g. land cover x burn
//! - Strata helpers: [`burn_landcover_strata`], [`frequency_histogram`],
//!   [`stratum_histogram`], [`targets_from_histogram`]

mod sampler;
mod samples;
mod strata;

pub use sampler::{sample_stratified, sample_uniform, stratum_histogram, SampleParams};
pub use samples::{Sample, SampleSet};
pub use strata::{burn_landcover_strata, frequency_histogram, targets_from_histogram, BURN_STRATUM_OFFSET};
