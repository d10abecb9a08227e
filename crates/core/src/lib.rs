//! # FireScar Core
//!
//! Core types and I/O for the FireScar burned-area mapping library.
//!
//! This crate provides:
//! - `Raster<T>`: Generic single-band raster grid
//! - `Image`: Ordered set of named `f64` bands sharing one grid
//! - `Mask`: Keep/exclude raster used to drop cells from analysis
//! - `GeoTransform`: Affine transformation for georeferencing
//! - Fire records and their date validation
//! - GeoTIFF I/O for single-band rasters

pub mod error;
pub mod io;
pub mod raster;
pub mod vector;

pub use error::{Error, Result};
pub use raster::{GeoTransform, GridSpec, Image, Mask, Raster, RasterElement};
pub use vector::{DatedFire, FireRecord, Region};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::raster::{GeoTransform, GridSpec, Image, Mask, Raster, RasterElement};
    pub use crate::vector::{DatedFire, FireRecord, Region};
    pub use crate::Algorithm;
}

/// Core trait for the raster stages in FireScar.
///
/// Stages are pure functions that transform input data according to parameters.
pub trait Algorithm {
    /// Input type for the stage
    type Input;
    /// Output type for the stage
    type Output;
    /// Parameters controlling stage behavior
    type Params: Default;
    /// Error type for stage execution
    type Error: std::error::Error;

    /// Returns the stage name
    fn name(&self) -> &'static str;

    /// Returns a description of what the stage does
    fn description(&self) -> &'static str;

    /// Execute the stage
    fn execute(&self, input: Self::Input, params: Self::Params) -> std::result::Result<Self::Output, Self::Error>;

    /// Execute with default parameters
    fn execute_default(&self, input: Self::Input) -> std::result::Result<Self::Output, Self::Error> {
        self.execute(input, Self::Params::default())
    }
}
