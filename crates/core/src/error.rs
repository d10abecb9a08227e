//! Error types for FireScar

use thiserror::Error;

/// Main error type for FireScar operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Raster size mismatch: expected ({er}, {ec}), got ({ar}, {ac})")]
    SizeMismatch { er: usize, ec: usize, ar: usize, ac: usize },

    #[error("Band '{0}' not found in image")]
    BandNotFound(String),

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    /// A fire record date field that does not parse. Absorbed into the
    /// invalid-zone mask by the record filter, never fatal for a run.
    #[error("Invalid date in field '{field}': {value:?}")]
    InvalidDateRecord { field: &'static str, value: String },

    /// No scene was acquired inside a composite window.
    #[error("Empty composite: no scenes acquired in {window}")]
    EmptyComposite { window: String },

    /// A sample set (or one of its strata) has no usable pixels.
    #[error("Degenerate sample: {reason}")]
    DegenerateSample { reason: String },

    #[error("Algorithm error: {0}")]
    Algorithm(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for FireScar operations
pub type Result<T> = std::result::Result<T, Error>;
