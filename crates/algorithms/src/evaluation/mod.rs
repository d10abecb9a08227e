//! Scoring classifications against ground truth
//!
//! Predictions and truth are 0/1 rasters with NaN for excluded cells. Each
//! cell maps to `2 * predicted + truth`:
//!
//! | value | meaning        |
//! |-------|----------------|
//! | 0     | true negative  |
//! | 1     | false negative |
//! | 2     | false positive |
//! | 3     | true positive  |

mod confusion;

pub use confusion::{confusion_by_band, confusion_counts, confusion_image, ConfusionCounts};
