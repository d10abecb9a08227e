//! # FireScar Algorithms
//!
//! Burned-area mapping from pre/post-fire multispectral composites.
//!
//! ## Modules
//!
//! - **fire**: fire windows, fire-record filtering, perimeter rasterization
//! - **imagery**: composites, spectral index registry, deltas and smoothing
//! - **classification**: threshold rules and trained classifiers
//! - **sampling**: uniform and stratified pixel sampling
//! - **evaluation**: confusion counts, accuracy and kappa
//! - **pipeline**: per-fire orchestration and batch runs

pub mod classification;
pub mod evaluation;
pub mod fire;
pub mod imagery;
pub mod pipeline;
pub mod sampling;

mod maybe_rayon;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::classification::{
        classify_image, BurnRule, Classifier, ClassifierKind, ThresholdClassifier, TrainedModel,
    };
    pub use crate::evaluation::{confusion_counts, confusion_image, ConfusionCounts};
    pub use crate::fire::{
        filter_fire_records, fire_windows, ground_truth, invalid_zone_mask, FilteredFires,
        TimeWindow,
    };
    pub use crate::imagery::{
        build_composite, compute_indices, delta_stack, BurnDirection, CompositeParams,
        DeltaParams, ImageCollection, IndexDefinition, IndexRegistry, Scene,
    };
    pub use crate::pipeline::{FireAnalysis, FireEvent, FirePipeline, PipelineConfig};
    pub use crate::sampling::{sample_stratified, sample_uniform, SampleParams, SampleSet};
    pub use firescar_core::prelude::*;
}
