//! Burn classification
//!
//! - **Threshold**: per-index rules on deltas, strict comparison in the
//!   index's burn direction
//! - **Trained**: [`Classifier`] implementations fitted on a [`SampleSet`]
//!   (CART, random forest, naive Bayes, Gaussian naive Bayes, maximum
//!   entropy, minimum distance, perceptron, linear SVM, Winnow)
//!
//! [`SampleSet`]: crate::sampling::SampleSet

mod bayes;
mod distance;
mod linear;
mod model;
mod threshold;
mod tree;

pub use bayes::{ContinuousNaiveBayes, NaiveBayes, NaiveBayesParams};
pub use distance::{signatures_from_samples, ClassSignature, MinimumDistance};
pub use linear::{MaxEnt, Perceptron, Svm, Winnow};
pub use model::{classify_image, Classifier, ClassifierKind, TrainedModel};
pub use threshold::{threshold_sweep, BurnRule, ThresholdClassifier, DEFAULT_THRESHOLDS};
pub use tree::{Cart, ForestParams, RandomForest, TreeParams};
