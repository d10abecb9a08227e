//! Classifier interface shared by every trained model

use std::fmt;
use std::str::FromStr;

use firescar_core::{Error, Image, Raster, Result};
use serde::{Deserialize, Serialize};

use super::bayes::{ContinuousNaiveBayes, NaiveBayes};
use super::distance::MinimumDistance;
use super::linear::{MaxEnt, Perceptron, Svm, Winnow};
use super::tree::{Cart, RandomForest};
use crate::evaluation::ConfusionCounts;
use crate::maybe_rayon::*;
use crate::sampling::SampleSet;

/// Trainable classifier families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierKind {
    Cart,
    NaiveBayes,
    ContinuousNaiveBayes,
    MaxEnt,
    MinimumDistance,
    Perceptron,
    RandomForest,
    Svm,
    Winnow,
}

impl ClassifierKind {
    /// Every kind, in declaration order
    pub const ALL: [ClassifierKind; 9] = [
        ClassifierKind::Cart,
        ClassifierKind::NaiveBayes,
        ClassifierKind::ContinuousNaiveBayes,
        ClassifierKind::MaxEnt,
        ClassifierKind::MinimumDistance,
        ClassifierKind::Perceptron,
        ClassifierKind::RandomForest,
        ClassifierKind::Svm,
        ClassifierKind::Winnow,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ClassifierKind::Cart => "cart",
            ClassifierKind::NaiveBayes => "naive_bayes",
            ClassifierKind::ContinuousNaiveBayes => "continuous_naive_bayes",
            ClassifierKind::MaxEnt => "max_ent",
            ClassifierKind::MinimumDistance => "minimum_distance",
            ClassifierKind::Perceptron => "perceptron",
            ClassifierKind::RandomForest => "random_forest",
            ClassifierKind::Svm => "svm",
            ClassifierKind::Winnow => "winnow",
        }
    }

    /// A classifier of this kind with default parameters
    pub fn build(&self) -> Box<dyn Classifier> {
        match self {
            ClassifierKind::Cart => Box::new(Cart::default()),
            ClassifierKind::NaiveBayes => Box::new(NaiveBayes::default()),
            ClassifierKind::ContinuousNaiveBayes => Box::new(ContinuousNaiveBayes::default()),
            ClassifierKind::MaxEnt => Box::new(MaxEnt::default()),
            ClassifierKind::MinimumDistance => Box::new(MinimumDistance),
            ClassifierKind::Perceptron => Box::new(Perceptron::default()),
            ClassifierKind::RandomForest => Box::new(RandomForest::default()),
            ClassifierKind::Svm => Box::new(Svm::default()),
            ClassifierKind::Winnow => Box::new(Winnow::default()),
        }
    }
}

impl fmt::Display for ClassifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClassifierKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let key: String = s.chars().filter(|c| *c != '_' && *c != '-').collect::<String>().to_lowercase();
        let kind = match key.as_str() {
            "cart" => ClassifierKind::Cart,
            "naivebayes" => ClassifierKind::NaiveBayes,
            "continuousnaivebayes" => ClassifierKind::ContinuousNaiveBayes,
            "maxent" | "gmomaxent" => ClassifierKind::MaxEnt,
            "minimumdistance" => ClassifierKind::MinimumDistance,
            "perceptron" => ClassifierKind::Perceptron,
            "randomforest" => ClassifierKind::RandomForest,
            "svm" => ClassifierKind::Svm,
            "winnow" => ClassifierKind::Winnow,
            _ => {
                return Err(Error::InvalidParameter {
                    name: "classifier",
                    value: s.to_string(),
                    reason: "unknown classifier".into(),
                })
            }
        };
        Ok(kind)
    }
}

/// A classifier that can be trained on labelled samples
pub trait Classifier: Send + Sync {
    fn kind(&self) -> ClassifierKind;

    /// Train on `samples`.
    ///
    /// # Errors
    /// [`Error::DegenerateSample`] for an empty set, a set without
    /// features or a set with a single class.
    fn fit(&self, samples: &SampleSet) -> Result<Box<dyn TrainedModel>>;
}

/// A trained model
pub trait TrainedModel: Send + Sync + fmt::Debug {
    fn kind(&self) -> ClassifierKind;

    /// Names of the feature bands, in the order `predict` expects them
    fn feature_names(&self) -> &[String];

    /// Predicted label; NaN when any feature is not finite
    fn predict(&self, features: &[f64]) -> f64;

    /// Resubstitution confusion matrix on the training set
    fn training_confusion(&self) -> ConfusionCounts;

    /// Error matrix of this model on another sample set
    fn error_matrix(&self, samples: &SampleSet) -> ConfusionCounts {
        ConfusionCounts::from_pairs(samples.iter().map(|s| (self.predict(&s.features), s.label)))
    }
}

/// Prediction core implemented by each model family
pub(crate) trait Predict: Send + Sync + fmt::Debug {
    /// Features are guaranteed finite
    fn predict_finite(&self, features: &[f64]) -> f64;
}

#[derive(Debug)]
struct Fitted<M> {
    kind: ClassifierKind,
    feature_names: Vec<String>,
    model: M,
    training: ConfusionCounts,
}

impl<M: Predict> TrainedModel for Fitted<M> {
    fn kind(&self) -> ClassifierKind {
        self.kind
    }

    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn predict(&self, features: &[f64]) -> f64 {
        if features.len() != self.feature_names.len() || features.iter().any(|v| !v.is_finite()) {
            return f64::NAN;
        }
        self.model.predict_finite(features)
    }

    fn training_confusion(&self) -> ConfusionCounts {
        self.training
    }
}

/// Wrap a trained core and compute its resubstitution matrix
pub(crate) fn finish<M: Predict + 'static>(
    kind: ClassifierKind,
    model: M,
    samples: &SampleSet,
) -> Box<dyn TrainedModel> {
    let mut fitted = Fitted {
        kind,
        feature_names: samples.feature_names.clone(),
        model,
        training: ConfusionCounts::default(),
    };
    fitted.training = fitted.error_matrix(samples);
    Box::new(fitted)
}

/// Check a sample set can be trained on; returns its sorted classes
pub(crate) fn check_trainable(samples: &SampleSet) -> Result<Vec<f64>> {
    if samples.is_empty() {
        return Err(Error::DegenerateSample {
            reason: "empty sample set".into(),
        });
    }
    if samples.n_features() == 0 {
        return Err(Error::DegenerateSample {
            reason: "samples have no features".into(),
        });
    }
    if let Some(bad) = samples.iter().find(|s| s.features.len() != samples.n_features()) {
        return Err(Error::InvalidParameter {
            name: "samples",
            value: format!("({}, {})", bad.row, bad.col),
            reason: format!("expected {} features, got {}", samples.n_features(), bad.features.len()),
        });
    }
    if samples.iter().any(|s| !s.label.is_finite() || s.features.iter().any(|v| !v.is_finite())) {
        return Err(Error::DegenerateSample {
            reason: "samples contain missing values".into(),
        });
    }
    let classes = samples.classes();
    if classes.len() < 2 {
        return Err(Error::DegenerateSample {
            reason: format!("samples hold a single class ({})", classes[0]),
        });
    }
    Ok(classes)
}

/// Index of `label` in a sorted class list
pub(crate) fn class_index(classes: &[f64], label: f64) -> usize {
    classes.iter().position(|&c| c == label).unwrap_or(0)
}

/// Apply a trained model to every cell of `image`.
///
/// `feature_bands` names the bands fed to the model, in the model's
/// feature order. Cells with any missing feature are NaN.
pub fn classify_image<S: AsRef<str>>(
    model: &dyn TrainedModel,
    image: &Image,
    feature_bands: &[S],
) -> Result<Raster<f64>> {
    if feature_bands.len() != model.feature_names().len() {
        return Err(Error::InvalidParameter {
            name: "feature_bands",
            value: feature_bands.len().to_string(),
            reason: format!("model was trained on {} features", model.feature_names().len()),
        });
    }
    let bands: Vec<&Raster<f64>> = feature_bands
        .iter()
        .map(|name| image.band(name.as_ref()))
        .collect::<Result<_>>()?;
    let template = *bands
        .first()
        .ok_or_else(|| Error::Algorithm("classification needs at least one feature band".into()))?;
    let (rows, cols) = template.shape();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut features = vec![0.0; bands.len()];
            let mut line = Vec::with_capacity(cols);
            for col in 0..cols {
                for (slot, band) in features.iter_mut().zip(&bands) {
                    *slot = unsafe { band.get_unchecked(row, col) };
                }
                line.push(model.predict(&features));
            }
            line
        })
        .collect();

    template.derive(data, Some(f64::NAN))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_parse_from_script_names() {
        assert_eq!("cart".parse::<ClassifierKind>().unwrap(), ClassifierKind::Cart);
        assert_eq!("continuousNaiveBayes".parse::<ClassifierKind>().unwrap(), ClassifierKind::ContinuousNaiveBayes);
        assert_eq!("gmoMaxEnt".parse::<ClassifierKind>().unwrap(), ClassifierKind::MaxEnt);
        assert_eq!("random_forest".parse::<ClassifierKind>().unwrap(), ClassifierKind::RandomForest);
        assert!("ikpamir".parse::<ClassifierKind>().is_err());
        for kind in ClassifierKind::ALL {
            assert_eq!(kind.as_str().parse::<ClassifierKind>().unwrap(), kind);
            assert_eq!(kind.build().kind(), kind);
        }
    }

    #[test]
    fn degenerate_samples_are_rejected() {
        let empty = SampleSet::new(vec!["a".into()], "class");
        let single = SampleSet::from_rows(vec!["a".into()], "class", vec![(vec![0.1], 1.0), (vec![0.2], 1.0)]);
        let no_features = SampleSet::from_rows(vec![], "class", vec![(vec![], 1.0), (vec![], 0.0)]);

        for kind in ClassifierKind::ALL {
            let c = kind.build();
            for set in [&empty, &single, &no_features] {
                assert!(matches!(c.fit(set), Err(Error::DegenerateSample { .. })), "{}", kind);
            }
        }
    }
}
