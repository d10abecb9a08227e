//! Minimum distance (nearest centroid) classification
//!
//! Each class is summarized by a signature: the per-feature mean and
//! standard deviation of its training samples. A pixel goes to the class
//! whose mean is closest in Euclidean distance. Simple and fast but blind
//! to class variance.

use firescar_core::Result;

use super::model::{check_trainable, class_index, finish, Classifier, ClassifierKind, Predict, TrainedModel};
use crate::sampling::SampleSet;

/// Per-class statistics of the training samples
#[derive(Debug, Clone, PartialEq)]
pub struct ClassSignature {
    pub label: f64,
    pub mean: Vec<f64>,
    pub std_dev: Vec<f64>,
    pub count: usize,
}

/// Class signatures, ordered by label
pub fn signatures_from_samples(samples: &SampleSet) -> Result<Vec<ClassSignature>> {
    let classes = check_trainable(samples)?;
    let nf = samples.n_features();

    let mut signatures: Vec<ClassSignature> = classes
        .iter()
        .map(|&label| ClassSignature {
            label,
            mean: vec![0.0; nf],
            std_dev: vec![0.0; nf],
            count: 0,
        })
        .collect();

    for s in samples.iter() {
        let sig = &mut signatures[class_index(&classes, s.label)];
        sig.count += 1;
        for (m, v) in sig.mean.iter_mut().zip(&s.features) {
            *m += v;
        }
    }
    for sig in &mut signatures {
        let n = sig.count as f64;
        sig.mean.iter_mut().for_each(|m| *m /= n);
    }
    for s in samples.iter() {
        let sig = &mut signatures[class_index(&classes, s.label)];
        for ((sd, v), m) in sig.std_dev.iter_mut().zip(&s.features).zip(&sig.mean) {
            *sd += (v - m).powi(2);
        }
    }
    for sig in &mut signatures {
        let dof = (sig.count.max(2) - 1) as f64;
        // Guard against zero variance
        sig.std_dev.iter_mut().for_each(|sd| *sd = (*sd / dof).sqrt().max(1e-10));
    }

    Ok(signatures)
}

#[derive(Debug, Clone)]
struct CentroidModel {
    signatures: Vec<ClassSignature>,
}

impl Predict for CentroidModel {
    fn predict_finite(&self, features: &[f64]) -> f64 {
        let mut best_dist = f64::INFINITY;
        let mut best_label = f64::NAN;
        for sig in &self.signatures {
            let dist: f64 = sig.mean.iter().zip(features).map(|(m, v)| (v - m).powi(2)).sum();
            if dist < best_dist {
                best_dist = dist;
                best_label = sig.label;
            }
        }
        best_label
    }
}

/// Nearest-centroid classifier
#[derive(Debug, Clone, Copy, Default)]
pub struct MinimumDistance;

impl Classifier for MinimumDistance {
    fn kind(&self) -> ClassifierKind {
        ClassifierKind::MinimumDistance
    }

    fn fit(&self, samples: &SampleSet) -> Result<Box<dyn TrainedModel>> {
        let signatures = signatures_from_samples(samples)?;
        Ok(finish(ClassifierKind::MinimumDistance, CentroidModel { signatures }, samples))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_clusters() -> SampleSet {
        let mut rows = Vec::new();
        for i in 0..10 {
            rows.push((vec![10.0 + i as f64, 0.0], 1.0));
            rows.push((vec![50.0 + i as f64, 1.0], 2.0));
        }
        SampleSet::from_rows(vec!["a".into(), "b".into()], "class", rows)
    }

    #[test]
    fn test_signatures_from_samples() {
        let sigs = signatures_from_samples(&two_clusters()).unwrap();
        assert_eq!(sigs.len(), 2);
        assert_eq!(sigs[0].label, 1.0);
        assert!((sigs[0].mean[0] - 14.5).abs() < 1e-10);
        assert!((sigs[1].mean[0] - 54.5).abs() < 1e-10);
        assert!(sigs[0].std_dev[1] > 0.0);
        assert_eq!(sigs[1].count, 10);
    }

    #[test]
    fn test_minimum_distance_basic() {
        let model = MinimumDistance.fit(&two_clusters()).unwrap();
        assert_eq!(model.predict(&[12.0, 0.0]), 1.0);
        assert_eq!(model.predict(&[48.0, 1.0]), 2.0);
        // only the 0/1 labels are scored
        assert_eq!(model.training_confusion().true_positive, 10);
        assert_eq!(model.training_confusion().total(), 10);
    }
}
