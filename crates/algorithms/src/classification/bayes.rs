//! Naive Bayes classifiers
//!
//! Both assume features are independent given the class. [`NaiveBayes`]
//! discretizes each feature into equal-width bins over its training range;
//! [`ContinuousNaiveBayes`] fits one Gaussian per class and feature.

use firescar_core::Result;

use super::model::{check_trainable, class_index, finish, Classifier, ClassifierKind, Predict, TrainedModel};
use crate::sampling::SampleSet;

/// Parameters for [`NaiveBayes`]
#[derive(Debug, Clone)]
pub struct NaiveBayesParams {
    pub bins: usize,
    /// Additive smoothing applied to every bin count
    pub smoothing: f64,
}

impl Default for NaiveBayesParams {
    fn default() -> Self {
        Self {
            bins: 16,
            smoothing: 1.0,
        }
    }
}

fn argmax(scores: &[f64]) -> usize {
    let mut best = 0;
    for (i, &s) in scores.iter().enumerate() {
        if s > scores[best] {
            best = i;
        }
    }
    best
}

fn log_priors(samples: &SampleSet, classes: &[f64]) -> (Vec<usize>, Vec<f64>) {
    let mut counts = vec![0usize; classes.len()];
    for s in samples.iter() {
        counts[class_index(classes, s.label)] += 1;
    }
    let n = samples.len() as f64;
    let priors = counts.iter().map(|&c| (c as f64 / n).ln()).collect();
    (counts, priors)
}

#[derive(Debug, Clone)]
struct BinnedModel {
    classes: Vec<f64>,
    log_prior: Vec<f64>,
    /// (min, width) per feature
    edges: Vec<(f64, f64)>,
    bins: usize,
    /// `log_prob[class][feature * bins + bin]`
    log_prob: Vec<Vec<f64>>,
}

impl BinnedModel {
    fn bin(&self, feature: usize, v: f64) -> usize {
        let (min, width) = self.edges[feature];
        if width <= 0.0 {
            return 0;
        }
        let b = ((v - min) / width).floor();
        if b < 0.0 {
            0
        } else {
            (b as usize).min(self.bins - 1)
        }
    }
}

impl Predict for BinnedModel {
    fn predict_finite(&self, features: &[f64]) -> f64 {
        let scores: Vec<f64> = (0..self.classes.len())
            .map(|c| {
                self.log_prior[c]
                    + features
                        .iter()
                        .enumerate()
                        .map(|(f, &v)| self.log_prob[c][f * self.bins + self.bin(f, v)])
                        .sum::<f64>()
            })
            .collect();
        self.classes[argmax(&scores)]
    }
}

/// Multinomial naive Bayes over binned features
#[derive(Debug, Clone, Default)]
pub struct NaiveBayes {
    pub params: NaiveBayesParams,
}

impl Classifier for NaiveBayes {
    fn kind(&self) -> ClassifierKind {
        ClassifierKind::NaiveBayes
    }

    fn fit(&self, samples: &SampleSet) -> Result<Box<dyn TrainedModel>> {
        let classes = check_trainable(samples)?;
        let nf = samples.n_features();
        let bins = self.params.bins.max(1);

        let edges: Vec<(f64, f64)> = (0..nf)
            .map(|f| {
                let (lo, hi) = samples.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), s| {
                    (lo.min(s.features[f]), hi.max(s.features[f]))
                });
                (lo, (hi - lo) / bins as f64)
            })
            .collect();

        let (class_counts, log_prior) = log_priors(samples, &classes);
        let mut model = BinnedModel {
            classes,
            log_prior,
            edges,
            bins,
            log_prob: Vec::new(),
        };

        let mut counts = vec![vec![0usize; nf * bins]; model.classes.len()];
        for s in samples.iter() {
            let c = class_index(&model.classes, s.label);
            for (f, &v) in s.features.iter().enumerate() {
                counts[c][f * bins + model.bin(f, v)] += 1;
            }
        }
        let alpha = self.params.smoothing.max(1e-12);
        model.log_prob = counts
            .iter()
            .zip(&class_counts)
            .map(|(per_class, &n)| {
                let denom = n as f64 + alpha * bins as f64;
                per_class.iter().map(|&k| ((k as f64 + alpha) / denom).ln()).collect()
            })
            .collect();

        Ok(finish(ClassifierKind::NaiveBayes, model, samples))
    }
}

#[derive(Debug, Clone)]
struct GaussianModel {
    classes: Vec<f64>,
    log_prior: Vec<f64>,
    /// (mean, variance) per class and feature
    moments: Vec<Vec<(f64, f64)>>,
}

impl Predict for GaussianModel {
    fn predict_finite(&self, features: &[f64]) -> f64 {
        let scores: Vec<f64> = self
            .moments
            .iter()
            .zip(&self.log_prior)
            .map(|(moments, prior)| {
                prior
                    + features
                        .iter()
                        .zip(moments)
                        .map(|(&x, &(mean, var))| {
                            -0.5 * ((2.0 * std::f64::consts::PI * var).ln() + (x - mean).powi(2) / var)
                        })
                        .sum::<f64>()
            })
            .collect();
        self.classes[argmax(&scores)]
    }
}

/// Gaussian naive Bayes
#[derive(Debug, Clone)]
pub struct ContinuousNaiveBayes {
    /// Added to every variance, relative to the largest feature variance
    pub var_smoothing: f64,
}

impl Default for ContinuousNaiveBayes {
    fn default() -> Self {
        Self { var_smoothing: 1e-9 }
    }
}

impl Classifier for ContinuousNaiveBayes {
    fn kind(&self) -> ClassifierKind {
        ClassifierKind::ContinuousNaiveBayes
    }

    fn fit(&self, samples: &SampleSet) -> Result<Box<dyn TrainedModel>> {
        let classes = check_trainable(samples)?;
        let nf = samples.n_features();
        let (class_counts, log_prior) = log_priors(samples, &classes);

        let mut sums = vec![vec![(0.0, 0.0); nf]; classes.len()];
        for s in samples.iter() {
            let c = class_index(&classes, s.label);
            for (acc, &v) in sums[c].iter_mut().zip(&s.features) {
                acc.0 += v;
                acc.1 += v * v;
            }
        }

        let mut moments: Vec<Vec<(f64, f64)>> = sums
            .iter()
            .zip(&class_counts)
            .map(|(per_class, &n)| {
                let n = n as f64;
                per_class
                    .iter()
                    .map(|&(s, sq)| {
                        let mean = s / n;
                        (mean, (sq / n - mean * mean).max(0.0))
                    })
                    .collect()
            })
            .collect();

        let max_var = moments.iter().flatten().map(|m| m.1).fold(0.0, f64::max);
        let epsilon = (self.var_smoothing * max_var).max(1e-12);
        for m in moments.iter_mut().flatten() {
            m.1 += epsilon;
        }

        let model = GaussianModel {
            classes,
            log_prior,
            moments,
        };
        Ok(finish(ClassifierKind::ContinuousNaiveBayes, model, samples))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn separable() -> SampleSet {
        let mut rows = Vec::new();
        for i in 0..40 {
            let jitter = (i % 7) as f64 * 0.01;
            rows.push((vec![-0.4 + jitter, 0.1 + jitter], 1.0));
            rows.push((vec![0.05 + jitter, 0.6 - jitter], 0.0));
        }
        SampleSet::from_rows(vec!["NBR delta".into(), "NDVI post".into()], "class", rows)
    }

    #[test]
    fn binned_bayes_separates_clusters() {
        let model = NaiveBayes::default().fit(&separable()).unwrap();
        assert_eq!(model.predict(&[-0.38, 0.12]), 1.0);
        assert_eq!(model.predict(&[0.08, 0.58]), 0.0);
        assert_eq!(model.training_confusion().accuracy(), 1.0);
    }

    #[test]
    fn binned_bayes_clamps_out_of_range_values() {
        let model = NaiveBayes::default().fit(&separable()).unwrap();
        assert_eq!(model.predict(&[-5.0, 0.0]), 1.0);
        assert_eq!(model.predict(&[5.0, 5.0]), 0.0);
    }

    #[test]
    fn gaussian_bayes_separates_clusters() {
        let model = ContinuousNaiveBayes::default().fit(&separable()).unwrap();
        assert_eq!(model.predict(&[-0.35, 0.15]), 1.0);
        assert_eq!(model.predict(&[0.1, 0.55]), 0.0);
        assert_eq!(model.training_confusion().accuracy(), 1.0);
    }

    #[test]
    fn constant_feature_does_not_break_gaussian() {
        let set = SampleSet::from_rows(
            vec!["a".into(), "b".into()],
            "class",
            vec![(vec![1.0, 0.0], 0.0), (vec![1.0, 0.1], 0.0), (vec![1.0, 0.9], 1.0), (vec![1.0, 1.0], 1.0)],
        );
        let model = ContinuousNaiveBayes::default().fit(&set).unwrap();
        assert_eq!(model.predict(&[1.0, 0.95]), 1.0);
    }
}
