//! Linear classifiers: maximum entropy (logistic regression), perceptron,
//! linear SVM (Pegasos) and Winnow
//!
//! Multi-class problems are handled one-vs-rest: one weight vector per
//! class, prediction is the class with the highest score. Weight vectors
//! carry the bias as their last element.

use firescar_core::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::model::{check_trainable, class_index, finish, Classifier, ClassifierKind, Predict, TrainedModel};
use crate::sampling::SampleSet;

/// Feature preprocessing fitted on the training set
#[derive(Debug, Clone)]
enum Prep {
    /// Zero mean, unit variance
    Standardize { mean: Vec<f64>, scale: Vec<f64> },
    /// Map to [0, 1] and append the complements `1 - x`
    UnitRange { min: Vec<f64>, span: Vec<f64> },
}

impl Prep {
    fn standardize(samples: &SampleSet) -> Self {
        let nf = samples.n_features();
        let n = samples.len() as f64;
        let mut mean = vec![0.0; nf];
        for s in samples.iter() {
            for (m, v) in mean.iter_mut().zip(&s.features) {
                *m += v / n;
            }
        }
        let mut var = vec![0.0; nf];
        for s in samples.iter() {
            for ((acc, v), m) in var.iter_mut().zip(&s.features).zip(&mean) {
                *acc += (v - m).powi(2) / n;
            }
        }
        let scale = var.iter().map(|v| if *v > 1e-24 { v.sqrt() } else { 1.0 }).collect();
        Prep::Standardize { mean, scale }
    }

    fn unit_range(samples: &SampleSet) -> Self {
        let nf = samples.n_features();
        let mut min = vec![f64::INFINITY; nf];
        let mut max = vec![f64::NEG_INFINITY; nf];
        for s in samples.iter() {
            for (f, &v) in s.features.iter().enumerate() {
                min[f] = min[f].min(v);
                max[f] = max[f].max(v);
            }
        }
        let span = min
            .iter()
            .zip(&max)
            .map(|(lo, hi)| if hi - lo > 1e-24 { hi - lo } else { 1.0 })
            .collect();
        Prep::UnitRange { min, span }
    }

    fn apply(&self, x: &[f64]) -> Vec<f64> {
        match self {
            Prep::Standardize { mean, scale } => {
                x.iter().zip(mean).zip(scale).map(|((v, m), s)| (v - m) / s).collect()
            }
            Prep::UnitRange { min, span } => {
                let unit: Vec<f64> = x
                    .iter()
                    .zip(min)
                    .zip(span)
                    .map(|((v, lo), s)| ((v - lo) / s).clamp(0.0, 1.0))
                    .collect();
                let complement: Vec<f64> = unit.iter().map(|u| 1.0 - u).collect();
                [unit, complement].concat()
            }
        }
    }
}

fn score(w: &[f64], x: &[f64]) -> f64 {
    let dim = x.len();
    w[..dim].iter().zip(x).map(|(a, b)| a * b).sum::<f64>() + w[dim]
}

#[derive(Debug, Clone)]
struct LinearModel {
    classes: Vec<f64>,
    prep: Prep,
    weights: Vec<Vec<f64>>,
}

impl Predict for LinearModel {
    fn predict_finite(&self, features: &[f64]) -> f64 {
        let x = self.prep.apply(features);
        let mut best = 0;
        let mut best_score = f64::NEG_INFINITY;
        for (c, w) in self.weights.iter().enumerate() {
            let s = score(w, &x);
            if s > best_score {
                best_score = s;
                best = c;
            }
        }
        self.classes[best]
    }
}

/// Preprocessed training rows plus class indices
struct Prepared {
    classes: Vec<f64>,
    prep: Prep,
    x: Vec<Vec<f64>>,
    y: Vec<usize>,
}

impl Prepared {
    fn new(samples: &SampleSet, prep: Prep) -> Result<Self> {
        let classes = check_trainable(samples)?;
        let x = samples.iter().map(|s| prep.apply(&s.features)).collect();
        let y = samples.iter().map(|s| class_index(&classes, s.label)).collect();
        Ok(Self { classes, prep, x, y })
    }

    fn dim(&self) -> usize {
        self.x.first().map_or(0, Vec::len)
    }

    /// Train one binary model per class (`+1` for the class, `-1` otherwise)
    fn one_vs_rest<F>(self, mut train: F) -> LinearModel
    where
        F: FnMut(&[Vec<f64>], &[f64]) -> Vec<f64>,
    {
        let weights = (0..self.classes.len())
            .map(|c| {
                let targets: Vec<f64> = self.y.iter().map(|&y| if y == c { 1.0 } else { -1.0 }).collect();
                train(&self.x, &targets)
            })
            .collect();
        LinearModel {
            classes: self.classes,
            prep: self.prep,
            weights,
        }
    }
}

/// Parameters for [`MaxEnt`]
#[derive(Debug, Clone)]
pub struct MaxEnt {
    pub iterations: usize,
    pub learning_rate: f64,
    /// L2 penalty on the weights (not the bias)
    pub l2: f64,
}

impl Default for MaxEnt {
    fn default() -> Self {
        Self {
            iterations: 300,
            learning_rate: 0.5,
            l2: 1e-4,
        }
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

impl Classifier for MaxEnt {
    fn kind(&self) -> ClassifierKind {
        ClassifierKind::MaxEnt
    }

    fn fit(&self, samples: &SampleSet) -> Result<Box<dyn TrainedModel>> {
        let data = Prepared::new(samples, Prep::standardize(samples))?;
        let dim = data.dim();
        let (iterations, lr, l2) = (self.iterations, self.learning_rate, self.l2);

        let model = data.one_vs_rest(|x, targets| {
            let n = x.len() as f64;
            let mut w = vec![0.0; dim + 1];
            for _ in 0..iterations {
                let mut grad = vec![0.0; dim + 1];
                for (xi, &t) in x.iter().zip(targets) {
                    let y = if t > 0.0 { 1.0 } else { 0.0 };
                    let err = sigmoid(score(&w, xi)) - y;
                    for (g, v) in grad.iter_mut().zip(xi) {
                        *g += err * v;
                    }
                    grad[dim] += err;
                }
                for j in 0..=dim {
                    let penalty = if j < dim { l2 * w[j] } else { 0.0 };
                    w[j] -= lr * (grad[j] / n + penalty);
                }
            }
            w
        });
        Ok(finish(ClassifierKind::MaxEnt, model, samples))
    }
}

/// Averaged perceptron
#[derive(Debug, Clone)]
pub struct Perceptron {
    pub epochs: usize,
    pub learning_rate: f64,
}

impl Default for Perceptron {
    fn default() -> Self {
        Self {
            epochs: 50,
            learning_rate: 1.0,
        }
    }
}

impl Classifier for Perceptron {
    fn kind(&self) -> ClassifierKind {
        ClassifierKind::Perceptron
    }

    fn fit(&self, samples: &SampleSet) -> Result<Box<dyn TrainedModel>> {
        let data = Prepared::new(samples, Prep::standardize(samples))?;
        let dim = data.dim();
        let (epochs, lr) = (self.epochs.max(1), self.learning_rate);

        let model = data.one_vs_rest(|x, targets| {
            let mut w = vec![0.0; dim + 1];
            let mut sum = vec![0.0; dim + 1];
            let mut steps = 0usize;
            for _ in 0..epochs {
                for (xi, &t) in x.iter().zip(targets) {
                    if t * score(&w, xi) <= 0.0 {
                        for (wj, v) in w.iter_mut().zip(xi) {
                            *wj += lr * t * v;
                        }
                        w[dim] += lr * t;
                    }
                    for (s, wj) in sum.iter_mut().zip(&w) {
                        *s += wj;
                    }
                    steps += 1;
                }
            }
            sum.iter().map(|s| s / steps as f64).collect()
        });
        Ok(finish(ClassifierKind::Perceptron, model, samples))
    }
}

/// Linear support vector machine trained with Pegasos
#[derive(Debug, Clone)]
pub struct Svm {
    pub lambda: f64,
    /// Stochastic steps per training sample
    pub steps_per_sample: usize,
    pub max_steps: usize,
    pub seed: u64,
}

impl Default for Svm {
    fn default() -> Self {
        Self {
            lambda: 1e-3,
            steps_per_sample: 20,
            max_steps: 200_000,
            seed: 42,
        }
    }
}

impl Classifier for Svm {
    fn kind(&self) -> ClassifierKind {
        ClassifierKind::Svm
    }

    fn fit(&self, samples: &SampleSet) -> Result<Box<dyn TrainedModel>> {
        let data = Prepared::new(samples, Prep::standardize(samples))?;
        let dim = data.dim();
        let lambda = self.lambda.max(1e-12);
        let steps = (samples.len() * self.steps_per_sample).clamp(1, self.max_steps.max(1));
        let seed = self.seed;

        let model = data.one_vs_rest(|x, targets| {
            let mut rng = StdRng::seed_from_u64(seed);
            // bias folded in as a constant feature, so it is regularized too
            let mut w = vec![0.0; dim + 1];
            for t in 1..=steps {
                let i = rng.gen_range(0..x.len());
                let eta = 1.0 / (lambda * t as f64);
                let margin = targets[i] * score(&w, &x[i]);
                let shrink = 1.0 - eta * lambda;
                w.iter_mut().for_each(|wj| *wj *= shrink);
                if margin < 1.0 {
                    for (wj, v) in w.iter_mut().zip(&x[i]) {
                        *wj += eta * targets[i] * v;
                    }
                    w[dim] += eta * targets[i];
                }
            }
            w
        });
        Ok(finish(ClassifierKind::Svm, model, samples))
    }
}

/// Balanced Winnow over features scaled to [0, 1] plus their complements
#[derive(Debug, Clone)]
pub struct Winnow {
    pub epochs: usize,
    /// Multiplicative promotion factor; demotion divides by it
    pub alpha: f64,
}

impl Default for Winnow {
    fn default() -> Self {
        Self {
            epochs: 20,
            alpha: 2.0,
        }
    }
}

impl Classifier for Winnow {
    fn kind(&self) -> ClassifierKind {
        ClassifierKind::Winnow
    }

    fn fit(&self, samples: &SampleSet) -> Result<Box<dyn TrainedModel>> {
        let data = Prepared::new(samples, Prep::unit_range(samples))?;
        let dim = data.dim();
        let (epochs, alpha) = (self.epochs.max(1), self.alpha.max(1.0 + 1e-9));
        let threshold = dim as f64 / 2.0;

        let model = data.one_vs_rest(|x, targets| {
            let mut w = vec![1.0; dim + 1];
            w[dim] = -threshold;
            for _ in 0..epochs {
                for (xi, &t) in x.iter().zip(targets) {
                    let s = score(&w, xi);
                    let predicted = if s > 0.0 { 1.0 } else { -1.0 };
                    if predicted != t {
                        for (wj, v) in w[..dim].iter_mut().zip(xi) {
                            *wj *= alpha.powf(t * v);
                        }
                    }
                }
            }
            w
        });
        Ok(finish(ClassifierKind::Winnow, model, samples))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Burned pixels have a strongly negative NBR delta
    fn linearly_separable() -> SampleSet {
        let mut rows = Vec::new();
        for i in 0..50 {
            let step = i as f64 / 50.0;
            rows.push((vec![-0.6 + 0.2 * step, 0.2 + 0.1 * step], 1.0));
            rows.push((vec![0.1 + 0.2 * step, 0.5 + 0.1 * step], 0.0));
        }
        SampleSet::from_rows(vec!["NBR delta".into(), "NDVI pre".into()], "class", rows)
    }

    fn check(classifier: &dyn Classifier) {
        let set = linearly_separable();
        let model = classifier.fit(&set).unwrap();
        assert_eq!(model.predict(&[-0.55, 0.22]), 1.0, "{}", classifier.kind());
        assert_eq!(model.predict(&[0.25, 0.58]), 0.0, "{}", classifier.kind());
        assert!(model.training_confusion().accuracy() > 0.95, "{}", classifier.kind());
        assert!(model.predict(&[f64::INFINITY, 0.0]).is_nan());
    }

    #[test]
    fn maxent_separates() {
        check(&MaxEnt::default());
    }

    #[test]
    fn perceptron_separates() {
        check(&Perceptron::default());
    }

    #[test]
    fn svm_separates() {
        check(&Svm::default());
    }

    #[test]
    fn winnow_separates() {
        check(&Winnow::default());
    }

    #[test]
    fn svm_is_deterministic_for_a_seed() {
        let set = linearly_separable();
        let a = Svm::default().fit(&set).unwrap();
        let b = Svm::default().fit(&set).unwrap();
        assert_eq!(a.predict(&[0.0, 0.4]), b.predict(&[0.0, 0.4]));
    }
}
