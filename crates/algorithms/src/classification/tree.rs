//! Decision trees (CART) and random forests
//!
//! Trees use binary splits `x[feature] <= threshold` chosen by Gini
//! impurity, with thresholds at midpoints between consecutive distinct
//! training values.

use firescar_core::Result;
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};

use super::model::{check_trainable, class_index, finish, Classifier, ClassifierKind, Predict, TrainedModel};
use crate::maybe_rayon::*;
use crate::sampling::SampleSet;

/// Parameters for a single tree
#[derive(Debug, Clone)]
pub struct TreeParams {
    pub max_depth: usize,
    /// Minimum number of samples in each leaf
    pub min_leaf: usize,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: 20,
            min_leaf: 1,
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf(usize),
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn predict(&self, x: &[f64]) -> usize {
        let mut node = self;
        loop {
            match node {
                Node::Leaf(class) => return *class,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if x[*feature] <= *threshold { left } else { right };
                }
            }
        }
    }
}

struct TrainData<'a> {
    x: Vec<&'a [f64]>,
    y: Vec<usize>,
    n_classes: usize,
    n_features: usize,
}

impl<'a> TrainData<'a> {
    fn new(samples: &'a SampleSet, classes: &[f64]) -> Self {
        Self {
            x: samples.iter().map(|s| s.features.as_slice()).collect(),
            y: samples.iter().map(|s| class_index(classes, s.label)).collect(),
            n_classes: classes.len(),
            n_features: samples.n_features(),
        }
    }
}

fn gini(counts: &[usize], n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let n = n as f64;
    1.0 - counts.iter().map(|&c| (c as f64 / n).powi(2)).sum::<f64>()
}

fn majority(counts: &[usize]) -> usize {
    let mut best = 0;
    for (i, &c) in counts.iter().enumerate() {
        if c > counts[best] {
            best = i;
        }
    }
    best
}

struct Grower<'a, 'd> {
    data: &'d TrainData<'a>,
    params: &'d TreeParams,
    /// Features tried per split; `None` tries all
    max_features: Option<usize>,
    rng: Option<StdRng>,
}

impl<'a, 'd> Grower<'a, 'd> {
    fn candidate_features(&mut self) -> Vec<usize> {
        let nf = self.data.n_features;
        match (self.max_features, self.rng.as_mut()) {
            (Some(k), Some(rng)) if k < nf => index::sample(rng, nf, k).into_vec(),
            _ => (0..nf).collect(),
        }
    }

    fn grow(&mut self, indices: &mut [usize], depth: usize) -> Node {
        let n = indices.len();
        let mut counts = vec![0usize; self.data.n_classes];
        for &i in indices.iter() {
            counts[self.data.y[i]] += 1;
        }
        let leaf = majority(&counts);
        let parent = gini(&counts, n);
        if parent == 0.0 || depth >= self.params.max_depth || n < 2 * self.params.min_leaf.max(1) {
            return Node::Leaf(leaf);
        }

        let mut best: Option<(f64, usize, f64)> = None;
        for feature in self.candidate_features() {
            if let Some((impurity, threshold)) = self.best_split(indices, feature, &counts) {
                if best.map_or(true, |(b, _, _)| impurity < b) {
                    best = Some((impurity, feature, threshold));
                }
            }
        }

        let (feature, threshold) = match best {
            Some((impurity, feature, threshold)) if impurity < parent - 1e-12 => (feature, threshold),
            _ => return Node::Leaf(leaf),
        };

        // partition in place: left side first
        let mut split = 0;
        for i in 0..n {
            if self.data.x[indices[i]][feature] <= threshold {
                indices.swap(i, split);
                split += 1;
            }
        }
        let (left, right) = indices.split_at_mut(split);
        Node::Split {
            feature,
            threshold,
            left: Box::new(self.grow(left, depth + 1)),
            right: Box::new(self.grow(right, depth + 1)),
        }
    }

    /// Lowest weighted Gini over thresholds of one feature
    fn best_split(&self, indices: &[usize], feature: usize, total: &[usize]) -> Option<(f64, f64)> {
        let mut order: Vec<usize> = indices.to_vec();
        order.sort_by(|&a, &b| self.data.x[a][feature].total_cmp(&self.data.x[b][feature]));

        let n = order.len();
        let min_leaf = self.params.min_leaf.max(1);
        let mut left = vec![0usize; total.len()];
        let mut right = total.to_vec();
        let mut best: Option<(f64, f64)> = None;

        for pos in 0..n - 1 {
            let class = self.data.y[order[pos]];
            left[class] += 1;
            right[class] -= 1;

            let here = self.data.x[order[pos]][feature];
            let next = self.data.x[order[pos + 1]][feature];
            let n_left = pos + 1;
            if here == next || n_left < min_leaf || n - n_left < min_leaf {
                continue;
            }
            let weighted =
                (n_left as f64 * gini(&left, n_left) + (n - n_left) as f64 * gini(&right, n - n_left)) / n as f64;
            if best.map_or(true, |(b, _)| weighted < b) {
                best = Some((weighted, here + (next - here) / 2.0));
            }
        }
        best
    }
}

#[derive(Debug, Clone)]
struct TreeModel {
    classes: Vec<f64>,
    root: Node,
}

impl Predict for TreeModel {
    fn predict_finite(&self, features: &[f64]) -> f64 {
        self.classes[self.root.predict(features)]
    }
}

/// Classification and regression tree
#[derive(Debug, Clone, Default)]
pub struct Cart {
    pub params: TreeParams,
}

impl Classifier for Cart {
    fn kind(&self) -> ClassifierKind {
        ClassifierKind::Cart
    }

    fn fit(&self, samples: &SampleSet) -> Result<Box<dyn TrainedModel>> {
        let classes = check_trainable(samples)?;
        let data = TrainData::new(samples, &classes);
        let mut grower = Grower {
            data: &data,
            params: &self.params,
            max_features: None,
            rng: None,
        };
        let mut indices: Vec<usize> = (0..samples.len()).collect();
        let root = grower.grow(&mut indices, 0);
        Ok(finish(ClassifierKind::Cart, TreeModel { classes, root }, samples))
    }
}

/// Parameters for [`RandomForest`]
#[derive(Debug, Clone)]
pub struct ForestParams {
    pub n_trees: usize,
    /// Features tried per split; `None` uses `sqrt(n_features)`
    pub max_features: Option<usize>,
    pub tree: TreeParams,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 50,
            max_features: None,
            tree: TreeParams::default(),
            seed: 42,
        }
    }
}

#[derive(Debug, Clone)]
struct ForestModel {
    classes: Vec<f64>,
    trees: Vec<Node>,
}

impl Predict for ForestModel {
    fn predict_finite(&self, features: &[f64]) -> f64 {
        let mut votes = vec![0usize; self.classes.len()];
        for tree in &self.trees {
            votes[tree.predict(features)] += 1;
        }
        self.classes[majority(&votes)]
    }
}

/// Bagged trees with random feature subsets per split
#[derive(Debug, Clone, Default)]
pub struct RandomForest {
    pub params: ForestParams,
}

impl Classifier for RandomForest {
    fn kind(&self) -> ClassifierKind {
        ClassifierKind::RandomForest
    }

    fn fit(&self, samples: &SampleSet) -> Result<Box<dyn TrainedModel>> {
        let classes = check_trainable(samples)?;
        let data = TrainData::new(samples, &classes);
        let n = samples.len();
        let max_features = self
            .params
            .max_features
            .unwrap_or_else(|| (data.n_features as f64).sqrt().round().max(1.0) as usize);

        let seeds: Vec<u64> = (0..self.params.n_trees.max(1) as u64)
            .map(|t| self.params.seed.wrapping_add(t))
            .collect();
        let trees: Vec<Node> = seeds
            .par_iter()
            .map(|&seed| {
                let mut rng = StdRng::seed_from_u64(seed);
                let mut bootstrap: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                let mut grower = Grower {
                    data: &data,
                    params: &self.params.tree,
                    max_features: Some(max_features),
                    rng: Some(rng),
                };
                grower.grow(&mut bootstrap, 0)
            })
            .collect();

        Ok(finish(ClassifierKind::RandomForest, ForestModel { classes, trees }, samples))
    }
}
