//! Training and validation samples

use std::collections::BTreeMap;

/// One sampled pixel
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub row: usize,
    pub col: usize,
    /// Feature values in [`SampleSet::feature_names`] order
    pub features: Vec<f64>,
    pub label: f64,
}

/// A set of labelled pixels drawn from one image
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleSet {
    pub feature_names: Vec<String>,
    pub label_name: String,
    pub samples: Vec<Sample>,
}

impl SampleSet {
    pub fn new(feature_names: Vec<String>, label_name: impl Into<String>) -> Self {
        Self {
            feature_names,
            label_name: label_name.into(),
            samples: Vec::new(),
        }
    }

    /// Build a set from plain feature rows and labels (pixel positions zero)
    pub fn from_rows(feature_names: Vec<String>, label_name: impl Into<String>, rows: Vec<(Vec<f64>, f64)>) -> Self {
        let mut set = Self::new(feature_names, label_name);
        set.samples = rows
            .into_iter()
            .map(|(features, label)| Sample {
                row: 0,
                col: 0,
                features,
                label,
            })
            .collect();
        set
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Number of feature columns
    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    /// Distinct labels, ascending
    pub fn classes(&self) -> Vec<f64> {
        let mut classes: Vec<f64> = Vec::new();
        for s in &self.samples {
            if !classes.contains(&s.label) {
                classes.push(s.label);
            }
        }
        classes.sort_by(|a, b| a.total_cmp(b));
        classes
    }

    /// Number of samples per label
    pub fn class_counts(&self) -> BTreeMap<i64, usize> {
        let mut counts = BTreeMap::new();
        for s in &self.samples {
            *counts.entry(s.label.round() as i64).or_insert(0) += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes_are_sorted_and_unique() {
        let set = SampleSet::from_rows(
            vec!["a".into()],
            "class",
            vec![(vec![0.1], 1.0), (vec![0.2], 0.0), (vec![0.3], 1.0)],
        );
        assert_eq!(set.classes(), vec![0.0, 1.0]);
        assert_eq!(set.class_counts().get(&1), Some(&2));
        assert_eq!(set.n_features(), 1);
    }
}
