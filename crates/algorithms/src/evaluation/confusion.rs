//! Binary confusion matrices

use std::fmt;
use std::ops::{Add, AddAssign};

use firescar_core::{Image, Raster, Result};
use serde::{Deserialize, Serialize};

use crate::maybe_rayon::*;

/// 2x2 confusion counts for burned (1) / unburned (0) labels.
///
/// The matrix view is indexed `[predicted][actual]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConfusionCounts {
    pub true_negative: u64,
    pub false_negative: u64,
    pub false_positive: u64,
    pub true_positive: u64,
}

impl ConfusionCounts {
    pub fn new(true_negative: u64, false_negative: u64, false_positive: u64, true_positive: u64) -> Self {
        Self {
            true_negative,
            false_negative,
            false_positive,
            true_positive,
        }
    }

    /// Tally `(predicted, actual)` label pairs. Pairs with a missing or
    /// non-binary label are skipped.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        let mut counts = Self::default();
        for (predicted, actual) in pairs {
            counts.record(predicted, actual);
        }
        counts
    }

    /// Add one `(predicted, actual)` pair; returns false when skipped
    pub fn record(&mut self, predicted: f64, actual: f64) -> bool {
        match (binary(predicted), binary(actual)) {
            (Some(p), Some(a)) => {
                self.record_bin(2 * p + a);
                true
            }
            _ => false,
        }
    }

    fn record_bin(&mut self, bin: u8) {
        match bin {
            0 => self.true_negative += 1,
            1 => self.false_negative += 1,
            2 => self.false_positive += 1,
            _ => self.true_positive += 1,
        }
    }

    /// Counts as `[predicted][actual]`
    pub fn matrix(&self) -> [[u64; 2]; 2] {
        [
            [self.true_negative, self.false_negative],
            [self.false_positive, self.true_positive],
        ]
    }

    /// Class labels in matrix order
    pub fn order(&self) -> [u8; 2] {
        [0, 1]
    }

    pub fn total(&self) -> u64 {
        self.true_negative + self.false_negative + self.false_positive + self.true_positive
    }

    /// Fraction of correctly labelled cells; NaN when empty
    pub fn accuracy(&self) -> f64 {
        let n = self.total();
        if n == 0 {
            return f64::NAN;
        }
        (self.true_negative + self.true_positive) as f64 / n as f64
    }

    /// Cohen's kappa; NaN when empty or when chance agreement is 1
    pub fn kappa(&self) -> f64 {
        let n = self.total() as f64;
        if n == 0.0 {
            return f64::NAN;
        }
        let predicted_neg = (self.true_negative + self.false_negative) as f64;
        let predicted_pos = (self.false_positive + self.true_positive) as f64;
        let actual_neg = (self.true_negative + self.false_positive) as f64;
        let actual_pos = (self.false_negative + self.true_positive) as f64;

        let observed = self.accuracy();
        let chance = (predicted_neg * actual_neg + predicted_pos * actual_pos) / (n * n);
        if (1.0 - chance).abs() < 1e-15 {
            return f64::NAN;
        }
        (observed - chance) / (1.0 - chance)
    }

    /// Per actual class, the fraction predicted correctly (recall)
    pub fn producers_accuracy(&self) -> [f64; 2] {
        [
            ratio(self.true_negative, self.true_negative + self.false_positive),
            ratio(self.true_positive, self.true_positive + self.false_negative),
        ]
    }

    /// Per predicted class, the fraction that is correct (precision)
    pub fn consumers_accuracy(&self) -> [f64; 2] {
        [
            ratio(self.true_negative, self.true_negative + self.false_negative),
            ratio(self.true_positive, self.true_positive + self.false_positive),
        ]
    }
}

fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 {
        f64::NAN
    } else {
        num as f64 / den as f64
    }
}

fn binary(v: f64) -> Option<u8> {
    if v == 0.0 {
        Some(0)
    } else if v == 1.0 {
        Some(1)
    } else {
        None
    }
}

impl Add for ConfusionCounts {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            true_negative: self.true_negative + rhs.true_negative,
            false_negative: self.false_negative + rhs.false_negative,
            false_positive: self.false_positive + rhs.false_positive,
            true_positive: self.true_positive + rhs.true_positive,
        }
    }
}

impl AddAssign for ConfusionCounts {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl fmt::Display for ConfusionCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[[{}, {}], [{}, {}]] accuracy={:.4} kappa={:.4}",
            self.true_negative,
            self.false_negative,
            self.false_positive,
            self.true_positive,
            self.accuracy(),
            self.kappa()
        )
    }
}

/// Confusion counts of a 0/1 prediction against 0/1 truth.
///
/// Only every `scale / cell_size`-th row and column is visited. Cells where
/// either raster is NaN (or not 0/1) are skipped.
pub fn confusion_counts(predicted: &Raster<f64>, truth: &Raster<f64>, scale: f64) -> Result<ConfusionCounts> {
    predicted.check_same_shape(truth)?;
    let (rows, cols) = predicted.shape();
    let stride = predicted.transform().stride_for_scale(scale);

    let rows_sampled: Vec<usize> = (0..rows).step_by(stride).collect();
    let partial: Vec<ConfusionCounts> = rows_sampled
        .par_iter()
        .map(|&row| {
            let mut counts = ConfusionCounts::default();
            for col in (0..cols).step_by(stride) {
                let p = unsafe { predicted.get_unchecked(row, col) };
                let t = unsafe { truth.get_unchecked(row, col) };
                counts.record(p, t);
            }
            counts
        })
        .collect();

    Ok(partial.into_iter().fold(ConfusionCounts::default(), Add::add))
}

/// Confusion counts for every band of a prediction image
pub fn confusion_by_band(
    predicted: &Image,
    truth: &Raster<f64>,
    scale: f64,
) -> Result<Vec<(String, ConfusionCounts)>> {
    predicted
        .iter()
        .map(|(name, band)| Ok((name.to_string(), confusion_counts(band, truth, scale)?)))
        .collect()
}

/// Raster of `2 * predicted + truth` (0..=3); NaN where either input is
/// missing or not 0/1
pub fn confusion_image(predicted: &Raster<f64>, truth: &Raster<f64>) -> Result<Raster<f64>> {
    predicted.check_same_shape(truth)?;
    let data: Vec<f64> = predicted
        .data()
        .iter()
        .zip(truth.data().iter())
        .map(|(&p, &t)| match (binary(p), binary(t)) {
            (Some(p), Some(t)) => f64::from(2 * p + t),
            _ => f64::NAN,
        })
        .collect();
    predicted.derive(data, Some(f64::NAN))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn known_counts_give_hand_computed_scores() {
        let cm = ConfusionCounts::new(10, 2, 3, 5);
        assert_eq!(cm.total(), 20);
        assert_relative_eq!(cm.accuracy(), 0.75, epsilon = 1e-12);
        // pe = (12 * 13 + 8 * 7) / 400 = 0.53
        assert_relative_eq!(cm.kappa(), (0.75 - 0.53) / (1.0 - 0.53), epsilon = 1e-9);
        assert_relative_eq!(cm.producers_accuracy()[1], 5.0 / 7.0, epsilon = 1e-12);
        assert_relative_eq!(cm.consumers_accuracy()[0], 10.0 / 12.0, epsilon = 1e-12);
        assert_eq!(cm.matrix(), [[10, 2], [3, 5]]);
    }

    #[test]
    fn empty_and_degenerate_matrices_give_nan() {
        let empty = ConfusionCounts::default();
        assert!(empty.accuracy().is_nan());
        assert!(empty.kappa().is_nan());

        let all_negative = ConfusionCounts::new(7, 0, 0, 0);
        assert_relative_eq!(all_negative.accuracy(), 1.0);
        assert!(all_negative.kappa().is_nan());
    }

    #[test]
    fn perfect_agreement_has_unit_kappa() {
        let cm = ConfusionCounts::new(40, 0, 0, 60);
        assert_relative_eq!(cm.accuracy(), 1.0);
        assert_relative_eq!(cm.kappa(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn from_pairs_skips_missing_labels() {
        let cm = ConfusionCounts::from_pairs([(1.0, 1.0), (0.0, 1.0), (f64::NAN, 0.0), (1.0, 0.0), (2.0, 1.0)]);
        assert_eq!(cm, ConfusionCounts::new(0, 1, 1, 1));
    }

    #[test]
    fn raster_counts_skip_nan_and_respect_scale() {
        let predicted = Raster::from_vec(vec![0.0, 1.0, 1.0, 0.0, f64::NAN, 1.0, 0.0, 0.0, 1.0], 3, 3).unwrap();
        let truth = Raster::from_vec(vec![0.0, 1.0, 0.0, 1.0, 1.0, f64::NAN, 0.0, 1.0, 1.0], 3, 3).unwrap();

        let all = confusion_counts(&predicted, &truth, 1.0).unwrap();
        assert_eq!(all, ConfusionCounts::new(2, 2, 1, 2));

        // default transform has 1-unit cells: scale 2 visits rows/cols 0 and 2
        let coarse = confusion_counts(&predicted, &truth, 2.0).unwrap();
        assert_eq!(coarse, ConfusionCounts::new(2, 0, 1, 1));
    }

    #[test]
    fn confusion_image_encodes_bins() {
        let predicted = Raster::from_vec(vec![0.0, 0.0, 1.0, 1.0, f64::NAN], 1, 5).unwrap();
        let truth = Raster::from_vec(vec![0.0, 1.0, 0.0, 1.0, 1.0], 1, 5).unwrap();
        let img = confusion_image(&predicted, &truth).unwrap();
        let values: Vec<f64> = img.data().iter().take(4).copied().collect();
        assert_eq!(values, vec![0.0, 1.0, 2.0, 3.0]);
        assert!(img.get(0, 4).unwrap().is_nan());
    }
}
