//! Land-cover x burn strata for stratified sampling

use std::collections::BTreeMap;

use firescar_core::{Raster, Result};

use crate::maybe_rayon::*;

/// Offset added to the land-cover code of burned cells
pub const BURN_STRATUM_OFFSET: f64 = 240.0;

/// Cross land cover with the burn class: `landcover + 240 * class`.
///
/// Land-cover codes below 240 keep burned and unburned cells of the same
/// cover type in separate strata. NaN in either input stays NaN.
pub fn burn_landcover_strata(landcover: &Raster<f64>, class: &Raster<f64>) -> Result<Raster<f64>> {
    landcover.check_same_shape(class)?;
    let data: Vec<f64> = landcover
        .data()
        .iter()
        .zip(class.data().iter())
        .map(|(&lc, &c)| lc + BURN_STRATUM_OFFSET * c)
        .collect();
    landcover.derive(data, Some(f64::NAN))
}

/// Count of each integer value over the sampling grid of `scale`.
/// Non-finite cells are ignored; values are rounded to the nearest integer.
pub fn frequency_histogram(raster: &Raster<f64>, scale: f64) -> BTreeMap<i64, u64> {
    let (rows, cols) = raster.shape();
    let stride = raster.transform().stride_for_scale(scale);
    let sampled_rows: Vec<usize> = (0..rows).step_by(stride).collect();

    let partial: Vec<BTreeMap<i64, u64>> = sampled_rows
        .par_iter()
        .map(|&row| {
            let mut hist = BTreeMap::new();
            for col in (0..cols).step_by(stride) {
                let v = unsafe { raster.get_unchecked(row, col) };
                if v.is_finite() {
                    *hist.entry(v.round() as i64).or_insert(0) += 1;
                }
            }
            hist
        })
        .collect();

    let mut hist = BTreeMap::new();
    for part in partial {
        for (k, n) in part {
            *hist.entry(k).or_insert(0) += n;
        }
    }
    hist
}

/// Per-stratum targets `floor(count * factor)`, in ascending stratum order
pub fn targets_from_histogram(histogram: &BTreeMap<i64, u64>, factor: f64) -> Vec<(i64, usize)> {
    histogram
        .iter()
        .map(|(&stratum, &count)| {
            let target = (count as f64 * factor).floor();
            (stratum, if target > 0.0 { target as usize } else { 0 })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strata_separate_burned_cover() {
        let lc = Raster::from_vec(vec![30.0, 30.0, 70.0, f64::NAN], 2, 2).unwrap();
        let class = Raster::from_vec(vec![0.0, 1.0, 1.0, 0.0], 2, 2).unwrap();
        let strata = burn_landcover_strata(&lc, &class).unwrap();
        assert_eq!(strata.get(0, 0).unwrap(), 30.0);
        assert_eq!(strata.get(0, 1).unwrap(), 270.0);
        assert_eq!(strata.get(1, 0).unwrap(), 310.0);
        assert!(strata.get(1, 1).unwrap().is_nan());
    }

    #[test]
    fn histogram_and_targets() {
        let r = Raster::from_vec(vec![30.0, 30.0, 270.0, f64::NAN, 30.0, 310.0], 2, 3).unwrap();
        let hist = frequency_histogram(&r, 1.0);
        assert_eq!(hist.get(&30), Some(&3));
        assert_eq!(hist.get(&270), Some(&1));
        assert_eq!(hist.len(), 3);

        let targets = targets_from_histogram(&hist, 1.5);
        assert_eq!(targets, vec![(30, 4), (270, 1), (310, 1)]);
        let halves = targets_from_histogram(&hist, 0.5);
        assert_eq!(halves, vec![(30, 1), (270, 0), (310, 0)]);
    }
}
