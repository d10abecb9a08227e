//! Uniform and stratified pixel sampling
//!
//! Eligible pixels lie on the sampling grid (every `scale / cell_size`-th
//! row and column) and have a finite value in every feature band and in the
//! label band. Draws use `StdRng` seeded from the caller, so the same
//! inputs and seed always give the same samples in the same order.

use std::collections::BTreeMap;

use firescar_core::{Error, Image, Raster, Result};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use tracing::debug;

use super::samples::{Sample, SampleSet};
use crate::maybe_rayon::*;

/// Parameters shared by both samplers
#[derive(Debug, Clone)]
pub struct SampleParams {
    /// Sampling resolution in map units
    pub scale: f64,
    pub seed: u64,
}

impl Default for SampleParams {
    fn default() -> Self {
        Self { scale: 10.0, seed: 42 }
    }
}

struct Layout<'a> {
    feature_names: Vec<String>,
    features: Vec<&'a Raster<f64>>,
    label: &'a Raster<f64>,
    stride: usize,
}

impl<'a> Layout<'a> {
    fn new(image: &'a Image, label_band: &str, scale: f64) -> Result<Self> {
        let label = image.band(label_band)?;
        let (feature_names, features): (Vec<String>, Vec<&Raster<f64>>) = image
            .iter()
            .filter(|(name, _)| *name != label_band)
            .map(|(name, band)| (name.to_string(), band))
            .unzip();
        if features.is_empty() {
            return Err(Error::DegenerateSample {
                reason: format!("image has no feature bands besides '{}'", label_band),
            });
        }
        let stride = label.transform().stride_for_scale(scale);
        Ok(Self {
            feature_names,
            features,
            label,
            stride,
        })
    }

    fn sample_at(&self, row: usize, col: usize) -> Option<Sample> {
        let label = unsafe { self.label.get_unchecked(row, col) };
        if !label.is_finite() {
            return None;
        }
        let mut features = Vec::with_capacity(self.features.len());
        for band in &self.features {
            let v = unsafe { band.get_unchecked(row, col) };
            if !v.is_finite() {
                return None;
            }
            features.push(v);
        }
        Some(Sample { row, col, features, label })
    }

    /// Eligible samples in row-major order, each tagged with `key(row, col)`
    fn eligible<K, F>(&self, key: F) -> Vec<(K, Sample)>
    where
        K: Send,
        F: Fn(usize, usize) -> Option<K> + Sync,
    {
        let (rows, cols) = self.label.shape();
        let sampled_rows: Vec<usize> = (0..rows).step_by(self.stride).collect();
        sampled_rows
            .par_iter()
            .flat_map(|&row| {
                (0..cols)
                    .step_by(self.stride)
                    .filter_map(|col| {
                        let k = key(row, col)?;
                        Some((k, self.sample_at(row, col)?))
                    })
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    fn empty_set(&self, label_band: &str) -> SampleSet {
        SampleSet::new(self.feature_names.clone(), label_band)
    }
}

/// Draw `count` indices out of `n` without replacement, ascending
fn draw(rng: &mut StdRng, n: usize, count: usize) -> Vec<usize> {
    if count >= n {
        return (0..n).collect();
    }
    let mut picked = index::sample(rng, n, count).into_vec();
    picked.sort_unstable();
    picked
}

/// Uniform random sample of up to `count` eligible pixels.
///
/// Features are every band of `image` except `label_band`, in image order.
///
/// # Errors
/// [`Error::DegenerateSample`] when no pixel is eligible or there are no
/// feature bands.
pub fn sample_uniform(image: &Image, label_band: &str, count: usize, params: &SampleParams) -> Result<SampleSet> {
    let layout = Layout::new(image, label_band, params.scale)?;
    let pool: Vec<Sample> = layout.eligible(|_, _| Some(())).into_iter().map(|(_, s)| s).collect();
    if pool.is_empty() {
        return Err(Error::DegenerateSample {
            reason: "no eligible pixels to sample".into(),
        });
    }

    let mut rng = StdRng::seed_from_u64(params.seed);
    let picked = draw(&mut rng, pool.len(), count);

    let mut set = layout.empty_set(label_band);
    set.samples = picked.into_iter().map(|i| pool[i].clone()).collect();

    debug!(eligible = pool.len(), sampled = set.len(), seed = params.seed, "uniform sample");
    Ok(set)
}

/// Count of eligible pixels per stratum on the sampling grid of `scale`.
///
/// Uses the same eligibility as [`sample_stratified`], so targets built
/// from this histogram never name a stratum the sampler cannot draw from
/// at the same scale.
pub fn stratum_histogram(image: &Image, label_band: &str, strata: &Raster<f64>, scale: f64) -> Result<BTreeMap<i64, u64>> {
    let layout = Layout::new(image, label_band, scale)?;
    layout.label.check_same_shape(strata)?;

    let mut hist = BTreeMap::new();
    for (stratum, _) in layout.eligible(|row, col| stratum_at(strata, row, col)) {
        *hist.entry(stratum).or_insert(0) += 1;
    }
    Ok(hist)
}

fn stratum_at(strata: &Raster<f64>, row: usize, col: usize) -> Option<i64> {
    let s = unsafe { strata.get_unchecked(row, col) };
    s.is_finite().then(|| s.round() as i64)
}

/// Stratified random sample.
///
/// `strata` assigns each cell an integer stratum (NaN cells are never
/// eligible). `targets` lists `(stratum, count)` pairs; strata with a zero
/// target are skipped and a stratum holding fewer eligible pixels than its
/// target contributes all of them. Samples appear in `targets` order.
///
/// # Errors
/// [`Error::DegenerateSample`] when a stratum with a positive target has no
/// eligible pixel.
pub fn sample_stratified(
    image: &Image,
    label_band: &str,
    strata: &Raster<f64>,
    targets: &[(i64, usize)],
    params: &SampleParams,
) -> Result<SampleSet> {
    let layout = Layout::new(image, label_band, params.scale)?;
    layout.label.check_same_shape(strata)?;

    let mut by_stratum: BTreeMap<i64, Vec<Sample>> = BTreeMap::new();
    let eligible = layout.eligible(|row, col| stratum_at(strata, row, col));
    for (stratum, sample) in eligible {
        by_stratum.entry(stratum).or_default().push(sample);
    }

    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut set = layout.empty_set(label_band);
    for &(stratum, target) in targets {
        if target == 0 {
            continue;
        }
        let pool = match by_stratum.get(&stratum) {
            Some(pool) if !pool.is_empty() => pool,
            _ => {
                return Err(Error::DegenerateSample {
                    reason: format!("stratum {} has a target of {} but no eligible pixels", stratum, target),
                })
            }
        };
        for i in draw(&mut rng, pool.len(), target) {
            set.samples.push(pool[i].clone());
        }
    }

    debug!(strata = targets.len(), sampled = set.len(), seed = params.seed, "stratified sample");
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampling::targets_from_histogram;
    use firescar_core::GeoTransform;

    fn image(rows: usize, cols: usize) -> Image {
        let transform = GeoTransform::new(0.0, rows as f64 * 10.0, 10.0, -10.0);
        let mut feature = Raster::new(rows, cols);
        let mut label = Raster::new(rows, cols);
        feature.set_transform(transform);
        label.set_transform(transform);
        for r in 0..rows {
            for c in 0..cols {
                feature.set(r, c, (r * cols + c) as f64).unwrap();
                label.set(r, c, if c < cols / 2 { 0.0 } else { 1.0 }).unwrap();
            }
        }
        Image::from_bands([("NDVI delta", feature), ("class", label)]).unwrap()
    }

    #[test]
    fn uniform_is_deterministic_for_a_seed() {
        let img = image(20, 20);
        let params = SampleParams { scale: 10.0, seed: 42 };
        let a = sample_uniform(&img, "class", 50, &params).unwrap();
        let b = sample_uniform(&img, "class", 50, &params).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 50);
        assert_eq!(a.feature_names, vec!["NDVI delta".to_string()]);

        let c = sample_uniform(&img, "class", 50, &SampleParams { scale: 10.0, seed: 43 }).unwrap();
        assert_ne!(a.samples, c.samples);
    }

    #[test]
    fn uniform_respects_scale_grid_and_missing_values() {
        let mut img = image(6, 6);
        let mut label = img.band("class").unwrap().clone();
        label.set(0, 0, f64::NAN).unwrap();
        img = Image::from_bands([("f", img.band("NDVI delta").unwrap().clone()), ("class", label)]).unwrap();

        // stride 3 -> rows/cols {0, 3}; (0, 0) has no label
        let set = sample_uniform(&img, "class", 100, &SampleParams { scale: 30.0, seed: 1 }).unwrap();
        let cells: Vec<(usize, usize)> = set.iter().map(|s| (s.row, s.col)).collect();
        assert_eq!(cells, vec![(0, 3), (3, 0), (3, 3)]);
    }

    #[test]
    fn uniform_without_eligible_pixels_is_degenerate() {
        let img = Image::from_bands([("f", Raster::filled(3, 3, 1.0)), ("class", Raster::filled(3, 3, f64::NAN))]).unwrap();
        assert!(matches!(
            sample_uniform(&img, "class", 10, &SampleParams::default()),
            Err(Error::DegenerateSample { .. })
        ));
    }

    #[test]
    fn stratified_honours_targets() {
        let img = image(10, 10);
        let strata = img.band("class").unwrap().map(|v| v + 10.0);
        let targets = [(10, 5), (11, 7), (99, 0)];
        let params = SampleParams { scale: 10.0, seed: 42 };

        let set = sample_stratified(&img, "class", &strata, &targets, &params).unwrap();
        assert_eq!(set.len(), 12);
        assert_eq!(set.class_counts().get(&0), Some(&5));
        assert_eq!(set.class_counts().get(&1), Some(&7));
        assert_eq!(set, sample_stratified(&img, "class", &strata, &targets, &params).unwrap());
    }

    #[test]
    fn stratum_histogram_skips_cells_with_missing_features() {
        let mut img = image(4, 4);
        let mut feature = img.band("NDVI delta").unwrap().clone();
        for r in 0..4 {
            feature.set(r, 0, f64::NAN).unwrap();
        }
        img = Image::from_bands([("NDVI delta", feature), ("class", img.band("class").unwrap().clone())]).unwrap();
        // column 0 is its own stratum, but no cell there has features
        let mut strata = img.band("class").unwrap().map(|v| v + 10.0);
        for r in 0..4 {
            strata.set(r, 0, 99.0).unwrap();
        }

        let hist = stratum_histogram(&img, "class", &strata, 10.0).unwrap();
        assert_eq!(hist.get(&99), None);
        assert_eq!(hist.get(&10), Some(&4));
        assert_eq!(hist.get(&11), Some(&8));

        let targets = targets_from_histogram(&hist, 0.5);
        let set = sample_stratified(&img, "class", &strata, &targets, &SampleParams::default()).unwrap();
        assert_eq!(set.len(), 6);
    }

    #[test]
    fn stratified_target_without_pixels_is_degenerate() {
        let img = image(4, 4);
        let strata = img.band("class").unwrap().clone();
        let result = sample_stratified(&img, "class", &strata, &[(0, 2), (7, 1)], &SampleParams::default());
        assert!(matches!(result, Err(Error::DegenerateSample { .. })));
    }
}
