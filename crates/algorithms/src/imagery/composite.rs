//! Mean composites over an acquisition window

use chrono::{DateTime, Utc};
use firescar_core::{Error, Image, Mask, Raster, Region, Result};
use tracing::debug;

use crate::fire::{region_mask, TimeWindow};
use crate::maybe_rayon::*;

/// Sentinel-2 band names read from each scene
pub const S2_BANDS: [&str; 6] = ["B2", "B3", "B4", "B8", "B11", "B12"];

/// Standard names the S2 bands are renamed to, in the same order
pub const STD_BANDS: [&str; 6] = ["BLUE", "GREEN", "RED", "NIR", "SSWIR", "LSWIR"];

/// One acquisition, already on the analysis grid
#[derive(Debug, Clone)]
pub struct Scene {
    pub id: String,
    pub acquired: DateTime<Utc>,
    pub image: Image,
}

impl Scene {
    pub fn new(id: impl Into<String>, acquired: DateTime<Utc>, image: Image) -> Self {
        Self {
            id: id.into(),
            acquired,
            image,
        }
    }
}

/// The scenes available to an analysis
#[derive(Debug, Clone, Default)]
pub struct ImageCollection {
    scenes: Vec<Scene>,
}

impl ImageCollection {
    pub fn new(scenes: Vec<Scene>) -> Self {
        Self { scenes }
    }

    pub fn push(&mut self, scene: Scene) {
        self.scenes.push(scene);
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    pub fn scenes(&self) -> &[Scene] {
        &self.scenes
    }

    /// Scenes acquired inside `window`
    pub fn filter_date(&self, window: &TimeWindow) -> Vec<&Scene> {
        self.scenes.iter().filter(|s| window.contains(s.acquired)).collect()
    }
}

/// Parameters for [`build_composite`]
#[derive(Debug, Clone)]
pub struct CompositeParams {
    /// Band names as stored in the scenes
    pub source_bands: Vec<String>,
    /// Names given to the composite bands (same length as `source_bands`)
    pub target_bands: Vec<String>,
    /// Stored digital numbers are divided by this to get reflectance
    pub reflectance_scale: f64,
}

impl Default for CompositeParams {
    fn default() -> Self {
        Self {
            source_bands: S2_BANDS.iter().map(|s| s.to_string()).collect(),
            target_bands: STD_BANDS.iter().map(|s| s.to_string()).collect(),
            reflectance_scale: 10000.0,
        }
    }
}

/// Per-cell mean of the rasters, ignoring NaN. Cells with no value in any
/// input stay NaN.
pub fn nan_mean(rasters: &[&Raster<f64>]) -> Result<Raster<f64>> {
    let first = match rasters.first() {
        Some(r) => *r,
        None => return Err(Error::Algorithm("mean of an empty raster list".into())),
    };
    for r in &rasters[1..] {
        first.check_same_shape(*r)?;
    }
    let (rows, cols) = first.shape();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut line = vec![f64::NAN; cols];
            for (col, out) in line.iter_mut().enumerate() {
                let mut sum = 0.0;
                let mut n = 0usize;
                for r in rasters {
                    let v = unsafe { r.get_unchecked(row, col) };
                    if !v.is_nan() {
                        sum += v;
                        n += 1;
                    }
                }
                if n > 0 {
                    *out = sum / n as f64;
                }
            }
            line
        })
        .collect();

    first.derive(data, Some(f64::NAN))
}

/// Build a reflectance composite for one window.
///
/// Scenes acquired inside `window` are averaged per band and cell
/// (ignoring missing values), the configured bands are renamed, scaled to
/// reflectance, clipped to `region` by cell centre and masked.
///
/// # Errors
/// [`Error::EmptyComposite`] when no scene falls in the window,
/// [`Error::BandNotFound`] when a scene lacks a source band.
pub fn build_composite(
    collection: &ImageCollection,
    window: &TimeWindow,
    region: &Region,
    mask: &Mask,
    params: &CompositeParams,
) -> Result<Image> {
    if params.source_bands.len() != params.target_bands.len() {
        return Err(Error::InvalidParameter {
            name: "target_bands",
            value: params.target_bands.join(","),
            reason: format!("expected {} names", params.source_bands.len()),
        });
    }
    if !(params.reflectance_scale.is_finite() && params.reflectance_scale != 0.0) {
        return Err(Error::InvalidParameter {
            name: "reflectance_scale",
            value: params.reflectance_scale.to_string(),
            reason: "must be finite and non-zero".into(),
        });
    }

    let scenes = collection.filter_date(window);
    if scenes.is_empty() {
        return Err(Error::EmptyComposite {
            window: window.to_string(),
        });
    }
    debug!(window = %window, scenes = scenes.len(), "building composite");

    let grid = mask.as_raster().grid();
    let inside = region_mask(region, &grid);
    let scale = params.reflectance_scale;

    let mut composite = Image::new();
    for (src, dst) in params.source_bands.iter().zip(&params.target_bands) {
        let inputs: Vec<&Raster<f64>> = scenes
            .iter()
            .map(|s| s.image.band(src))
            .collect::<Result<_>>()?;
        let mean = nan_mean(&inputs)?.map(|v| v / scale);
        let band = mask.apply(&inside.apply(&mean)?)?;
        composite.push_band(dst.as_str(), band)?;
    }
    Ok(composite)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use firescar_core::GeoTransform;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2016, 8, 1, 0, 0, 0).unwrap()
    }

    fn grid_raster(value: f64) -> Raster<f64> {
        let mut r = Raster::filled(2, 2, value);
        r.set_transform(GeoTransform::new(0.0, 2.0, 1.0, -1.0));
        r
    }

    fn scene(day: i64, value: f64) -> Scene {
        let image = Image::from_bands(S2_BANDS.iter().map(|&b| (b, grid_raster(value)))).unwrap();
        Scene::new(format!("s{}", day), t0() + Duration::days(day), image)
    }

    fn keep_all() -> Mask {
        Mask::keep_all(2, 2, GeoTransform::new(0.0, 2.0, 1.0, -1.0))
    }

    #[test]
    fn composite_is_scaled_mean_of_window_scenes() {
        let collection = ImageCollection::new(vec![scene(1, 1000.0), scene(2, 3000.0), scene(20, 9000.0)]);
        let window = TimeWindow::half_open(t0(), t0() + Duration::days(10));
        let region = Region::from_bounds(0.0, 0.0, 2.0, 2.0);

        let img = build_composite(&collection, &window, &region, &keep_all(), &CompositeParams::default()).unwrap();

        assert_eq!(img.band_names().len(), 6);
        assert_eq!(img.band_names()[3], "NIR");
        assert!((img.band("NIR").unwrap().get(1, 1).unwrap() - 0.2).abs() < 1e-12);
    }

    #[test]
    fn mean_ignores_missing_values() {
        let a = grid_raster(2.0);
        let mut b = grid_raster(4.0);
        b.set(0, 0, f64::NAN).unwrap();
        let mut c = grid_raster(f64::NAN);
        c.set(1, 1, 6.0).unwrap();

        let m = nan_mean(&[&a, &b, &c]).unwrap();
        assert_eq!(m.get(0, 0).unwrap(), 2.0);
        assert_eq!(m.get(0, 1).unwrap(), 3.0);
        assert_eq!(m.get(1, 1).unwrap(), 4.0);
        assert!(nan_mean(&[&grid_raster(f64::NAN)]).unwrap().get(0, 0).unwrap().is_nan());
    }

    #[test]
    fn empty_window_is_an_error() {
        let collection = ImageCollection::new(vec![scene(20, 1000.0)]);
        let window = TimeWindow::half_open(t0(), t0() + Duration::days(10));
        let region = Region::from_bounds(0.0, 0.0, 2.0, 2.0);
        let result = build_composite(&collection, &window, &region, &keep_all(), &CompositeParams::default());
        assert!(matches!(result, Err(Error::EmptyComposite { .. })));
    }

    #[test]
    fn clipping_and_masking_give_nan() {
        let collection = ImageCollection::new(vec![scene(1, 1000.0)]);
        let window = TimeWindow::half_open(t0(), t0() + Duration::days(10));
        // left column only
        let region = Region::from_bounds(0.0, 0.0, 1.0, 2.0);
        let mut keep = Raster::filled(2, 2, 1u8);
        keep.set_transform(GeoTransform::new(0.0, 2.0, 1.0, -1.0));
        keep.set(1, 0, 0).unwrap();
        let mask = Mask::from_raster(keep);

        let img = build_composite(&collection, &window, &region, &mask, &CompositeParams::default()).unwrap();
        let red = img.band("RED").unwrap();
        assert!((red.get(0, 0).unwrap() - 0.1).abs() < 1e-12);
        assert!(red.get(0, 1).unwrap().is_nan());
        assert!(red.get(1, 0).unwrap().is_nan());
    }
}
