//! Pre/post change stack
//!
//! For every index band `X` present in both the pre-fire and post-fire
//! index images this produces `X delta = post - pre`, and optionally
//! `X pre`, `X post` and a smoothed `X delta blurred`.

use firescar_core::{Error, Image, Raster, Result};
use tracing::debug;

use super::kernel::{convolve, Kernel};
use crate::maybe_rayon::*;

/// Suffix of delta bands
pub const DELTA_SUFFIX: &str = " delta";
/// Suffix of pre-fire bands
pub const PRE_SUFFIX: &str = " pre";
/// Suffix of post-fire bands
pub const POST_SUFFIX: &str = " post";
/// Suffix of smoothed delta bands
pub const BLURRED_SUFFIX: &str = " delta blurred";

/// Name of the delta band for an index
pub fn delta_band(index: &str) -> String {
    format!("{}{}", index, DELTA_SUFFIX)
}

/// Which bands [`delta_stack`] emits besides the deltas
#[derive(Debug, Clone)]
pub struct DeltaParams {
    pub include_pre: bool,
    pub include_post: bool,
    /// Smooth the deltas with this kernel and add them as extra bands
    pub blur: Option<Kernel>,
}

impl Default for DeltaParams {
    fn default() -> Self {
        Self {
            include_pre: true,
            include_post: true,
            blur: None,
        }
    }
}

impl DeltaParams {
    /// Only the delta bands
    pub fn deltas_only() -> Self {
        Self {
            include_pre: false,
            include_post: false,
            blur: None,
        }
    }
}

/// Cell-wise `after - before`; NaN where either input is NaN
pub fn raster_difference(before: &Raster<f64>, after: &Raster<f64>) -> Result<Raster<f64>> {
    before.check_same_shape(after)?;
    let (rows, cols) = before.shape();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut line = vec![f64::NAN; cols];
            for (col, out) in line.iter_mut().enumerate() {
                let b = unsafe { before.get_unchecked(row, col) };
                let a = unsafe { after.get_unchecked(row, col) };
                if !(b.is_nan() || a.is_nan()) {
                    *out = a - b;
                }
            }
            line
        })
        .collect();

    before.derive(data, Some(f64::NAN))
}

/// Build the change stack from pre-fire and post-fire index images.
///
/// Both images must carry the same index bands in the same order.
pub fn delta_stack(pre: &Image, post: &Image, params: &DeltaParams) -> Result<Image> {
    if pre.band_names() != post.band_names() {
        return Err(Error::Algorithm(format!(
            "pre-fire bands {:?} do not match post-fire bands {:?}",
            pre.band_names(),
            post.band_names()
        )));
    }

    let mut deltas = Vec::with_capacity(pre.len());
    for ((name, before), (_, after)) in pre.iter().zip(post.iter()) {
        deltas.push((name, raster_difference(before, after)?));
    }

    let mut stack = Image::new();
    for (name, delta) in &deltas {
        stack.push_band(delta_band(name), delta.clone())?;
    }
    if params.include_pre {
        for (name, band) in pre.iter() {
            stack.push_band(format!("{}{}", name, PRE_SUFFIX), band.clone())?;
        }
    }
    if params.include_post {
        for (name, band) in post.iter() {
            stack.push_band(format!("{}{}", name, POST_SUFFIX), band.clone())?;
        }
    }
    if let Some(kernel) = &params.blur {
        for (name, delta) in &deltas {
            stack.push_band(format!("{}{}", name, BLURRED_SUFFIX), convolve(delta, kernel)?)?;
        }
    }

    debug!(bands = stack.len(), "built delta stack");
    Ok(stack)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn image(values: &[(&str, f64)]) -> Image {
        Image::from_bands(values.iter().map(|&(n, v)| (n, Raster::filled(4, 4, v)))).unwrap()
    }

    #[test]
    fn delta_is_post_minus_pre() {
        let pre = image(&[("NDVI", 0.7), ("NBR", 0.5)]);
        let post = image(&[("NDVI", 0.3), ("NBR", 0.6)]);

        let stack = delta_stack(&pre, &post, &DeltaParams::deltas_only()).unwrap();

        assert_eq!(stack.band_names(), &["NDVI delta".to_string(), "NBR delta".to_string()]);
        assert_relative_eq!(stack.band("NDVI delta").unwrap().get(0, 0).unwrap(), -0.4, epsilon = 1e-12);
        assert_relative_eq!(stack.band("NBR delta").unwrap().get(3, 3).unwrap(), 0.1, epsilon = 1e-12);
    }

    #[test]
    fn optional_bands_follow_deltas() {
        let pre = image(&[("NDVI", 0.7)]);
        let post = image(&[("NDVI", 0.3)]);
        let params = DeltaParams {
            blur: Some(Kernel::ring_blur()),
            ..DeltaParams::default()
        };

        let stack = delta_stack(&pre, &post, &params).unwrap();
        let names: Vec<&str> = stack.band_names().iter().map(String::as_str).collect();
        assert_eq!(names, vec!["NDVI delta", "NDVI pre", "NDVI post", "NDVI delta blurred"]);

        let blurred = stack.band("NDVI delta blurred").unwrap();
        assert_relative_eq!(blurred.get(1, 1).unwrap(), -0.4, epsilon = 1e-12);
        assert!(blurred.get(0, 0).unwrap().is_nan());
    }

    #[test]
    fn missing_input_gives_missing_delta() {
        let mut before = Raster::filled(2, 2, 0.5);
        before.set(0, 1, f64::NAN).unwrap();
        let after = Raster::filled(2, 2, 0.2);
        let d = raster_difference(&before, &after).unwrap();
        assert!(d.get(0, 1).unwrap().is_nan());
        assert_relative_eq!(d.get(1, 1).unwrap(), -0.3, epsilon = 1e-12);
    }

    #[test]
    fn mismatched_indices_are_rejected() {
        let pre = image(&[("NDVI", 0.7)]);
        let post = image(&[("NBR", 0.3)]);
        assert!(delta_stack(&pre, &post, &DeltaParams::default()).is_err());
    }
}
