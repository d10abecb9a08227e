//! Named multi-band images

use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster};

/// An ordered set of named `f64` bands on one grid.
///
/// Every band shares the same shape and geotransform; insertion checks the
/// shape against the first band. Band names are unique.
#[derive(Debug, Clone, Default)]
pub struct Image {
    names: Vec<String>,
    bands: Vec<Raster<f64>>,
}

impl Image {
    /// Create an image with no bands
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an image from `(name, band)` pairs
    pub fn from_bands<S: Into<String>>(bands: impl IntoIterator<Item = (S, Raster<f64>)>) -> Result<Self> {
        let mut image = Self::new();
        for (name, band) in bands {
            image.push_band(name, band)?;
        }
        Ok(image)
    }

    /// Append a band
    pub fn push_band(&mut self, name: impl Into<String>, band: Raster<f64>) -> Result<()> {
        let name = name.into();
        if self.names.contains(&name) {
            return Err(Error::InvalidParameter {
                name: "band",
                value: name,
                reason: "band names must be unique within an image".into(),
            });
        }
        if let Some(first) = self.bands.first() {
            first.check_same_shape(&band)?;
        }
        self.names.push(name);
        self.bands.push(band);
        Ok(())
    }

    /// Consume the image and return it with one more band
    pub fn with_band(mut self, name: impl Into<String>, band: Raster<f64>) -> Result<Self> {
        self.push_band(name, band)?;
        Ok(self)
    }

    /// Append every band of `other`, keeping its names
    pub fn merged(mut self, other: Image) -> Result<Self> {
        for (name, band) in other.names.into_iter().zip(other.bands) {
            self.push_band(name, band)?;
        }
        Ok(self)
    }

    /// Number of bands
    pub fn len(&self) -> usize {
        self.bands.len()
    }

    /// Whether the image has no bands
    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    /// Band names in order
    pub fn band_names(&self) -> &[String] {
        &self.names
    }

    /// Whether a band with this name exists
    pub fn has_band(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Position of a band by name
    pub fn band_index(&self, name: &str) -> Result<usize> {
        self.names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| Error::BandNotFound(name.to_string()))
    }

    /// Band by name
    pub fn band(&self, name: &str) -> Result<&Raster<f64>> {
        let idx = self.band_index(name)?;
        Ok(&self.bands[idx])
    }

    /// Iterate over `(name, band)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Raster<f64>)> {
        self.names.iter().map(String::as_str).zip(self.bands.iter())
    }

    /// Grid shape shared by all bands; `None` for an image without bands
    pub fn shape(&self) -> Option<(usize, usize)> {
        self.bands.first().map(Raster::shape)
    }

    /// Geotransform shared by all bands
    pub fn transform(&self) -> Option<&GeoTransform> {
        self.bands.first().map(Raster::transform)
    }

    /// New image holding only the named bands, in the given order
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Self> {
        let mut out = Self::new();
        for name in names {
            let name = name.as_ref();
            out.push_band(name, self.band(name)?.clone())?;
        }
        Ok(out)
    }

    /// New image with selected bands renamed (`from[i]` becomes `to[i]`)
    pub fn select_as<S: AsRef<str>, R: AsRef<str>>(&self, from: &[S], to: &[R]) -> Result<Self> {
        if from.len() != to.len() {
            return Err(Error::InvalidParameter {
                name: "to",
                value: format!("{} names", to.len()),
                reason: format!("expected {} names to match the selection", from.len()),
            });
        }
        let mut out = Self::new();
        for (src, dst) in from.iter().zip(to) {
            out.push_band(dst.as_ref(), self.band(src.as_ref())?.clone())?;
        }
        Ok(out)
    }

    /// New image with every band renamed by `f`
    pub fn renamed<F: Fn(&str) -> String>(&self, f: F) -> Result<Self> {
        let mut out = Self::new();
        for (name, band) in self.iter() {
            out.push_band(f(name), band.clone())?;
        }
        Ok(out)
    }

    /// New image with `f` applied to every band
    pub fn map_bands<F>(&self, f: F) -> Result<Self>
    where
        F: Fn(&Raster<f64>) -> Result<Raster<f64>>,
    {
        let mut out = Self::new();
        for (name, band) in self.iter() {
            out.push_band(name, f(band)?)?;
        }
        Ok(out)
    }

    /// Band values at one cell, in band order
    pub fn values_at(&self, row: usize, col: usize) -> Result<Vec<f64>> {
        self.bands.iter().map(|b| b.get(row, col)).collect()
    }

    /// Consume the image into `(name, band)` pairs
    pub fn into_bands(self) -> Vec<(String, Raster<f64>)> {
        self.names.into_iter().zip(self.bands).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn band(value: f64) -> Raster<f64> {
        Raster::filled(4, 4, value)
    }

    #[test]
    fn select_preserves_requested_order() {
        let image = Image::from_bands([("A", band(1.0)), ("B", band(2.0)), ("C", band(3.0))]).unwrap();
        let picked = image.select(&["C", "A"]).unwrap();

        assert_eq!(picked.band_names(), &["C".to_string(), "A".to_string()]);
        assert_eq!(picked.band("C").unwrap().get(0, 0).unwrap(), 3.0);
    }

    #[test]
    fn rejects_mismatched_band_shape() {
        let mut image = Image::new();
        image.push_band("A", band(1.0)).unwrap();
        let err = image.push_band("B", Raster::filled(4, 5, 0.0));
        assert!(matches!(err, Err(Error::SizeMismatch { .. })));
    }

    #[test]
    fn rejects_duplicate_names() {
        let image = Image::from_bands([("A", band(1.0))]).unwrap();
        assert!(image.with_band("A", band(2.0)).is_err());
    }

    #[test]
    fn missing_band_is_reported_by_name() {
        let image = Image::from_bands([("NIR", band(0.3))]).unwrap();
        match image.band("RED") {
            Err(Error::BandNotFound(name)) => assert_eq!(name, "RED"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn select_as_renames() {
        let image = Image::from_bands([("B4", band(1.0)), ("B8", band(2.0))]).unwrap();
        let std = image.select_as(&["B4", "B8"], &["RED", "NIR"]).unwrap();
        assert!(std.has_band("RED"));
        assert!(std.has_band("NIR"));
        assert!(!std.has_band("B4"));
    }
}
