//! Keep/exclude masks

use crate::error::Result;
use crate::raster::{GeoTransform, Raster};

/// A keep/exclude mask over a raster grid.
///
/// Stored as `Raster<u8>`: 1 keeps the cell, 0 excludes it. Applying a mask
/// to an `f64` raster turns excluded cells into NaN.
#[derive(Debug, Clone)]
pub struct Mask(Raster<u8>);

impl Mask {
    /// Mask that keeps every cell of a grid
    pub fn keep_all(rows: usize, cols: usize, transform: GeoTransform) -> Self {
        let mut raster = Raster::filled(rows, cols, 1u8);
        raster.set_transform(transform);
        Self(raster)
    }

    /// Wrap a 0/1 raster; any non-zero value keeps the cell
    pub fn from_raster(raster: Raster<u8>) -> Self {
        Self(raster.map(|v| u8::from(v != 0)))
    }

    /// Whether the cell is kept. Cells outside the grid are excluded.
    pub fn keeps(&self, row: usize, col: usize) -> bool {
        self.0.get(row, col).map(|v| v != 0).unwrap_or(false)
    }

    /// Number of kept cells
    pub fn kept_count(&self) -> usize {
        self.0.data().iter().filter(|&&v| v != 0).count()
    }

    /// Grid shape
    pub fn shape(&self) -> (usize, usize) {
        self.0.shape()
    }

    /// The underlying 0/1 raster
    pub fn as_raster(&self) -> &Raster<u8> {
        &self.0
    }

    /// Cell-wise AND with another mask of the same shape
    pub fn and(&self, other: &Mask) -> Result<Mask> {
        self.0.check_same_shape(&other.0)?;
        let data: Vec<u8> = self
            .0
            .data()
            .iter()
            .zip(other.0.data().iter())
            .map(|(&a, &b)| u8::from(a != 0 && b != 0))
            .collect();
        Ok(Mask(self.0.derive(data, None)?))
    }

    /// Copy of `raster` with excluded cells set to NaN
    pub fn apply(&self, raster: &Raster<f64>) -> Result<Raster<f64>> {
        raster.check_same_shape(&self.0)?;
        let data: Vec<f64> = raster
            .data()
            .iter()
            .zip(self.0.data().iter())
            .map(|(&v, &m)| if m != 0 { v } else { f64::NAN })
            .collect();
        raster.derive(data, Some(f64::NAN))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_sets_excluded_cells_to_nan() {
        let mask = Mask::from_raster(Raster::from_vec(vec![1, 0, 1, 1], 2, 2).unwrap());
        let values = Raster::filled(2, 2, 0.5);

        let masked = mask.apply(&values).unwrap();
        assert_eq!(masked.get(0, 0).unwrap(), 0.5);
        assert!(masked.get(0, 1).unwrap().is_nan());
        assert_eq!(mask.kept_count(), 3);
    }

    #[test]
    fn and_combines_exclusions() {
        let a = Mask::from_raster(Raster::from_vec(vec![1, 0, 1, 1], 2, 2).unwrap());
        let b = Mask::from_raster(Raster::from_vec(vec![1, 1, 0, 1], 2, 2).unwrap());
        let both = a.and(&b).unwrap();
        assert!(both.keeps(0, 0));
        assert!(!both.keeps(0, 1));
        assert!(!both.keeps(1, 0));
        assert!(!both.keeps(5, 5));
    }
}
