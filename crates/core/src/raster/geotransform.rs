//! Affine geotransformation for north-up rasters

use geo_types::{coord, Rect};
use serde::{Deserialize, Serialize};

/// Georeferencing of a north-up raster grid.
///
/// Converts between pixel coordinates (col, row) and map coordinates (x, y):
/// ```text
/// x = origin_x + col * pixel_width
/// y = origin_y + row * pixel_height
/// ```
///
/// `pixel_height` is negative for the usual top-down row order. Scenes
/// handled by FireScar are already resampled to a common grid, so there
/// are no rotation terms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    /// X coordinate of the upper-left corner
    pub origin_x: f64,
    /// Y coordinate of the upper-left corner
    pub origin_y: f64,
    /// Pixel width (cell size in X direction)
    pub pixel_width: f64,
    /// Pixel height (cell size in Y direction, usually negative)
    pub pixel_height: f64,
}

impl GeoTransform {
    /// Create a new north-up GeoTransform
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
        }
    }

    /// Map coordinates of the pixel center
    pub fn pixel_to_geo(&self, col: usize, row: usize) -> (f64, f64) {
        let x = self.origin_x + (col as f64 + 0.5) * self.pixel_width;
        let y = self.origin_y + (row as f64 + 0.5) * self.pixel_height;
        (x, y)
    }

    /// Map coordinates of the pixel's top-left corner
    pub fn pixel_to_geo_corner(&self, col: usize, row: usize) -> (f64, f64) {
        let x = self.origin_x + col as f64 * self.pixel_width;
        let y = self.origin_y + row as f64 * self.pixel_height;
        (x, y)
    }

    /// Footprint of a cell as an axis-aligned rectangle
    pub fn cell_footprint(&self, col: usize, row: usize) -> Rect<f64> {
        let (x0, y0) = self.pixel_to_geo_corner(col, row);
        let (x1, y1) = self.pixel_to_geo_corner(col + 1, row + 1);
        Rect::new(coord! { x: x0, y: y0 }, coord! { x: x1, y: y1 })
    }

    /// Fractional pixel coordinates of a map location; `.floor()` gives the cell
    pub fn geo_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        if self.pixel_width.abs() < 1e-12 || self.pixel_height.abs() < 1e-12 {
            return (f64::NAN, f64::NAN);
        }
        let col = (x - self.origin_x) / self.pixel_width;
        let row = (y - self.origin_y) / self.pixel_height;
        (col, row)
    }

    /// Cell size (assumes square pixels)
    pub fn cell_size(&self) -> f64 {
        self.pixel_width.abs()
    }

    /// Number of native cells per step when working at a coarser `scale`
    /// (map units). Scales finer than the native cell size map to 1.
    pub fn stride_for_scale(&self, scale: f64) -> usize {
        let cell = self.cell_size();
        if !(scale.is_finite() && cell > 0.0) {
            return 1;
        }
        ((scale / cell).round() as usize).max(1)
    }
}

/// Shape and georeferencing of a raster grid without any cell data
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub rows: usize,
    pub cols: usize,
    pub transform: GeoTransform,
}

impl GridSpec {
    pub fn new(rows: usize, cols: usize, transform: GeoTransform) -> Self {
        Self { rows, cols, transform }
    }

    /// Number of cells
    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inclusive cell range `(row0, row1, col0, col1)` overlapped by a map
    /// rectangle, or `None` when it misses the grid
    pub fn cell_window(&self, rect: &Rect<f64>) -> Option<(usize, usize, usize, usize)> {
        if self.is_empty() {
            return None;
        }
        let (c0, r0) = self.transform.geo_to_pixel(rect.min().x, rect.max().y);
        let (c1, r1) = self.transform.geo_to_pixel(rect.max().x, rect.min().y);
        let (col_lo, col_hi) = (c0.min(c1).floor(), c0.max(c1).floor());
        let (row_lo, row_hi) = (r0.min(r1).floor(), r0.max(r1).floor());
        if !(col_lo.is_finite() && row_lo.is_finite() && col_hi.is_finite() && row_hi.is_finite()) {
            return None;
        }
        if col_hi < 0.0 || row_hi < 0.0 || col_lo >= self.cols as f64 || row_lo >= self.rows as f64 {
            return None;
        }
        let clamp = |v: f64, max: usize| (v.max(0.0) as usize).min(max - 1);
        Some((
            clamp(row_lo, self.rows),
            clamp(row_hi, self.rows),
            clamp(col_lo, self.cols),
            clamp(col_hi, self.cols),
        ))
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::new(0.0, 0.0, 1.0, -1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_pixel_to_geo_roundtrip() {
        let gt = GeoTransform::new(100.0, 200.0, 10.0, -10.0);

        let (x, y) = gt.pixel_to_geo(5, 10);
        let (col, row) = gt.geo_to_pixel(x, y);

        assert_relative_eq!(col, 5.5, epsilon = 1e-10);
        assert_relative_eq!(row, 10.5, epsilon = 1e-10);
    }

    #[test]
    fn test_cell_footprint() {
        let gt = GeoTransform::new(0.0, 30.0, 10.0, -10.0);
        let rect = gt.cell_footprint(1, 2);

        assert_relative_eq!(rect.min().x, 10.0, epsilon = 1e-10);
        assert_relative_eq!(rect.max().x, 20.0, epsilon = 1e-10);
        assert_relative_eq!(rect.min().y, 0.0, epsilon = 1e-10);
        assert_relative_eq!(rect.max().y, 10.0, epsilon = 1e-10);
    }

    #[test]
    fn test_cell_window_clamps_to_grid() {
        let grid = GridSpec::new(10, 10, GeoTransform::new(0.0, 100.0, 10.0, -10.0));
        let rect = Rect::new(coord! { x: 15.0, y: 75.0 }, coord! { x: 250.0, y: 95.0 });
        assert_eq!(grid.cell_window(&rect), Some((0, 2, 1, 9)));

        let outside = Rect::new(coord! { x: 200.0, y: 0.0 }, coord! { x: 300.0, y: 50.0 });
        assert_eq!(grid.cell_window(&outside), None);
    }

    #[test]
    fn test_stride_for_scale() {
        let gt = GeoTransform::new(0.0, 0.0, 10.0, -10.0);
        assert_eq!(gt.stride_for_scale(10.0), 1);
        assert_eq!(gt.stride_for_scale(30.0), 3);
        assert_eq!(gt.stride_for_scale(150.0), 15);
        assert_eq!(gt.stride_for_scale(5.0), 1);
    }
}
