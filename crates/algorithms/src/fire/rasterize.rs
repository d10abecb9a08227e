//! Rasterizing fire footprints onto the analysis grid

use firescar_core::{DatedFire, FireRecord, GridSpec, Mask, Raster, Region, Result};
use geo::{BoundingRect, Geometry, Intersects};

use crate::maybe_rayon::*;

/// Name of the ground-truth band
pub const CLASS_BAND: &str = "class";

struct Footprint<'a> {
    geometry: &'a Geometry<f64>,
    window: (usize, usize, usize, usize),
}

/// Count, for every cell of `grid`, how many geometries touch the cell's
/// footprint rectangle.
pub fn coverage_count<'a, I>(geometries: I, grid: &GridSpec) -> Raster<u16>
where
    I: IntoIterator<Item = &'a Geometry<f64>>,
{
    let footprints: Vec<Footprint<'a>> = geometries
        .into_iter()
        .filter_map(|geometry| {
            let bbox = geometry.bounding_rect()?;
            let (r0, r1, c0, c1) = grid.cell_window(&bbox)?;
            // cells sharing only an edge with the bbox still intersect
            let window = (
                r0.saturating_sub(1),
                (r1 + 1).min(grid.rows - 1),
                c0.saturating_sub(1),
                (c1 + 1).min(grid.cols - 1),
            );
            Some(Footprint { geometry, window })
        })
        .collect();

    let (rows, cols) = (grid.rows, grid.cols);
    let transform = grid.transform;

    let data: Vec<u16> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut line = vec![0u16; cols];
            for fp in &footprints {
                let (r0, r1, c0, c1) = fp.window;
                if row < r0 || row > r1 {
                    continue;
                }
                for (col, count) in line.iter_mut().enumerate().take(c1 + 1).skip(c0) {
                    if fp.geometry.intersects(&transform.cell_footprint(col, row)) {
                        *count = count.saturating_add(1);
                    }
                }
            }
            line
        })
        .collect();

    let mut raster = Raster::on_grid(grid, 0u16);
    for (cell, v) in raster.data_mut().iter_mut().zip(data) {
        *cell = v;
    }
    raster
}

/// Mask keeping the cells whose centre lies inside `region`
pub fn region_mask(region: &Region, grid: &GridSpec) -> Mask {
    let transform = grid.transform;
    let cols = grid.cols;
    let data: Vec<u8> = (0..grid.rows)
        .into_par_iter()
        .flat_map(|row| {
            (0..cols)
                .map(|col| {
                    let (x, y) = transform.pixel_to_geo(col, row);
                    u8::from(region.contains_point(x, y))
                })
                .collect::<Vec<_>>()
        })
        .collect();

    let mut raster = Raster::on_grid(grid, 0u8);
    for (cell, v) in raster.data_mut().iter_mut().zip(data) {
        *cell = v;
    }
    Mask::from_raster(raster)
}

/// Mask that excludes every cell touched by at least one invalid-date
/// fire footprint
pub fn invalid_zone_mask(invalid: &[FireRecord], grid: &GridSpec) -> Mask {
    let counts = coverage_count(invalid.iter().map(|r| &r.geometry), grid);
    Mask::from_raster(counts.map(|c| u8::from(c == 0)))
}

/// Ground-truth burn raster named [`CLASS_BAND`].
///
/// 1 where at least one in-scope fire covers the cell, 0 elsewhere, NaN
/// outside `region` or where `mask` excludes the cell.
pub fn ground_truth(
    in_scope: &[DatedFire],
    grid: &GridSpec,
    region: &Region,
    mask: &Mask,
) -> Result<Raster<f64>> {
    let counts = coverage_count(in_scope.iter().map(|f| &f.geometry), grid);
    let burned = counts.map(|c| if c >= 1 { 1.0 } else { 0.0 });
    let clipped = region_mask(region, grid).apply(&burned)?;
    mask.apply(&clipped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use firescar_core::GeoTransform;

    fn grid() -> GridSpec {
        // 4x4 cells of size 1 covering [0,4] x [0,4]
        GridSpec::new(4, 4, GeoTransform::new(0.0, 4.0, 1.0, -1.0))
    }

    fn square(x0: f64, y0: f64, size: f64) -> Geometry<f64> {
        Region::from_bounds(x0, y0, x0 + size, y0 + size).geometry().clone()
    }

    #[test]
    fn overlapping_geometries_are_counted_per_cell() {
        let a = square(0.2, 3.2, 0.5);
        let b = square(0.1, 3.1, 0.3);
        let counts = coverage_count([&a, &b], &grid());

        assert_eq!(counts.get(0, 0).unwrap(), 2);
        assert_eq!(counts.get(0, 1).unwrap(), 0);
        assert_eq!(counts.get(3, 3).unwrap(), 0);
    }

    #[test]
    fn invalid_zone_mask_excludes_touched_cells_only() {
        let record = FireRecord::new("x", "", "", square(1.2, 1.2, 1.5));
        let mask = invalid_zone_mask(&[record], &grid());

        // covers x in [1.2, 2.7], y in [1.2, 2.7] -> rows 1..=2, cols 1..=2
        assert!(!mask.keeps(1, 1));
        assert!(!mask.keeps(2, 2));
        assert!(mask.keeps(0, 0));
        assert!(mask.keeps(3, 3));
        assert_eq!(mask.kept_count(), 12);
    }

    #[test]
    fn no_invalid_records_keeps_everything() {
        let mask = invalid_zone_mask(&[], &grid());
        assert_eq!(mask.kept_count(), 16);
    }

    #[test]
    fn ground_truth_is_clipped_and_masked() {
        let g = grid();
        let fire = FireRecord::new("f", "2016-08-08 04:09:00.000", "2016-08-09 04:09:00.000", square(0.1, 0.1, 0.5))
            .validate()
            .unwrap();
        let region = Region::from_bounds(0.0, 0.0, 3.0, 4.0);
        let mut keep = Raster::on_grid(&g, 1u8);
        keep.set(0, 0, 0).unwrap();
        let mask = Mask::from_raster(keep);

        let truth = ground_truth(&[fire], &g, &region, &mask).unwrap();

        assert_eq!(truth.get(3, 0).unwrap(), 1.0);
        assert_eq!(truth.get(2, 0).unwrap(), 0.0);
        assert!(truth.get(0, 0).unwrap().is_nan());
        assert!(truth.get(1, 3).unwrap().is_nan());
    }
}
