//! Fixed-weight convolution
//!
//! No-value policy: an output cell is NaN when its own input is NaN or when
//! any neighbour under a non-zero weight is NaN or falls outside the grid.

use firescar_core::{Algorithm, Error, Raster, Result};

use crate::maybe_rayon::*;

/// A square convolution kernel with odd side length
#[derive(Debug, Clone, PartialEq)]
pub struct Kernel {
    size: usize,
    weights: Vec<f64>,
}

impl Kernel {
    /// Kernel from rows of weights; `normalize` rescales them to sum to 1
    pub fn fixed(rows: &[Vec<f64>], normalize: bool) -> Result<Self> {
        let size = rows.len();
        if size == 0 || size % 2 == 0 || rows.iter().any(|r| r.len() != size) {
            return Err(Error::InvalidParameter {
                name: "kernel",
                value: format!("{} rows", size),
                reason: "kernel must be square with an odd side".into(),
            });
        }
        let mut weights: Vec<f64> = rows.iter().flatten().copied().collect();
        if normalize {
            let sum: f64 = weights.iter().sum();
            if sum.abs() < 1e-12 {
                return Err(Error::InvalidParameter {
                    name: "kernel",
                    value: format!("{:?}", weights),
                    reason: "weights sum to zero and cannot be normalized".into(),
                });
            }
            weights.iter_mut().for_each(|w| *w /= sum);
        }
        Ok(Self { size, weights })
    }

    /// Ring blur used to smooth index deltas: corners 1/16, edges 1/8,
    /// centre 0, normalized (corners 1/12, edges 1/6)
    pub fn ring_blur() -> Self {
        let (c, e) = (1.0 / 12.0, 1.0 / 6.0);
        Self {
            size: 3,
            weights: vec![c, e, c, e, 0.0, e, c, e, c],
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn radius(&self) -> usize {
        self.size / 2
    }

    /// Weight at kernel position (row, col)
    pub fn weight(&self, row: usize, col: usize) -> f64 {
        self.weights[row * self.size + col]
    }

    /// Sum of all weights
    pub fn sum(&self) -> f64 {
        self.weights.iter().sum()
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Self::ring_blur()
    }
}

/// Convolution stage
#[derive(Debug, Clone, Default)]
pub struct Convolve;

impl Algorithm for Convolve {
    type Input = Raster<f64>;
    type Output = Raster<f64>;
    type Params = Kernel;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Convolve"
    }

    fn description(&self) -> &'static str {
        "Fixed-kernel convolution propagating missing values"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        convolve(&input, &params)
    }
}

/// Convolve a raster with `kernel`
pub fn convolve(raster: &Raster<f64>, kernel: &Kernel) -> Result<Raster<f64>> {
    let (rows, cols) = raster.shape();
    let radius = kernel.radius() as isize;
    let size = kernel.size();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut line = vec![f64::NAN; cols];
            'cells: for (col, out) in line.iter_mut().enumerate() {
                let center = unsafe { raster.get_unchecked(row, col) };
                if center.is_nan() {
                    continue;
                }
                let mut acc = 0.0;
                for kr in 0..size {
                    for kc in 0..size {
                        let w = kernel.weight(kr, kc);
                        if w == 0.0 {
                            continue;
                        }
                        let r = row as isize + kr as isize - radius;
                        let c = col as isize + kc as isize - radius;
                        if r < 0 || c < 0 || r >= rows as isize || c >= cols as isize {
                            continue 'cells;
                        }
                        let v = unsafe { raster.get_unchecked(r as usize, c as usize) };
                        if v.is_nan() {
                            continue 'cells;
                        }
                        acc += w * v;
                    }
                }
                *out = acc;
            }
            line
        })
        .collect();

    raster.derive(data, Some(f64::NAN))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn ring_blur_weights_sum_to_one() {
        let k = Kernel::ring_blur();
        assert_relative_eq!(k.sum(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(k.weight(0, 0), 1.0 / 12.0, epsilon = 1e-12);
        assert_relative_eq!(k.weight(0, 1), 1.0 / 6.0, epsilon = 1e-12);
        assert_eq!(k.weight(1, 1), 0.0);
    }

    #[test]
    fn fixed_normalizes_literal_weights() {
        let c = 1.0 / 16.0;
        let e = 1.0 / 8.0;
        let k = Kernel::fixed(&[vec![c, e, c], vec![e, 0.0, e], vec![c, e, c]], true).unwrap();
        let expected = Kernel::ring_blur();
        for r in 0..3 {
            for c in 0..3 {
                assert_relative_eq!(k.weight(r, c), expected.weight(r, c), epsilon = 1e-12);
            }
        }
        assert!(Kernel::fixed(&[vec![1.0, 1.0]], false).is_err());
        assert!(Kernel::fixed(&[vec![0.0]], true).is_err());
    }

    #[test]
    fn constant_field_is_unchanged_inside() {
        let raster = Raster::filled(5, 5, 0.4);
        let out = Convolve.execute_default(raster).unwrap();
        assert_relative_eq!(out.get(2, 2).unwrap(), 0.4, epsilon = 1e-12);
    }

    #[test]
    fn borders_and_missing_neighbours_propagate_nan() {
        let mut raster = Raster::filled(5, 5, 1.0);
        raster.set(2, 2, f64::NAN).unwrap();
        let out = convolve(&raster, &Kernel::ring_blur()).unwrap();

        // outside-grid neighbours
        assert!(out.get(0, 0).unwrap().is_nan());
        assert!(out.get(4, 2).unwrap().is_nan());
        // NaN centre and NaN neighbour
        assert!(out.get(2, 2).unwrap().is_nan());
        assert!(out.get(1, 1).unwrap().is_nan());
        assert!(out.get(3, 2).unwrap().is_nan());
    }

    #[test]
    fn zero_weight_centre_does_not_contribute() {
        let mut raster = Raster::filled(3, 3, 0.0);
        raster.set(1, 1, 100.0).unwrap();
        let out = convolve(&raster, &Kernel::ring_blur()).unwrap();
        assert_relative_eq!(out.get(1, 1).unwrap(), 0.0);
    }
}
