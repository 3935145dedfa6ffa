//! Interpolation functions for LUT evaluation
//!
//! This module provides:
//! - Linear interpolation (1D)
//! - Multilinear interpolation over an N-dimensional grid
//! - Simplex (tetrahedral in 3D) interpolation over an N-dimensional grid
//!
//! Grids are stored with the first input varying slowest and the output
//! channels interleaved at the innermost level, the ICC CLUT layout.
//! Inputs are clamped to [0, 1]. NaN inputs produce NaN outputs instead
//! of indexing out of bounds.

/// Interpolation method for multi-dimensional tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interpolation {
    /// Multilinear: weights every corner of the enclosing hypercube
    Linear,
    /// Simplex: weights the n+1 corners of the enclosing simplex
    #[default]
    Tetrahedral,
}

/// Linear interpolation between two values
///
/// Returns a + t * (b - a) for t in [0, 1]
#[inline]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + t * (b - a)
}

/// 1D LUT interpolation over evenly spaced samples
pub fn lut1d_interp(lut: &[f32], input: f32) -> f32 {
    match lut.len() {
        0 => return input,
        1 => return lut[0],
        _ => {}
    }

    let max_idx = (lut.len() - 1) as f32;
    let pos = input.clamp(0.0, 1.0) * max_idx;
    if pos.is_nan() {
        return f32::NAN;
    }

    let i0 = (pos.floor() as usize).min(lut.len() - 2);
    let t = pos - i0 as f32;
    lerp(lut[i0], lut[i0 + 1], t)
}

/// Cell position along one grid axis
#[derive(Debug, Clone, Copy)]
struct Axis {
    stride: usize,
    frac: f32,
}

/// Locate the grid cell holding `input`. Returns the base offset and the
/// axes that actually span a cell (grid size > 1).
fn locate(grid: &[u8], outputs: usize, input: &[f32], axes: &mut Vec<Axis>) -> usize {
    axes.clear();
    let mut stride = outputs;
    let mut base = 0usize;
    for (dim, &points) in grid.iter().enumerate().rev() {
        let points = points as usize;
        if points > 1 {
            let x = input.get(dim).copied().unwrap_or(0.0).clamp(0.0, 1.0);
            let pos = x * (points - 1) as f32;
            // NaN casts to 0 and keeps its NaN fraction
            let idx = (pos.floor() as usize).min(points - 2);
            base += idx * stride;
            axes.push(Axis {
                stride,
                frac: pos - idx as f32,
            });
        }
        stride *= points.max(1);
    }
    base
}

/// Number of entries an N-dimensional table with these grid sizes holds
pub fn grid_len(grid: &[u8], outputs: usize) -> Option<usize> {
    grid.iter()
        .try_fold(outputs, |acc, &g| acc.checked_mul(g as usize))
}

/// Interpolate an N-dimensional table
///
/// `grid` holds the number of points per input dimension; `data` holds
/// `product(grid) * out.len()` samples. Missing samples read as NaN.
pub fn clut_interp(
    grid: &[u8],
    data: &[f32],
    input: &[f32],
    out: &mut [f32],
    method: Interpolation,
) {
    let outputs = out.len();
    if grid.iter().any(|&g| g == 0) {
        out.fill(f32::NAN);
        return;
    }

    let mut axes = Vec::with_capacity(grid.len());
    let base = locate(grid, outputs, input, &mut axes);
    let sample = |idx: usize| data.get(idx).copied().unwrap_or(f32::NAN);

    match method {
        Interpolation::Linear => {
            out.fill(0.0);
            let corners = 1usize << axes.len().min(usize::BITS as usize - 1);
            for corner in 0..corners {
                let mut weight = 1.0f32;
                let mut offset = base;
                for (bit, axis) in axes.iter().enumerate() {
                    if corner & (1 << bit) != 0 {
                        weight *= axis.frac;
                        offset += axis.stride;
                    } else {
                        weight *= 1.0 - axis.frac;
                    }
                }
                if weight == 0.0 {
                    continue;
                }
                for (j, o) in out.iter_mut().enumerate() {
                    *o += weight * sample(offset + j);
                }
            }
        }
        Interpolation::Tetrahedral => {
            // walk the axes in order of decreasing fraction
            axes.sort_by(|a, b| b.frac.total_cmp(&a.frac));
            let mut prev = 1.0f32;
            let mut offset = base;
            out.fill(0.0);
            for axis in &axes {
                let w = prev - axis.frac;
                for (j, o) in out.iter_mut().enumerate() {
                    *o += w * sample(offset + j);
                }
                offset += axis.stride;
                prev = axis.frac;
            }
            for (j, o) in out.iter_mut().enumerate() {
                *o += prev * sample(offset + j);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-5;

    /// Identity table over `dims` inputs with `points` grid points each
    fn identity_table(dims: usize, points: u8) -> (Vec<u8>, Vec<f32>) {
        let grid = vec![points; dims];
        let total = (points as usize).pow(dims as u32);
        let mut data = Vec::with_capacity(total * dims);
        for i in 0..total {
            let mut rem = i;
            let mut coords = vec![0.0; dims];
            for d in (0..dims).rev() {
                coords[d] = (rem % points as usize) as f32 / (points - 1) as f32;
                rem /= points as usize;
            }
            data.extend_from_slice(&coords);
        }
        (grid, data)
    }

    #[test]
    fn test_lerp() {
        assert!((lerp(0.0, 1.0, 0.0) - 0.0).abs() < EPSILON);
        assert!((lerp(0.0, 1.0, 1.0) - 1.0).abs() < EPSILON);
        assert!((lerp(0.0, 1.0, 0.5) - 0.5).abs() < EPSILON);
        assert!((lerp(2.0, 4.0, 0.25) - 2.5).abs() < EPSILON);
    }

    #[test]
    fn test_lut1d() {
        let lut = vec![0.0, 0.5, 1.0];

        assert!((lut1d_interp(&lut, 0.0) - 0.0).abs() < EPSILON);
        assert!((lut1d_interp(&lut, 0.5) - 0.5).abs() < EPSILON);
        assert!((lut1d_interp(&lut, 1.0) - 1.0).abs() < EPSILON);
        assert!((lut1d_interp(&lut, 0.25) - 0.25).abs() < EPSILON);
        assert!(lut1d_interp(&lut, f32::NAN).is_nan());
        assert_eq!(lut1d_interp(&lut, 7.0), 1.0);
    }

    #[test]
    fn test_identity_lut_3d() {
        let (grid, data) = identity_table(3, 3);
        let inputs = [
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
            [1.0, 1.0, 1.0],
            [0.5, 0.5, 0.5],
            [0.25, 0.5, 0.75],
        ];

        for input in inputs {
            for method in [Interpolation::Linear, Interpolation::Tetrahedral] {
                let mut out = [0.0f32; 3];
                clut_interp(&grid, &data, &input, &mut out, method);
                for c in 0..3 {
                    assert!(
                        (out[c] - input[c]).abs() < EPSILON,
                        "{:?} identity failed: {:?} -> {:?}",
                        method,
                        input,
                        out
                    );
                }
            }
        }
    }

    #[test]
    fn test_identity_lut_4d() {
        let (grid, data) = identity_table(4, 2);
        let input = [0.1, 0.9, 0.4, 0.6];
        for method in [Interpolation::Linear, Interpolation::Tetrahedral] {
            let mut out = [0.0f32; 4];
            clut_interp(&grid, &data, &input, &mut out, method);
            for c in 0..4 {
                assert!((out[c] - input[c]).abs() < EPSILON, "{:?}: {:?}", method, out);
            }
        }
    }

    #[test]
    fn test_out_of_range_and_nan() {
        let (grid, data) = identity_table(3, 5);
        for method in [Interpolation::Linear, Interpolation::Tetrahedral] {
            let mut out = [0.0f32; 3];
            clut_interp(&grid, &data, &[-0.1, 1.1, f32::INFINITY], &mut out, method);
            assert!((out[0] - 0.0).abs() < EPSILON);
            assert!((out[1] - 1.0).abs() < EPSILON);
            assert!((out[2] - 1.0).abs() < EPSILON);

            clut_interp(&grid, &data, &[f32::NAN, 0.5, 0.5], &mut out, method);
            assert!(out[0].is_nan(), "{:?}: {:?}", method, out);
        }
    }

    #[test]
    fn test_single_point_grid() {
        let grid = [1u8, 2];
        let data = [0.25, 0.75];
        let mut out = [0.0f32];
        clut_interp(&grid, &data, &[0.9, 0.5], &mut out, Interpolation::Tetrahedral);
        assert!((out[0] - 0.5).abs() < EPSILON);
    }

    #[test]
    fn test_short_data_is_nan() {
        let grid = [2u8, 2];
        let data = [0.0, 1.0];
        let mut out = [0.0f32];
        clut_interp(&grid, &data, &[1.0, 1.0], &mut out, Interpolation::Linear);
        assert!(out[0].is_nan());
    }

    #[test]
    fn test_grid_len_overflow() {
        assert_eq!(grid_len(&[17, 17, 17], 3), Some(17 * 17 * 17 * 3));
        assert_eq!(grid_len(&[255; 16], 16), None);
    }
}
