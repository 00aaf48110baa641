//! Gradient formulas shared by the per-tensor and per-channel kernels.
//!
//! Let `Xq` be the quantized code (clamped unless noted), `Xfq` the fake
//! quantized output, `Δ` the scale and `z` the effective zero point.
//!
//! ```text
//! dXfq/dX = 1                    if qmin <= Xq(unclamped) <= qmax, else 0
//! dXfq/dΔ = qmin - z             if Xq == qmin
//!           qmax - z             if Xq == qmax
//!           (Xfq - X) / Δ        otherwise
//! dXfq/dz = -Δ                   if Xq == qmin or Xq == qmax
//!           0                    otherwise
//! ```
//!
//! References: Learned Step Size Quantization (Esser et al., 2020) and
//! Trained Quantization Thresholds (Jain et al., 2019).

use ndarray::{ArrayD, Zip};
use rayon::prelude::*;

use crate::quant::range::QuantRange;

/// Straight-through gradient for one element: `grad` where the unclamped
/// code lies inside the grid, zero where it saturates.
#[inline]
pub fn input_grad_value(grad: f32, code: f32, range: QuantRange) -> f32 {
    if range.contains(code) {
        grad
    } else {
        0.0
    }
}

/// Local derivative of the output w.r.t. the scale for one element.
///
/// `code` must already be clamped; boundary detection is exact equality.
/// The three regimes are blended with 0/1 indicators rather than branched
/// on, so a non-finite interior term (zero scale) turns the result into NaN
/// even for saturated elements.
#[inline]
pub fn scale_grad_local(
    x: f32,
    x_fq: f32,
    code: f32,
    scale: f32,
    zero_point: f32,
    range: QuantRange,
) -> f32 {
    let (small, big) = boundary_indicators(code, range);
    let middle = 1.0 - small - big;
    small * (range.min_f32() - zero_point)
        + big * (range.max_f32() - zero_point)
        + middle * ((x_fq - x) / scale)
}

/// Local derivative of the output w.r.t. the zero point for one element.
///
/// `code` must already be clamped.
#[inline]
pub fn zero_point_grad_local(code: f32, scale: f32, range: QuantRange) -> f32 {
    let (small, big) = boundary_indicators(code, range);
    (small + big) * -scale
}

/// `(code == qmin, code == qmax)` as 0/1 weights.
#[inline]
fn boundary_indicators(code: f32, range: QuantRange) -> (f32, f32) {
    let small = if code == range.min_f32() { 1.0 } else { 0.0 };
    let big = if code == range.max_f32() { 1.0 } else { 0.0 };
    (small, big)
}

/// Gradient mask over a whole tensor: pass `grad_output` through where the
/// unclamped `codes` are on the grid, zero elsewhere.
///
/// Shapes must match; callers validate before calling.
pub fn straight_through_grad(
    grad_output: &ArrayD<f32>,
    codes: &ArrayD<f32>,
    range: QuantRange,
) -> ArrayD<f32> {
    Zip::from(grad_output)
        .and(codes)
        .par_map_collect(|&g, &q| input_grad_value(g, q, range))
}

/// Sum `(scale, zero_point)` gradient contributions.
pub(crate) fn sum_contributions(contrib: &ArrayD<(f32, f32)>) -> (f32, f32) {
    match contrib.as_slice_memory_order() {
        Some(values) => values
            .par_iter()
            .copied()
            .reduce(|| (0.0, 0.0), |a, b| (a.0 + b.0, a.1 + b.1)),
        None => contrib
            .iter()
            .fold((0.0, 0.0), |acc, &(s, z)| (acc.0 + s, acc.1 + z)),
    }
}
