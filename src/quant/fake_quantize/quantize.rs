//! Elementwise quantize / dequantize primitives.
//!
//! Every kernel in the crate funnels through [`quantize_value`], so the
//! per-tensor and per-channel paths agree bit for bit on each element.

use ndarray::{Array1, ArrayD, ArrayViewD, IxDyn, Zip};

use crate::error::{Error, Result};
use crate::quant::range::QuantRange;

/// Quantize a single value onto the (unclamped) integer grid:
/// `round(x * inv_scale + zero_point)`, ties to even.
#[inline]
pub fn quantize_value(x: f32, inv_scale: f32, zero_point: f32) -> f32 {
    (x * inv_scale + zero_point).round_ties_even()
}

/// Quantize, clamp, and map back: `(clamp(q) - zero_point) * scale`.
#[inline]
pub fn fake_quantize_value(
    x: f32,
    scale: f32,
    inv_scale: f32,
    zero_point: f32,
    range: QuantRange,
) -> f32 {
    (range.clamp(quantize_value(x, inv_scale, zero_point)) - zero_point) * scale
}

/// Quantize a tensor with a single scale and zero point.
///
/// With `clamp = false` the raw codes are returned, which is what the
/// straight-through mask in the backward pass inspects.
pub fn quantize(
    x: &ArrayD<f32>,
    scale: f32,
    zero_point: f32,
    range: QuantRange,
    clamp: bool,
) -> ArrayD<f32> {
    let inv_scale = 1.0 / scale;
    Zip::from(x).par_map_collect(|&v| {
        let q = quantize_value(v, inv_scale, zero_point);
        if clamp {
            range.clamp(q)
        } else {
            q
        }
    })
}

/// Map integer codes back to real values: `(q - zero_point) * scale`.
pub fn dequantize(q: &ArrayD<f32>, scale: f32, zero_point: f32) -> ArrayD<f32> {
    q.mapv(|v| (v - zero_point) * scale)
}

/// Quantize with one scale / zero point per slice along `axis`.
pub fn quantize_per_channel(
    x: &ArrayD<f32>,
    scale: &Array1<f32>,
    zero_point: &Array1<f32>,
    axis: usize,
    range: QuantRange,
    clamp: bool,
) -> Result<ArrayD<f32>> {
    let inv_scale = scale.mapv(|s| 1.0 / s);
    let inv_unit = channel_unit_view(&inv_scale, x.shape(), axis, "scale")?;
    let zp_unit = channel_unit_view(zero_point, x.shape(), axis, "zero_point")?;
    let inv_b = broadcast_to(&inv_unit, x.shape())?;
    let zp_b = broadcast_to(&zp_unit, x.shape())?;

    let mut out = ArrayD::zeros(x.raw_dim());
    Zip::from(&mut out).and(x).and(&inv_b).and(&zp_b).par_for_each(|o, &v, &inv, &zp| {
        let q = quantize_value(v, inv, zp);
        *o = if clamp { range.clamp(q) } else { q };
    });
    Ok(out)
}

/// Per-channel counterpart of [`dequantize`].
pub fn dequantize_per_channel(
    q: &ArrayD<f32>,
    scale: &Array1<f32>,
    zero_point: &Array1<f32>,
    axis: usize,
) -> Result<ArrayD<f32>> {
    let scale_unit = channel_unit_view(scale, q.shape(), axis, "scale")?;
    let zp_unit = channel_unit_view(zero_point, q.shape(), axis, "zero_point")?;
    let scale_b = broadcast_to(&scale_unit, q.shape())?;
    let zp_b = broadcast_to(&zp_unit, q.shape())?;

    let mut out = ArrayD::zeros(q.raw_dim());
    Zip::from(&mut out)
        .and(q)
        .and(&scale_b)
        .and(&zp_b)
        .for_each(|o, &v, &s, &zp| *o = (v - zp) * s);
    Ok(out)
}

/// Reshape a per-channel vector to the unit shape `[1, .., C, .., 1]` with
/// the channel extent on `axis`.
///
/// Fails if `axis` is not a dimension of `shape` or the vector length differs
/// from `shape[axis]`.
pub(crate) fn channel_unit_view<'a, A>(
    params: &'a Array1<A>,
    shape: &[usize],
    axis: usize,
    what: &'static str,
) -> Result<ArrayViewD<'a, A>> {
    let channels = check_channel_axis(shape, axis)?;
    if params.len() != channels {
        return Err(Error::shape_mismatch(what, &[channels], &[params.len()]));
    }
    let mut unit = vec![1usize; shape.len()];
    unit[axis] = channels;
    params
        .view()
        .into_shape_with_order(IxDyn(&unit))
        .map_err(|_| Error::shape_mismatch(what, &unit, params.shape()))
}

/// Validate `axis` against `shape` and return the channel extent.
pub(crate) fn check_channel_axis(shape: &[usize], axis: usize) -> Result<usize> {
    shape.get(axis).copied().ok_or(Error::InvalidAxis { axis, ndim: shape.len() })
}

pub(crate) fn broadcast_to<'v, A>(
    unit: &'v ArrayViewD<'_, A>,
    shape: &[usize],
) -> Result<ArrayViewD<'v, A>> {
    unit.broadcast(IxDyn(shape))
        .ok_or_else(|| Error::shape_mismatch("broadcast", shape, unit.shape()))
}
