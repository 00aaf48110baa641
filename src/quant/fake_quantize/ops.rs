//! Affine fake quantization: quantize onto the integer grid, clamp, and map
//! back to floating point in one pass.
//!
//! This is the non-learnable fast path. The learnable kernels produce their
//! forward output through these same functions.

use ndarray::{Array1, ArrayD, Zip};

use super::quantize::{broadcast_to, channel_unit_view, fake_quantize_value};
use crate::error::Result;
use crate::quant::range::QuantRange;

/// Per-tensor affine fake quantization:
/// `(clamp(round(x / scale + zero_point), qmin, qmax) - zero_point) * scale`.
///
/// `zero_point` is expected to be integer-valued already
/// (see [`QuantRange::effective_zero_point`]).
pub fn fake_quantize_per_tensor_affine(
    x: &ArrayD<f32>,
    scale: f32,
    zero_point: f32,
    range: QuantRange,
) -> ArrayD<f32> {
    let inv_scale = 1.0 / scale;
    Zip::from(x).par_map_collect(|&v| fake_quantize_value(v, scale, inv_scale, zero_point, range))
}

/// Per-channel affine fake quantization along `axis`.
///
/// Each slice `x[.., c, ..]` is processed exactly as
/// [`fake_quantize_per_tensor_affine`] would with `scale[c]` and
/// `zero_point[c]`.
pub fn fake_quantize_per_channel_affine(
    x: &ArrayD<f32>,
    scale: &Array1<f32>,
    zero_point: &Array1<f32>,
    axis: usize,
    range: QuantRange,
) -> Result<ArrayD<f32>> {
    let inv_scale = scale.mapv(|s| 1.0 / s);
    let scale_unit = channel_unit_view(scale, x.shape(), axis, "scale")?;
    let inv_unit = channel_unit_view(&inv_scale, x.shape(), axis, "scale")?;
    let zp_unit = channel_unit_view(zero_point, x.shape(), axis, "zero_point")?;
    let scale_b = broadcast_to(&scale_unit, x.shape())?;
    let inv_b = broadcast_to(&inv_unit, x.shape())?;
    let zp_b = broadcast_to(&zp_unit, x.shape())?;

    // Broadcast views have zero strides; collect into a standard-layout
    // output instead of letting them pick the memory order.
    let mut out = ArrayD::zeros(x.raw_dim());
    Zip::from(&mut out)
        .and(x)
        .and(&scale_b)
        .and(&inv_b)
        .and(&zp_b)
        .par_for_each(|o, &v, &s, &inv, &zp| *o = fake_quantize_value(v, s, inv, zp, range));
    Ok(out)
}
