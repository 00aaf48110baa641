//! Per-tensor learnable fake quantization kernel.

use ndarray::{arr1, ArrayD, Zip};

use super::gradients::{
    scale_grad_local, straight_through_grad, sum_contributions, zero_point_grad_local,
};
use super::FakeQuantGrads;
use crate::error::{Error, Result};
use crate::quant::fake_quantize::{fake_quantize_per_tensor_affine, quantize};
use crate::quant::range::QuantRange;
use crate::trace::{TraceStep, TRACER};

/// Per-tensor kernel configuration: one scale and zero point for the whole
/// tensor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PerTensorFakeQuantize {
    range: QuantRange,
    grad_factor: f32,
}

impl PerTensorFakeQuantize {
    /// `grad_factor` multiplies the scale and zero-point gradients only.
    pub fn new(range: QuantRange, grad_factor: f32) -> Self {
        Self { range, grad_factor }
    }

    pub fn range(&self) -> QuantRange {
        self.range
    }

    pub fn grad_factor(&self) -> f32 {
        self.grad_factor
    }

    /// Fake quantize `x` and capture everything the backward pass needs.
    ///
    /// `zero_point` is the continuous learned value; it is rounded and
    /// clamped here and again in backward. A non-positive scale is not
    /// rejected and yields non-finite outputs.
    pub fn forward(&self, x: &ArrayD<f32>, scale: f32, zero_point: f32) -> PerTensorCall {
        let effective_zp = self.range.effective_zero_point(zero_point);
        tracing::debug!(
            shape = ?x.shape(),
            scale,
            zero_point = effective_zp,
            range = %self.range,
            "per-tensor learnable fake quantize"
        );
        let output = TRACER.span(TraceStep::Forward, "per_tensor", || {
            fake_quantize_per_tensor_affine(x, scale, effective_zp, self.range)
        });

        PerTensorCall {
            x: x.clone(),
            scale,
            zero_point,
            output,
            range: self.range,
            grad_factor: self.grad_factor,
        }
    }
}

/// One forward/backward cycle of the per-tensor kernel.
///
/// Returned by [`PerTensorFakeQuantize::forward`] and consumed by
/// [`PerTensorCall::backward`].
#[derive(Clone, Debug)]
pub struct PerTensorCall {
    x: ArrayD<f32>,
    scale: f32,
    zero_point: f32,
    output: ArrayD<f32>,
    range: QuantRange,
    grad_factor: f32,
}

impl PerTensorCall {
    /// The fake quantized tensor.
    pub fn output(&self) -> &ArrayD<f32> {
        &self.output
    }

    /// Take the output, dropping the cached state.
    pub fn into_output(self) -> ArrayD<f32> {
        self.output
    }

    pub fn input(&self) -> &ArrayD<f32> {
        &self.x
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// The continuous zero point the forward pass received.
    pub fn zero_point(&self) -> f32 {
        self.zero_point
    }

    /// The rounded and clamped zero point actually applied.
    pub fn effective_zero_point(&self) -> f32 {
        self.range.effective_zero_point(self.zero_point)
    }

    /// Gradients for input, scale and zero point given `dL/dXfq`.
    ///
    /// The scale and zero-point gradients are 1-element arrays.
    pub fn backward(self, grad_output: &ArrayD<f32>) -> Result<FakeQuantGrads> {
        if grad_output.shape() != self.x.shape() {
            return Err(Error::shape_mismatch(
                "grad_output",
                self.x.shape(),
                grad_output.shape(),
            ));
        }

        TRACER.span(TraceStep::Backward, "per_tensor", || {
            let range = self.range;
            let scale = self.scale;
            let zp = range.effective_zero_point(self.zero_point);

            let codes = quantize(&self.x, scale, zp, range, false);
            let grad_input = straight_through_grad(grad_output, &codes, range);

            let contrib = Zip::from(&self.x)
                .and(&self.output)
                .and(&codes)
                .and(&grad_input)
                .par_map_collect(|&x, &x_fq, &q, &g| {
                    let q = range.clamp(q);
                    (
                        scale_grad_local(x, x_fq, q, scale, zp, range) * g,
                        zero_point_grad_local(q, scale, range) * g,
                    )
                });
            let (grad_scale, grad_zp) = sum_contributions(&contrib);

            Ok(FakeQuantGrads {
                grad_input,
                grad_scale: arr1(&[grad_scale * self.grad_factor]),
                grad_zero_point: arr1(&[grad_zp * self.grad_factor]),
            })
        })
    }
}

/// Learnable per-tensor fake quantization entry point.
///
/// Validates `qmin < qmax`, then runs the forward pass.
pub fn learnable_fake_quantize_per_tensor(
    x: &ArrayD<f32>,
    scale: f32,
    zero_point: f32,
    qmin: i32,
    qmax: i32,
    grad_factor: f32,
) -> Result<PerTensorCall> {
    let range = QuantRange::new(qmin, qmax)?;
    Ok(PerTensorFakeQuantize::new(range, grad_factor).forward(x, scale, zero_point))
}
