//! Per-channel learnable fake quantization kernel.
//!
//! Scale and zero point are vectors indexed along `axis`. Each element uses
//! its channel's parameters through the same scalar formulas as the
//! per-tensor kernel; the parameter gradients are reduced over every axis
//! except `axis`.

use ndarray::{Array1, ArrayD, Axis, Zip};
use rayon::prelude::*;

use super::gradients::{input_grad_value, scale_grad_local, zero_point_grad_local};
use super::FakeQuantGrads;
use crate::error::{Error, Result};
use crate::quant::fake_quantize::{
    broadcast_to, channel_unit_view, check_channel_axis, fake_quantize_per_channel_affine,
    quantize_value,
};
use crate::quant::range::QuantRange;
use crate::trace::{TraceStep, TRACER};

/// Per-channel kernel configuration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PerChannelFakeQuantize {
    range: QuantRange,
    axis: usize,
    grad_factor: f32,
}

impl PerChannelFakeQuantize {
    pub fn new(range: QuantRange, axis: usize, grad_factor: f32) -> Self {
        Self { range, axis, grad_factor }
    }

    pub fn range(&self) -> QuantRange {
        self.range
    }

    pub fn axis(&self) -> usize {
        self.axis
    }

    pub fn grad_factor(&self) -> f32 {
        self.grad_factor
    }

    /// Fake quantize `x` with per-channel parameters along `self.axis`.
    ///
    /// Fails when the axis is out of range or the parameter vectors do not
    /// have one entry per channel.
    pub fn forward(
        &self,
        x: &ArrayD<f32>,
        scale: &Array1<f32>,
        zero_point: &Array1<f32>,
    ) -> Result<PerChannelCall> {
        let effective_zp = zero_point.mapv(|z| self.range.effective_zero_point(z));
        tracing::debug!(
            shape = ?x.shape(),
            axis = self.axis,
            channels = scale.len(),
            range = %self.range,
            "per-channel learnable fake quantize"
        );
        let output = TRACER.span(TraceStep::Forward, "per_channel", || {
            fake_quantize_per_channel_affine(x, scale, &effective_zp, self.axis, self.range)
        })?;

        Ok(PerChannelCall {
            x: x.clone(),
            scale: scale.clone(),
            zero_point: zero_point.clone(),
            output,
            range: self.range,
            axis: self.axis,
            grad_factor: self.grad_factor,
        })
    }
}

/// One forward/backward cycle of the per-channel kernel.
#[derive(Clone, Debug)]
pub struct PerChannelCall {
    x: ArrayD<f32>,
    scale: Array1<f32>,
    zero_point: Array1<f32>,
    output: ArrayD<f32>,
    range: QuantRange,
    axis: usize,
    grad_factor: f32,
}

impl PerChannelCall {
    pub fn output(&self) -> &ArrayD<f32> {
        &self.output
    }

    pub fn into_output(self) -> ArrayD<f32> {
        self.output
    }

    pub fn input(&self) -> &ArrayD<f32> {
        &self.x
    }

    pub fn axis(&self) -> usize {
        self.axis
    }

    pub fn scale(&self) -> &Array1<f32> {
        &self.scale
    }

    pub fn zero_point(&self) -> &Array1<f32> {
        &self.zero_point
    }

    pub fn effective_zero_point(&self) -> Array1<f32> {
        self.zero_point.mapv(|z| self.range.effective_zero_point(z))
    }

    /// Gradients for input, scale and zero point given `dL/dXfq`.
    ///
    /// The scale and zero-point gradients hold one value per channel.
    pub fn backward(self, grad_output: &ArrayD<f32>) -> Result<FakeQuantGrads> {
        if grad_output.shape() != self.x.shape() {
            return Err(Error::shape_mismatch(
                "grad_output",
                self.x.shape(),
                grad_output.shape(),
            ));
        }

        TRACER.span(TraceStep::Backward, "per_channel", || self.compute_grads(grad_output))
    }

    fn compute_grads(&self, grad_output: &ArrayD<f32>) -> Result<FakeQuantGrads> {
        let range = self.range;
        let shape = self.x.shape();
        let channels = check_channel_axis(shape, self.axis)?;

        if self.zero_point.len() != self.scale.len() {
            return Err(Error::shape_mismatch(
                "zero_point",
                &[self.scale.len()],
                &[self.zero_point.len()],
            ));
        }

        // (scale, 1 / scale, effective zero point) per channel
        let params: Array1<(f32, f32, f32)> = self
            .scale
            .iter()
            .zip(self.effective_zero_point().iter())
            .map(|(&s, &z)| (s, 1.0 / s, z))
            .collect();
        let params_unit = channel_unit_view(&params, shape, self.axis, "scale")?;
        let params_b = broadcast_to(&params_unit, shape)?;

        // Outputs are allocated in standard layout; the stride-0 broadcast
        // would otherwise steer the collected order.
        let mut codes = ArrayD::zeros(self.x.raw_dim());
        Zip::from(&mut codes)
            .and(&self.x)
            .and(&params_b)
            .par_for_each(|q, &x, &(_, inv, z)| *q = quantize_value(x, inv, z));

        let mut grad_input = ArrayD::zeros(self.x.raw_dim());
        Zip::from(&mut grad_input)
            .and(grad_output)
            .and(&codes)
            .par_for_each(|d, &g, &q| *d = input_grad_value(g, q, range));

        let mut contrib = ArrayD::from_elem(self.x.raw_dim(), (0.0f32, 0.0f32));
        Zip::from(&mut contrib)
            .and(&self.x)
            .and(&self.output)
            .and(&codes)
            .and(&grad_input)
            .and(&params_b)
            .par_for_each(|c, &x, &x_fq, &q, &g, &(s, _, z)| {
                let q = range.clamp(q);
                *c = (
                    scale_grad_local(x, x_fq, q, s, z, range) * g,
                    zero_point_grad_local(q, s, range) * g,
                );
            });

        let axis = Axis(self.axis);
        let sums: Vec<(f32, f32)> = (0..channels)
            .into_par_iter()
            .map(|c| {
                contrib
                    .index_axis(axis, c)
                    .fold((0.0, 0.0), |acc, &(s, z)| (acc.0 + s, acc.1 + z))
            })
            .collect();

        let grad_scale = sums.iter().map(|&(s, _)| s * self.grad_factor).collect();
        let grad_zero_point = sums.iter().map(|&(_, z)| z * self.grad_factor).collect();

        Ok(FakeQuantGrads {
            grad_input,
            grad_scale,
            grad_zero_point,
        })
    }
}

/// Learnable per-channel fake quantization entry point.
pub fn learnable_fake_quantize_per_channel(
    x: &ArrayD<f32>,
    scale: &Array1<f32>,
    zero_point: &Array1<f32>,
    axis: usize,
    qmin: i32,
    qmax: i32,
    grad_factor: f32,
) -> Result<PerChannelCall> {
    let range = QuantRange::new(qmin, qmax)?;
    PerChannelFakeQuantize::new(range, axis, grad_factor).forward(x, scale, zero_point)
}
