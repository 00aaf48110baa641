//! Kernel call values shared between forward and backward.

use ndarray::{Array1, ArrayD};

use super::per_channel::PerChannelCall;
use super::per_tensor::PerTensorCall;
use crate::error::Result;

/// Gradients produced by a learnable fake quantization backward pass.
#[derive(Clone, Debug, PartialEq)]
pub struct FakeQuantGrads {
    /// `dL/dX`, same shape as the input
    pub grad_input: ArrayD<f32>,
    /// `dL/dscale`, one entry per-tensor or one per channel
    pub grad_scale: Array1<f32>,
    /// `dL/dzero_point`, same length as `grad_scale`
    pub grad_zero_point: Array1<f32>,
}

/// A forward pass awaiting its backward pass, tagged by kernel.
#[derive(Clone, Debug)]
pub enum KernelCall {
    PerTensor(PerTensorCall),
    PerChannel(PerChannelCall),
}

impl KernelCall {
    /// The fake quantized tensor.
    pub fn output(&self) -> &ArrayD<f32> {
        match self {
            Self::PerTensor(call) => call.output(),
            Self::PerChannel(call) => call.output(),
        }
    }

    /// Take the output, dropping the cached state.
    pub fn into_output(self) -> ArrayD<f32> {
        match self {
            Self::PerTensor(call) => call.into_output(),
            Self::PerChannel(call) => call.into_output(),
        }
    }

    /// Channel axis for per-channel calls.
    pub fn channel_axis(&self) -> Option<usize> {
        match self {
            Self::PerTensor(_) => None,
            Self::PerChannel(call) => Some(call.axis()),
        }
    }

    /// Run the matching backward pass, consuming the cached state.
    pub fn backward(self, grad_output: &ArrayD<f32>) -> Result<FakeQuantGrads> {
        match self {
            Self::PerTensor(call) => call.backward(grad_output),
            Self::PerChannel(call) => call.backward(grad_output),
        }
    }
}

impl From<PerTensorCall> for KernelCall {
    fn from(call: PerTensorCall) -> Self {
        Self::PerTensor(call)
    }
}

impl From<PerChannelCall> for KernelCall {
    fn from(call: PerChannelCall) -> Self {
        Self::PerChannel(call)
    }
}
