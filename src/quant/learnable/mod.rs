//! Learnable fake quantization kernels
//!
//! Forward passes fake quantize the input exactly like the affine fast path.
//! Backward passes produce gradients for the input (straight-through with
//! saturation masking) and for the scale and zero point, so both can be
//! trained by gradient descent.
//!
//! A forward call returns a [`KernelCall`] that owns the cached input,
//! parameters and output; passing it to `backward` consumes it.

mod call;
pub mod gradients;
mod per_channel;
mod per_tensor;

#[cfg(test)]
mod test_utils;

pub use call::{FakeQuantGrads, KernelCall};
pub use per_channel::{learnable_fake_quantize_per_channel, PerChannelCall, PerChannelFakeQuantize};
pub use per_tensor::{learnable_fake_quantize_per_tensor, PerTensorCall, PerTensorFakeQuantize};
