//! Quantization kernels
//!
//! - Integer grid and dtype bounds ([`QuantRange`], [`QuantDtype`])
//! - Affine fake quantization fast path (per-tensor and per-channel)
//! - Learnable fake quantization with gradients for scale and zero point

pub mod fake_quantize;
pub mod learnable;
pub mod range;

pub use fake_quantize::{
    dequantize, dequantize_per_channel, fake_quantize_per_channel_affine,
    fake_quantize_per_tensor_affine, quantize, quantize_per_channel,
};
pub use learnable::{
    learnable_fake_quantize_per_channel, learnable_fake_quantize_per_tensor, FakeQuantGrads,
    KernelCall, PerChannelCall, PerChannelFakeQuantize, PerTensorCall, PerTensorFakeQuantize,
};
pub use range::{QuantDtype, QuantRange};
