//! Affine fake quantization primitives
//!
//! Fake quantization simulates integer quantization while staying in floating
//! point:
//! - Quantize: `q = round(x / scale + zero_point)` (ties to even)
//! - Clamp: `q` into `[qmin, qmax]`
//! - Dequantize: `(q - zero_point) * scale`
//!
//! Per-channel variants broadcast one scale / zero point per slice along a
//! channel axis.

mod ops;
mod quantize;


pub use ops::{fake_quantize_per_channel_affine, fake_quantize_per_tensor_affine};
pub(crate) use quantize::{broadcast_to, channel_unit_view, check_channel_axis};
pub use quantize::{
    dequantize, dequantize_per_channel, fake_quantize_value, quantize, quantize_per_channel,
    quantize_value,
};
