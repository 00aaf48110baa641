//! Entrenar LFQ: learnable fake quantization for quantization-aware training
//!
//! Fake quantization rounds a tensor onto an affine integer grid and maps it
//! back to floating point, so a network trains against the error it will see
//! once deployed in integer form. The learnable variant also produces
//! gradients for the scale and zero point (LSQ / TQT), letting an optimizer
//! tune them alongside the weights.
//!
//! # Architecture
//!
//! - `quant::fake_quantize`: quantize / dequantize primitives and the
//!   non-learnable affine fast path
//! - `quant::learnable`: per-tensor and per-channel kernels with backward
//!   passes
//! - `observer`: source of static scale / zero-point estimates
//! - `qat`: the [`LearnableFakeQuantize`] module tying parameters, observer
//!   and mode together
//!
//! # Example
//!
//! ```
//! use entrenar_lfq::quant::learnable_fake_quantize_per_tensor;
//! use ndarray::{arr1, ArrayD};
//!
//! let x = arr1(&[0.0f32, 0.4, 0.6, 1.0]).into_dyn();
//! let call = learnable_fake_quantize_per_tensor(&x, 0.5, 0.0, 0, 1, 1.0)?;
//! assert_eq!(call.output().as_slice().unwrap(), &[0.0, 0.5, 0.5, 0.5]);
//!
//! let grads = call.backward(&ArrayD::ones(x.raw_dim()))?;
//! assert_eq!(grads.grad_input.as_slice().unwrap(), &[1.0, 1.0, 1.0, 0.0]);
//! # Ok::<(), entrenar_lfq::Error>(())
//! ```

pub mod error;
pub mod observer;
pub mod qat;
pub mod quant;
pub mod trace;

pub use error::{Error, Result};
pub use observer::{FixedQParamsObserver, Observer, QParams, QScheme};
pub use qat::{FakeQuantMode, FakeQuantOutput, GradScaling, LearnableFakeQuantConfig, LearnableFakeQuantize};
pub use quant::{FakeQuantGrads, KernelCall, QuantDtype, QuantRange};
