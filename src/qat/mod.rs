//! Quantization-aware training wrapper
//!
//! [`LearnableFakeQuantize`] owns learnable scale and zero-point parameters
//! together with an [`Observer`](crate::observer::Observer) and decides, per
//! forward pass, between:
//! - pass-through (fake quantization off)
//! - static estimation (parameters copied from the observer, fast path)
//! - learning (learnable kernel; the returned call feeds backward)

mod config;
mod fake_quant;
mod mode;
mod state;

#[cfg(test)]
mod tests;

pub use config::LearnableFakeQuantConfig;
pub use fake_quant::{FakeQuantOutput, LearnableFakeQuantize, QParamsMut};
pub use mode::{FakeQuantMode, GradScaling};
pub use state::QParamState;
