//! Operating modes of the QAT wrapper.

use serde::{Deserialize, Serialize};

/// What a forward pass does with the observer and the output.
///
/// | Mode                | copy observer qparams | output               |
/// |---------------------|-----------------------|----------------------|
/// | `Disabled`          | no                    | input unchanged      |
/// | `StaticObservation` | yes                   | input unchanged      |
/// | `StaticEstimate`    | yes                   | fast-path fake quant |
/// | `Learning`          | no                    | learnable kernel     |
///
/// The observer sees every forward input in every mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FakeQuantMode {
    Disabled,
    StaticObservation,
    #[default]
    StaticEstimate,
    Learning,
}

impl FakeQuantMode {
    /// Whether the observer's qparams overwrite scale and zero point.
    pub fn copies_qparams(&self) -> bool {
        matches!(self, Self::StaticObservation | Self::StaticEstimate)
    }

    /// Whether the output is fake quantized.
    pub fn fake_quant_enabled(&self) -> bool {
        matches!(self, Self::StaticEstimate | Self::Learning)
    }

    /// Whether scale and zero point receive gradients.
    pub fn is_learning(&self) -> bool {
        matches!(self, Self::Learning)
    }
}

/// Multiplier for the scale and zero-point gradients.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradScaling {
    /// Factor 1
    #[default]
    Disabled,
    /// Caller-chosen constant
    Fixed(f32),
    /// `1 / sqrt(numel * qmax)` of the forwarded tensor
    ElementCount,
}

impl GradScaling {
    /// Gradient factor for a forward input with `numel` elements.
    ///
    /// `ElementCount` falls back to 1 when `numel * qmax` is not positive.
    pub fn factor(&self, numel: usize, qmax: i32) -> f32 {
        match *self {
            Self::Disabled => 1.0,
            Self::Fixed(factor) => factor,
            Self::ElementCount => {
                let denom = numel as f64 * f64::from(qmax);
                if denom > 0.0 {
                    (1.0 / denom.sqrt()) as f32
                } else {
                    1.0
                }
            }
        }
    }
}
