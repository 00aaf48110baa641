//! Error types for learnable fake quantization.
//!
//! Numeric problems (zero or negative scale) are never reported here: they
//! propagate as NaN/Inf through the kernels. Only configuration and shape
//! contract violations are errors.

use thiserror::Error;

/// Result type alias for entrenar-lfq operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by kernels, the QAT wrapper, and parameter persistence.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid quantization range: quant_min ({qmin}) must be strictly less than quant_max ({qmax})")]
    InvalidQuantRange { qmin: i32, qmax: i32 },

    #[error("Quantization range [{qmin}, {qmax}] out of bounds for {dtype} [{min}, {max}]")]
    QuantRangeOutOfBounds {
        qmin: i32,
        qmax: i32,
        dtype: String,
        min: i64,
        max: i64,
    },

    #[error("Invalid channel length: {0} (must be > 0)")]
    InvalidChannelLen(usize),

    #[error("Channel axis {axis} out of range for tensor with {ndim} dimensions")]
    InvalidAxis { axis: usize, ndim: usize },

    #[error("Shape mismatch for {what}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Scheme mismatch: {0}")]
    SchemeMismatch(String),

    #[error("Missing state keys: {0:?}")]
    MissingStateKeys(Vec<String>),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn shape_mismatch(what: &'static str, expected: &[usize], actual: &[usize]) -> Self {
        Self::ShapeMismatch {
            what,
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }

    /// Whether the error stems from user-supplied configuration rather than
    /// a runtime shape contract violation.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidQuantRange { .. }
                | Self::QuantRangeOutOfBounds { .. }
                | Self::InvalidChannelLen(_)
                | Self::SchemeMismatch(_)
                | Self::Config(_)
        )
    }
}
