//! Declarative configuration for [`LearnableFakeQuantize`](super::LearnableFakeQuantize).
//!
//! ```yaml
//! quant_min: 0
//! quant_max: 15
//! scale: 0.1
//! zero_point: 0.0
//! channel_len: 16
//! grad_scaling: element_count
//! mode: learning
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use super::mode::{FakeQuantMode, GradScaling};
use crate::error::{Error, Result};
use crate::quant::range::QuantRange;

/// Construction parameters of a learnable fake quantization module.
///
/// Every field is optional in YAML; missing fields take the defaults of an
/// unsigned 8-bit per-tensor module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LearnableFakeQuantConfig {
    pub quant_min: i32,
    pub quant_max: i32,
    /// Initial scale, replicated per channel
    pub scale: f32,
    /// Initial zero point, replicated per channel
    pub zero_point: f32,
    /// Number of channels; `None` for per-tensor
    pub channel_len: Option<usize>,
    pub grad_scaling: GradScaling,
    pub mode: FakeQuantMode,
}

impl Default for LearnableFakeQuantConfig {
    fn default() -> Self {
        Self {
            quant_min: 0,
            quant_max: 255,
            scale: 1.0,
            zero_point: 0.0,
            channel_len: None,
            grad_scaling: GradScaling::Disabled,
            mode: FakeQuantMode::StaticEstimate,
        }
    }
}

impl LearnableFakeQuantConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the integer grid.
    pub fn with_range(mut self, quant_min: i32, quant_max: i32) -> Self {
        self.quant_min = quant_min;
        self.quant_max = quant_max;
        self
    }

    /// Set the initial scale and zero point.
    pub fn with_qparams(mut self, scale: f32, zero_point: f32) -> Self {
        self.scale = scale;
        self.zero_point = zero_point;
        self
    }

    pub fn with_channel_len(mut self, channel_len: usize) -> Self {
        self.channel_len = Some(channel_len);
        self
    }

    pub fn with_grad_scaling(mut self, grad_scaling: GradScaling) -> Self {
        self.grad_scaling = grad_scaling;
        self
    }

    pub fn with_mode(mut self, mode: FakeQuantMode) -> Self {
        self.mode = mode;
        self
    }

    /// The validated integer grid.
    pub fn range(&self) -> Result<QuantRange> {
        QuantRange::new(self.quant_min, self.quant_max)
    }

    /// Check the configuration before a module is built from it.
    ///
    /// Checks:
    /// - `quant_min < quant_max`
    /// - `channel_len`, when given, is positive
    /// - the initial scale is finite and positive
    /// - a fixed gradient factor is finite
    pub fn validate(&self) -> Result<()> {
        self.range()?;

        if self.channel_len == Some(0) {
            return Err(Error::InvalidChannelLen(0));
        }

        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(Error::Config(format!(
                "initial scale must be finite and positive, got {}",
                self.scale
            )));
        }

        if let GradScaling::Fixed(factor) = self.grad_scaling {
            if !factor.is_finite() {
                return Err(Error::Config(format!("grad scaling factor must be finite, got {factor}")));
            }
        }

        Ok(())
    }

    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| Error::Config(format!("Failed to parse YAML config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load, parse and validate a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let yaml = fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_yaml_str(&yaml)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| Error::Config(format!("Failed to write YAML config: {e}")))
    }
}
