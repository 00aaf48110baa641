//! The learnable fake quantization module.

use ndarray::{Array1, ArrayD};
use std::fmt;

use super::config::LearnableFakeQuantConfig;
use super::mode::{FakeQuantMode, GradScaling};
use crate::error::{Error, Result};
use crate::observer::{Observer, QParams, QScheme};
use crate::quant::fake_quantize::{fake_quantize_per_channel_affine, fake_quantize_per_tensor_affine};
use crate::quant::learnable::{KernelCall, PerChannelFakeQuantize, PerTensorFakeQuantize};
use crate::quant::range::QuantRange;
use crate::trace::{TraceStep, TRACER};

/// Result of a forward pass.
#[derive(Clone, Debug)]
pub enum FakeQuantOutput {
    /// Fake quantization disabled; the input is returned unchanged
    Passthrough(ArrayD<f32>),
    /// Fast-path fake quantization with the current (static) parameters
    Quantized(ArrayD<f32>),
    /// Learnable kernel output awaiting its backward pass
    Learnable(KernelCall),
}

impl FakeQuantOutput {
    pub fn output(&self) -> &ArrayD<f32> {
        match self {
            Self::Passthrough(x) | Self::Quantized(x) => x,
            Self::Learnable(call) => call.output(),
        }
    }

    pub fn into_output(self) -> ArrayD<f32> {
        match self {
            Self::Passthrough(x) | Self::Quantized(x) => x,
            Self::Learnable(call) => call.into_output(),
        }
    }

    /// The kernel call to hand to backward, present only in learning mode.
    pub fn into_call(self) -> Option<KernelCall> {
        match self {
            Self::Learnable(call) => Some(call),
            Self::Passthrough(_) | Self::Quantized(_) => None,
        }
    }
}

/// Mutable access to the learnable parameters for an external optimizer.
pub struct QParamsMut<'a> {
    pub scale: &'a mut Array1<f32>,
    pub zero_point: &'a mut Array1<f32>,
}

/// Fake quantization module whose scale and zero point can be learned.
///
/// The module owns the parameters and an observer. Depending on its
/// [`FakeQuantMode`] a forward pass copies the observer's estimates into
/// the parameters, fake quantizes with them, or runs the learnable kernel
/// so the parameters receive gradients.
pub struct LearnableFakeQuantize {
    range: QuantRange,
    scale: Array1<f32>,
    zero_point: Array1<f32>,
    mode: FakeQuantMode,
    grad_scaling: GradScaling,
    observer: Box<dyn Observer>,
}

impl fmt::Debug for LearnableFakeQuantize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LearnableFakeQuantize")
            .field("range", &self.range)
            .field("scale", &self.scale)
            .field("zero_point", &self.zero_point)
            .field("mode", &self.mode)
            .field("grad_scaling", &self.grad_scaling)
            .field("qscheme", &self.observer.qscheme())
            .field("dtype", &self.observer.dtype())
            .finish()
    }
}

impl LearnableFakeQuantize {
    /// Build a module from a configuration and an observer.
    ///
    /// Fails if the configuration is invalid, the range does not fit the
    /// observer's dtype, or `channel_len` disagrees with the observer's
    /// scheme (set for per-channel schemes, unset for per-tensor ones).
    pub fn new(config: LearnableFakeQuantConfig, observer: Box<dyn Observer>) -> Result<Self> {
        config.validate()?;
        let range = config.range()?;
        observer.dtype().check_range(range)?;

        let scheme = observer.qscheme();
        let len = match (scheme.is_per_channel(), config.channel_len) {
            (true, Some(len)) => len,
            (false, None) => 1,
            (true, None) => {
                return Err(Error::SchemeMismatch(format!(
                    "{scheme:?} requires channel_len"
                )))
            }
            (false, Some(len)) => {
                return Err(Error::SchemeMismatch(format!(
                    "{scheme:?} does not take channel_len (got {len})"
                )))
            }
        };

        tracing::debug!(
            range = %range,
            channels = len,
            qscheme = ?scheme,
            mode = ?config.mode,
            "created learnable fake quantize"
        );

        Ok(Self {
            range,
            scale: Array1::from_elem(len, config.scale),
            zero_point: Array1::from_elem(len, config.zero_point),
            mode: config.mode,
            grad_scaling: config.grad_scaling,
            observer,
        })
    }

    /// Learn scale and zero point by backprop; output is fake quantized.
    pub fn enable_param_learning(&mut self) -> &mut Self {
        self.mode = FakeQuantMode::Learning;
        self
    }

    /// Take scale and zero point from the observer; output is fake quantized.
    pub fn enable_static_estimate(&mut self) -> &mut Self {
        self.mode = FakeQuantMode::StaticEstimate;
        self
    }

    /// Take scale and zero point from the observer; output is the input.
    pub fn enable_static_observation(&mut self) -> &mut Self {
        self.mode = FakeQuantMode::StaticObservation;
        self
    }

    /// Keep parameters fixed; output is the input.
    pub fn disable(&mut self) -> &mut Self {
        self.mode = FakeQuantMode::Disabled;
        self
    }

    pub fn set_mode(&mut self, mode: FakeQuantMode) -> &mut Self {
        self.mode = mode;
        self
    }

    pub fn mode(&self) -> FakeQuantMode {
        self.mode
    }

    /// Whether scale and zero point currently receive gradients.
    pub fn is_learning(&self) -> bool {
        self.mode.is_learning()
    }

    pub fn grad_scaling(&self) -> GradScaling {
        self.grad_scaling
    }

    pub fn set_grad_scaling(&mut self, grad_scaling: GradScaling) {
        self.grad_scaling = grad_scaling;
    }

    pub fn range(&self) -> QuantRange {
        self.range
    }

    /// `floor(log2(quant_max - quant_min + 1))`
    pub fn bitwidth(&self) -> u32 {
        self.range.bitwidth()
    }

    pub fn qscheme(&self) -> QScheme {
        self.observer.qscheme()
    }

    pub fn observer(&self) -> &dyn Observer {
        self.observer.as_ref()
    }

    pub fn scale(&self) -> &Array1<f32> {
        &self.scale
    }

    /// The stored continuous zero point (not rounded).
    pub fn zero_point(&self) -> &Array1<f32> {
        &self.zero_point
    }

    /// Parameters for an optimizer step.
    pub fn parameters_mut(&mut self) -> QParamsMut<'_> {
        QParamsMut {
            scale: &mut self.scale,
            zero_point: &mut self.zero_point,
        }
    }

    /// The observer's current estimate.
    pub fn calculate_qparams(&self) -> QParams {
        self.observer.calculate_qparams()
    }

    /// Overwrite scale and zero point.
    ///
    /// Vectors must match the module's channel count; a 1-element vector is
    /// broadcast to every channel.
    pub fn set_qparams(&mut self, qparams: &QParams) -> Result<()> {
        let len = self.scale.len();
        let scale = broadcast_param("scale", &qparams.scale, len)?;
        let zero_point = broadcast_param("zero_point", &qparams.zero_point, len)?;

        if scale.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            tracing::warn!(scale = ?scale, "observer produced a non-positive or non-finite scale");
        }

        self.scale = scale;
        self.zero_point = zero_point;
        Ok(())
    }

    /// Emit the current parameters as a tracing event.
    pub fn log_quant_params(&self) {
        tracing::info!(
            scale = ?self.scale.as_slice(),
            zero_point = ?self.zero_point.as_slice(),
            "learnable fake quantize parameters"
        );
    }

    /// Observe `x`, refresh the parameters if the mode asks for it, and
    /// produce the output for the current mode.
    pub fn forward(&mut self, x: &ArrayD<f32>) -> Result<FakeQuantOutput> {
        let observer = &mut self.observer;
        TRACER.span(TraceStep::Observe, "observer", || observer.observe(x));

        if self.mode.copies_qparams() {
            let qparams = self.observer.calculate_qparams();
            self.set_qparams(&qparams)?;
        }

        if !self.mode.fake_quant_enabled() {
            return Ok(FakeQuantOutput::Passthrough(x.clone()));
        }

        let axis = self.observer.qscheme().channel_axis();
        if self.mode.is_learning() {
            let grad_factor = self.grad_scaling.factor(x.len(), self.range.qmax());
            let call: KernelCall = match axis {
                Some(axis) => PerChannelFakeQuantize::new(self.range, axis, grad_factor)
                    .forward(x, &self.scale, &self.zero_point)?
                    .into(),
                None => PerTensorFakeQuantize::new(self.range, grad_factor)
                    .forward(x, self.scale[0], self.zero_point[0])
                    .into(),
            };
            return Ok(FakeQuantOutput::Learnable(call));
        }

        let range = self.range;
        let zero_point = self.zero_point.mapv(|z| range.effective_zero_point(z));
        tracing::debug!(shape = ?x.shape(), channel_axis = ?axis, "static fake quantize");
        let output = TRACER.span(TraceStep::Forward, "static", || match axis {
            Some(axis) => fake_quantize_per_channel_affine(x, &self.scale, &zero_point, axis, range),
            None => Ok(fake_quantize_per_tensor_affine(
                x,
                self.scale[0],
                zero_point[0],
                range,
            )),
        })?;
        Ok(FakeQuantOutput::Quantized(output))
    }

    pub(crate) fn replace_params(&mut self, scale: Array1<f32>, zero_point: Array1<f32>) {
        self.scale = scale;
        self.zero_point = zero_point;
    }
}

fn broadcast_param(what: &'static str, values: &Array1<f32>, len: usize) -> Result<Array1<f32>> {
    match values.len() {
        n if n == len => Ok(values.clone()),
        1 => Ok(Array1::from_elem(len, values[0])),
        n => Err(Error::shape_mismatch(what, &[len], &[n])),
    }
}
