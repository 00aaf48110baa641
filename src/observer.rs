//! Observer interface for quantization parameters
//!
//! An observer watches the tensors flowing through a fake quantization
//! module and proposes `(scale, zero_point)` for them. Statistics estimation
//! lives outside this crate; [`FixedQParamsObserver`] covers callers whose
//! ranges are known ahead of time.

use ndarray::{arr1, Array1, ArrayD};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::quant::range::QuantDtype;

/// How scale and zero point map onto a tensor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum QScheme {
    PerTensorAffine,
    PerTensorSymmetric,
    PerChannelAffine { axis: usize },
    PerChannelSymmetric { axis: usize },
}

impl QScheme {
    pub fn is_per_channel(&self) -> bool {
        matches!(self, Self::PerChannelAffine { .. } | Self::PerChannelSymmetric { .. })
    }

    pub fn is_symmetric(&self) -> bool {
        matches!(self, Self::PerTensorSymmetric | Self::PerChannelSymmetric { .. })
    }

    /// Channel axis for per-channel schemes.
    pub fn channel_axis(&self) -> Option<usize> {
        match self {
            Self::PerChannelAffine { axis } | Self::PerChannelSymmetric { axis } => Some(*axis),
            Self::PerTensorAffine | Self::PerTensorSymmetric => None,
        }
    }
}

/// Quantization parameters proposed by an observer.
///
/// Per-tensor schemes use 1-element vectors.
#[derive(Clone, Debug, PartialEq)]
pub struct QParams {
    pub scale: Array1<f32>,
    pub zero_point: Array1<f32>,
}

impl QParams {
    /// Per-tensor parameters.
    pub fn per_tensor(scale: f32, zero_point: f32) -> Self {
        Self {
            scale: arr1(&[scale]),
            zero_point: arr1(&[zero_point]),
        }
    }

    /// Number of entries (1 for per-tensor).
    pub fn len(&self) -> usize {
        self.scale.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scale.is_empty()
    }
}

/// Source of quantization parameters for a fake quantization module.
pub trait Observer: Send {
    /// Record statistics of a tensor seen in the forward pass.
    fn observe(&mut self, x: &ArrayD<f32>);

    /// Current best `(scale, zero_point)`.
    fn calculate_qparams(&self) -> QParams;

    /// Integer type the parameters target.
    fn dtype(&self) -> QuantDtype;

    fn qscheme(&self) -> QScheme;
}

/// Observer returning constant parameters regardless of the data.
#[derive(Clone, Debug)]
pub struct FixedQParamsObserver {
    qparams: QParams,
    dtype: QuantDtype,
    qscheme: QScheme,
    num_batches: usize,
}

impl FixedQParamsObserver {
    /// Create an observer with the given parameters.
    ///
    /// Scale and zero point must have equal, non-zero length; per-tensor
    /// schemes take exactly one entry.
    pub fn new(qparams: QParams, dtype: QuantDtype, qscheme: QScheme) -> Result<Self> {
        if qparams.is_empty() {
            return Err(Error::InvalidChannelLen(0));
        }
        if qparams.zero_point.len() != qparams.scale.len() {
            return Err(Error::shape_mismatch(
                "zero_point",
                &[qparams.scale.len()],
                &[qparams.zero_point.len()],
            ));
        }
        if !qscheme.is_per_channel() && qparams.len() != 1 {
            return Err(Error::SchemeMismatch(format!(
                "{qscheme:?} takes a single scale, got {}",
                qparams.len()
            )));
        }
        Ok(Self {
            qparams,
            dtype,
            qscheme,
            num_batches: 0,
        })
    }

    /// Per-tensor affine observer.
    pub fn per_tensor(scale: f32, zero_point: f32, dtype: QuantDtype) -> Self {
        Self {
            qparams: QParams::per_tensor(scale, zero_point),
            dtype,
            qscheme: QScheme::PerTensorAffine,
            num_batches: 0,
        }
    }

    /// Per-channel affine observer along `axis`.
    pub fn per_channel(
        scale: Vec<f32>,
        zero_point: Vec<f32>,
        axis: usize,
        dtype: QuantDtype,
    ) -> Result<Self> {
        Self::new(
            QParams {
                scale: Array1::from_vec(scale),
                zero_point: Array1::from_vec(zero_point),
            },
            dtype,
            QScheme::PerChannelAffine { axis },
        )
    }

    /// Number of tensors observed so far.
    pub fn num_batches(&self) -> usize {
        self.num_batches
    }
}

impl Observer for FixedQParamsObserver {
    fn observe(&mut self, _x: &ArrayD<f32>) {
        self.num_batches += 1;
    }

    fn calculate_qparams(&self) -> QParams {
        self.qparams.clone()
    }

    fn dtype(&self) -> QuantDtype {
        self.dtype
    }

    fn qscheme(&self) -> QScheme {
        self.qscheme
    }
}
