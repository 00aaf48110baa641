//! Integer grid definitions: quantization range and target dtype.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// The representable integer grid `[qmin, qmax]`, with `qmin < qmax`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRange", into = "RawRange")]
pub struct QuantRange {
    qmin: i32,
    qmax: i32,
}

#[derive(Serialize, Deserialize)]
struct RawRange {
    qmin: i32,
    qmax: i32,
}

impl TryFrom<RawRange> for QuantRange {
    type Error = Error;

    fn try_from(raw: RawRange) -> Result<Self> {
        Self::new(raw.qmin, raw.qmax)
    }
}

impl From<QuantRange> for RawRange {
    fn from(range: QuantRange) -> Self {
        Self { qmin: range.qmin, qmax: range.qmax }
    }
}

impl QuantRange {
    /// Create a range, rejecting `qmin >= qmax`.
    pub fn new(qmin: i32, qmax: i32) -> Result<Self> {
        if qmin >= qmax {
            return Err(Error::InvalidQuantRange { qmin, qmax });
        }
        Ok(Self { qmin, qmax })
    }

    /// Unsigned grid `[0, 2^bits - 1]`.
    pub fn unsigned(bits: u32) -> Result<Self> {
        if bits == 0 || bits > 31 {
            return Err(Error::Config(format!("unsupported bit width {bits} (must be 1..=31)")));
        }
        Self::new(0, ((1i64 << bits) - 1) as i32)
    }

    /// Signed grid `[-2^(bits-1), 2^(bits-1) - 1]`.
    pub fn signed(bits: u32) -> Result<Self> {
        if bits < 2 || bits > 32 {
            return Err(Error::Config(format!("unsupported bit width {bits} (must be 2..=32)")));
        }
        let half = 1i64 << (bits - 1);
        Self::new((-half) as i32, (half - 1) as i32)
    }

    pub fn qmin(&self) -> i32 {
        self.qmin
    }

    pub fn qmax(&self) -> i32 {
        self.qmax
    }

    /// Lower bound as a float, for comparisons against float codes.
    #[inline]
    pub fn min_f32(&self) -> f32 {
        self.qmin as f32
    }

    /// Upper bound as a float.
    #[inline]
    pub fn max_f32(&self) -> f32 {
        self.qmax as f32
    }

    /// Number of grid points.
    pub fn levels(&self) -> u64 {
        (i64::from(self.qmax) - i64::from(self.qmin) + 1) as u64
    }

    /// `floor(log2(levels))`, e.g. 8 for `[0, 255]`.
    pub fn bitwidth(&self) -> u32 {
        self.levels().ilog2()
    }

    /// Clamp a float code into the grid. NaN stays NaN.
    #[inline]
    pub fn clamp(&self, q: f32) -> f32 {
        q.clamp(self.min_f32(), self.max_f32())
    }

    /// Whether an (unclamped) code lies on the grid's closed interval.
    #[inline]
    pub fn contains(&self, q: f32) -> bool {
        q >= self.min_f32() && q <= self.max_f32()
    }

    /// Round a continuous zero point half-up and clamp it into the grid.
    ///
    /// The learned zero point is stored as a float; both forward and
    /// backward only ever see this integer-valued effective version.
    #[inline]
    pub fn effective_zero_point(&self, zero_point: f32) -> f32 {
        self.clamp((zero_point + 0.5).floor())
    }
}

impl fmt::Display for QuantRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.qmin, self.qmax)
    }
}

/// Integer type the quantized values are ultimately stored in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuantDtype {
    /// Unsigned 8-bit: [0, 255]
    #[default]
    QUInt8,
    /// Signed 8-bit: [-128, 127]
    QInt8,
    /// Signed 32-bit
    QInt32,
}

impl QuantDtype {
    pub fn min(&self) -> i64 {
        match self {
            Self::QUInt8 => 0,
            Self::QInt8 => i64::from(i8::MIN),
            Self::QInt32 => i64::from(i32::MIN),
        }
    }

    pub fn max(&self) -> i64 {
        match self {
            Self::QUInt8 => i64::from(u8::MAX),
            Self::QInt8 => i64::from(i8::MAX),
            Self::QInt32 => i64::from(i32::MAX),
        }
    }

    /// Check that a range fits inside this dtype.
    pub fn check_range(&self, range: QuantRange) -> Result<()> {
        if i64::from(range.qmin()) < self.min() || i64::from(range.qmax()) > self.max() {
            return Err(Error::QuantRangeOutOfBounds {
                qmin: range.qmin(),
                qmax: range.qmax(),
                dtype: self.to_string(),
                min: self.min(),
                max: self.max(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for QuantDtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::QUInt8 => "quint8",
            Self::QInt8 => "qint8",
            Self::QInt32 => "qint32",
        };
        f.write_str(name)
    }
}
