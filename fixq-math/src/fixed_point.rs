use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::ops::Exact;

/// Widest word length a format may declare. Raw values are stored as `i64`.
pub const MAX_WORD_LENGTH: u32 = 64;

/// What happens when a value falls outside a format's range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Two's-complement wraparound (drop the high bits)
    #[default]
    Wrap,
    /// Clamp to the nearest representable boundary
    Saturate,
}

/// How bits below the LSB are discarded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantizationPolicy {
    /// Floor of the two's-complement value
    #[default]
    Truncate,
    /// Nearest, ties away from zero
    RoundNearest,
    /// Nearest, ties to the even raw integer
    RoundNearestEven,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FixedPointError {
    #[error("Invalid format: word length {word_length}, fractional length {fractional_length}: {reason}")]
    InvalidFormat {
        word_length: i64,
        fractional_length: i64,
        reason: &'static str,
    },
    #[error("Raw value {raw} does not fit in {word_length} bits")]
    RawOutOfRange { raw: i64, word_length: u32 },
    #[error("Shape mismatch: {0} vs {1}")]
    ShapeMismatch(usize, usize),
    #[error("Cannot parse '{0}'")]
    ParseFormat(String),
}

/// Signed fixed-point number format.
///
/// The sign bit is explicit: `integer_length = word_length - fractional_length - 1`.
/// Formats are plain values; resizing produces a new format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "FormatFields", into = "FormatFields")]
pub struct FixedPointFormat {
    word_length: u32,
    fractional_length: u32,
    overflow: OverflowPolicy,
    quantization: QuantizationPolicy,
}

/// Shadow of [`FixedPointFormat`] so deserialization goes through validation.
#[derive(Serialize, Deserialize)]
struct FormatFields {
    word_length: i64,
    fractional_length: i64,
    #[serde(default)]
    overflow: OverflowPolicy,
    #[serde(default)]
    quantization: QuantizationPolicy,
}

impl TryFrom<FormatFields> for FixedPointFormat {
    type Error = FixedPointError;

    fn try_from(f: FormatFields) -> Result<Self, Self::Error> {
        FixedPointFormat::new(f.word_length, f.fractional_length, f.overflow, f.quantization)
    }
}

impl From<FixedPointFormat> for FormatFields {
    fn from(f: FixedPointFormat) -> Self {
        FormatFields {
            word_length: f.word_length as i64,
            fractional_length: f.fractional_length as i64,
            overflow: f.overflow,
            quantization: f.quantization,
        }
    }
}

impl FixedPointFormat {
    /// Create a format, validating word and fractional lengths
    pub fn new(
        word_length: i64,
        fractional_length: i64,
        overflow: OverflowPolicy,
        quantization: QuantizationPolicy,
    ) -> Result<Self, FixedPointError> {
        let invalid = |reason| FixedPointError::InvalidFormat {
            word_length,
            fractional_length,
            reason,
        };
        if word_length < 1 {
            return Err(invalid("word length must be at least 1"));
        }
        if word_length > MAX_WORD_LENGTH as i64 {
            return Err(invalid("word length exceeds 64 bits"));
        }
        if fractional_length < 0 {
            return Err(invalid("fractional length must be non-negative"));
        }
        if fractional_length > word_length - 1 {
            return Err(invalid("fractional length leaves no room for the sign bit"));
        }
        Ok(Self {
            word_length: word_length as u32,
            fractional_length: fractional_length as u32,
            overflow,
            quantization,
        })
    }

    /// Format with `integer_length` integer bits and `fractional_length` fractional bits
    pub fn from_bits(
        integer_length: u32,
        fractional_length: u32,
        overflow: OverflowPolicy,
        quantization: QuantizationPolicy,
    ) -> Result<Self, FixedPointError> {
        let word_length = 1 + integer_length as i64 + fractional_length as i64;
        Self::new(word_length, fractional_length as i64, overflow, quantization)
    }

    /// Same policies, new lengths
    pub fn resize(&self, word_length: i64, fractional_length: i64) -> Result<Self, FixedPointError> {
        Self::new(word_length, fractional_length, self.overflow, self.quantization)
    }

    pub fn with_overflow(&self, overflow: OverflowPolicy) -> Self {
        Self { overflow, ..*self }
    }

    pub fn with_quantization(&self, quantization: QuantizationPolicy) -> Self {
        Self { quantization, ..*self }
    }

    pub fn word_length(&self) -> u32 {
        self.word_length
    }

    pub fn fractional_length(&self) -> u32 {
        self.fractional_length
    }

    pub fn integer_length(&self) -> u32 {
        self.word_length - self.fractional_length - 1
    }

    pub fn overflow(&self) -> OverflowPolicy {
        self.overflow
    }

    pub fn quantization(&self) -> QuantizationPolicy {
        self.quantization
    }

    /// Smallest raw integer: -2^(wl-1)
    pub fn min_raw(&self) -> i64 {
        (-(1i128 << (self.word_length - 1))) as i64
    }

    /// Largest raw integer: 2^(wl-1) - 1
    pub fn max_raw(&self) -> i64 {
        ((1i128 << (self.word_length - 1)) - 1) as i64
    }

    pub fn contains_raw(&self, raw: i128) -> bool {
        raw >= self.min_raw() as i128 && raw <= self.max_raw() as i128
    }

    /// Weight of the least significant bit
    pub fn lsb(&self) -> f64 {
        2f64.powi(-(self.fractional_length as i32))
    }

    pub fn min_value(&self) -> f64 {
        -(2f64.powi(self.integer_length() as i32))
    }

    pub fn max_value(&self) -> f64 {
        self.max_raw() as f64 * self.lsb()
    }
}

impl fmt::Display for FixedPointFormat {
    /// ARM-style Q notation, sign bit implied: `Q<int>.<frac>`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Q{}.{}", self.integer_length(), self.fractional_length)
    }
}

impl FromStr for FixedPointFormat {
    type Err = FixedPointError;

    /// Parses `Q<int>.<frac>` with the default (wrap, truncate) policies.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || FixedPointError::ParseFormat(s.to_string());
        let rest = s.trim().strip_prefix('Q').ok_or_else(err)?;
        let (int, frac) = rest.split_once('.').ok_or_else(err)?;
        let int: u32 = int.parse().map_err(|_| err())?;
        let frac: u32 = frac.parse().map_err(|_| err())?;
        Self::from_bits(int, frac, OverflowPolicy::default(), QuantizationPolicy::default())
    }
}

impl fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OverflowPolicy::Wrap => "wrap",
            OverflowPolicy::Saturate => "saturate",
        })
    }
}

impl FromStr for OverflowPolicy {
    type Err = FixedPointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "wrap" => Ok(OverflowPolicy::Wrap),
            "saturate" | "sat" => Ok(OverflowPolicy::Saturate),
            _ => Err(FixedPointError::ParseFormat(s.to_string())),
        }
    }
}

impl fmt::Display for QuantizationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            QuantizationPolicy::Truncate => "truncate",
            QuantizationPolicy::RoundNearest => "round",
            QuantizationPolicy::RoundNearestEven => "round-even",
        })
    }
}

impl FromStr for QuantizationPolicy {
    type Err = FixedPointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "truncate" | "floor" => Ok(QuantizationPolicy::Truncate),
            "round" => Ok(QuantizationPolicy::RoundNearest),
            "round-even" | "convergent" => Ok(QuantizationPolicy::RoundNearestEven),
            _ => Err(FixedPointError::ParseFormat(s.to_string())),
        }
    }
}

/// A raw two's-complement integer interpreted in a [`FixedPointFormat`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct QuantizedValue {
    raw: i64,
    format: FixedPointFormat,
}

impl QuantizedValue {
    pub fn from_raw(raw: i64, format: FixedPointFormat) -> Result<Self, FixedPointError> {
        if !format.contains_raw(raw as i128) {
            return Err(FixedPointError::RawOutOfRange {
                raw,
                word_length: format.word_length(),
            });
        }
        Ok(Self { raw, format })
    }

    /// Caller guarantees `raw` is in range
    pub(crate) fn new_unchecked(raw: i64, format: FixedPointFormat) -> Self {
        debug_assert!(format.contains_raw(raw as i128));
        Self { raw, format }
    }

    pub fn zero(format: FixedPointFormat) -> Self {
        Self { raw: 0, format }
    }

    pub fn raw(&self) -> i64 {
        self.raw
    }

    pub fn format(&self) -> &FixedPointFormat {
        &self.format
    }

    /// `raw × 2^-fractional_length`
    pub fn to_f64(&self) -> f64 {
        self.raw as f64 * self.format.lsb()
    }

    pub fn to_exact(&self) -> Exact {
        Exact::new(self.raw as i128, self.format.fractional_length())
    }
}
