use crate::fixed_point::{
    FixedPointError, FixedPointFormat, OverflowPolicy, QuantizationPolicy, QuantizedValue,
};
use crate::ops::{shl_saturating, Exact, MAX_EXACT_FRACTION};

/// Outcome of quantizing one value: the representable result plus what was lost
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quantization {
    pub value: QuantizedValue,
    /// The rounded value fell outside the format's range
    pub overflowed: bool,
    /// Bits below the LSB were discarded
    pub truncated: bool,
}

/// Quantize a real number into `format`.
///
/// Never fails: every edge case is reported through the flags so a caller
/// can keep going and collect all of them.
pub fn quantize(real: f64, format: &FixedPointFormat) -> Quantization {
    if real.is_nan() {
        return Quantization {
            value: QuantizedValue::zero(*format),
            overflowed: true,
            truncated: false,
        };
    }

    let scaled = real * 2f64.powi(format.fractional_length() as i32);
    let rounded = match format.quantization() {
        QuantizationPolicy::Truncate => scaled.floor(),
        QuantizationPolicy::RoundNearest => scaled.round(),
        QuantizationPolicy::RoundNearestEven => scaled.round_ties_even(),
    };
    let truncated = scaled.is_finite() && rounded != scaled;

    // Beyond 2^126 every f64 is a multiple of 2^64, so it wraps to zero
    let beyond = 2f64.powi(126);
    // Finite reals that scale past f64 range fall through to the wrap/saturate split
    let (raw, overflowed) = if real.is_infinite() {
        let boundary = if rounded < 0.0 { format.min_raw() } else { format.max_raw() };
        (boundary, true)
    } else if rounded.abs() >= beyond {
        match format.overflow() {
            OverflowPolicy::Saturate => {
                let boundary = if rounded < 0.0 { format.min_raw() } else { format.max_raw() };
                (boundary, true)
            }
            OverflowPolicy::Wrap => (0, true),
        }
    } else {
        fit(rounded as i128, format)
    };

    Quantization {
        value: QuantizedValue::new_unchecked(raw, *format),
        overflowed,
        truncated,
    }
}

/// Requantize an exact intermediate into `format`, bit-exact.
///
/// Same rounding and overflow semantics as [`quantize`], evaluated on
/// integers.
pub fn requantize(exact: Exact, format: &FixedPointFormat) -> Quantization {
    let target = format.fractional_length();
    let (value, truncated) = if target >= exact.fractional_length {
        (shl_saturating(exact.raw, target - exact.fractional_length), false)
    } else {
        let shift = (exact.fractional_length - target).min(MAX_EXACT_FRACTION);
        round_shift(exact.raw, shift, format.quantization())
    };
    let (raw, overflowed) = fit(value, format);
    Quantization {
        value: QuantizedValue::new_unchecked(raw, *format),
        overflowed,
        truncated,
    }
}

/// Quantize every element of a homogeneous slice
pub fn quantize_slice(values: &[f64], format: &FixedPointFormat) -> Vec<Quantization> {
    values.iter().map(|&v| quantize(v, format)).collect()
}

/// Quantize a block of equal-length rows; ragged input is rejected
pub fn quantize_rows(
    rows: &[&[f64]],
    format: &FixedPointFormat,
) -> Result<Vec<Vec<Quantization>>, FixedPointError> {
    let expected = rows.first().map_or(0, |r| r.len());
    if let Some(bad) = rows.iter().find(|r| r.len() != expected) {
        return Err(FixedPointError::ShapeMismatch(expected, bad.len()));
    }
    Ok(rows.iter().map(|r| quantize_slice(r, format)).collect())
}

/// Shift right by `shift` bits, rounding per `policy`. Returns (value, any bits lost).
fn round_shift(raw: i128, shift: u32, policy: QuantizationPolicy) -> (i128, bool) {
    if shift == 0 {
        return (raw, false);
    }
    let floor = raw >> shift;
    let remainder = raw - (floor << shift);
    if remainder == 0 {
        return (floor, false);
    }
    let half = 1i128 << (shift - 1);
    let up = match policy {
        QuantizationPolicy::Truncate => false,
        QuantizationPolicy::RoundNearest => remainder > half || (remainder == half && raw >= 0),
        QuantizationPolicy::RoundNearestEven => {
            remainder > half || (remainder == half && floor & 1 == 1)
        }
    };
    (if up { floor + 1 } else { floor }, true)
}

/// Range-check an integer against `format`, applying its overflow policy
fn fit(value: i128, format: &FixedPointFormat) -> (i64, bool) {
    if format.contains_raw(value) {
        return (value as i64, false);
    }
    let raw = match format.overflow() {
        OverflowPolicy::Saturate => {
            if value < 0 {
                format.min_raw()
            } else {
                format.max_raw()
            }
        }
        OverflowPolicy::Wrap => {
            let modulus = 1i128 << format.word_length();
            let mut wrapped = value.rem_euclid(modulus);
            if wrapped > format.max_raw() as i128 {
                wrapped -= modulus;
            }
            wrapped as i64
        }
    };
    (raw, true)
}
