//! # fixq-math
//!
//! Signed fixed-point formats and bit-exact quantization.
//!
//! A [`FixedPointFormat`] describes a two's-complement word (`word_length`
//! bits, `fractional_length` of them below the binary point) together with
//! its overflow and quantization policies. [`quantize`] maps a real number
//! into a format; [`requantize`] does the same for an [`Exact`] integer
//! intermediate, so datapath arithmetic never passes through `f64`.
//!
//! Overflow and truncation are reported as flags on [`Quantization`], never
//! as errors.

pub mod fixed_point;
pub mod ops;
pub mod quantize;

pub use fixed_point::{
    FixedPointError, FixedPointFormat, OverflowPolicy, QuantizationPolicy, QuantizedValue,
    MAX_WORD_LENGTH,
};
pub use ops::Exact;
pub use quantize::{quantize, quantize_rows, quantize_slice, requantize, Quantization};
