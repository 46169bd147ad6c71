//! Exact intermediate arithmetic.
//!
//! Sums and products of quantized values are carried as scaled `i128`
//! integers so that the only rounding in a datapath is the explicit
//! requantization into a node's format. Operands are at most 64 bits wide,
//! so products (fractional lengths up to 126) always fit; sums of very wide,
//! badly misaligned operands saturate at the `i128` limits.

/// Largest fractional length an [`Exact`] value carries
pub const MAX_EXACT_FRACTION: u32 = 126;

/// `raw × 2^-fractional_length`, unbounded by any word length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Exact {
    pub raw: i128,
    pub fractional_length: u32,
}

impl Exact {
    pub fn new(raw: i128, fractional_length: u32) -> Self {
        debug_assert!(fractional_length <= MAX_EXACT_FRACTION);
        Self {
            raw,
            fractional_length,
        }
    }

    pub fn zero() -> Self {
        Self::new(0, 0)
    }

    /// Nearest `f64`; exact while `|raw| < 2^53`
    pub fn to_f64(&self) -> f64 {
        self.raw as f64 * 2f64.powi(-(self.fractional_length as i32))
    }

    /// Re-express with more fractional bits (left shift, no rounding)
    pub fn align(&self, fractional_length: u32) -> Self {
        debug_assert!(fractional_length >= self.fractional_length);
        let shift = fractional_length - self.fractional_length;
        Self::new(shl_saturating(self.raw, shift), fractional_length)
    }

    /// Exact product; fractional lengths add
    pub fn mul(&self, other: &Self) -> Self {
        Self::new(
            self.raw.saturating_mul(other.raw),
            self.fractional_length + other.fractional_length,
        )
    }

    /// Exact sum, aligned to the widest fractional length among the terms
    pub fn sum(terms: &[Exact]) -> Self {
        let fractional_length = terms
            .iter()
            .map(|t| t.fractional_length)
            .max()
            .unwrap_or(0);
        let raw = terms
            .iter()
            .map(|t| t.align(fractional_length).raw)
            .fold(0i128, |acc, r| acc.saturating_add(r));
        Self::new(raw, fractional_length)
    }
}

/// `raw << shift`, clamped to the `i128` range instead of losing bits
pub(crate) fn shl_saturating(raw: i128, shift: u32) -> i128 {
    if raw == 0 {
        return 0;
    }
    let limit = if raw < 0 { i128::MIN } else { i128::MAX };
    if shift >= 127 {
        return limit;
    }
    raw.checked_mul(1i128 << shift).unwrap_or(limit)
}
