//! Group delay of floating-point or quantized coefficient sets.
//!
//! Frequencies are normalized angular frequencies in radians per sample
//! (`0..π` covers DC to Nyquist); delays come back in samples. Where the
//! numerator or denominator response vanishes the delay is undefined and
//! reported as 0.

use num_complex::Complex64;
use std::f64::consts::PI;
use tracing::warn;

use crate::error::SimulationError;

/// `n` frequencies evenly spaced over `[0, π)`
pub fn frequency_grid(n: usize) -> Vec<f64> {
    (0..n).map(|k| PI * k as f64 / n as f64).collect()
}

/// Group delay of `b(z) / a(z)`, polynomials in z^-1.
///
/// Uses `τ(w) = Re(Σ k c_k e^{-jwk} / Σ c_k e^{-jwk})` for each polynomial,
/// numerator minus denominator.
pub fn group_delay(b: &[f64], a: &[f64], w: &[f64]) -> Result<Vec<f64>, SimulationError> {
    if b.is_empty() || a.is_empty() {
        return Err(SimulationError::InvalidCoefficients("empty coefficient vector"));
    }
    if a[0] == 0.0 {
        return Err(SimulationError::InvalidCoefficients(
            "leading denominator coefficient is zero",
        ));
    }
    let mut singular = 0usize;
    let delays = w
        .iter()
        .map(|&wk| {
            let (tb, sb) = polynomial_delay(b, wk);
            let (ta, sa) = polynomial_delay(a, wk);
            if sb || sa {
                singular += 1;
                0.0
            } else {
                tb - ta
            }
        })
        .collect();
    if singular > 0 {
        warn!(frequencies = singular, "group delay undefined where the response vanishes; set to 0");
    }
    Ok(delays)
}

/// Group delay of a cascade of second-order sections `[b0, b1, b2, a0, a1, a2]`
pub fn sos_group_delay(sections: &[[f64; 6]], w: &[f64]) -> Result<Vec<f64>, SimulationError> {
    if sections.is_empty() {
        return Err(SimulationError::InvalidCoefficients("no second-order sections"));
    }
    if sections.iter().any(|s| s[3] == 0.0) {
        return Err(SimulationError::InvalidCoefficients(
            "leading denominator coefficient is zero",
        ));
    }
    Ok(w
        .iter()
        .map(|&wk| {
            sections
                .iter()
                .map(|s| quadratic_delay([s[0], s[1], s[2]], wk) - quadratic_delay([s[3], s[4], s[5]], wk))
                .sum::<f64>()
        })
        .collect())
}

/// Group delay from zeros and poles, each a factor `1 - r e^{jφ} z^-1`.
/// The gain does not contribute.
pub fn zpk_group_delay(zeros: &[Complex64], poles: &[Complex64], w: &[f64]) -> Vec<f64> {
    w.iter()
        .map(|&wk| {
            zeros.iter().map(|&z| root_delay(z, wk)).sum::<f64>()
                - poles.iter().map(|&p| root_delay(p, wk)).sum::<f64>()
        })
        .collect()
}

/// Delay of one polynomial and whether its response vanishes at `w`
fn polynomial_delay(c: &[f64], w: f64) -> (f64, bool) {
    let (mut sum, mut ramp) = (Complex64::new(0.0, 0.0), Complex64::new(0.0, 0.0));
    for (k, &ck) in c.iter().enumerate() {
        let e = Complex64::from_polar(1.0, -w * k as f64);
        sum += e * ck;
        ramp += e * (ck * k as f64);
    }
    if sum.norm() < 10.0 * f64::EPSILON {
        (0.0, true)
    } else {
        ((ramp / sum).re, false)
    }
}

/// Closed form for a polynomial of degree two or less
fn quadratic_delay(c: [f64; 3], w: f64) -> f64 {
    let [c0, c1, c2] = c;
    let (u0, u1, u2) = (c0 * c0, c1 * c1, c2 * c2);
    let (v0, v1, v2) = (c0 * c1, c1 * c2, c2 * c0);
    let (cos1, cos2) = (w.cos(), (2.0 * w).cos());
    let num = (u1 + 2.0 * u2) + (v0 + 3.0 * v1) * cos1 + 2.0 * v2 * cos2;
    let den = (u0 + u1 + u2) + 2.0 * (v0 + v1) * cos1 + 2.0 * v2 * cos2;
    if den.abs() < 10.0 * f64::EPSILON {
        0.0
    } else {
        num / den
    }
}

fn root_delay(root: Complex64, w: f64) -> f64 {
    let (r, phi) = root.to_polar();
    let r2 = r * r;
    let cos = (w - phi).cos();
    let den = r2 + 1.0 - 2.0 * r * cos;
    if den.abs() < 10.0 * f64::EPSILON {
        0.0
    } else {
        (r2 - r * cos) / den
    }
}
