//! Floating-point reference responses.
//!
//! The quantized simulator is judged against these: the same topology run
//! in `f64`, or the textbook difference equation driven straight from
//! `(b, a)`.

use fixq_core::{NodeKind, TopologyModel};
use fixq_math::FixedPointError;
use serde::{Deserialize, Serialize};

use crate::error::SimulationError;

/// Default impulse response length for recursive filters
pub const DEFAULT_IIR_LENGTH: usize = 100;

/// Execute `topology` in `f64`, one channel per input node.
///
/// Same schedule and delay semantics as the fixed-point simulator, with
/// constants taken at full precision.
pub fn run_reference(
    topology: &TopologyModel,
    channels: &[&[f64]],
) -> Result<Vec<Vec<f64>>, SimulationError> {
    let inputs = topology.inputs();
    let outputs = topology.outputs();
    let delays = topology.delays();
    if channels.len() != inputs.len() {
        return Err(SimulationError::InputCount {
            expected: inputs.len(),
            found: channels.len(),
        });
    }
    let length = channels.first().map_or(0, |c| c.len());
    if let Some(bad) = channels.iter().find(|c| c.len() != length) {
        return Err(FixedPointError::ShapeMismatch(length, bad.len()).into());
    }

    let schedule = topology.schedule()?;
    let mut values = vec![0.0f64; topology.len()];
    let mut registers = vec![0.0f64; topology.len()];
    let mut out = vec![Vec::with_capacity(length); outputs.len()];

    for n in 0..length {
        for &id in &schedule {
            let node = topology.node(id)?;
            let ops = node.operands();
            values[id.0] = match node.kind() {
                NodeKind::Input => {
                    let k = inputs.iter().position(|&i| i == id).unwrap_or(0);
                    channels[k][n]
                }
                NodeKind::Const(c) => c,
                NodeKind::Add => ops.iter().map(|s| values[s.0]).sum(),
                NodeKind::Multiply => values[ops[0].0] * values[ops[1].0],
                NodeKind::Delay => registers[id.0],
                NodeKind::Output => values[ops[0].0],
            };
        }
        for &d in &delays {
            registers[d.0] = values[topology.node(d)?.operands()[0].0];
        }
        for (k, o) in outputs.iter().enumerate() {
            out[k].push(values[o.0]);
        }
    }
    Ok(out)
}

/// Filter `x` through `b(z) / a(z)` (transposed direct form II)
pub fn lfilter(b: &[f64], a: &[f64], x: &[f64]) -> Result<Vec<f64>, SimulationError> {
    if b.is_empty() || a.is_empty() {
        return Err(SimulationError::InvalidCoefficients("empty coefficient vector"));
    }
    let a0 = a[0];
    if a0 == 0.0 {
        return Err(SimulationError::InvalidCoefficients(
            "leading denominator coefficient is zero",
        ));
    }

    let order = b.len().max(a.len());
    let coef = |c: &[f64], i: usize| c.get(i).copied().unwrap_or(0.0) / a0;
    let mut state = vec![0.0; order];
    let mut y = Vec::with_capacity(x.len());
    for &xn in x {
        let yn = coef(b, 0) * xn + state[0];
        for i in 1..order {
            let next = if i < order - 1 { state[i] } else { 0.0 };
            state[i - 1] = coef(b, i) * xn - coef(a, i) * yn + next;
        }
        y.push(yn);
    }
    Ok(y)
}

/// Whether `(b, a)` has feedback, using the conventions of the design tool:
/// a lone numerator tap over a longer denominator always counts as recursive
fn is_recursive(b: &[f64], a: &[f64]) -> Result<bool, SimulationError> {
    match (b.len(), a.len()) {
        (1, 1) => Err(SimulationError::InvalidCoefficients(
            "len(a) = len(b) = 1 is not a filter",
        )),
        (_, 1) => Ok(false),
        (1, _) => Ok(true),
        _ => Ok(a[0] == 0.0 || a[1..].iter().any(|&c| c != 0.0)),
    }
}

/// Impulse response of `b(z) / a(z)`.
///
/// Without an explicit `length`, recursive filters get
/// [`DEFAULT_IIR_LENGTH`] samples and FIR filters `min(len(b), 100)`.
pub fn impulse_response(
    b: &[f64],
    a: &[f64],
    length: Option<usize>,
) -> Result<Vec<f64>, SimulationError> {
    if b.is_empty() || a.is_empty() {
        return Err(SimulationError::InvalidCoefficients("empty coefficient vector"));
    }
    let recursive = is_recursive(b, a)?;
    let n = match length {
        Some(n) if n > 0 => n,
        _ if recursive => DEFAULT_IIR_LENGTH,
        _ => b.len().min(DEFAULT_IIR_LENGTH),
    };
    lfilter(b, a, &impulse(n))
}

/// Step response: running sum of the impulse response
pub fn step_response(
    b: &[f64],
    a: &[f64],
    length: Option<usize>,
) -> Result<Vec<f64>, SimulationError> {
    let h = impulse_response(b, a, length)?;
    Ok(h.iter()
        .scan(0.0, |acc, &v| {
            *acc += v;
            Some(*acc)
        })
        .collect())
}

/// Unit impulse of length `n`
pub fn impulse(n: usize) -> Vec<f64> {
    let mut x = vec![0.0; n];
    if let Some(first) = x.first_mut() {
        *first = 1.0;
    }
    x
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ErrorStats {
    pub max_abs: f64,
    pub rms: f64,
}

/// Error of `actual` against `reference`; lengths must match
pub fn compare(actual: &[f64], reference: &[f64]) -> Result<ErrorStats, SimulationError> {
    if actual.len() != reference.len() {
        return Err(FixedPointError::ShapeMismatch(reference.len(), actual.len()).into());
    }
    if actual.is_empty() {
        return Ok(ErrorStats::default());
    }
    let (max_abs, sum_sq) = actual
        .iter()
        .zip(reference)
        .map(|(a, r)| (a - r).abs())
        .fold((0.0f64, 0.0f64), |(m, s), e| (m.max(e), s + e * e));
    Ok(ErrorStats {
        max_abs,
        rms: (sum_sq / actual.len() as f64).sqrt(),
    })
}
