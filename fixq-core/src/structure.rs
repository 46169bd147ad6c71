//! Filter descriptions and their realization as a [`TopologyModel`].
//!
//! A description pairs floating-point coefficients (as produced by a filter
//! design stage) with a structural form. Realization wires the coefficients
//! into input, constant, multiply, add and delay nodes; nothing is quantized
//! here.

use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::TopologyError;
use crate::topology::{NodeId, NodeKind, TopologyBuilder, TopologyModel};

/// Structural form of a realization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Structure {
    /// Separate feed-forward and feedback delay lines
    #[default]
    DirectForm1,
    /// Shared delay line (canonical form)
    DirectForm2,
    /// Second-order sections, each in direct form I
    CascadeDirectForm1,
    /// Second-order sections, each in direct form II
    CascadeDirectForm2,
}

impl Structure {
    pub fn is_cascade(&self) -> bool {
        matches!(self, Structure::CascadeDirectForm1 | Structure::CascadeDirectForm2)
    }

    fn section_form(&self) -> Structure {
        match self {
            Structure::DirectForm1 | Structure::CascadeDirectForm1 => Structure::DirectForm1,
            Structure::DirectForm2 | Structure::CascadeDirectForm2 => Structure::DirectForm2,
        }
    }
}

impl fmt::Display for Structure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Structure::DirectForm1 => "df1",
            Structure::DirectForm2 => "df2",
            Structure::CascadeDirectForm1 => "cascade-df1",
            Structure::CascadeDirectForm2 => "cascade-df2",
        })
    }
}

impl FromStr for Structure {
    type Err = TopologyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "df1" | "direct_form1" => Ok(Structure::DirectForm1),
            "df2" | "direct_form2" => Ok(Structure::DirectForm2),
            "cascade-df1" | "sos-df1" | "cascade_direct_form1" => Ok(Structure::CascadeDirectForm1),
            "cascade-df2" | "sos-df2" | "cascade_direct_form2" => Ok(Structure::CascadeDirectForm2),
            _ => Err(TopologyError::UnsupportedStructure(s.to_string())),
        }
    }
}

/// Floating-point filter coefficients in one of the usual representations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Coefficients {
    /// Polynomials in z^-1, highest power last
    TransferFunction {
        numerator: Vec<f64>,
        denominator: Vec<f64>,
    },
    ZeroPoleGain {
        zeros: Vec<Complex64>,
        poles: Vec<Complex64>,
        gain: f64,
    },
    /// Rows of `[b0, b1, b2, a0, a1, a2]`
    SecondOrderSections(Vec<[f64; 6]>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterDescription {
    pub coefficients: Coefficients,
    #[serde(default)]
    pub structure: Structure,
}

impl FilterDescription {
    pub fn new(coefficients: Coefficients, structure: Structure) -> Self {
        Self {
            coefficients,
            structure,
        }
    }

    /// Wire the coefficients into a single-input, single-output topology
    pub fn realize(&self) -> Result<TopologyModel, TopologyError> {
        let sections = if self.structure.is_cascade() {
            self.sections()?
        } else {
            vec![self.transfer_function()?]
        };

        let mut builder = TopologyBuilder::new();
        let mut signal = builder.input();
        for (b, a) in &sections {
            signal = match self.structure.section_form() {
                Structure::DirectForm2 => direct_form2(&mut builder, signal, b, a)?,
                _ => direct_form1(&mut builder, signal, b, a)?,
            };
        }
        builder.output(signal);

        tracing::debug!(
            structure = %self.structure,
            sections = sections.len(),
            nodes = builder.len(),
            "filter realized"
        );
        builder.build()
    }

    /// Normalized `(b, a)` of the whole filter, `a[0] == 1`
    pub fn transfer_function(&self) -> Result<(Vec<f64>, Vec<f64>), TopologyError> {
        match &self.coefficients {
            Coefficients::TransferFunction {
                numerator,
                denominator,
            } => normalize(numerator, denominator),
            Coefficients::ZeroPoleGain { zeros, poles, gain } => {
                let b: Vec<f64> = real_poly(zeros)?.iter().map(|c| c * gain).collect();
                let a = real_poly(poles)?;
                normalize(&b, &a)
            }
            Coefficients::SecondOrderSections(rows) => {
                if rows.is_empty() {
                    return Err(TopologyError::InvalidCoefficients("no sections".into()));
                }
                let mut b = vec![1.0];
                let mut a = vec![1.0];
                for row in rows {
                    b = convolve(&b, &row[..3]);
                    a = convolve(&a, &row[3..]);
                }
                normalize(&b, &a)
            }
        }
    }

    /// Normalized second-order (or first-order) sections
    fn sections(&self) -> Result<Vec<(Vec<f64>, Vec<f64>)>, TopologyError> {
        match &self.coefficients {
            Coefficients::TransferFunction { .. } => Err(TopologyError::UnsupportedStructure(
                "a transfer function cannot be cascaded without factoring it; \
                 supply zeros/poles or second-order sections"
                    .into(),
            )),
            Coefficients::ZeroPoleGain { zeros, poles, gain } => {
                let zq = pair_roots(zeros)?;
                let pq = pair_roots(poles)?;
                let count = zq.len().max(pq.len()).max(1);
                (0..count)
                    .map(|i| {
                        let mut b = zq.get(i).cloned().unwrap_or_else(|| vec![1.0]);
                        if i == 0 {
                            b.iter_mut().for_each(|c| *c *= gain);
                        }
                        let a = pq.get(i).cloned().unwrap_or_else(|| vec![1.0]);
                        normalize(&b, &a)
                    })
                    .collect()
            }
            Coefficients::SecondOrderSections(rows) => {
                if rows.is_empty() {
                    return Err(TopologyError::InvalidCoefficients("no sections".into()));
                }
                rows.iter().map(|r| normalize(&r[..3], &r[3..])).collect()
            }
        }
    }
}

/// Divide through by `a[0]` and drop trailing zero taps
fn normalize(b: &[f64], a: &[f64]) -> Result<(Vec<f64>, Vec<f64>), TopologyError> {
    let invalid = |msg: &str| TopologyError::InvalidCoefficients(msg.to_string());
    if b.is_empty() || a.is_empty() {
        return Err(invalid("empty coefficient vector"));
    }
    if b.iter().chain(a).any(|c| !c.is_finite()) {
        return Err(invalid("non-finite coefficient"));
    }
    let a0 = a[0];
    if a0 == 0.0 {
        return Err(invalid("leading denominator coefficient is zero"));
    }
    let mut b: Vec<f64> = b.iter().map(|c| c / a0).collect();
    let mut a: Vec<f64> = a.iter().map(|c| c / a0).collect();
    trim_trailing_zeros(&mut b);
    trim_trailing_zeros(&mut a);
    if b.iter().all(|&c| c == 0.0) {
        return Err(invalid("numerator is identically zero"));
    }
    Ok((b, a))
}

fn trim_trailing_zeros(c: &mut Vec<f64>) {
    while c.len() > 1 && c.last() == Some(&0.0) {
        c.pop();
    }
}

fn convolve(x: &[f64], y: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; x.len() + y.len() - 1];
    for (i, xi) in x.iter().enumerate() {
        for (j, yj) in y.iter().enumerate() {
            out[i + j] += xi * yj;
        }
    }
    out
}

fn root_tolerance(r: Complex64) -> f64 {
    1e-9 * r.norm().max(1.0)
}

/// Monic polynomial with the given roots; roots must come in conjugate pairs
fn real_poly(roots: &[Complex64]) -> Result<Vec<f64>, TopologyError> {
    let mut c = vec![Complex64::new(1.0, 0.0)];
    for &r in roots {
        let mut next = c.clone();
        next.push(Complex64::new(0.0, 0.0));
        for i in 1..next.len() {
            next[i] -= r * c[i - 1];
        }
        c = next;
    }
    let scale = c.iter().map(|z| z.norm()).fold(1.0, f64::max);
    if c.iter().any(|z| z.im.abs() > 1e-9 * scale) {
        return Err(TopologyError::InvalidCoefficients(
            "complex roots without matching conjugates".into(),
        ));
    }
    Ok(c.iter().map(|z| z.re).collect())
}

/// Group roots into real quadratics: conjugate pairs first, then reals two by two
fn pair_roots(roots: &[Complex64]) -> Result<Vec<Vec<f64>>, TopologyError> {
    let mut used = vec![false; roots.len()];
    let mut quadratics = Vec::new();
    let mut reals = Vec::new();
    for i in 0..roots.len() {
        if used[i] {
            continue;
        }
        used[i] = true;
        let r = roots[i];
        if r.im.abs() <= root_tolerance(r) {
            reals.push(r.re);
            continue;
        }
        let partner = (i + 1..roots.len())
            .find(|&j| !used[j] && (roots[j] - r.conj()).norm() <= root_tolerance(r))
            .ok_or_else(|| {
                TopologyError::InvalidCoefficients(format!("root {} has no conjugate", r))
            })?;
        used[partner] = true;
        quadratics.push(vec![1.0, -2.0 * r.re, r.norm_sqr()]);
    }
    for pair in reals.chunks(2) {
        match pair {
            [r1, r2] => quadratics.push(vec![1.0, -(r1 + r2), r1 * r2]),
            [r] => quadratics.push(vec![1.0, -r]),
            _ => {}
        }
    }
    Ok(quadratics)
}

/// `signal × coefficient`, skipping the multiply for a unit coefficient
fn tap(builder: &mut TopologyBuilder, signal: NodeId, coefficient: f64) -> NodeId {
    if coefficient == 1.0 {
        signal
    } else {
        builder.scale(signal, coefficient)
    }
}

/// Collapse a term list into one signal
fn sum(builder: &mut TopologyBuilder, terms: &[NodeId]) -> NodeId {
    match terms {
        [single] => *single,
        _ => builder.add(terms),
    }
}

/// Delay line of `length` registers after `signal`; element `k` is `signal[n-k]`
fn delay_line(builder: &mut TopologyBuilder, signal: NodeId, length: usize) -> Vec<NodeId> {
    let mut line = vec![signal];
    for _ in 0..length {
        let prev = line[line.len() - 1];
        line.push(builder.delay(prev));
    }
    line
}

/// y[n] = Σ b_k x[n-k] − Σ a_k y[n-k]
fn direct_form1(
    builder: &mut TopologyBuilder,
    input: NodeId,
    b: &[f64],
    a: &[f64],
) -> Result<NodeId, TopologyError> {
    let x = delay_line(builder, input, b.len() - 1);
    let mut terms: Vec<NodeId> = b
        .iter()
        .zip(&x)
        .filter(|(c, _)| **c != 0.0)
        .map(|(&c, &s)| tap(builder, s, c))
        .collect();

    if a.len() == 1 {
        return Ok(sum(builder, &terms));
    }

    let y = builder.node(NodeKind::Add);
    let past = delay_line(builder, y, a.len() - 1);
    for (&c, &s) in a.iter().zip(&past).skip(1) {
        if c != 0.0 {
            terms.push(tap(builder, s, -c));
        }
    }
    for term in terms {
        builder.connect(term, y)?;
    }
    Ok(y)
}

/// w[n] = x[n] − Σ a_k w[n-k];  y[n] = Σ b_k w[n-k]
fn direct_form2(
    builder: &mut TopologyBuilder,
    input: NodeId,
    b: &[f64],
    a: &[f64],
) -> Result<NodeId, TopologyError> {
    let order = b.len().max(a.len()) - 1;
    let w = if a.len() == 1 {
        input
    } else {
        builder.node(NodeKind::Add)
    };
    let line = delay_line(builder, w, order);

    if a.len() > 1 {
        builder.connect(input, w)?;
        for (&c, &s) in a.iter().zip(&line).skip(1) {
            if c != 0.0 {
                let fb = tap(builder, s, -c);
                builder.connect(fb, w)?;
            }
        }
    }

    let terms: Vec<NodeId> = b
        .iter()
        .zip(&line)
        .filter(|(c, _)| **c != 0.0)
        .map(|(&c, &s)| tap(builder, s, c))
        .collect();
    Ok(sum(builder, &terms))
}
