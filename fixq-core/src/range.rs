use fixq_math::{quantize, FixedPointFormat, MAX_WORD_LENGTH};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::assignment::FormatAssignment;
use crate::error::TopologyError;
use crate::topology::{Node, NodeId, NodeKind, TopologyModel};

/// How many fractional bits each sized node keeps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FractionalPolicy {
    /// Same fractional length everywhere
    Uniform(u32),
    /// A default plus per-node exceptions
    PerNode {
        default: u32,
        overrides: BTreeMap<NodeId, u32>,
    },
    /// Keep every bit: products add fractional lengths, sums take the widest
    FullPrecision,
}

/// Worst-case integer-bit growth analysis.
///
/// Walks the topology in dependency order and sizes every node so that,
/// with signals bounded by the amplitude bound, no exact add or multiply
/// result exceeds its integer length:
///
/// - Multiply: `int = int_a + int_b + 1`
/// - Add: `int = max(int_i) + ceil(log2(n))`
/// - Const: the smallest format holding the coefficient within the
///   coefficient word length
/// - Input, and Delay closing a feedback loop: enough integer bits for the
///   amplitude bound
/// - Output, and Delay on a feed-forward path: the operand's format
///
/// Overflow and quantization policies are taken from the signal format.
#[derive(Debug, Clone)]
pub struct RangeTracker {
    signal_format: FixedPointFormat,
    coefficient_word_length: u32,
    fractional_policy: FractionalPolicy,
    amplitude_bound: f64,
    input_format: Option<FixedPointFormat>,
}

impl RangeTracker {
    pub fn new(signal_format: FixedPointFormat) -> Self {
        Self {
            signal_format,
            coefficient_word_length: signal_format.word_length(),
            fractional_policy: FractionalPolicy::Uniform(signal_format.fractional_length()),
            amplitude_bound: 1.0,
            input_format: None,
        }
    }

    /// Word length budget for constant coefficients
    pub fn with_coefficient_word_length(mut self, word_length: u32) -> Self {
        self.coefficient_word_length = word_length;
        self
    }

    pub fn with_fractional_policy(mut self, policy: FractionalPolicy) -> Self {
        self.fractional_policy = policy;
        self
    }

    /// Largest magnitude any input or fed-back signal may reach
    pub fn with_amplitude_bound(mut self, bound: f64) -> Self {
        self.amplitude_bound = bound;
        self
    }

    /// Pin every input node to `format` instead of deriving it
    pub fn with_input_format(mut self, format: FixedPointFormat) -> Self {
        self.input_format = Some(format);
        self
    }

    pub fn signal_format(&self) -> &FixedPointFormat {
        &self.signal_format
    }

    /// Size every node of `topology`.
    ///
    /// # Algorithm
    /// 1. Reject cycles with no delay (`UnsizableTopology`)
    /// 2. Visit nodes once all their operands are sized, lowest id first
    /// 3. When only feedback remains, release the lowest-id unsized delay
    ///    with the amplitude-bound format and continue
    pub fn size(&self, topology: &TopologyModel) -> Result<FormatAssignment, TopologyError> {
        topology.schedule()?;
        if !(self.amplitude_bound.is_finite() && self.amplitude_bound > 0.0) {
            return Err(TopologyError::InvalidCoefficients(format!(
                "amplitude bound {} must be positive and finite",
                self.amplitude_bound
            )));
        }

        let nodes = topology.nodes();
        let n = nodes.len();
        let mut pending: Vec<usize> = nodes.iter().map(|node| node.operands().len()).collect();
        let mut consumers: Vec<Vec<NodeId>> = vec![Vec::new(); n];
        for node in nodes {
            for src in node.operands() {
                consumers[src.0].push(node.id());
            }
        }

        let mut formats: Vec<Option<FixedPointFormat>> = vec![None; n];
        let mut visited = vec![false; n];
        let mut ready: BTreeSet<NodeId> = nodes
            .iter()
            .filter(|node| pending[node.id().0] == 0)
            .map(|node| node.id())
            .collect();

        loop {
            while let Some(id) = ready.pop_first() {
                if visited[id.0] {
                    continue;
                }
                visited[id.0] = true;
                let node = &nodes[id.0];
                let format = match formats[id.0] {
                    Some(released) => released,
                    None => self.size_node(node, &formats)?,
                };
                tracing::debug!(node = %id, kind = node.kind().label(), format = %format, "sized");
                formats[id.0] = Some(format);

                for &c in &consumers[id.0] {
                    pending[c.0] -= 1;
                    if pending[c.0] == 0 {
                        ready.insert(c);
                    }
                }
            }

            if visited.iter().all(|&v| v) {
                break;
            }

            // Only feedback left: cut the loop at its lowest-id delay
            let delay = nodes
                .iter()
                .find(|node| !visited[node.id().0] && node.kind() == NodeKind::Delay)
                .map(|node| node.id())
                .ok_or_else(|| TopologyError::UnsizableTopology {
                    nodes: (0..n).filter(|&i| !visited[i]).map(NodeId).collect(),
                })?;
            let format = self.source_format(delay, self.signal_format.fractional_length())?;
            tracing::debug!(node = %delay, format = %format, "feedback delay released");
            formats[delay.0] = Some(format);
            ready.insert(delay);
        }

        formats
            .into_iter()
            .enumerate()
            .map(|(i, f)| f.map(|f| (NodeId(i), f)).ok_or(TopologyError::MissingFormat(NodeId(i))))
            .collect()
    }

    fn size_node(
        &self,
        node: &Node,
        formats: &[Option<FixedPointFormat>],
    ) -> Result<FixedPointFormat, TopologyError> {
        let operand = |i: usize| -> Result<FixedPointFormat, TopologyError> {
            let src = node.operands()[i];
            formats[src.0].ok_or(TopologyError::MissingFormat(src))
        };

        match node.kind() {
            NodeKind::Input => match self.input_format {
                Some(pinned) => Ok(pinned),
                None => self.source_format(node.id(), self.signal_format.fractional_length()),
            },
            NodeKind::Const(value) => self.constant_format(node.id(), value),
            NodeKind::Multiply => {
                let (a, b) = (operand(0)?, operand(1)?);
                let integer = a.integer_length() + b.integer_length() + 1;
                let fraction = self.fraction_for(
                    node.id(),
                    a.fractional_length() + b.fractional_length(),
                );
                self.grown(integer, fraction)
            }
            NodeKind::Add => {
                let terms = (0..node.operands().len())
                    .map(operand)
                    .collect::<Result<Vec<_>, _>>()?;
                let widest = terms.iter().map(|f| f.integer_length()).max().unwrap_or(0);
                let integer = widest + ceil_log2(terms.len());
                let full = terms.iter().map(|f| f.fractional_length()).max().unwrap_or(0);
                self.grown(integer, self.fraction_for(node.id(), full))
            }
            NodeKind::Delay | NodeKind::Output => operand(0),
        }
    }

    /// Format for a signal entering the datapath (input or fed-back delay)
    fn source_format(&self, id: NodeId, full: u32) -> Result<FixedPointFormat, TopologyError> {
        self.grown(
            integer_bits_for(self.amplitude_bound),
            self.fraction_for(id, full),
        )
    }

    /// Smallest format holding `value` exactly within the coefficient word length;
    /// the integer part always fits, widening the word if it must
    fn constant_format(&self, id: NodeId, value: f64) -> Result<FixedPointFormat, TopologyError> {
        let mut integer = integer_bits_for_coefficient(value);
        let budget = self.coefficient_word_length.saturating_sub(1 + integer);
        let fraction = (0..=budget)
            .find(|&f| (value * 2f64.powi(f as i32)).fract() == 0.0)
            .unwrap_or(budget);

        let mut format = self.grown(integer, fraction)?;
        while quantize(value, &format).overflowed {
            // rounding carried into the integer part
            integer += 1;
            format = self.grown(integer, fraction)?;
        }

        if format.word_length() > self.coefficient_word_length {
            tracing::warn!(
                node = %id,
                coefficient = value,
                requested = self.coefficient_word_length,
                used = format.word_length(),
                "coefficient needs a wider word than requested"
            );
        }
        Ok(format)
    }

    fn fraction_for(&self, id: NodeId, full: u32) -> u32 {
        match &self.fractional_policy {
            FractionalPolicy::Uniform(f) => *f,
            FractionalPolicy::PerNode { default, overrides } => {
                overrides.get(&id).copied().unwrap_or(*default)
            }
            FractionalPolicy::FullPrecision => full,
        }
    }

    fn grown(&self, integer: u32, fraction: u32) -> Result<FixedPointFormat, TopologyError> {
        Ok(FixedPointFormat::from_bits(
            integer,
            fraction,
            self.signal_format.overflow(),
            self.signal_format.quantization(),
        )?)
    }
}

/// Smallest `I` with `bound < 2^I`, so `±bound` fits in `I` integer bits
fn integer_bits_for(bound: f64) -> u32 {
    let mut bits = 0;
    while bits < MAX_WORD_LENGTH && bound >= 2f64.powi(bits as i32) {
        bits += 1;
    }
    bits
}

/// Smallest `I` with `-2^I <= value < 2^I`
fn integer_bits_for_coefficient(value: f64) -> u32 {
    let mut bits = 0;
    while bits < MAX_WORD_LENGTH
        && !(value >= -(2f64.powi(bits as i32)) && value < 2f64.powi(bits as i32))
    {
        bits += 1;
    }
    bits
}

fn ceil_log2(n: usize) -> u32 {
    if n <= 1 {
        0
    } else {
        usize::BITS - (n - 1).leading_zeros()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::TopologyBuilder;
    use fixq_math::{OverflowPolicy, QuantizationPolicy};

    fn q(wl: i64, fl: i64) -> FixedPointFormat {
        FixedPointFormat::new(wl, fl, OverflowPolicy::Saturate, QuantizationPolicy::RoundNearest)
            .unwrap()
    }

    #[test]
    fn test_ceil_log2() {
        assert_eq!(ceil_log2(2), 1);
        assert_eq!(ceil_log2(3), 2);
        assert_eq!(ceil_log2(4), 2);
        assert_eq!(ceil_log2(5), 3);
    }

    #[test]
    fn test_amplitude_bits() {
        assert_eq!(integer_bits_for(0.5), 0);
        assert_eq!(integer_bits_for(1.0), 1);
        assert_eq!(integer_bits_for(3.9), 2);
        assert_eq!(integer_bits_for_coefficient(-1.0), 0);
        assert_eq!(integer_bits_for_coefficient(1.0), 1);
        assert_eq!(integer_bits_for_coefficient(-1.5), 1);
        assert_eq!(integer_bits_for_coefficient(0.0), 0);
    }

    #[test]
    fn test_multiply_growth() {
        let mut b = TopologyBuilder::new();
        let x = b.input();
        let y = b.input();
        let p = b.multiply(x, y);
        b.output(p);
        let t = b.build().unwrap();

        let tracker = RangeTracker::new(q(8, 7))
            .with_input_format(q(8, 7))
            .with_fractional_policy(FractionalPolicy::FullPrecision);
        let a = tracker.size(&t).unwrap();
        let product = a.require(p).unwrap();
        assert_eq!(product.integer_length(), 0 + 0 + 1);
        assert_eq!(product.fractional_length(), 14);
        assert_eq!(a.require(NodeId(3)).unwrap(), product);
    }

    #[test]
    fn test_add_growth() {
        let mut b = TopologyBuilder::new();
        let xs: Vec<_> = (0..3).map(|_| b.input()).collect();
        let s = b.add(&xs);
        b.output(s);
        let t = b.build().unwrap();

        let a = RangeTracker::new(q(16, 12)).size(&t).unwrap();
        // inputs need 1 integer bit for the default bound of 1.0
        assert_eq!(a.require(xs[0]).unwrap().integer_length(), 1);
        let sum = a.require(s).unwrap();
        assert_eq!(sum.integer_length(), 1 + 2);
        assert_eq!(sum.fractional_length(), 12);
    }

    #[test]
    fn test_constant_minimal() {
        let tracker = RangeTracker::new(q(16, 15)).with_coefficient_word_length(8);
        let f = tracker.constant_format(NodeId(0), 0.375).unwrap();
        assert_eq!((f.integer_length(), f.fractional_length()), (0, 3));

        // 0.1 is not dyadic: all remaining bits go to the fraction
        let f = tracker.constant_format(NodeId(0), 0.1).unwrap();
        assert_eq!(f.word_length(), 8);
        assert_eq!(f.fractional_length(), 7);

        // -1.5 needs one integer bit
        let f = tracker.constant_format(NodeId(0), -1.5).unwrap();
        assert_eq!((f.integer_length(), f.fractional_length()), (1, 1));
    }

    #[test]
    fn test_constant_rounding_carry_widens() {
        // 0.999 rounds to 1.0 at 3 fractional bits, which needs an integer bit
        let tracker = RangeTracker::new(q(16, 15)).with_coefficient_word_length(4);
        let f = tracker.constant_format(NodeId(0), 0.999).unwrap();
        assert_eq!(f.integer_length(), 1);
        assert!(!quantize(0.999, &f).overflowed);
    }

    #[test]
    fn test_constant_wider_than_budget() {
        let tracker = RangeTracker::new(q(16, 15)).with_coefficient_word_length(4);
        let f = tracker.constant_format(NodeId(0), 100.0).unwrap();
        assert_eq!(f.integer_length(), 7);
        assert_eq!(f.word_length(), 8);
    }

    #[test]
    fn test_feedback_delay_uses_bound() {
        // add = x + delay(y); y = 0.5 * add
        let mut b = TopologyBuilder::new();
        let x = b.input();
        let add = b.node(NodeKind::Add);
        let y = b.scale(add, 0.5);
        let d = b.delay(y);
        b.connect(x, add).unwrap();
        b.connect(d, add).unwrap();
        b.output(y);
        let t = b.build().unwrap();

        let a = RangeTracker::new(q(8, 7)).size(&t).unwrap();
        assert_eq!(a.require(d).unwrap(), q(9, 7));
        assert_eq!(a.require(add).unwrap().integer_length(), 2);
        assert_eq!(a.require(y).unwrap().integer_length(), 3);
        assert_eq!(a.len(), t.len());
    }

    #[test]
    fn test_feed_forward_delay_passes_through() {
        let mut b = TopologyBuilder::new();
        let x = b.input();
        let d = b.delay(x);
        let s = b.add(&[x, d]);
        b.output(s);
        let t = b.build().unwrap();

        let a = RangeTracker::new(q(8, 6)).size(&t).unwrap();
        assert_eq!(a.require(d).unwrap(), a.require(x).unwrap());
    }

    #[test]
    fn test_cycle_without_delay_is_unsizable() {
        let mut b = TopologyBuilder::new();
        let x = b.input();
        let add = b.node(NodeKind::Add);
        let fb = b.scale(add, 1.5);
        b.connect(x, add).unwrap();
        b.connect(fb, add).unwrap();
        b.output(add);
        let t = b.build().unwrap();

        assert!(matches!(
            RangeTracker::new(q(8, 7)).size(&t),
            Err(TopologyError::UnsizableTopology { .. })
        ));
    }

    #[test]
    fn test_growth_past_64_bits() {
        let mut b = TopologyBuilder::new();
        let x = b.input();
        let p = b.multiply(x, x);
        b.output(p);
        let t = b.build().unwrap();

        // 42-bit input squared at full precision needs 84 bits
        let tracker = RangeTracker::new(q(48, 40)).with_fractional_policy(FractionalPolicy::FullPrecision);
        assert!(matches!(tracker.size(&t), Err(TopologyError::Format(_))));
    }

    #[test]
    fn test_per_node_fraction() {
        let mut b = TopologyBuilder::new();
        let x = b.input();
        let y = b.scale(x, 0.75);
        b.output(y);
        let t = b.build().unwrap();

        let policy = FractionalPolicy::PerNode {
            default: 6,
            overrides: BTreeMap::from([(y, 10)]),
        };
        let a = RangeTracker::new(q(8, 7)).with_fractional_policy(policy).size(&t).unwrap();
        assert_eq!(a.require(x).unwrap().fractional_length(), 6);
        assert_eq!(a.require(y).unwrap().fractional_length(), 10);
    }
}
