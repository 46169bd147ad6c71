use fixq_core::{FormatAssignment, NodeId, NodeKind, TopologyError, TopologyModel};
use fixq_math::{quantize, requantize, Exact, FixedPointFormat, Quantization, QuantizedValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::SimulationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowKind {
    /// Value left the format's range (wrapped or saturated)
    Overflow,
    /// Bits below the LSB were discarded
    UnderflowTruncation,
}

/// One overflow or truncation, recorded where and when it happened
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverflowEvent {
    pub node: NodeId,
    pub sample_index: usize,
    /// Exact value before requantization, as `f64`
    pub attempted: f64,
    pub format: FixedPointFormat,
    pub kind: OverflowKind,
}

/// Bit-exact, sample-by-sample execution of a quantized topology.
///
/// Add and multiply results are formed exactly (`i128`) and requantized
/// into the node's format; every overflow and truncation is appended to the
/// event log and the run carries on. Delay registers belong to this
/// simulator and start at zero.
#[derive(Debug, Clone)]
pub struct FixedPointSimulator<'a> {
    topology: &'a TopologyModel,
    formats: Vec<FixedPointFormat>,
    schedule: Vec<NodeId>,
    inputs: Vec<NodeId>,
    outputs: Vec<NodeId>,
    delays: Vec<NodeId>,
    values: Vec<QuantizedValue>,
    registers: Vec<QuantizedValue>,
    sample_index: usize,
    events: Vec<OverflowEvent>,
}

impl<'a> FixedPointSimulator<'a> {
    pub fn new(
        topology: &'a TopologyModel,
        assignment: &FormatAssignment,
    ) -> Result<Self, SimulationError> {
        let schedule = topology.schedule()?;
        let formats = topology
            .nodes()
            .iter()
            .map(|n| assignment.require(n.id()))
            .collect::<Result<Vec<_>, TopologyError>>()?;
        let zeros: Vec<QuantizedValue> = formats.iter().map(|f| QuantizedValue::zero(*f)).collect();

        let mut sim = Self {
            topology,
            schedule,
            inputs: topology.inputs(),
            outputs: topology.outputs(),
            delays: topology.delays(),
            values: zeros.clone(),
            registers: zeros,
            formats,
            sample_index: 0,
            events: Vec::new(),
        };
        sim.reset();
        Ok(sim)
    }

    /// Clear registers and the event log, and re-quantize the constants.
    ///
    /// Constant quantization events are reported at sample 0.
    pub fn reset(&mut self) {
        self.sample_index = 0;
        self.events.clear();
        for (i, f) in self.formats.iter().enumerate() {
            self.values[i] = QuantizedValue::zero(*f);
            self.registers[i] = QuantizedValue::zero(*f);
        }
        let topology = self.topology;
        for node in topology.nodes() {
            if let NodeKind::Const(c) = node.kind() {
                let q = quantize(c, &self.formats[node.id().0]);
                self.values[node.id().0] = self.settle(node.id(), q, c);
            }
        }
    }

    /// Advance one sample. `samples[k]` feeds the `k`-th input node;
    /// returns one value per output node.
    pub fn step(&mut self, samples: &[f64]) -> Result<Vec<f64>, SimulationError> {
        if samples.len() != self.inputs.len() {
            return Err(SimulationError::InputCount {
                expected: self.inputs.len(),
                found: samples.len(),
            });
        }

        let topology = self.topology;
        for i in 0..self.schedule.len() {
            let id = self.schedule[i];
            let node = topology.node(id)?;
            let format = self.formats[id.0];
            let value = match node.kind() {
                NodeKind::Input => {
                    let k = self.inputs.binary_search(&id).map_err(|_| TopologyError::UnknownNode(id))?;
                    let x = samples[k];
                    let q = quantize(x, &format);
                    self.settle(id, q, x)
                }
                NodeKind::Const(_) => continue,
                NodeKind::Add => {
                    let terms: Vec<Exact> = node
                        .operands()
                        .iter()
                        .map(|src| self.values[src.0].to_exact())
                        .collect();
                    self.settle_exact(id, Exact::sum(&terms), &format)
                }
                NodeKind::Multiply => {
                    let ops = node.operands();
                    let exact = self.values[ops[0].0]
                        .to_exact()
                        .mul(&self.values[ops[1].0].to_exact());
                    self.settle_exact(id, exact, &format)
                }
                NodeKind::Delay => self.registers[id.0],
                NodeKind::Output => {
                    let exact = self.values[node.operands()[0].0].to_exact();
                    self.settle_exact(id, exact, &format)
                }
            };
            self.values[id.0] = value;
        }

        // Latch every register from this sample's values
        for i in 0..self.delays.len() {
            let id = self.delays[i];
            let src = topology.node(id)?.operands()[0];
            let exact = self.values[src.0].to_exact();
            let format = self.formats[id.0];
            self.registers[id.0] = self.settle_exact(id, exact, &format);
        }

        self.sample_index += 1;
        Ok(self.outputs.iter().map(|o| self.values[o.0].to_f64()).collect())
    }

    /// Raw integers currently held by the output nodes
    pub fn output_raw(&self) -> Vec<i64> {
        self.outputs.iter().map(|o| self.values[o.0].raw()).collect()
    }

    /// Value most recently computed by `node`
    pub fn value(&self, node: NodeId) -> Option<QuantizedValue> {
        self.values.get(node.0).copied()
    }

    pub fn events(&self) -> &[OverflowEvent] {
        &self.events
    }

    /// Number of samples stepped since the last reset
    pub fn sample_index(&self) -> usize {
        self.sample_index
    }

    fn settle_exact(&mut self, id: NodeId, exact: Exact, format: &FixedPointFormat) -> QuantizedValue {
        let q = requantize(exact, format);
        self.settle(id, q, exact.to_f64())
    }

    fn settle(&mut self, node: NodeId, q: Quantization, attempted: f64) -> QuantizedValue {
        let format = *q.value.format();
        let mut record = |kind| {
            self.events.push(OverflowEvent {
                node,
                sample_index: self.sample_index,
                attempted,
                format,
                kind,
            })
        };
        if q.overflowed {
            record(OverflowKind::Overflow);
        }
        if q.truncated {
            record(OverflowKind::UnderflowTruncation);
        }
        q.value
    }
}

/// Outputs and event log of a complete run.
///
/// Constant quantization events carry sample index 0 and are only reported
/// when at least one sample was processed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationResult {
    /// One sequence per output node, in node id order
    pub outputs: Vec<Vec<f64>>,
    /// Raw integers behind `outputs`
    pub raw_outputs: Vec<Vec<i64>>,
    pub events: Vec<OverflowEvent>,
}

impl SimulationResult {
    /// First output sequence; single-output filters have only this one
    pub fn output(&self) -> &[f64] {
        self.outputs.first().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn overflow_count(&self) -> usize {
        self.count(OverflowKind::Overflow)
    }

    pub fn truncation_count(&self) -> usize {
        self.count(OverflowKind::UnderflowTruncation)
    }

    pub fn is_overflow_free(&self) -> bool {
        self.overflow_count() == 0
    }

    pub fn events_by_node(&self) -> BTreeMap<NodeId, Vec<&OverflowEvent>> {
        let mut map: BTreeMap<NodeId, Vec<&OverflowEvent>> = BTreeMap::new();
        for e in &self.events {
            map.entry(e.node).or_default().push(e);
        }
        map
    }

    fn count(&self, kind: OverflowKind) -> usize {
        self.events.iter().filter(|e| e.kind == kind).count()
    }
}

/// Simulate a single-input topology over `samples`
pub fn run(
    topology: &TopologyModel,
    assignment: &FormatAssignment,
    samples: &[f64],
) -> Result<SimulationResult, SimulationError> {
    let expected = topology.inputs().len();
    if expected != 1 {
        return Err(SimulationError::InputCount { expected, found: 1 });
    }
    run_channels(topology, assignment, &[samples])
}

/// Simulate with one equal-length sample sequence per input node
pub fn run_channels(
    topology: &TopologyModel,
    assignment: &FormatAssignment,
    channels: &[&[f64]],
) -> Result<SimulationResult, SimulationError> {
    let mut sim = FixedPointSimulator::new(topology, assignment)?;
    if channels.len() != sim.inputs.len() {
        return Err(SimulationError::InputCount {
            expected: sim.inputs.len(),
            found: channels.len(),
        });
    }
    let length = channels.first().map_or(0, |c| c.len());
    if let Some(bad) = channels.iter().find(|c| c.len() != length) {
        return Err(fixq_math::FixedPointError::ShapeMismatch(length, bad.len()).into());
    }

    let mut outputs = vec![Vec::with_capacity(length); sim.outputs.len()];
    let mut raw_outputs = vec![Vec::with_capacity(length); sim.outputs.len()];
    let mut frame = vec![0.0; channels.len()];
    for n in 0..length {
        for (slot, channel) in frame.iter_mut().zip(channels) {
            *slot = channel[n];
        }
        let y = sim.step(&frame)?;
        for (k, v) in y.into_iter().enumerate() {
            outputs[k].push(v);
        }
        for (k, r) in sim.output_raw().into_iter().enumerate() {
            raw_outputs[k].push(r);
        }
    }

    // Constant events belong to the first sample; an empty run has none
    let events = if length == 0 { Vec::new() } else { sim.events };
    let result = SimulationResult {
        outputs,
        raw_outputs,
        events,
    };
    tracing::debug!(
        samples = length,
        overflows = result.overflow_count(),
        truncations = result.truncation_count(),
        "simulation finished"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixq_core::{FractionalPolicy, RangeTracker, TopologyBuilder};
    use fixq_math::{OverflowPolicy, QuantizationPolicy};

    fn q(wl: i64, fl: i64) -> FixedPointFormat {
        FixedPointFormat::new(wl, fl, OverflowPolicy::Saturate, QuantizationPolicy::RoundNearest)
            .unwrap()
    }

    /// add = x + delay(y); y = 0.5 * add
    fn first_order() -> TopologyModel {
        let mut b = TopologyBuilder::new();
        let x = b.input();
        let add = b.node(NodeKind::Add);
        let y = b.scale(add, 0.5);
        let d = b.delay(y);
        b.connect(x, add).unwrap();
        b.connect(d, add).unwrap();
        b.output(y);
        b.build().unwrap()
    }

    #[test]
    fn test_first_order_section() {
        let t = first_order();
        let a = RangeTracker::new(q(8, 7)).size(&t).unwrap();
        let r = run(&t, &a, &[1.0, 0.0, 0.0, 0.0]).unwrap();

        let expected = [0.5, 0.25, 0.125, 0.0625];
        for (got, want) in r.output().iter().zip(expected) {
            assert!((got - want).abs() <= 2f64.powi(-7), "{} vs {}", got, want);
        }
        assert!(r.events.is_empty(), "{:?}", r.events);
    }

    #[test]
    fn test_multiply_extremes_do_not_overflow() {
        let mut b = TopologyBuilder::new();
        let x = b.input();
        let y = b.input();
        let p = b.multiply(x, y);
        b.output(p);
        let t = b.build().unwrap();

        let a = RangeTracker::new(q(8, 7))
            .with_input_format(q(8, 7))
            .with_fractional_policy(FractionalPolicy::FullPrecision)
            .size(&t)
            .unwrap();
        let lo = q(8, 7).min_value();
        let hi = q(8, 7).max_value();
        let xs: &[f64] = &[lo, lo, hi, hi];
        let ys: &[f64] = &[lo, hi, lo, hi];
        let r = run_channels(&t, &a, &[xs, ys]).unwrap();

        assert!(r.events.is_empty(), "{:?}", r.events);
        assert_eq!(r.output()[0], 1.0);
        assert_eq!(r.output()[3], hi * hi);
    }

    #[test]
    fn test_overflow_is_data() {
        let mut b = TopologyBuilder::new();
        let x = b.input();
        let y = b.scale(x, 0.75);
        b.output(y);
        let t = b.build().unwrap();

        // Everything in Q0.3: inputs beyond ±1 saturate but the run continues
        let a = FormatAssignment::uniform(&t, q(4, 3));
        let r = run(&t, &a, &[0.5, 3.0, -0.5, 0.1]).unwrap();
        assert_eq!(r.output().len(), 4);
        assert_eq!(r.overflow_count(), 1);
        assert!(!r.is_overflow_free());
        let overflow = r.events.iter().find(|e| e.kind == OverflowKind::Overflow).unwrap();
        assert_eq!((overflow.node, overflow.sample_index, overflow.attempted), (x, 1, 3.0));
        assert!(r.truncation_count() > 0);
        assert!(r.events_by_node().contains_key(&y));
    }

    #[test]
    fn test_wrap_and_saturate_differ() {
        let mut b = TopologyBuilder::new();
        let x = b.input();
        let y = b.input();
        let s = b.add(&[x, y]);
        b.output(s);
        let t = b.build().unwrap();

        let sat = FormatAssignment::uniform(&t, q(4, 2));
        let wrap = FormatAssignment::uniform(&t, q(4, 2).with_overflow(OverflowPolicy::Wrap));
        let xs: &[f64] = &[1.5];
        let ys: &[f64] = &[1.0];
        // 2.5 in Q1.2: saturates to 1.75, wraps to -1.5
        assert_eq!(run_channels(&t, &sat, &[xs, ys]).unwrap().output(), &[1.75]);
        assert_eq!(run_channels(&t, &wrap, &[xs, ys]).unwrap().output(), &[-1.5]);
    }

    #[test]
    fn test_deterministic_and_resettable() {
        let t = first_order();
        let a = FormatAssignment::uniform(&t, q(6, 3));
        let input = [0.9, -0.7, 0.3, 0.55, -1.0, 0.0];
        let r1 = run(&t, &a, &input).unwrap();
        let r2 = run(&t, &a, &input).unwrap();
        assert_eq!(r1, r2);

        let mut sim = FixedPointSimulator::new(&t, &a).unwrap();
        let first: Vec<f64> = input.iter().map(|&x| sim.step(&[x]).unwrap()[0]).collect();
        assert_eq!(sim.sample_index(), input.len());
        sim.reset();
        assert_eq!(sim.sample_index(), 0);
        let second: Vec<f64> = input.iter().map(|&x| sim.step(&[x]).unwrap()[0]).collect();
        assert_eq!(first, second);
        assert_eq!(sim.events(), r1.events.as_slice());
    }

    #[test]
    fn test_constant_events_at_reset() {
        let mut b = TopologyBuilder::new();
        let x = b.input();
        let y = b.scale(x, 0.3);
        b.output(y);
        let t = b.build().unwrap();
        let a = FormatAssignment::uniform(&t, q(8, 4));

        let sim = FixedPointSimulator::new(&t, &a).unwrap();
        assert_eq!(sim.events().len(), 1);
        assert_eq!(sim.events()[0].node, NodeId(1));
        assert_eq!(sim.events()[0].sample_index, 0);
        assert_eq!(sim.events()[0].kind, OverflowKind::UnderflowTruncation);
    }

    #[test]
    fn test_empty_run_has_no_events() {
        let mut b = TopologyBuilder::new();
        let x = b.input();
        let y = b.scale(x, 0.3);
        b.output(y);
        let t = b.build().unwrap();
        let a = FormatAssignment::uniform(&t, q(8, 4));

        let empty = run(&t, &a, &[]).unwrap();
        assert!(empty.events.is_empty(), "{:?}", empty.events);
        assert_eq!(empty.output(), &[] as &[f64]);

        let one = run(&t, &a, &[0.0]).unwrap();
        assert_eq!(one.truncation_count(), 1);
        assert_eq!(one.events[0].sample_index, 0);
    }

    #[test]
    fn test_result_serializes_for_reports() {
        let mut b = TopologyBuilder::new();
        let x = b.input();
        let y = b.scale(x, 0.75);
        b.output(y);
        let t = b.build().unwrap();
        let a = FormatAssignment::uniform(&t, q(4, 3));
        let r = run(&t, &a, &[0.5, 3.0]).unwrap();

        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["outputs"].as_array().unwrap().len(), 1);
        assert_eq!(json["raw_outputs"][0].as_array().unwrap().len(), 2);
        let events = json["events"].as_array().unwrap();
        assert_eq!(events.len(), r.events.len());
        let overflow = events.iter().find(|e| e["kind"] == "overflow").unwrap();
        assert_eq!(overflow["node"], 0);
        assert_eq!(overflow["sample_index"], 1);
        assert_eq!(overflow["attempted"], 3.0);
        assert_eq!(overflow["format"]["word_length"], 4);
        assert_eq!(overflow["format"]["overflow"], "saturate");

        // events read back unchanged
        let text = serde_json::to_string(&r.events).unwrap();
        let back: Vec<OverflowEvent> = serde_json::from_str(&text).unwrap();
        assert_eq!(back, r.events);
    }

    #[test]
    fn test_input_count_checked() {
        let t = first_order();
        let a = FormatAssignment::uniform(&t, q(8, 7));
        let mut sim = FixedPointSimulator::new(&t, &a).unwrap();
        assert!(matches!(
            sim.step(&[0.1, 0.2]),
            Err(SimulationError::InputCount { expected: 1, found: 2 })
        ));
    }

    #[test]
    fn test_ragged_channels_rejected() {
        let mut b = TopologyBuilder::new();
        let x = b.input();
        let y = b.input();
        let s = b.add(&[x, y]);
        b.output(s);
        let t = b.build().unwrap();
        let a = FormatAssignment::uniform(&t, q(8, 4));
        let long: &[f64] = &[0.0, 0.1];
        let short: &[f64] = &[0.0];
        assert!(matches!(
            run_channels(&t, &a, &[long, short]),
            Err(SimulationError::Format(_))
        ));
        assert!(matches!(
            run(&t, &a, &[0.0]),
            Err(SimulationError::InputCount { expected: 2, .. })
        ));
    }

    #[test]
    fn test_missing_format() {
        let t = first_order();
        let a = FormatAssignment::new();
        assert!(matches!(
            FixedPointSimulator::new(&t, &a),
            Err(SimulationError::Topology(TopologyError::MissingFormat(_)))
        ));
    }
}
