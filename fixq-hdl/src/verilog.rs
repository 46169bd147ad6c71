//! Synthesizable Verilog-2001 from a sized topology.
//!
//! One wire per node, named `n<id>_<kind>`, evaluated in schedule order.
//! Add and multiply are computed at full precision and then requantized
//! with the node's own policies, so the netlist matches the simulator
//! bit for bit. Delay nodes become registers on a single clock with a
//! synchronous reset and a clock enable.

use std::fmt::Write as _;

use fixq_core::{FormatAssignment, NodeId, NodeKind, TopologyModel};
use fixq_math::{quantize, FixedPointFormat, OverflowPolicy, QuantizationPolicy};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::NetlistError;
use crate::sanitize::sanitize_module_name;

/// Emitted module text plus the identifier it declares
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Netlist {
    pub module_name: String,
    pub text: String,
}

impl Netlist {
    /// Hex SHA-256 of the text; equal topologies and formats give equal digests
    pub fn digest(&self) -> String {
        hex::encode(Sha256::digest(self.text.as_bytes()))
    }

    /// Conventional file name for the module
    pub fn file_name(&self) -> String {
        format!("{}.v", self.module_name)
    }
}

/// Emit `topology` as a Verilog module named after `name` (sanitized).
///
/// Every node needs a format in `assignment`. Output is deterministic:
/// the same inputs always produce byte-identical text.
pub fn emit(
    topology: &TopologyModel,
    assignment: &FormatAssignment,
    name: &str,
) -> Result<Netlist, NetlistError> {
    let module_name = sanitize_module_name(name)?;
    assignment.covers(topology)?;
    let schedule = topology.schedule()?;

    let mut emitter = Emitter {
        topology,
        assignment,
        out: String::new(),
    };
    emitter.module(&module_name, &schedule)?;

    debug!(
        module = %module_name,
        nodes = topology.len(),
        bytes = emitter.out.len(),
        "emitted netlist"
    );
    Ok(Netlist {
        module_name,
        text: emitter.out,
    })
}

/// Value on a wire before it is narrowed to a node format
struct Full {
    name: String,
    width: u32,
    fractional_length: u32,
}

struct Emitter<'a> {
    topology: &'a TopologyModel,
    assignment: &'a FormatAssignment,
    out: String,
}

impl Emitter<'_> {
    fn module(&mut self, module_name: &str, schedule: &[NodeId]) -> Result<(), NetlistError> {
        let inputs = self.topology.inputs();
        let outputs = self.topology.outputs();
        let delays = self.topology.delays();

        self.header()?;

        let mut ports = Vec::new();
        if !delays.is_empty() {
            ports.push("    input  wire clk".to_string());
            ports.push("    input  wire rst".to_string());
            ports.push("    input  wire ce".to_string());
        }
        for (k, &id) in inputs.iter().enumerate() {
            let f = self.format(id)?;
            ports.push(format!("    input  wire {} in_{}", signed(f.word_length()), k));
        }
        for (k, &id) in outputs.iter().enumerate() {
            let f = self.format(id)?;
            ports.push(format!("    output wire {} out_{}", signed(f.word_length()), k));
        }
        let _ = writeln!(self.out, "module {} (", module_name);
        self.out.push_str(&ports.join(",\n"));
        self.out.push_str("\n);\n");

        if !delays.is_empty() {
            self.out.push('\n');
            for &d in &delays {
                let f = self.format(d)?;
                let _ = writeln!(self.out, "    reg {} {};", signed(f.word_length()), signal(d, "delay"));
            }
        }

        for &id in schedule {
            self.node(id, &inputs)?;
        }

        if !delays.is_empty() {
            self.out.push_str("\n    // next state\n");
            for &d in &delays {
                let operand = self.topology.node(d)?.operands()[0];
                let src = self.full_of(operand)?;
                let f = self.format(d)?;
                self.narrow(&format!("{}_d", signal(d, "delay")), &src, &f);
            }
            self.registers(&delays)?;
        }

        self.out.push('\n');
        for (k, &id) in outputs.iter().enumerate() {
            let _ = writeln!(self.out, "    assign out_{} = {};", k, signal(id, "output"));
        }
        self.out.push_str("\nendmodule\n");
        Ok(())
    }

    fn header(&mut self) -> Result<(), NetlistError> {
        self.out.push_str("// Generated by fixq. Do not edit.\n//\n");
        for node in self.topology.nodes() {
            let f = self.format(node.id())?;
            let _ = writeln!(
                self.out,
                "// {:<6} {:<6} {:<8} {}, {}",
                node.id().to_string(),
                node.kind().label(),
                f.to_string(),
                f.overflow(),
                f.quantization()
            );
        }
        self.out.push('\n');
        Ok(())
    }

    fn node(&mut self, id: NodeId, inputs: &[NodeId]) -> Result<(), NetlistError> {
        let node = self.topology.node(id)?;
        let kind = node.kind();
        let ops = node.operands().to_vec();
        let f = self.format(id)?;
        let name = signal(id, kind.label());

        match kind {
            NodeKind::Input => {
                let k = inputs.iter().position(|&i| i == id).unwrap_or(0);
                let _ = writeln!(self.out, "\n    wire {} {} = in_{};", signed(f.word_length()), name, k);
            }
            NodeKind::Const(c) => {
                let raw = quantize(c, &f).value.raw();
                let _ = writeln!(
                    self.out,
                    "\n    wire {} {} = {}; // {}",
                    signed(f.word_length()),
                    name,
                    hex_literal(raw, f.word_length()),
                    c
                );
            }
            NodeKind::Add => {
                let terms = ops
                    .iter()
                    .map(|&o| self.format(o).map(|fo| (o, fo)))
                    .collect::<Result<Vec<_>, _>>()?;
                let frac = terms.iter().map(|(_, fo)| fo.fractional_length()).max().unwrap_or(0);
                let int = terms.iter().map(|(_, fo)| fo.integer_length()).max().unwrap_or(0)
                    + ceil_log2(terms.len());
                let width = 1 + int + frac;
                let sum = terms
                    .iter()
                    .map(|(o, fo)| -> Result<String, NetlistError> {
                        let shift = frac - fo.fractional_length();
                        let operand = self.signal_of(*o)?;
                        Ok(if shift == 0 {
                            operand
                        } else {
                            format!("({} <<< {})", operand, shift)
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?
                    .join(" + ");
                let full = format!("{}_full", name);
                let _ = writeln!(self.out, "\n    wire {} {} = {};", signed(width), full, sum);
                let src = Full {
                    name: full,
                    width,
                    fractional_length: frac,
                };
                self.narrow(&name, &src, &f);
            }
            NodeKind::Multiply => {
                let (fa, fb) = (self.format(ops[0])?, self.format(ops[1])?);
                let width = fa.word_length() + fb.word_length();
                let full = format!("{}_full", name);
                let _ = writeln!(
                    self.out,
                    "\n    wire {} {} = {} * {};",
                    signed(width),
                    full,
                    self.signal_of(ops[0])?,
                    self.signal_of(ops[1])?
                );
                let src = Full {
                    name: full,
                    width,
                    fractional_length: fa.fractional_length() + fb.fractional_length(),
                };
                self.narrow(&name, &src, &f);
            }
            NodeKind::Output => {
                let src = self.full_of(ops[0])?;
                self.out.push('\n');
                self.narrow(&name, &src, &f);
            }
            // registered; next state is emitted after all combinational nodes
            NodeKind::Delay => {}
        }
        Ok(())
    }

    /// Requantize `src` into `target`, declaring `dest` and any intermediates
    fn narrow(&mut self, dest: &str, src: &Full, target: &FixedPointFormat) {
        let f = target.fractional_length();

        let (q, q_width) = if f >= src.fractional_length {
            let shift = f - src.fractional_length;
            if shift == 0 {
                (src.name.clone(), src.width)
            } else {
                let q = format!("{}_q", dest);
                let width = src.width + shift;
                let _ = writeln!(self.out, "    wire {} {} = {} <<< {};", signed(width), q, src.name, shift);
                (q, width)
            }
        } else {
            let k = src.fractional_length - f;
            let q = format!("{}_q", dest);
            let width = src.width - k;
            match target.quantization() {
                QuantizationPolicy::Truncate => {
                    let _ = writeln!(self.out, "    wire {} {} = {} >>> {};", signed(width), q, src.name, k);
                }
                policy => {
                    let r = format!("{}_r", dest);
                    let rw = src.width + 1;
                    let half: u128 = 1u128 << (k - 1);
                    let bias = match policy {
                        QuantizationPolicy::RoundNearestEven => format!(
                            "{}'sd{} + $signed({{1'b0, {}[{}]}})",
                            rw,
                            half - 1,
                            src.name,
                            k
                        ),
                        _ => format!(
                            "({}[{}] ? {}'sd{} : {}'sd{})",
                            src.name,
                            src.width - 1,
                            rw,
                            half - 1,
                            rw,
                            half
                        ),
                    };
                    let _ = writeln!(self.out, "    wire {} {} = {} + {};", signed(rw), r, src.name, bias);
                    let _ = writeln!(self.out, "    wire {} {} = {} >>> {};", signed(width + 1), q, r, k);
                    return self.fit(dest, &q, width + 1, target);
                }
            }
            (q, width)
        };
        self.fit(dest, &q, q_width, target);
    }

    /// Final overflow stage from a `width`-bit value at the target scale
    fn fit(&mut self, dest: &str, q: &str, width: u32, target: &FixedPointFormat) {
        let w = target.word_length();
        let expr = if width <= w {
            q.to_string()
        } else {
            match target.overflow() {
                OverflowPolicy::Wrap => format!("$signed({}[{}:0])", q, w - 1),
                OverflowPolicy::Saturate => {
                    let max = target.max_raw();
                    let min_abs = target.min_raw().unsigned_abs();
                    format!(
                        "({q} > {width}'sd{max}) ? {hi} :\n        ({q} < -{width}'sd{min_abs}) ? {lo} :\n        $signed({q}[{top}:0])",
                        hi = hex_literal(max, w),
                        lo = hex_literal(target.min_raw(), w),
                        top = w - 1,
                    )
                }
            }
        };
        let _ = writeln!(self.out, "    wire {} {} = {};", signed(w), dest, expr);
    }

    fn registers(&mut self, delays: &[NodeId]) -> Result<(), NetlistError> {
        self.out.push_str("\n    always @(posedge clk) begin\n        if (rst) begin\n");
        for &d in delays {
            let f = self.format(d)?;
            let _ = writeln!(self.out, "            {} <= {};", signal(d, "delay"), hex_literal(0, f.word_length()));
        }
        self.out.push_str("        end else if (ce) begin\n");
        for &d in delays {
            let reg = signal(d, "delay");
            let _ = writeln!(self.out, "            {} <= {}_d;", reg, reg);
        }
        self.out.push_str("        end\n    end\n");
        Ok(())
    }

    fn format(&self, id: NodeId) -> Result<FixedPointFormat, NetlistError> {
        Ok(self.assignment.require(id)?)
    }

    fn signal_of(&self, id: NodeId) -> Result<String, NetlistError> {
        Ok(signal(id, self.topology.node(id)?.kind().label()))
    }

    /// An operand's settled value, viewed as a full-precision source
    fn full_of(&self, id: NodeId) -> Result<Full, NetlistError> {
        let f = self.format(id)?;
        Ok(Full {
            name: self.signal_of(id)?,
            width: f.word_length(),
            fractional_length: f.fractional_length(),
        })
    }
}

fn signal(id: NodeId, label: &str) -> String {
    format!("{}_{}", id, label)
}

fn signed(width: u32) -> String {
    format!("signed [{}:0]", width - 1)
}

/// `W'sh` literal holding the two's-complement bits of `raw`
fn hex_literal(raw: i64, width: u32) -> String {
    let mask = if width >= 64 { u64::MAX } else { (1u64 << width) - 1 };
    format!("{}'sh{:x}", width, (raw as u64) & mask)
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
    use fixq_core::{RangeTracker, TopologyBuilder};

    fn q(int: u32, frac: u32) -> FixedPointFormat {
        FixedPointFormat::from_bits(int, frac, OverflowPolicy::Saturate, QuantizationPolicy::RoundNearest)
            .unwrap()
    }

    /// y[n] = x[n] + 0.5 y[n-1]
    fn first_order() -> TopologyModel {
        let mut b = TopologyBuilder::new();
        let x = b.input();
        let sum = b.node(NodeKind::Add);
        let d = b.delay(sum);
        let fb = b.scale(d, 0.5);
        b.connect(x, sum).unwrap();
        b.connect(fb, sum).unwrap();
        b.output(sum);
        b.build().unwrap()
    }

    fn sized(t: &TopologyModel) -> FormatAssignment {
        RangeTracker::new(q(0, 7)).size(t).unwrap()
    }

    #[test]
    fn test_ports_and_registers() {
        let t = first_order();
        let a = sized(&t);
        let n = emit(&t, &a, "First Order").unwrap();
        assert_eq!(n.module_name, "first_order");
        assert_eq!(n.file_name(), "first_order.v");

        let text = &n.text;
        assert!(text.contains("module first_order ("));
        assert!(text.contains("input  wire clk"));
        let in_w = a.require(t.inputs()[0]).unwrap().word_length();
        assert!(text.contains(&format!("input  wire signed [{}:0] in_0", in_w - 1)));
        let out_w = a.require(t.outputs()[0]).unwrap().word_length();
        assert!(text.contains(&format!("output wire signed [{}:0] out_0", out_w - 1)));
        assert!(text.contains("always @(posedge clk) begin"));
        assert!(text.contains("end else if (ce) begin"));
        assert!(text.contains("n2_delay <= n2_delay_d;"));
        assert!(text.ends_with("endmodule\n"));
    }

    #[test]
    fn test_combinational_has_no_clock() {
        let mut b = TopologyBuilder::new();
        let x = b.input();
        let y = b.scale(x, 0.75);
        b.output(y);
        let t = b.build().unwrap();
        let a = sized(&t);
        let text = emit(&t, &a, "gain").unwrap().text;
        assert!(!text.contains("clk"));
        assert!(!text.contains("always"));
        assert!(text.contains("n1_const"));
        assert!(text.contains("= n0_input * n1_const;"));
    }

    #[test]
    fn test_deterministic() {
        let t = first_order();
        let a = sized(&t);
        let first = emit(&t, &a, "iir").unwrap();
        let second = emit(&t.clone(), &a.clone(), "iir").unwrap();
        assert_eq!(first, second);
        assert_eq!(first.digest(), second.digest());
        assert_eq!(first.digest().len(), 64);

        let other = emit(&t, &a, "iir2").unwrap();
        assert_ne!(first.digest(), other.digest());
    }

    #[test]
    fn test_saturate_and_wrap() {
        let mut b = TopologyBuilder::new();
        let x = b.input();
        let y = b.input();
        let s = b.add(&[x, y]);
        b.output(s);
        let t = b.build().unwrap();

        let narrow = q(0, 7);
        let mut a = FormatAssignment::uniform(&t, narrow);
        let text = emit(&t, &a, "sat").unwrap().text;
        assert!(text.contains("wire signed [8:0] n2_add_full = n0_input + n1_input;"));
        assert!(text.contains("8'sh7f"));
        assert!(text.contains("8'sh80"));

        a.insert(s, narrow.with_overflow(OverflowPolicy::Wrap));
        let text = emit(&t, &a, "wrap").unwrap().text;
        assert!(text.contains("$signed(n2_add_full[7:0])"));
    }

    #[test]
    fn test_alignment_and_rounding() {
        let mut b = TopologyBuilder::new();
        let x = b.input();
        let y = b.input();
        let s = b.add(&[x, y]);
        b.output(s);
        let t = b.build().unwrap();

        let mut a = FormatAssignment::new();
        a.insert(x, q(0, 7));
        a.insert(y, q(2, 3));
        a.insert(s, q(3, 4).with_quantization(QuantizationPolicy::RoundNearestEven));
        a.insert(t.outputs()[0], q(3, 4));
        let text = emit(&t, &a, "align").unwrap().text;
        // Q3.7 = 11 bits; y aligned by 4
        assert!(text.contains("wire signed [10:0] n2_add_full = n0_input + (n1_input <<< 4);"));
        assert!(text.contains("$signed({1'b0, n2_add_full[3]})"));
        assert!(text.contains("n2_add_full >>> 3") || text.contains("n2_add_r >>> 3"));
    }

    #[test]
    fn test_rejects_bad_inputs() {
        let t = first_order();
        let a = sized(&t);
        assert!(matches!(emit(&t, &a, "%%"), Err(NetlistError::InvalidModuleName(_))));

        let mut partial = FormatAssignment::new();
        partial.insert(NodeId(0), q(0, 7));
        assert!(matches!(emit(&t, &partial, "iir"), Err(NetlistError::Topology(_))));
    }

    #[test]
    fn test_hex_literal() {
        assert_eq!(hex_literal(-1, 8), "8'shff");
        assert_eq!(hex_literal(64, 8), "8'sh40");
        assert_eq!(hex_literal(i64::MIN, 64), "64'sh8000000000000000");
    }
}
