//! fixq CLI arguments.
//!
//! Format flags override the values read from the design file.

use clap::Parser;
use fixq::{OverflowPolicy, QuantizationPolicy};
use std::path::PathBuf;

/// fixq CLI arguments.
#[derive(Parser, Debug, Clone, PartialEq)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// JSON design file (filter coefficients, structure, formats)
    pub design: PathBuf,
    /// Signal word length in bits
    #[clap(long)]
    pub word_length: Option<u32>,
    /// Signal fractional length in bits
    #[clap(long)]
    pub fractional_length: Option<u32>,
    /// Overflow policy: wrap or saturate
    #[clap(long)]
    pub overflow: Option<OverflowPolicy>,
    /// Quantization policy: truncate, round or round-even
    #[clap(long)]
    pub quantization: Option<QuantizationPolicy>,
    /// Verilog module name; defaults to the output file stem
    #[clap(long)]
    pub module_name: Option<String>,
    /// Write the netlist here
    #[clap(long, short)]
    pub output: Option<PathBuf>,
    /// Write a JSON report (formats, responses, overflow events) here
    #[clap(long)]
    pub report: Option<PathBuf>,
    /// Impulse response length
    #[clap(long, default_value_t = 64)]
    pub samples: usize,
}
