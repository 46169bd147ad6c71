use anyhow::{Context, Result};
use clap::Parser;
use fixq::{DesignConfig, QuantizedDesign};
use fixq_hdl::module_name_from_path;
use fixq_sim::impulse;
use std::fs;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod args;

use args::Args;

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    run(&Args::parse())
}

fn run(args: &Args) -> Result<()> {
    let text = fs::read_to_string(&args.design)
        .with_context(|| format!("failed to read {}", args.design.display()))?;
    let mut config = DesignConfig::from_json(&text)
        .with_context(|| format!("invalid design file {}", args.design.display()))?;
    apply_overrides(&mut config, args)?;

    let design = QuantizedDesign::from_config(&config).context("failed to size design")?;
    for (node, format) in design.assignment().iter() {
        info!(%node, %format, overflow = %format.overflow(), quantization = %format.quantization(), "format");
    }

    let x = impulse(args.samples);
    let result = design.simulate(&x).context("simulation failed")?;
    let reference = design.reference(&x).context("reference run failed")?;
    let error = fixq::compare(result.output(), &reference)?;
    info!(
        overflows = result.overflow_count(),
        truncations = result.truncation_count(),
        max_abs_error = error.max_abs,
        rms_error = error.rms,
        "impulse response"
    );
    if !result.is_overflow_free() {
        warn!(events = result.overflow_count(), "design overflows on a unit impulse");
    }

    let netlist = design.netlist().context("netlist emission failed")?;
    match &args.output {
        Some(path) => {
            fs::write(path, &netlist.text)
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!(path = %path.display(), digest = %netlist.digest(), "netlist written");
        }
        None => print!("{}", netlist.text),
    }

    if let Some(path) = &args.report {
        let report = serde_json::json!({
            "module_name": netlist.module_name,
            "digest": netlist.digest(),
            "formats": design.assignment(),
            "output": result.output(),
            "reference": reference,
            "error": error,
            "events": result.events,
        });
        fs::write(path, serde_json::to_string_pretty(&report)?)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    Ok(())
}

fn apply_overrides(config: &mut DesignConfig, args: &Args) -> Result<()> {
    if let Some(wl) = args.word_length {
        config.word_length = wl;
    }
    if let Some(fl) = args.fractional_length {
        config.fractional_length = fl;
    }
    if let Some(overflow) = args.overflow {
        config.overflow = overflow;
    }
    if let Some(quantization) = args.quantization {
        config.quantization = quantization;
    }
    match (&args.module_name, &args.output) {
        (Some(name), _) => config.module_name = name.clone(),
        (None, Some(path)) => {
            config.module_name = module_name_from_path(path)
                .with_context(|| format!("no module name in {}", path.display()))?;
        }
        (None, None) => {}
    }
    Ok(())
}
