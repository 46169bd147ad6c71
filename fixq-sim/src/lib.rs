//! # fixq-sim
//!
//! Bit-exact simulation of quantized filter topologies.
//!
//! Key items:
//! - [`FixedPointSimulator`]: sample-by-sample execution with owned delay
//!   registers; [`run`] and [`run_channels`] drive it over whole sequences
//! - [`OverflowEvent`]: every overflow and truncation, recorded as data
//! - [`reference`]: floating-point responses to compare against
//! - [`group_delay`](mod@group_delay): delay of float or quantized coefficient sets
//! - [`explore`] (feature `parallel`): many candidate formats at once

pub mod error;
#[cfg(feature = "parallel")]
pub mod explore;
pub mod group_delay;
pub mod reference;
pub mod simulator;

pub use error::SimulationError;
#[cfg(feature = "parallel")]
pub use explore::{explore, narrowest_overflow_free, Exploration};
pub use group_delay::{frequency_grid, group_delay, sos_group_delay, zpk_group_delay};
pub use reference::{compare, impulse, impulse_response, lfilter, run_reference, step_response, ErrorStats};
pub use simulator::{run, run_channels, FixedPointSimulator, OverflowEvent, OverflowKind, SimulationResult};
