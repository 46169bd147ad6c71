use fixq_core::TopologyError;
use fixq_math::FixedPointError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimulationError {
    #[error("Topology error: {0}")]
    Topology(#[from] TopologyError),
    #[error("Math error: {0}")]
    Format(#[from] FixedPointError),
    #[error("Expected {expected} input channel(s), found {found}")]
    InputCount { expected: usize, found: usize },
    #[error("Invalid coefficients: {0}")]
    InvalidCoefficients(&'static str),
}
