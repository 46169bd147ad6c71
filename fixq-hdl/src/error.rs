use fixq_core::TopologyError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NetlistError {
    /// Nothing usable left after sanitization
    #[error("Invalid module name '{0}'")]
    InvalidModuleName(String),
    #[error("Topology error: {0}")]
    Topology(#[from] TopologyError),
}
