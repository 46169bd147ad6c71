use fixq_math::FixedPointError;
use thiserror::Error;

use crate::topology::NodeId;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TopologyError {
    /// A cycle with no delay element in it
    #[error("Unsizable topology: cycle without a delay through {nodes:?}")]
    UnsizableTopology { nodes: Vec<NodeId> },

    #[error("Node {node} ({kind}) expects {expected} operand(s), found {found}")]
    InvalidArity {
        node: NodeId,
        kind: &'static str,
        expected: &'static str,
        found: usize,
    },

    #[error("Unknown node {0}")]
    UnknownNode(NodeId),

    #[error("Missing port: {0}")]
    MissingPort(&'static str),

    #[error("Invalid coefficients: {0}")]
    InvalidCoefficients(String),

    #[error("Unsupported structure: {0}")]
    UnsupportedStructure(String),

    #[error("No format assigned to node {0}")]
    MissingFormat(NodeId),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error(transparent)]
    Format(#[from] FixedPointError),
}
