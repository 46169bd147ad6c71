use fixq_math::FixedPointFormat;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::TopologyError;
use crate::topology::{NodeId, TopologyModel};

/// One fixed-point format per node.
///
/// Produced by `RangeTracker::size` (or by hand), consumed by the simulator
/// and the netlist emitter. Each pipeline run owns its own assignment.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FormatAssignment {
    formats: BTreeMap<NodeId, FixedPointFormat>,
}

impl FormatAssignment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every node of `topology` in the same format
    pub fn uniform(topology: &TopologyModel, format: FixedPointFormat) -> Self {
        Self {
            formats: topology.nodes().iter().map(|n| (n.id(), format)).collect(),
        }
    }

    /// Returns the format previously assigned to `node`, if any
    pub fn insert(&mut self, node: NodeId, format: FixedPointFormat) -> Option<FixedPointFormat> {
        self.formats.insert(node, format)
    }

    pub fn get(&self, node: NodeId) -> Option<&FixedPointFormat> {
        self.formats.get(&node)
    }

    pub fn require(&self, node: NodeId) -> Result<FixedPointFormat, TopologyError> {
        self.formats
            .get(&node)
            .copied()
            .ok_or(TopologyError::MissingFormat(node))
    }

    /// Check that every node of `topology` has a format
    pub fn covers(&self, topology: &TopologyModel) -> Result<(), TopologyError> {
        topology
            .nodes()
            .iter()
            .try_for_each(|n| self.require(n.id()).map(|_| ()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &FixedPointFormat)> {
        self.formats.iter().map(|(id, f)| (*id, f))
    }

    pub fn len(&self) -> usize {
        self.formats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }

    /// Sum of all word lengths
    pub fn total_bits(&self) -> u64 {
        self.formats.values().map(|f| f.word_length() as u64).sum()
    }

    /// Widest word in the assignment
    pub fn max_word_length(&self) -> u32 {
        self.formats.values().map(|f| f.word_length()).max().unwrap_or(0)
    }
}

impl FromIterator<(NodeId, FixedPointFormat)> for FormatAssignment {
    fn from_iter<I: IntoIterator<Item = (NodeId, FixedPointFormat)>>(iter: I) -> Self {
        Self {
            formats: iter.into_iter().collect(),
        }
    }
}
