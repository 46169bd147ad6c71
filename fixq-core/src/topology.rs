use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::error::TopologyError;

/// Node identifier; also the node's index in its [`TopologyModel`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Closed set of signal-flow node kinds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum NodeKind {
    Input,
    Output,
    /// Floating-point coefficient, quantized into the node's format
    Const(f64),
    Add,
    Multiply,
    /// Unit-sample register; breaks feedback cycles
    Delay,
}

impl NodeKind {
    /// Short lowercase tag used in signal names and diagnostics
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::Input => "input",
            NodeKind::Output => "output",
            NodeKind::Const(_) => "const",
            NodeKind::Add => "add",
            NodeKind::Multiply => "mul",
            NodeKind::Delay => "delay",
        }
    }

    fn arity_ok(&self, found: usize) -> Result<(), &'static str> {
        let (ok, expected) = match self {
            NodeKind::Input | NodeKind::Const(_) => (found == 0, "0"),
            NodeKind::Output | NodeKind::Delay => (found == 1, "1"),
            NodeKind::Multiply => (found == 2, "2"),
            NodeKind::Add => (found >= 2, "2 or more"),
        };
        if ok {
            Ok(())
        } else {
            Err(expected)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    id: NodeId,
    kind: NodeKind,
    operands: Vec<NodeId>,
}

impl Node {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Incoming signals, in operand order
    pub fn operands(&self) -> &[NodeId] {
        &self.operands
    }
}

/// Immutable signal-flow graph of a filter realization.
///
/// Built once through [`TopologyBuilder`] and never mutated afterwards;
/// formats live in a separate `FormatAssignment`, so one topology can be
/// shared by reference across any number of quantization runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopologyModel {
    nodes: Vec<Node>,
}

impl TopologyModel {
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Result<&Node, TopologyError> {
        self.nodes.get(id.0).ok_or(TopologyError::UnknownNode(id))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Input nodes in id order; input `k` of a run feeds the `k`-th of these
    pub fn inputs(&self) -> Vec<NodeId> {
        self.ids_of(|k| matches!(k, NodeKind::Input))
    }

    /// Output nodes in id order
    pub fn outputs(&self) -> Vec<NodeId> {
        self.ids_of(|k| matches!(k, NodeKind::Output))
    }

    pub fn delays(&self) -> Vec<NodeId> {
        self.ids_of(|k| matches!(k, NodeKind::Delay))
    }

    fn ids_of(&self, pred: impl Fn(&NodeKind) -> bool) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| pred(&n.kind))
            .map(|n| n.id)
            .collect()
    }

    /// All `(operand, consumer)` edges, one per operand slot
    pub fn edges(&self) -> impl Iterator<Item = (NodeId, NodeId)> + '_ {
        self.nodes
            .iter()
            .flat_map(|n| n.operands.iter().map(move |&src| (src, n.id)))
    }

    /// Evaluation order within one sample.
    ///
    /// # Algorithm (Kahn)
    /// 1. Ignore edges *into* delay nodes; a delay's output is the previous
    ///    sample's state, so it is a source within the current sample
    /// 2. Repeatedly emit the ready node with the lowest id
    /// 3. Anything left over sits on or behind a cycle with no delay
    ///
    /// Ties broken by id keep the order, and everything derived from it,
    /// reproducible.
    pub fn schedule(&self) -> Result<Vec<NodeId>, TopologyError> {
        self.kahn(|n| n.kind == NodeKind::Delay)
    }

    /// Kahn's algorithm, treating the operands of nodes matching `cut` as absent
    pub(crate) fn kahn(&self, cut: impl Fn(&Node) -> bool) -> Result<Vec<NodeId>, TopologyError> {
        let n = self.nodes.len();
        let mut pending = vec![0usize; n];
        let mut consumers: Vec<Vec<NodeId>> = vec![Vec::new(); n];
        for node in &self.nodes {
            if cut(node) {
                continue;
            }
            pending[node.id.0] = node.operands.len();
            for src in &node.operands {
                consumers[src.0].push(node.id);
            }
        }

        let mut ready: BTreeSet<NodeId> = self
            .nodes
            .iter()
            .filter(|node| pending[node.id.0] == 0)
            .map(|node| node.id)
            .collect();
        let mut order = Vec::with_capacity(n);
        while let Some(id) = ready.pop_first() {
            order.push(id);
            for &c in &consumers[id.0] {
                pending[c.0] -= 1;
                if pending[c.0] == 0 {
                    ready.insert(c);
                }
            }
        }

        if order.len() < n {
            let nodes = (0..n)
                .map(NodeId)
                .filter(|id| pending[id.0] > 0)
                .collect();
            return Err(TopologyError::UnsizableTopology { nodes });
        }
        Ok(order)
    }

    /// Snapshot for shipping the topology to another process
    pub fn to_bytes(&self) -> Result<Vec<u8>, TopologyError> {
        bincode::serialize(&self.nodes).map_err(|e| TopologyError::Serialization(e.to_string()))
    }

    /// Restore a snapshot; the graph is re-validated
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TopologyError> {
        let nodes: Vec<Node> =
            bincode::deserialize(bytes).map_err(|e| TopologyError::Serialization(e.to_string()))?;
        validate(&nodes)?;
        Ok(Self { nodes })
    }
}

fn validate(nodes: &[Node]) -> Result<(), TopologyError> {
    for (index, node) in nodes.iter().enumerate() {
        if node.id.0 != index {
            return Err(TopologyError::UnknownNode(node.id));
        }
        if let Err(expected) = node.kind.arity_ok(node.operands.len()) {
            return Err(TopologyError::InvalidArity {
                node: node.id,
                kind: node.kind.label(),
                expected,
                found: node.operands.len(),
            });
        }
        if let NodeKind::Const(v) = node.kind {
            if !v.is_finite() {
                return Err(TopologyError::InvalidCoefficients(format!(
                    "{} holds non-finite coefficient {}",
                    node.id, v
                )));
            }
        }
        for src in &node.operands {
            let operand = nodes.get(src.0).ok_or(TopologyError::UnknownNode(*src))?;
            if operand.kind == NodeKind::Output {
                return Err(TopologyError::UnsupportedStructure(format!(
                    "output {} feeds {}",
                    src, node.id
                )));
            }
        }
    }
    if !nodes.iter().any(|n| n.kind == NodeKind::Input) {
        return Err(TopologyError::MissingPort("input"));
    }
    if !nodes.iter().any(|n| n.kind == NodeKind::Output) {
        return Err(TopologyError::MissingPort("output"));
    }
    Ok(())
}

/// Incremental construction of a [`TopologyModel`].
///
/// Operands may reference nodes created later (feedback through a delay),
/// so structural checks run once, in [`build`](Self::build).
///
/// # Example
/// ```
/// use fixq_core::TopologyBuilder;
///
/// // y[n] = x[n] + 0.5 * y[n-1]
/// let mut b = TopologyBuilder::new();
/// let x = b.input();
/// let sum = b.node(fixq_core::NodeKind::Add);
/// let state = b.delay(sum);
/// let fb = b.scale(state, 0.5);
/// b.connect(x, sum).unwrap();
/// b.connect(fb, sum).unwrap();
/// b.output(sum);
///
/// let topology = b.build().unwrap();
/// assert_eq!(topology.inputs().len(), 1);
/// assert!(topology.schedule().is_ok());
/// ```
#[derive(Debug, Default, Clone)]
pub struct TopologyBuilder {
    nodes: Vec<Node>,
}

impl TopologyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node with no operands yet
    pub fn node(&mut self, kind: NodeKind) -> NodeId {
        self.push(kind, Vec::new())
    }

    /// Append `operand` to the operand list of `node`
    pub fn connect(&mut self, operand: NodeId, node: NodeId) -> Result<(), TopologyError> {
        let target = self
            .nodes
            .get_mut(node.0)
            .ok_or(TopologyError::UnknownNode(node))?;
        target.operands.push(operand);
        Ok(())
    }

    pub fn input(&mut self) -> NodeId {
        self.push(NodeKind::Input, Vec::new())
    }

    pub fn constant(&mut self, value: f64) -> NodeId {
        self.push(NodeKind::Const(value), Vec::new())
    }

    pub fn add(&mut self, terms: &[NodeId]) -> NodeId {
        self.push(NodeKind::Add, terms.to_vec())
    }

    pub fn multiply(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.push(NodeKind::Multiply, vec![a, b])
    }

    /// `signal × coefficient`: a constant node feeding a multiply
    pub fn scale(&mut self, signal: NodeId, coefficient: f64) -> NodeId {
        let c = self.constant(coefficient);
        self.multiply(signal, c)
    }

    pub fn delay(&mut self, signal: NodeId) -> NodeId {
        self.push(NodeKind::Delay, vec![signal])
    }

    pub fn output(&mut self, signal: NodeId) -> NodeId {
        self.push(NodeKind::Output, vec![signal])
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Validate arity, operand references and ports, then freeze.
    ///
    /// Cycles are not rejected here; they surface from
    /// [`TopologyModel::schedule`] as `UnsizableTopology`.
    pub fn build(self) -> Result<TopologyModel, TopologyError> {
        validate(&self.nodes)?;
        tracing::debug!(nodes = self.nodes.len(), "topology built");
        Ok(TopologyModel { nodes: self.nodes })
    }

    fn push(&mut self, kind: NodeKind, operands: Vec<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node { id, kind, operands });
        id
    }
}
