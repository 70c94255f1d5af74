//! Context: the node graph under construction.
//!
//! [`Context`] owns the nodes and connections produced for one board, plus
//! any nested sub-contexts (existing boards built from inside the parent).
//! Nodes live in a petgraph `StableGraph` so removals (e.g. pruning an
//! elided conditional) never invalidate other handles. Node identities come
//! from the context's own monotonic generator, so output ordering depends
//! only on the order of builder calls. The tail of the generator can be
//! handed back once the nodes holding those ids are gone.
//!
//! All mutations go through `Context` methods, which validate pin layouts
//! and the single-writer rule for data inputs.

use std::collections::HashMap;

use petgraph::graph::NodeIndex;
use petgraph::stable_graph::StableGraph;
use petgraph::{Directed, Direction};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::catalog::ChipSignature;
use crate::error::GraphError;
use crate::id::{ConnectionId, NodeId};
use crate::node::{InputSlot, Node};
use crate::port::{Connection, Port, PortKind};
use crate::value::ValueKind;

/// Edge weight: the connection plus its creation sequence number.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct Wire {
    id: ConnectionId,
    connection: Connection,
}

#[derive(Debug, Clone, Default)]
pub struct Context {
    graph: StableGraph<Node, Wire, Directed, u32>,
    indices: HashMap<NodeId, NodeIndex<u32>>,
    next_id: u64,
    next_connection: u64,
    anchor: Option<String>,
    sub_contexts: Vec<Context>,
}

impl Context {
    pub fn new() -> Self {
        Context::default()
    }

    /// A context nested under an existing board named `anchor`.
    pub fn anchored(anchor: impl Into<String>) -> Self {
        Context {
            anchor: Some(anchor.into()),
            ..Context::default()
        }
    }

    pub fn anchor(&self) -> Option<&str> {
        self.anchor.as_deref()
    }

    /// Returns the next identity from the context's generator.
    pub fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Rewinds the generator to `from` when no live node holds `from` or a
    /// later id. Returns whether it rewound.
    pub fn release_ids_from(&mut self, from: NodeId) -> bool {
        if from.0 >= self.next_id || self.indices.keys().any(|id| *id >= from) {
            return false;
        }
        self.next_id = from.0;
        true
    }

    // -----------------------------------------------------------------------
    // Nodes
    // -----------------------------------------------------------------------

    /// Spawns a node of `kind` shaped by `signature`, with generic pin kinds
    /// resolved against `type_args`.
    pub fn new_node(
        &mut self,
        kind: &str,
        signature: &ChipSignature,
        type_args: &[ValueKind],
    ) -> NodeId {
        let id = NodeId(self.allocate_id());
        let node = Node {
            id,
            kind: kind.to_string(),
            exec_input: signature.exec_input,
            exec_outputs: signature.exec_outputs,
            inputs: signature
                .inputs
                .iter()
                .map(|k| InputSlot::new(k.resolve(type_args)))
                .collect(),
            outputs: signature
                .outputs
                .iter()
                .map(|k| k.resolve(type_args))
                .collect::<SmallVec<_>>(),
            metadata: Default::default(),
        };
        let idx = self.graph.add_node(node);
        self.indices.insert(id, idx);
        id
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.indices.get(&id).and_then(|idx| self.graph.node_weight(*idx))
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        let idx = *self.indices.get(&id)?;
        self.graph.node_weight_mut(idx)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.indices.contains_key(&id)
    }

    /// Removes a node and every connection touching it.
    pub fn remove_node(&mut self, id: NodeId) -> Result<Node, GraphError> {
        let idx = self
            .indices
            .remove(&id)
            .ok_or(GraphError::NodeNotFound { id })?;
        self.graph
            .remove_node(idx)
            .ok_or(GraphError::NodeNotFound { id })
    }

    /// All nodes in identity order.
    pub fn nodes(&self) -> Vec<&Node> {
        let mut nodes: Vec<&Node> = self.graph.node_weights().collect();
        nodes.sort_by_key(|n| n.id);
        nodes
    }

    /// Nodes of one kind in identity order.
    pub fn nodes_of_kind(&self, kind: &str) -> Vec<&Node> {
        self.nodes().into_iter().filter(|n| n.kind == kind).collect()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    // -----------------------------------------------------------------------
    // Connections
    // -----------------------------------------------------------------------

    /// Wires `from` to `to`.
    ///
    /// Exec connections run from an exec output to a node's exec input and
    /// may fan in. Data connections run from a data output to a data input;
    /// each data input accepts one source, and connecting it drops any inline
    /// literal.
    pub fn connect(
        &mut self,
        from: Port,
        to: Port,
        is_exec: bool,
    ) -> Result<ConnectionId, GraphError> {
        let from_idx = *self
            .indices
            .get(&from.node)
            .ok_or(GraphError::NodeNotFound { id: from.node })?;
        let to_idx = *self
            .indices
            .get(&to.node)
            .ok_or(GraphError::NodeNotFound { id: to.node })?;

        let expected = if is_exec { PortKind::Exec } else { PortKind::Data };
        if from.kind != expected || to.kind != expected {
            return Err(GraphError::InvalidConnection {
                reason: format!("{} -> {} as {:?} connection", from, to, expected),
            });
        }

        let source = &self.graph[from_idx];
        let target = &self.graph[to_idx];
        if is_exec {
            if from.index >= source.exec_outputs {
                return Err(GraphError::PortOutOfRange {
                    port: from,
                    kind: source.kind.clone(),
                });
            }
            if !target.exec_input || to.index != 0 {
                return Err(GraphError::PortOutOfRange {
                    port: to,
                    kind: target.kind.clone(),
                });
            }
        } else {
            if from.index as usize >= source.outputs.len() {
                return Err(GraphError::PortOutOfRange {
                    port: from,
                    kind: source.kind.clone(),
                });
            }
            if to.index as usize >= target.inputs.len() {
                return Err(GraphError::PortOutOfRange {
                    port: to,
                    kind: target.kind.clone(),
                });
            }
            if self.data_source(to).is_some() {
                return Err(GraphError::InputAlreadyConnected { port: to });
            }
        }

        if !is_exec {
            self.graph[to_idx].inputs[to.index as usize].literal = None;
        }

        let id = ConnectionId(self.next_connection);
        self.next_connection += 1;
        let connection = Connection { from, to, is_exec };
        self.graph
            .add_edge(from_idx, to_idx, Wire { id, connection });
        Ok(id)
    }

    /// All connections in creation order.
    pub fn connections(&self) -> Vec<(ConnectionId, Connection)> {
        let mut wires: Vec<(ConnectionId, Connection)> = self
            .graph
            .edge_weights()
            .map(|w| (w.id, w.connection))
            .collect();
        wires.sort_by_key(|(id, _)| *id);
        wires
    }

    pub fn connection_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Whether an exec connection runs from `from` into `to`'s node.
    pub fn has_exec_connection(&self, from: Port, to: Port) -> bool {
        self.connections().iter().any(|(_, c)| {
            c.is_exec && c.from.equivalent_to(&from) && c.to.node == to.node
        })
    }

    /// The source feeding a data input, if any.
    pub fn data_source(&self, input: Port) -> Option<Port> {
        let idx = self.indices.get(&input.node)?;
        self.graph
            .edges_directed(*idx, Direction::Incoming)
            .map(|e| e.weight().connection)
            .find(|c| !c.is_exec && c.to.index == input.index)
            .map(|c| c.from)
    }

    /// Exec output ports wired into `node`'s exec input, in creation order.
    pub fn exec_sources(&self, node: NodeId) -> Vec<Port> {
        let Some(idx) = self.indices.get(&node) else {
            return Vec::new();
        };
        let mut wires: Vec<Wire> = self
            .graph
            .edges_directed(*idx, Direction::Incoming)
            .map(|e| *e.weight())
            .filter(|w| w.connection.is_exec)
            .collect();
        wires.sort_by_key(|w| w.id);
        wires.into_iter().map(|w| w.connection.from).collect()
    }

    /// Targets an exec output is wired to, in creation order.
    pub fn exec_targets(&self, output: Port) -> Vec<Port> {
        let Some(idx) = self.indices.get(&output.node) else {
            return Vec::new();
        };
        let mut wires: Vec<Wire> = self
            .graph
            .edges_directed(*idx, Direction::Outgoing)
            .map(|e| *e.weight())
            .filter(|w| w.connection.is_exec && w.connection.from.index == output.index)
            .collect();
        wires.sort_by_key(|w| w.id);
        wires.into_iter().map(|w| w.connection.to).collect()
    }

    // -----------------------------------------------------------------------
    // Sub-contexts
    // -----------------------------------------------------------------------

    pub fn add_sub_context(&mut self, context: Context) {
        self.sub_contexts.push(context);
    }

    pub fn sub_contexts(&self) -> &[Context] {
        &self.sub_contexts
    }

    /// Verifies that the identity map and the graph agree.
    #[cfg(debug_assertions)]
    pub fn assert_consistency(&self) {
        assert_eq!(self.indices.len(), self.graph.node_count());
        for (id, idx) in &self.indices {
            let node = self
                .graph
                .node_weight(*idx)
                .unwrap_or_else(|| panic!("dangling index for node {}", id));
            assert_eq!(node.id, *id);
        }
        for sub in &self.sub_contexts {
            sub.assert_consistency();
        }
    }
}
