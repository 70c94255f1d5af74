//! The execution-flow frontier.
//!
//! An [`ExecFlow`] is the set of exec output ports that are still dangling:
//! whichever node is spawned next gets all of them wired into its exec
//! input. Exactly one flow is current while a block is being built; control
//! builders swap in fresh flows for branch and loop bodies and merge the
//! results back.

use chipflow_core::{Context, GraphError, Port};
use indexmap::IndexSet;

/// Identity of a flow value. Pending labels bind to the flow that was
/// current when they were declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FlowId(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecFlow {
    id: FlowId,
    ports: IndexSet<Port>,
    advanced: bool,
    cleared: bool,
    first_target: Option<Port>,
}

impl ExecFlow {
    pub fn new(id: FlowId) -> Self {
        ExecFlow {
            id,
            ports: IndexSet::new(),
            advanced: false,
            cleared: false,
            first_target: None,
        }
    }

    /// A flow whose frontier is the single port `port`.
    pub fn seeded(id: FlowId, port: Port) -> Self {
        let mut flow = ExecFlow::new(id);
        flow.ports.insert(port);
        flow
    }

    pub fn id(&self) -> FlowId {
        self.id
    }

    pub fn ports(&self) -> impl Iterator<Item = &Port> {
        self.ports.iter()
    }

    pub fn contains(&self, port: &Port) -> bool {
        self.ports.contains(port)
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    /// The first exec input this flow was fed into, if any.
    pub fn first_target(&self) -> Option<Port> {
        self.first_target
    }

    /// Wires every frontier port into `into`; the frontier becomes `{out}`.
    pub fn advance(&mut self, ctx: &mut Context, into: Port, out: Port) -> Result<(), GraphError> {
        self.feed(ctx, into)?;
        self.ports.insert(out);
        self.advanced = true;
        Ok(())
    }

    /// Wires every frontier port into `into` and empties the frontier
    /// without marking the flow cleared.
    pub fn feed(&mut self, ctx: &mut Context, into: Port) -> Result<(), GraphError> {
        for port in self.ports.drain(..) {
            ctx.connect(port, into, true)?;
        }
        self.first_target.get_or_insert(into);
        Ok(())
    }

    /// Union of both frontiers.
    pub fn merge(&mut self, other: ExecFlow) {
        self.ports.extend(other.ports);
    }

    /// Moves the frontier out into a flow with the same identity. This flow
    /// is left empty but not marked cleared.
    pub fn take(&mut self) -> ExecFlow {
        ExecFlow {
            id: self.id,
            ports: std::mem::take(&mut self.ports),
            advanced: false,
            cleared: false,
            first_target: None,
        }
    }

    pub fn insert(&mut self, port: Port) {
        self.ports.insert(port);
    }

    /// Terminates the path: nothing downstream is reachable from here.
    pub fn clear(&mut self) {
        self.ports.clear();
        self.cleared = true;
    }

    /// Whether the path was terminated and nothing has been spawned on it
    /// since.
    pub fn is_terminated(&self) -> bool {
        self.cleared && self.ports.is_empty()
    }

    pub fn has_advanced_or_cleared(&self) -> bool {
        self.advanced || self.cleared
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chipflow_core::{Catalog, NodeId};
    use proptest::prelude::*;

    fn ctx_with(n: usize) -> (Context, Vec<NodeId>) {
        let catalog = Catalog::builtin();
        let mut ctx = Context::new();
        let ids = (0..n)
            .map(|_| ctx.new_node("DebugLog", catalog.get("DebugLog").unwrap(), &[]))
            .collect();
        (ctx, ids)
    }

    #[test]
    fn advance_connects_and_moves_frontier() {
        let (mut ctx, ids) = ctx_with(3);
        let mut flow = ExecFlow::seeded(FlowId(0), Port::exec(ids[0], 0));
        flow.insert(Port::exec(ids[1], 0));
        flow.advance(&mut ctx, Port::exec(ids[2], 0), Port::exec(ids[2], 0))
            .unwrap();
        assert_eq!(ctx.exec_sources(ids[2]).len(), 2);
        assert_eq!(flow.ports().copied().collect::<Vec<_>>(), vec![Port::exec(ids[2], 0)]);
        assert!(flow.has_advanced_or_cleared());
        assert_eq!(flow.first_target(), Some(Port::exec(ids[2], 0)));
    }

    #[test]
    fn clear_marks_flow() {
        let (_, ids) = ctx_with(1);
        let mut flow = ExecFlow::seeded(FlowId(0), Port::exec(ids[0], 0));
        assert!(!flow.has_advanced_or_cleared());
        flow.clear();
        assert!(flow.is_empty());
        assert!(flow.is_terminated());
        assert!(flow.has_advanced_or_cleared());
    }

    #[test]
    fn feed_does_not_mark_flow() {
        let (mut ctx, ids) = ctx_with(2);
        let mut flow = ExecFlow::seeded(FlowId(0), Port::exec(ids[0], 0));
        flow.feed(&mut ctx, Port::exec(ids[1], 0)).unwrap();
        assert!(flow.is_empty());
        assert!(!flow.is_terminated());
        assert!(!flow.has_advanced_or_cleared());
    }

    proptest! {
        #[test]
        fn merge_is_union(a in proptest::collection::vec(0u64..16, 0..8),
                          b in proptest::collection::vec(0u64..16, 0..8)) {
            let mut left = ExecFlow::new(FlowId(0));
            for n in &a { left.insert(Port::exec(NodeId(*n), 0)); }
            let mut right = ExecFlow::new(FlowId(1));
            for n in &b { right.insert(Port::exec(NodeId(*n), 0)); }
            left.merge(right);
            for n in a.iter().chain(b.iter()) {
                prop_assert!(left.contains(&Port::exec(NodeId(*n), 0)));
            }
            let distinct: std::collections::BTreeSet<u64> = a.iter().chain(b.iter()).copied().collect();
            prop_assert_eq!(left.len(), distinct.len());
            prop_assert!(!left.has_advanced_or_cleared());
        }

        #[test]
        fn advance_leaves_single_port(n in 1usize..6) {
            let (mut ctx, ids) = ctx_with(n + 1);
            let mut flow = ExecFlow::new(FlowId(0));
            for id in &ids[..n] { flow.insert(Port::exec(*id, 0)); }
            let target = ids[n];
            flow.advance(&mut ctx, Port::exec(target, 0), Port::exec(target, 0)).unwrap();
            prop_assert_eq!(flow.len(), 1);
            prop_assert_eq!(ctx.exec_sources(target).len(), n);
        }
    }
}
