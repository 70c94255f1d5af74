//! Stable ID newtypes for graph entities.
//!
//! Node identities are allocated by a [`Context`](crate::graph::Context)'s
//! monotonic generator, never reused, and never derived from petgraph's
//! internal indices (those are recycled by `StableGraph` after removals).

use std::fmt;

use serde::{Deserialize, Serialize};

/// Node identity, unique within one context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

/// Creation sequence number of a connection within its context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
