//! Ports and connections.
//!
//! A [`Port`] addresses one slot of one node. Exec ports carry control
//! (which node runs next), data ports carry values. Inputs and outputs share
//! the same representation; direction is implied by where the port is used
//! in a [`Connection`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::id::NodeId;

/// Whether a port carries control or data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PortKind {
    Exec,
    Data,
}

/// One slot of one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Port {
    pub node: NodeId,
    pub index: u32,
    pub kind: PortKind,
}

impl Port {
    pub fn exec(node: NodeId, index: u32) -> Self {
        Port {
            node,
            index,
            kind: PortKind::Exec,
        }
    }

    pub fn data(node: NodeId, index: u32) -> Self {
        Port {
            node,
            index,
            kind: PortKind::Data,
        }
    }

    /// Two ports are equivalent when they address the same slot index of the
    /// same node, regardless of kind.
    pub fn equivalent_to(&self, other: &Port) -> bool {
        self.node == other.node && self.index == other.index
    }

    pub fn is_exec(&self) -> bool {
        self.kind == PortKind::Exec
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            PortKind::Exec => "exec",
            PortKind::Data => "data",
        };
        write!(f, "{}:{}[{}]", self.node, kind, self.index)
    }
}

/// A directed wire between two ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub from: Port,
    pub to: Port,
    pub is_exec: bool,
}

impl Connection {
    pub fn exec(from: Port, to: Port) -> Self {
        Connection {
            from,
            to,
            is_exec: true,
        }
    }

    pub fn data(from: Port, to: Port) -> Self {
        Connection {
            from,
            to,
            is_exec: false,
        }
    }
}
