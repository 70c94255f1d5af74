//! Core error types for chipflow-core.
//!
//! Uses `thiserror` for structured, matchable error variants covering
//! misuse of the graph model. Any of these surfacing during lowering is a
//! builder bug rather than a user error.

use crate::id::NodeId;
use crate::port::Port;
use thiserror::Error;

/// Errors produced by [`Context`](crate::graph::Context) mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// A node id was not found in the context.
    #[error("node not found: NodeId({id})", id = id.0)]
    NodeNotFound { id: NodeId },

    /// A singular data input already has a source.
    #[error("data input {port} is already connected")]
    InputAlreadyConnected { port: Port },

    /// A port index is outside the node's pin layout.
    #[error("port {port} does not exist on node kind '{kind}'")]
    PortOutOfRange { port: Port, kind: String },

    /// A connection mixes exec and data ports.
    #[error("invalid connection: {reason}")]
    InvalidConnection { reason: String },

    /// The artifact could not be encoded for fingerprinting.
    #[error("artifact encoding failed: {reason}")]
    Encoding { reason: String },
}
