pub mod artifact;
pub mod catalog;
pub mod error;
pub mod graph;
pub mod id;
pub mod node;
pub mod port;
pub mod value;

// Re-export commonly used types
pub use artifact::{ArtifactConnection, ArtifactNode, GraphArtifact};
pub use catalog::{Catalog, ChipSignature};
pub use error::GraphError;
pub use graph::Context;
pub use id::{ConnectionId, NodeId};
pub use node::{InputSlot, Node};
pub use port::{Connection, Port, PortKind};
pub use value::{Literal, Operand, Value, ValueKind};
