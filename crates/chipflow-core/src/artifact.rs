//! Persisted form of a lowered context and its content fingerprint.
//!
//! The artifact is the diffable output of a lowering: nodes sorted by id,
//! connections in creation order, metadata in `BTreeMap`s. Because nothing
//! in it is hash-ordered, `serde_json::to_vec` of the artifact is canonical
//! and its blake3 hash identifies the build.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::GraphError;
use crate::graph::Context;
use crate::value::Literal;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactNode {
    pub id: u64,
    pub kind: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
    /// Inline literals of unconnected input slots, keyed by slot index.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub literals: BTreeMap<u32, Literal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactConnection {
    pub from_node: u64,
    pub from_slot: u32,
    pub to_node: u64,
    pub to_slot: u32,
    pub is_exec: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphArtifact {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor: Option<String>,
    pub nodes: Vec<ArtifactNode>,
    pub connections: Vec<ArtifactConnection>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_contexts: Vec<GraphArtifact>,
}

impl GraphArtifact {
    pub fn from_context(context: &Context) -> Self {
        let nodes = context
            .nodes()
            .into_iter()
            .map(|node| ArtifactNode {
                id: node.id.0,
                kind: node.kind.clone(),
                metadata: node.metadata.clone(),
                literals: node
                    .inputs
                    .iter()
                    .enumerate()
                    .filter_map(|(i, slot)| slot.literal.clone().map(|l| (i as u32, l)))
                    .collect(),
            })
            .collect();
        let connections = context
            .connections()
            .into_iter()
            .map(|(_, c)| ArtifactConnection {
                from_node: c.from.node.0,
                from_slot: c.from.index,
                to_node: c.to.node.0,
                to_slot: c.to.index,
                is_exec: c.is_exec,
            })
            .collect();
        GraphArtifact {
            anchor: context.anchor().map(str::to_string),
            nodes,
            connections,
            sub_contexts: context
                .sub_contexts()
                .iter()
                .map(GraphArtifact::from_context)
                .collect(),
        }
    }

    /// blake3 hash of the canonical JSON encoding.
    pub fn fingerprint(&self) -> Result<blake3::Hash, GraphError> {
        let bytes = serde_json::to_vec(self).map_err(|e| GraphError::Encoding {
            reason: e.to_string(),
        })?;
        Ok(blake3::hash(&bytes))
    }
}

impl Context {
    pub fn to_artifact(&self) -> GraphArtifact {
        GraphArtifact::from_context(self)
    }
}
