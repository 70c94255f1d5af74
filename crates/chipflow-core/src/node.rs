//! Chip nodes.
//!
//! A [`Node`] is one instance of a catalog chip. Its shape (exec pins, data
//! inputs, data outputs) is fixed when it is spawned from a
//! [`ChipSignature`](crate::catalog::ChipSignature), except for dynamic-pin
//! chips whose input count follows the number of arguments.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::id::NodeId;
use crate::port::Port;
use crate::value::{Literal, Value, ValueKind};

/// A data input slot. Unconnected slots may carry an inline literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSlot {
    pub kind: ValueKind,
    pub literal: Option<Literal>,
}

impl InputSlot {
    pub fn new(kind: ValueKind) -> Self {
        InputSlot {
            kind,
            literal: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    /// Catalog kind, e.g. `If` or `ExecutionIntegerSwitch`.
    pub kind: String,
    pub exec_input: bool,
    pub exec_outputs: u32,
    pub inputs: SmallVec<[InputSlot; 4]>,
    pub outputs: SmallVec<[ValueKind; 2]>,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Node {
    /// The exec input pin. Every node exposes index 0 for it; whether it is
    /// wired is up to the builder.
    pub fn exec_in(&self) -> Port {
        Port::exec(self.id, 0)
    }

    pub fn exec_out(&self, index: u32) -> Port {
        Port::exec(self.id, index)
    }

    pub fn data_in(&self, index: u32) -> Port {
        Port::data(self.id, index)
    }

    pub fn data_out(&self, index: u32) -> Port {
        Port::data(self.id, index)
    }

    /// Resizes a dynamic-pin node. New slots take `kind`.
    pub fn set_input_count(&mut self, count: usize, kind: &ValueKind) {
        if count < self.inputs.len() {
            self.inputs.truncate(count);
        } else {
            while self.inputs.len() < count {
                self.inputs.push(InputSlot::new(kind.clone()));
            }
        }
    }

    /// Stores a literal in an input slot. Returns `false` when the slot does
    /// not exist.
    pub fn set_literal(&mut self, slot: u32, literal: Literal) -> bool {
        match self.inputs.get_mut(slot as usize) {
            Some(input) => {
                input.literal = Some(literal);
                true
            }
            None => false,
        }
    }

    /// The value produced by the node: a single output as itself, several
    /// outputs as a tuple, none as unit.
    pub fn result_value(&self) -> Value {
        match self.outputs.len() {
            0 => Value::Unit,
            1 => Value::from_port(&self.outputs[0], self.data_out(0)),
            _ => Value::Tuple(
                self.outputs
                    .iter()
                    .enumerate()
                    .map(|(i, kind)| Value::from_port(kind, self.data_out(i as u32)))
                    .collect(),
            ),
        }
    }
}
