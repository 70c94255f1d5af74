//! Chip catalog: the shapes of the node kinds the builder may spawn.
//!
//! The full catalog of a target runtime is host data and is normally loaded
//! from JSON. [`Catalog::builtin`] carries the control chips the lowering
//! itself emits plus the operator chips the syntax rewriter maps operators
//! onto, so a bare catalog is enough to lower most programs.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::value::ValueKind;

/// Pin layout of one chip kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChipSignature {
    #[serde(default)]
    pub exec_input: bool,
    #[serde(default)]
    pub exec_outputs: u32,
    #[serde(default)]
    pub inputs: Vec<ValueKind>,
    #[serde(default)]
    pub outputs: Vec<ValueKind>,
    /// Input count follows the argument count (dynamic pins).
    #[serde(default)]
    pub variadic: bool,
    /// Exec output that continues the flow after the chip runs.
    #[serde(default)]
    pub flow_output: u32,
    /// Exec output that fires later than the chip itself (e.g. a delay).
    #[serde(default)]
    pub deferred_output: Option<u32>,
}

impl ChipSignature {
    /// A data-only chip.
    pub fn pure(inputs: Vec<ValueKind>, outputs: Vec<ValueKind>) -> Self {
        ChipSignature {
            exec_input: false,
            exec_outputs: 0,
            inputs,
            outputs,
            variadic: false,
            flow_output: 0,
            deferred_output: None,
        }
    }

    /// A chip with one exec input and one exec output.
    pub fn exec(inputs: Vec<ValueKind>, outputs: Vec<ValueKind>) -> Self {
        ChipSignature {
            exec_input: true,
            exec_outputs: 1,
            ..ChipSignature::pure(inputs, outputs)
        }
    }

    pub fn variadic(mut self) -> Self {
        self.variadic = true;
        self
    }

    /// Whether spawning this chip moves the execution frontier.
    pub fn is_sequenced(&self) -> bool {
        self.exec_input && self.exec_outputs > 0
    }
}

/// Name-indexed chip signatures plus the known object kinds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub chips: IndexMap<String, ChipSignature>,
    #[serde(default)]
    pub object_kinds: IndexSet<String>,
}

impl Catalog {
    pub fn new() -> Self {
        Catalog::default()
    }

    /// Control, operator, variable and event chips.
    pub fn builtin() -> Self {
        use ValueKind::*;
        let t = || Generic(0);
        let list_t = || List(Box::new(Generic(0)));

        let mut catalog = Catalog::new();

        // Control flow.
        catalog.insert(
            "If",
            ChipSignature {
                exec_outputs: 2,
                ..ChipSignature::exec(vec![Bool], vec![])
            },
        );
        catalog.insert("ExecutionIntegerSwitch", ChipSignature::exec(vec![Int], vec![]));
        catalog.insert("ExecutionStringSwitch", ChipSignature::exec(vec![String], vec![]));
        catalog.insert(
            "ForEach",
            ChipSignature {
                exec_outputs: 2,
                ..ChipSignature::exec(vec![list_t()], vec![t(), Int])
            },
        );
        catalog.insert(
            "Delay",
            ChipSignature {
                exec_outputs: 2,
                flow_output: 1,
                deferred_output: Some(1),
                ..ChipSignature::exec(vec![Float], vec![])
            },
        );
        catalog.insert("IfValue", ChipSignature::pure(vec![Bool, t(), t()], vec![t()]));

        // Variables.
        catalog.insert("Variable", ChipSignature::pure(vec![], vec![t()]));
        catalog.insert("SetVariable", ChipSignature::exec(vec![t()], vec![]));

        // Events.
        catalog.insert("EventDefinition", ChipSignature::pure(vec![], vec![]));
        catalog.insert(
            "EventReceiver",
            ChipSignature {
                exec_outputs: 1,
                ..ChipSignature::pure(vec![], vec![])
            },
        );
        catalog.insert("EventSender", ChipSignature::exec(vec![], vec![]).variadic());

        // Arithmetic.
        for name in ["Add", "Subtract", "Multiply", "Divide", "Modulo", "Min", "Max"] {
            catalog.insert(name, ChipSignature::pure(vec![t(), t()], vec![t()]).variadic());
        }
        catalog.insert("Negate", ChipSignature::pure(vec![t()], vec![t()]));

        // Comparison and logic.
        for name in ["GreaterThan", "LessThan", "GreaterOrEqual", "LessOrEqual"] {
            catalog.insert(name, ChipSignature::pure(vec![t(), t()], vec![Bool]));
        }
        catalog.insert("Equals", ChipSignature::pure(vec![Any, Any], vec![Bool]).variadic());
        catalog.insert("Not", ChipSignature::pure(vec![Bool], vec![Bool]));
        catalog.insert("And", ChipSignature::pure(vec![Bool, Bool], vec![Bool]).variadic());
        catalog.insert("Or", ChipSignature::pure(vec![Bool, Bool], vec![Bool]).variadic());
        catalog.insert("BitShiftLeft", ChipSignature::pure(vec![Int, Int], vec![Int]));
        catalog.insert("BitShiftRight", ChipSignature::pure(vec![Int, Int], vec![Int]));

        // Strings and lists.
        catalog.insert(
            "StringConcat",
            ChipSignature::pure(vec![String, String], vec![String]).variadic(),
        );
        catalog.insert("ToString", ChipSignature::pure(vec![t()], vec![String]));
        catalog.insert("ListCreate", ChipSignature::pure(vec![t()], vec![list_t()]).variadic());
        catalog.insert("ListGetElement", ChipSignature::pure(vec![list_t(), Int], vec![t()]));
        catalog.insert("ListCount", ChipSignature::pure(vec![list_t()], vec![Int]));

        // A small set of runtime chips so programs can do something observable.
        catalog.insert("DebugLog", ChipSignature::exec(vec![String], vec![]));
        catalog.insert(
            "GetLocalPlayer",
            ChipSignature::pure(vec![], vec![Object("Player".into())]),
        );
        catalog.insert(
            "PlayerGetName",
            ChipSignature::pure(vec![Object("Player".into())], vec![String]),
        );

        for kind in ["Player", "RecRoomObject", "Vector3", "Quaternion", "Color", "AudioClip"] {
            catalog.object_kinds.insert(kind.to_string());
        }

        catalog
    }

    pub fn insert(&mut self, name: &str, signature: ChipSignature) {
        self.chips.insert(name.to_string(), signature);
    }

    pub fn get(&self, name: &str) -> Option<&ChipSignature> {
        self.chips.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.chips.contains_key(name)
    }

    pub fn is_object_kind(&self, name: &str) -> bool {
        self.object_kinds.contains(name)
    }

    /// Adds every entry of `other`, replacing same-named chips.
    pub fn extend(&mut self, other: Catalog) {
        self.chips.extend(other.chips);
        self.object_kinds.extend(other.object_kinds);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_has_control_chips() {
        let catalog = Catalog::builtin();
        let if_sig = catalog.get("If").unwrap();
        assert!(if_sig.exec_input);
        assert_eq!(if_sig.exec_outputs, 2);
        assert_eq!(if_sig.inputs, vec![ValueKind::Bool]);
        assert!(catalog.get("SetVariable").unwrap().is_sequenced());
        assert!(!catalog.get("Variable").unwrap().is_sequenced());
    }

    #[test]
    fn delay_continues_on_deferred_output() {
        let catalog = Catalog::builtin();
        let delay = catalog.get("Delay").unwrap();
        assert_eq!(delay.flow_output, 1);
        assert_eq!(delay.deferred_output, Some(1));
    }

    #[test]
    fn extend_overrides_entries() {
        let mut catalog = Catalog::builtin();
        let mut extra = Catalog::new();
        extra.insert("Add", ChipSignature::pure(vec![], vec![]));
        extra.object_kinds.insert("Trigger".into());
        catalog.extend(extra);
        assert!(catalog.get("Add").unwrap().inputs.is_empty());
        assert!(catalog.is_object_kind("Trigger"));
        assert!(catalog.is_object_kind("Player"));
    }

    #[test]
    fn signature_json_defaults() {
        let sig: ChipSignature =
            serde_json::from_str(r#"{"exec_input": true, "exec_outputs": 1}"#).unwrap();
        assert!(sig.is_sequenced());
        assert!(sig.inputs.is_empty());
        assert!(!sig.variadic);
        assert_eq!(sig.deferred_output, None);
    }
}
