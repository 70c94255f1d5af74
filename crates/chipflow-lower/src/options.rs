//! Lowering configuration.

use chipflow_core::Catalog;
use serde::{Deserialize, Serialize};

/// Options for [`lower_with`](crate::lower_with).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LowerOptions {
    /// Name of the method the build starts from.
    pub entry: String,
    /// Chip shapes available to the program.
    pub catalog: Catalog,
    /// Maximum nesting of inlined user method calls.
    pub max_inline_depth: usize,
}

impl Default for LowerOptions {
    fn default() -> Self {
        LowerOptions {
            entry: "CircuitGraph".to_string(),
            catalog: Catalog::builtin(),
            max_inline_depth: 64,
        }
    }
}
