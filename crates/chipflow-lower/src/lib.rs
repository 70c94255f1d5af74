//! Lowering of structured imperative code into chip flow graphs.
//!
//! The pipeline has two stages:
//!
//! 1. [`rewrite`] turns a typed [`SourceTree`] into a [`Program`], where
//!    every control statement is a builder call and every body a nested op
//!    list. Types are retargeted to port kinds and elided generic arguments
//!    are resolved through the [`SymbolOracle`].
//! 2. The build runtime executes the program once, starting from the entry
//!    method, and spawns nodes and connections into a [`Context`].
//!
//! # Modules
//!
//! - [`source`] -- Input syntax tree
//! - [`oracle`] -- Symbol information the rewriter needs
//! - [`program`] -- The rewritten program
//! - [`rewrite`] -- Syntax rewriter
//! - [`build`] -- Graph-construction runtime
//! - [`error`] -- [`LoweringError`]
//! - [`options`] -- [`LowerOptions`]

pub mod build;
pub mod error;
pub mod options;
pub mod oracle;
pub mod program;
pub mod rewrite;
pub mod source;

pub use build::flow::{ExecFlow, FlowId};
pub use error::LoweringError;
pub use options::LowerOptions;
pub use oracle::{GenericResolution, SymbolOracle, TableOracle};
pub use program::Program;
pub use rewrite::rewrite;
pub use source::SourceTree;

use chipflow_core::Context;

/// Lowers `tree` with default options.
pub fn lower(tree: &SourceTree, oracle: &dyn SymbolOracle) -> Result<Context, LoweringError> {
    lower_with(tree, oracle, &LowerOptions::default())
}

/// Lowers `tree`: rewrites it against the options' catalog, then builds the
/// entry method into a fresh context.
pub fn lower_with(
    tree: &SourceTree,
    oracle: &dyn SymbolOracle,
    options: &LowerOptions,
) -> Result<Context, LoweringError> {
    tracing::info!(tree = %tree.name, entry = %options.entry, "lowering");
    let program = rewrite(tree, oracle, &options.catalog)?;
    let context = build::build(&program, options)?;
    tracing::info!(
        nodes = context.node_count(),
        connections = context.connection_count(),
        sub_contexts = context.sub_contexts().len(),
        "lowered"
    );
    Ok(context)
}
