//! Chip flow lowering CLI.
//!
//! Provides the `chipflow` binary. `lower` turns a source tree exported by a
//! front end into a graph artifact; `rewrite` stops after the syntax rewrite
//! and prints the intermediate program. Both read JSON files and use the same
//! `chipflow_lower` entry points a host application would.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;

use chipflow_core::Catalog;
use chipflow_lower::{LowerOptions, SourceTree, TableOracle};

/// Chip flow lowering tools.
#[derive(Parser)]
#[command(name = "chipflow", about = "Lower structured code into chip flow graphs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Lower a source tree to a graph artifact.
    Lower {
        /// Source tree JSON.
        #[arg(short, long)]
        input: PathBuf,

        /// Symbol oracle tables JSON (default: empty).
        #[arg(long)]
        oracle: Option<PathBuf>,

        /// Extra chip signatures, merged over the built-in catalog.
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Lowering options JSON.
        #[arg(long)]
        options: Option<PathBuf>,

        /// Entry method name (overrides the options file).
        #[arg(long)]
        entry: Option<String>,

        /// Artifact output file (default: stdout).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the rewritten program without building a graph.
    Rewrite {
        /// Source tree JSON.
        #[arg(short, long)]
        input: PathBuf,

        /// Symbol oracle tables JSON (default: empty).
        #[arg(long)]
        oracle: Option<PathBuf>,

        /// Extra chip signatures, merged over the built-in catalog.
        #[arg(long)]
        catalog: Option<PathBuf>,
    },
}

fn main() {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let exit_code = match cli.command {
        Commands::Lower {
            input,
            oracle,
            catalog,
            options,
            entry,
            output,
        } => run_lower(&input, oracle, catalog, options, entry, output),
        Commands::Rewrite {
            input,
            oracle,
            catalog,
        } => run_rewrite(&input, oracle, catalog),
    };
    process::exit(exit_code);
}

/// Execute the lower subcommand.
///
/// Returns exit code: 0 = success, 1 = lowering error, 3 = I/O or JSON error.
fn run_lower(
    input: &Path,
    oracle: Option<PathBuf>,
    catalog: Option<PathBuf>,
    options: Option<PathBuf>,
    entry: Option<String>,
    output: Option<PathBuf>,
) -> i32 {
    let tree: SourceTree = match read_json(input) {
        Ok(tree) => tree,
        Err(code) => return code,
    };
    let oracle = match load_oracle(oracle.as_deref()) {
        Ok(oracle) => oracle,
        Err(code) => return code,
    };
    let mut lower_options = match options {
        Some(path) => match read_json::<LowerOptions>(&path) {
            Ok(options) => options,
            Err(code) => return code,
        },
        None => LowerOptions::default(),
    };
    if let Err(code) = extend_catalog(&mut lower_options.catalog, catalog.as_deref()) {
        return code;
    }
    if let Some(entry) = entry {
        lower_options.entry = entry;
    }

    let context = match chipflow_lower::lower_with(&tree, &oracle, &lower_options) {
        Ok(context) => context,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    let artifact = context.to_artifact();
    match artifact.fingerprint() {
        Ok(hash) => tracing::info!(fingerprint = %hash, "artifact fingerprint"),
        Err(e) => {
            eprintln!("Error: {}", e);
            return 3;
        }
    }

    let json = match serde_json::to_string_pretty(&artifact) {
        Ok(json) => json,
        Err(e) => {
            eprintln!("Error: failed to serialize artifact: {}", e);
            return 3;
        }
    };
    match output {
        Some(path) => {
            if let Err(e) = fs::write(&path, json) {
                eprintln!("Error: failed to write '{}': {}", path.display(), e);
                return 3;
            }
        }
        None => println!("{}", json),
    }
    0
}

/// Execute the rewrite subcommand. Exit codes as for `lower`.
fn run_rewrite(input: &Path, oracle: Option<PathBuf>, catalog: Option<PathBuf>) -> i32 {
    let tree: SourceTree = match read_json(input) {
        Ok(tree) => tree,
        Err(code) => return code,
    };
    let oracle = match load_oracle(oracle.as_deref()) {
        Ok(oracle) => oracle,
        Err(code) => return code,
    };
    let mut chips = Catalog::builtin();
    if let Err(code) = extend_catalog(&mut chips, catalog.as_deref()) {
        return code;
    }

    let program = match chipflow_lower::rewrite(&tree, &oracle, &chips) {
        Ok(program) => program,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let json = serde_json::to_string_pretty(&program).unwrap_or_else(|e| {
        format!("{{\"error\": \"failed to serialize program: {}\"}}", e)
    });
    println!("{}", json);
    0
}

/// Reads and parses a JSON file, reporting failures on stderr.
fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, i32> {
    let text = fs::read_to_string(path).map_err(|e| {
        eprintln!("Error: failed to read '{}': {}", path.display(), e);
        3
    })?;
    serde_json::from_str(&text).map_err(|e| {
        eprintln!("Error: invalid JSON in '{}': {}", path.display(), e);
        3
    })
}

fn load_oracle(path: Option<&Path>) -> Result<TableOracle, i32> {
    match path {
        Some(path) => read_json(path),
        None => Ok(TableOracle::new()),
    }
}

fn extend_catalog(catalog: &mut Catalog, path: Option<&Path>) -> Result<(), i32> {
    if let Some(path) = path {
        let extra: Catalog = read_json(path)?;
        tracing::debug!(chips = extra.chips.len(), "loaded catalog");
        catalog.extend(extra);
    }
    Ok(())
}
