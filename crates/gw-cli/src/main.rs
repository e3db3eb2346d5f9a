#![forbid(unsafe_code)]

//! graphweave CLI - parse, validate, check, and load weave documents.
//!
//! # Commands
//!
//! - `parse`: Output the parsed subgraphs as JSON for tooling/debugging
//! - `validate`: Check input for errors and echo each subgraph back in
//!   canonical source form
//! - `check`: Run the assertions embedded in the document's comments
//! - `load`: Load the document into an in-memory store and report counts

use std::io::{self, Read};
use std::path::Path;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gw_core::{ParseError, Subgraph};
use gw_harness::check_document;
use gw_loader::{load, MemoryStore};
use gw_parser::parse_document;
use serde::Serialize;
use tracing::{debug, info};

/// graphweave CLI - parse, validate, check, and load weave documents.
#[derive(Debug, Parser)]
#[command(
    name = "gw-cli",
    version,
    about = "graphweave CLI - parse, validate, check, and load weave documents",
    long_about = "A toolkit for the weave graph-description format.\n\n\
        Reads documents of node chains, hooks, and comments, reports syntax\n\
        errors with line and column positions, and can load the result into\n\
        an in-memory graph store."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose logging (can be repeated for more detail: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Parse a document and output its subgraphs as JSON.
    Parse {
        /// Input file path or "-" for stdin.
        #[arg(default_value = "-")]
        input: String,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Validate a document and echo each subgraph in canonical form.
    Validate {
        /// Input file path or "-" for stdin.
        #[arg(default_value = "-")]
        input: String,

        /// Output as JSON (structured diagnostics)
        #[arg(long)]
        json: bool,
    },

    /// Run the assertions embedded in the document's comments.
    Check {
        /// Input file path or "-" for stdin.
        #[arg(default_value = "-")]
        input: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Load a document into an in-memory store and report what landed.
    Load {
        /// Input file path or "-" for stdin.
        #[arg(default_value = "-")]
        input: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Result of validating a document.
#[derive(Debug, Serialize)]
struct ValidateResult {
    valid: bool,
    subgraphs: usize,
    order: usize,
    size: usize,
    error: Option<Diagnostic>,
}

#[derive(Debug, Serialize)]
struct Diagnostic {
    message: String,
    line: Option<usize>,
    column: Option<usize>,
}

impl Diagnostic {
    fn from_parse_error(err: &ParseError) -> Self {
        let (line, column) = match err.position() {
            Some((line, column)) => (Some(line), Some(column)),
            None => (None, None),
        };
        Self {
            message: err.to_string(),
            line,
            column,
        }
    }
}

/// Result of running a document's embedded assertions.
#[derive(Debug, Serialize)]
struct CheckResult {
    passed: bool,
    subgraphs: usize,
    assertions: usize,
    failure: Option<String>,
}

/// Result of loading a document into the in-memory store.
#[derive(Debug, Serialize)]
struct LoadResult {
    subgraphs: usize,
    nodes: usize,
    relationships: usize,
    named_nodes: Vec<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.quiet);

    match cli.command {
        Command::Parse { input, pretty } => cmd_parse(&input, pretty),
        Command::Validate { input, json } => cmd_validate(&input, json),
        Command::Check { input, json } => cmd_check(&input, json),
        Command::Load { input, json } => cmd_load(&input, json),
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if quiet {
        "error"
    } else {
        match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .without_time()
        .try_init();
}

fn load_input(input: &str) -> Result<String> {
    if input == "-" {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read from stdin")?;
        Ok(buffer)
    } else if Path::new(input).exists() {
        std::fs::read_to_string(input).context(format!("Failed to read file: {input}"))
    } else {
        // Treat as inline document text
        Ok(input.to_string())
    }
}

// =============================================================================
// Command: parse
// =============================================================================

fn cmd_parse(input: &str, pretty: bool) -> Result<()> {
    let source = load_input(input)?;
    let subgraphs = match parse_document(&source) {
        Ok(subgraphs) => subgraphs,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    };

    debug!(subgraphs = subgraphs.len(), "parsed document");

    let output = if pretty {
        serde_json::to_string_pretty(&subgraphs)?
    } else {
        serde_json::to_string(&subgraphs)?
    };
    println!("{output}");

    Ok(())
}

// =============================================================================
// Command: validate
// =============================================================================

fn cmd_validate(input: &str, json_output: bool) -> Result<()> {
    let source = load_input(input)?;

    let (result, subgraphs) = match parse_document(&source) {
        Ok(subgraphs) => (
            ValidateResult {
                valid: true,
                subgraphs: subgraphs.len(),
                order: subgraphs.iter().map(Subgraph::order).sum(),
                size: subgraphs.iter().map(Subgraph::size).sum(),
                error: None,
            },
            subgraphs,
        ),
        Err(err) => (
            ValidateResult {
                valid: false,
                subgraphs: 0,
                order: 0,
                size: 0,
                error: Some(Diagnostic::from_parse_error(&err)),
            },
            Vec::new(),
        ),
    };

    if json_output {
        let output = serde_json::to_string_pretty(&result)?;
        println!("{output}");
    } else if result.valid {
        println!(
            "valid: {} subgraph(s), order {}, size {}",
            result.subgraphs, result.order, result.size
        );
        for (index, subgraph) in subgraphs.iter().enumerate() {
            println!("--- subgraph {index} ---");
            println!("{subgraph}");
        }
    } else if let Some(diagnostic) = &result.error {
        println!("invalid: {}", diagnostic.message);
    }

    if !result.valid {
        std::process::exit(1);
    }

    Ok(())
}

// =============================================================================
// Command: check
// =============================================================================

fn cmd_check(input: &str, json_output: bool) -> Result<()> {
    let source = load_input(input)?;

    let result = match check_document(&source) {
        Ok(report) => CheckResult {
            passed: true,
            subgraphs: report.subgraphs,
            assertions: report.assertions,
            failure: None,
        },
        Err(err) => CheckResult {
            passed: false,
            subgraphs: 0,
            assertions: 0,
            failure: Some(err.to_string()),
        },
    };

    if json_output {
        let output = serde_json::to_string_pretty(&result)?;
        println!("{output}");
    } else if result.passed {
        println!(
            "ok: {} assertion(s) over {} subgraph(s)",
            result.assertions, result.subgraphs
        );
    } else if let Some(failure) = &result.failure {
        println!("failed: {failure}");
    }

    if !result.passed {
        std::process::exit(1);
    }

    Ok(())
}

// =============================================================================
// Command: load
// =============================================================================

fn cmd_load(input: &str, json_output: bool) -> Result<()> {
    let source = load_input(input)?;
    let subgraphs = match parse_document(&source) {
        Ok(subgraphs) => subgraphs,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    };

    let mut store = MemoryStore::new();
    let mut named_nodes: Vec<String> = Vec::new();
    for subgraph in &subgraphs {
        let named = load(&mut store, subgraph);
        named_nodes.extend(named.into_keys());
    }
    named_nodes.sort();
    named_nodes.dedup();

    info!(
        nodes = store.node_count(),
        relationships = store.relationship_count(),
        "loaded document"
    );

    let result = LoadResult {
        subgraphs: subgraphs.len(),
        nodes: store.node_count(),
        relationships: store.relationship_count(),
        named_nodes,
    };

    if json_output {
        let output = serde_json::to_string_pretty(&result)?;
        println!("{output}");
    } else {
        println!(
            "loaded {} subgraph(s): {} node(s), {} relationship(s)",
            result.subgraphs, result.nodes, result.relationships
        );
        for name in &result.named_nodes {
            println!("  {name}");
        }
    }

    Ok(())
}
