// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `flowgraph`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "flowgraph",
    version,
    about = "Run a workflow of dependent tasks with IF / LOOP / REPLICATE control flow.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the workflow definition (TOML).
    ///
    /// Default: `Flowgraph.toml` in the current working directory.
    #[arg(long, value_name = "PATH")]
    pub definition: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `FLOWGRAPH_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the task graph, but don't execute anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Directory under which `.flowgraph/jobs` snapshots are written when
    /// `[job].store = "file"`.
    ///
    /// Default: the directory containing the definition file.
    #[arg(long, value_name = "DIR")]
    pub store_dir: Option<String>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
