//! CLI module for the research server
//!
//! Provides command-line interface parsing for the finresearch-server binary.
//! Uses clap for argument parsing and owo-colors for colored terminal output.

pub mod output;

use crate::utils::toml_config::DEFAULT_CONFIG_PATH;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Financial research server
///
/// Accepts research queries over HTTP, runs them through an external
/// research pipeline, and returns structured, verified reports.
#[derive(Parser, Debug)]
#[command(
    name = "finresearch-server",
    version,
    about = "Financial research server",
    long_about = "Accepts free-text financial research queries over HTTP, runs them through an\n\
                  external research pipeline, and returns structured, verified reports.\n\n\
                  Run without arguments to start the server.",
    after_help = "EXAMPLES:\n    \
                  finresearch-server                              # Start the server\n    \
                  finresearch-server --config prod.toml           # Use a custom config file\n    \
                  finresearch-server config --validate            # Check the configuration\n    \
                  finresearch-server research \"Analyze Apple\"     # One-shot research, JSON to stdout"
)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, global = true)]
    pub config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI subcommands
#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Start the HTTP server (default)
    Serve,

    /// Show configuration information
    Config {
        /// Show the full configuration as TOML
        #[arg(short = 'f', long)]
        full: bool,

        /// Validate the configuration file
        #[arg(long)]
        validate: bool,
    },

    /// Run a single research query and print the report as JSON
    Research {
        /// The research question
        query: String,
    },
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
