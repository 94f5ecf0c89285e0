//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "flowlens",
    version,
    author = "neur0map",
    about = "Passive HTTP traffic correlator for automated browsing sessions",
    long_about = "Flowlens listens on a Unix socket for request/response events emitted by a \
                  passthrough proxy, correlates them into exchanges, groups exchanges into pages \
                  by referer provenance, extracts security signals, and writes one compact \
                  page-batch artifact when the session ends."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/flowlens/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a capture: listen for flow events until the session ends,
    /// then write the page-batch artifact
    Run {
        /// Ingest socket path (overrides config)
        #[arg(short, long)]
        socket: Option<PathBuf>,

        /// Artifact output directory (overrides config)
        #[arg(short, long)]
        out_dir: Option<PathBuf>,

        /// File of target URLs; their hostnames become the capture scope
        #[arg(short, long)]
        urls_file: Option<PathBuf>,
    },

    /// Check whether a collector is listening on the ingest socket
    Status,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
