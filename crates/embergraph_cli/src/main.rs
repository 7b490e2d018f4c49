//! EmberGraph CLI
//!
//! Command-line tools for the EmberGraph kernel.
//!
//! # Commands
//!
//! - `status` - Boot a kernel and report its state
//! - `smoke` - Run a workload exercising every kernel path
//! - `log` - Show the persistent message log of a store

mod commands;

use clap::{Parser, Subcommand};
use commands::{CliError, Format, KernelOptions};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// EmberGraph kernel tools.
#[derive(Parser)]
#[command(name = "embergraph")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Store directory; omit for an in-memory kernel
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Kernel parameter as key=value (repeatable)
    #[arg(global = true, long = "param", value_name = "KEY=VALUE")]
    params: Vec<String>,

    /// Start the kernel read-only
    #[arg(global = true, long)]
    read_only: bool,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(global = true, short, long, default_value = "text")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Boot a kernel and report its state
    Status,

    /// Run a workload exercising every kernel path
    Smoke {
        /// Number of nodes in the test chain
        #[arg(short, long, default_value = "100")]
        nodes: usize,
    },

    /// Show the persistent message log
    Log {
        /// Only show the newest entries
        #[arg(short, long)]
        tail: Option<usize>,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let format = Format::parse(&cli.format)?;
    let options = KernelOptions {
        path: cli.path,
        params: cli.params,
        read_only: cli.read_only,
    };

    match cli.command {
        Commands::Status => commands::status::run(&options, format)?,
        Commands::Smoke { nodes } => commands::smoke::run(&options, nodes, format)?,
        Commands::Log { tail } => {
            let path = options.path.as_deref().ok_or(CliError::PathRequired("log"))?;
            commands::log::run(path, tail, format)?;
        }
        Commands::Version => {
            println!("EmberGraph CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("EmberGraph Core v{}", embergraph_core::VERSION);
        }
    }

    Ok(())
}
