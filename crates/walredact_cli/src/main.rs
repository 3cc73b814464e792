//! walredact CLI
//!
//! Command-line tools for redacting and inspecting WAL segments.
//!
//! # Commands
//!
//! - `filter` - Rewrite a run of segments with excluded relations redacted
//! - `dump` - Print the records of a run of segments
//! - `verify` - Check every record checksum
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use walredact_core::{RelationId, WalGeometry, DEFAULT_PAGE_SIZE, DEFAULT_SEGMENT_SIZE};

/// WAL redaction and inspection tools.
#[derive(Parser)]
#[command(name = "walredact")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    /// Segment file size in bytes
    #[arg(global = true, long, default_value_t = DEFAULT_SEGMENT_SIZE)]
    segment_size: u64,

    /// WAL page size in bytes
    #[arg(global = true, long, default_value_t = DEFAULT_PAGE_SIZE)]
    page_size: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rewrite segments, replacing records of excluded relations with no-ops
    Filter {
        /// First segment file of the run
        start_file: PathBuf,

        /// Directory to write the rewritten segments to
        output_dir: PathBuf,

        /// Relation to redact, as tablespace,database,relfilenode
        #[arg(short = 'x', long = "exclude", value_name = "TS,DB,REL")]
        exclude: Vec<RelationId>,
    },

    /// Print WAL records for debugging
    Dump {
        /// First segment file of the run
        start_file: PathBuf,

        /// Maximum number of records to dump
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Verify record checksums
    Verify {
        /// First segment file of the run
        start_file: PathBuf,
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
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let geometry = WalGeometry::new(cli.segment_size, cli.page_size)?;

    match cli.command {
        Commands::Filter {
            start_file,
            output_dir,
            exclude,
        } => {
            commands::filter::run(&start_file, &output_dir, &exclude, geometry)?;
        }
        Commands::Dump {
            start_file,
            limit,
            format,
        } => {
            commands::dump::run(&start_file, geometry, limit, &format)?;
        }
        Commands::Verify { start_file } => {
            commands::verify::run(&start_file, geometry)?;
        }
        Commands::Version => {
            println!("walredact CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("walredact core v{}", walredact_core::VERSION);
        }
    }

    Ok(())
}
