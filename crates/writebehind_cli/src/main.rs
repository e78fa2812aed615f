//! Writebehind CLI
//!
//! Command-line tools for the write-behind buffer.
//!
//! # Commands
//!
//! - `demo` - Drive a buffer with generated events and report where they went
//! - `inspect` - Summarize a backup file written by failed flushes

mod commands;

use clap::{Parser, Subcommand};
use commands::demo::{DemoOptions, LayoutArg};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Write-behind buffer tools.
#[derive(Parser)]
#[command(name = "writebehind")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Append generated events to a buffer and print the flush counters
    Demo {
        /// Buffer length that triggers a flush
        #[arg(short, long, default_value = "20")]
        capacity: usize,

        /// Timer period in milliseconds
        #[arg(short, long, default_value = "2000")]
        interval_ms: u64,

        /// Number of events to append
        #[arg(short = 'n', long, default_value = "100")]
        count: u64,

        /// Pause between appends in milliseconds
        #[arg(short, long, default_value = "10")]
        rate_ms: u64,

        /// Directory for batches both sinks reject
        #[arg(short, long)]
        backup_dir: Option<PathBuf>,

        /// Backup file name prefix
        #[arg(long, default_value = "failed")]
        prefix: String,

        /// Backup directory mode, in octal
        #[arg(long, default_value = "755", value_parser = parse_octal)]
        mode: u32,

        /// Backup line layout
        #[arg(short, long, value_enum, default_value_t = LayoutArg::PerRecord)]
        layout: LayoutArg,

        /// Make the primary sink reject every batch
        #[arg(long)]
        fail_primary: bool,

        /// Make the secondary sink reject every batch
        #[arg(long)]
        fail_secondary: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Summarize a backup file
    Inspect {
        /// Backup file to read
        file: PathBuf,

        /// Print every record after the summary
        #[arg(short, long)]
        records: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn parse_octal(value: &str) -> Result<u32, String> {
    u32::from_str_radix(value.trim_start_matches("0o"), 8)
        .map_err(|e| format!("invalid octal mode {value:?}: {e}"))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Demo {
            capacity,
            interval_ms,
            count,
            rate_ms,
            backup_dir,
            prefix,
            mode,
            layout,
            fail_primary,
            fail_secondary,
            format,
        } => {
            let options = DemoOptions {
                capacity,
                interval_ms,
                count,
                rate_ms,
                backup_dir,
                prefix,
                mode,
                layout,
                fail_primary,
                fail_secondary,
            };
            commands::demo::run(&options, &format)?;
        }
        Commands::Inspect {
            file,
            records,
            format,
        } => {
            commands::inspect::run(&file, records, &format)?;
        }
        Commands::Version => {
            println!("writebehind CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
