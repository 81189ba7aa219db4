//! # Ecotrace CLI Module
//!
//! This module implements the CLI interface for Ecotrace.
//!
//! ## Available Commands
//!
//! - `server` - Start the HTTP server
//! - `stats` - Show a user's emission statistics
//! - `reconcile` - Repair a user's ledger from their records
//! - `factors` - Dump the resolved factor table
//! - `init` - Initialize a new database

mod commands;

use clap::{Parser, Subcommand};
use ecotrace_core::EcotraceError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Ecotrace - Carbon Accounting Server
///
/// A deterministic, owner-scoped emission accounting engine. Every stored
/// carbon value is derived from the factor table; the ledger is the exact
/// integer sum of what survives.
#[derive(Parser, Debug)]
#[command(name = "ecotrace")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the emission database
    #[arg(short = 'D', long, global = true, default_value = "ecotrace.db")]
    pub database: PathBuf,

    /// Storage backend: "redb" (ACID database) or "memory" (ephemeral)
    #[arg(short = 'B', long, global = true, default_value = "redb")]
    pub backend: String,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// TOML file with factor overrides, merged over the built-in table
    #[arg(short = 'F', long, global = true)]
    pub factors_file: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start HTTP server
    Server {
        /// Host to bind to
        #[arg(short = 'H', long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to
        #[arg(short, long, default_value = "8080")]
        port: u16,
    },

    /// Show a user's emission statistics
    Stats {
        /// User id to summarize
        #[arg(short, long)]
        user: u64,

        /// Time range (all, week, month, year)
        #[arg(short, long, default_value = "all")]
        range: String,
    },

    /// Recompute a user's ledger from their records and repair drift
    Reconcile {
        /// User id to reconcile
        #[arg(short, long)]
        user: u64,
    },

    /// Dump the resolved factor table
    Factors,

    /// Initialize a new empty database
    Init {
        /// Force initialization even if database exists
        #[arg(short, long)]
        force: bool,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), EcotraceError> {
    let backend = cli.backend.as_str();
    let json_mode = cli.json_mode;
    let factors_file = cli.factors_file.as_deref();

    match cli.command {
        Some(Commands::Server { host, port }) => {
            cmd_server(&cli.database, backend, factors_file, &host, port).await
        }
        Some(Commands::Stats { user, range }) => {
            cmd_stats(&cli.database, backend, factors_file, json_mode, user, &range)
        }
        Some(Commands::Reconcile { user }) => {
            cmd_reconcile(&cli.database, backend, factors_file, json_mode, user)
        }
        Some(Commands::Factors) => cmd_factors(factors_file, json_mode),
        Some(Commands::Init { force }) => cmd_init(&cli.database, force),
        None => {
            // No subcommand - dump the factor table by default
            cmd_factors(factors_file, json_mode)
        }
    }
}
