//! # Ecotrace - Carbon Accounting Server
//!
//! The main binary for the Ecotrace emission accounting engine.
//!
//! This application provides:
//! - HTTP REST API server (axum-based)
//! - WebSocket notification channel (per-user rooms)
//! - CLI interface for accounting operations
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                  apps/ecotrace (THE BINARY)                │
//! │                                                            │
//! │  ┌──────────┐   ┌──────────────┐   ┌──────────────────┐   │
//! │  │   CLI    │   │   HTTP API   │   │  Notification    │   │
//! │  │  (clap)  │   │   (axum)     │   │  Hub (ws)        │   │
//! │  └─────┬────┘   └──────┬───────┘   └────────┬─────────┘   │
//! │        │               │                    │              │
//! │        └───────────────┼────────────────────┘              │
//! │                        ▼                                   │
//! │               ┌─────────────────┐                          │
//! │               │  ecotrace-core  │                          │
//! │               │  (THE LOGIC)    │                          │
//! │               └─────────────────┘                          │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Start the HTTP server
//! ecotrace server --host 0.0.0.0 --port 8080
//!
//! # CLI operations
//! ecotrace stats --user 1 --range month
//! ecotrace reconcile --user 1
//! ecotrace factors
//! ```

use clap::Parser;
use ecotrace::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // Initialize tracing — ECOTRACE_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("ECOTRACE_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "ecotrace=info,tower_http=debug".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    // Parse CLI arguments
    let cli = cli::Cli::parse();

    // Display startup banner
    if !cli.quiet {
        print_banner();
    }

    // Execute command
    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the Ecotrace startup banner.
fn print_banner() {
    println!(
        r#"
  ███████╗ ██████╗ ██████╗ ████████╗██████╗  █████╗  ██████╗███████╗
  ██╔════╝██╔════╝██╔═══██╗╚══██╔══╝██╔══██╗██╔══██╗██╔════╝██╔════╝
  █████╗  ██║     ██║   ██║   ██║   ██████╔╝███████║██║     █████╗
  ██╔══╝  ██║     ██║   ██║   ██║   ██╔══██╗██╔══██║██║     ██╔══╝
  ███████╗╚██████╗╚██████╔╝   ██║   ██║  ██║██║  ██║╚██████╗███████╗
  ╚══════╝ ╚═════╝ ╚═════╝    ╚═╝   ╚═╝  ╚═╝╚═╝  ╚═╝ ╚═════╝╚══════╝

  Carbon Accounting Server v{}

  Deterministic • Owner-Scoped • Reconcilable
"#,
        env!("CARGO_PKG_VERSION")
    );
}
