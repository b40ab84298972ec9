//! # Footprint CLI
//!
//! Runs footprint operations against a redb store described by a TOML
//! configuration.
//!
//! ## Usage
//!
//! ```bash
//! footprint -c footprint.toml create User '{"name": "Raphaela"}'
//! footprint find List 1 --populate todos
//! footprint find-association List 2 todos '{"done": true}' --limit 1
//! footprint update-association List 2 todos '{"task": "Update this"}' '{"task": "Updated"}'
//! ```
//!
//! Output is JSON on stdout. Logs go to stderr.

use clap::Parser;
use footprint::cli;
use footprint::render::error_to_json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // Initialize tracing: FOOTPRINT_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("FOOTPRINT_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "footprint=info,footprint_core=info".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    // Parse CLI arguments
    let cli = cli::Cli::parse();

    // Execute command
    if let Err(e) = cli::execute(cli).await {
        tracing::error!(code = e.code(), "Error: {}", e);
        println!("{}", error_to_json(&e));
        std::process::exit(1);
    }
}
